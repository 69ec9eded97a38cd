use thiserror::Error;

use crate::com::HResult;
use crate::registry::TypeHandle;

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// This enum covers the managed-side failure modes of the interop runtime: identity failures
/// while materializing wrappers, collection misuse, missing interop metadata and result codes
/// surfaced by native calls. Native-facing entry points never raise these across the boundary;
/// they are translated to [`HResult`] values at the edge (see [`crate::marshal`]).
///
/// # Error Categories
///
/// ## Identity and typing errors
/// - [`Error::InvalidCast`] - Identity interface could not be obtained, or a type check failed
/// - [`Error::MissingMetadata`] - Required interop metadata is absent
/// - [`Error::ObjectDisposed`] - The underlying native object was already released
///
/// ## Collection errors
/// - [`Error::ArgumentOutOfRange`] - Index/capacity misuse of an interop collection
/// - [`Error::DuplicateKey`] - Key already present in a dictionary insert
/// - [`Error::CapacityOverflow`] - Requested size exceeds the curated prime table
///
/// ## Native protocol errors
/// - [`Error::NoSuchInterface`] - QueryInterface failed for the requested IID
/// - [`Error::Com`] - Any other failure result code returned by native code
///
/// # Examples
///
/// ```rust
/// use combridge::{collections::primes, Error};
///
/// match primes::get_prime(usize::MAX) {
///     Err(Error::CapacityOverflow) => {}
///     other => panic!("expected overflow, got {:?}", other),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The native object's identity interface could not be obtained, or a strongly-typed
    /// wrapper failed its type check.
    ///
    /// Raised when `QueryInterface` for the identity interface fails during RCW creation
    /// (identity failures never degrade to a weakly-typed wrapper), or when a caller
    /// requests an incompatible wrapper type.
    #[error("Specified cast is not valid")]
    InvalidCast,

    /// Required interop metadata is absent.
    ///
    /// The operation fundamentally cannot proceed without the missing descriptor. Lookups
    /// that can degrade (e.g. an unresolvable runtime class name) do so instead of raising
    /// this; only operations with no weaker fallback report it.
    ///
    /// # Fields
    ///
    /// * `message` - Description of which metadata is missing
    /// * `file` - Source file where the condition was detected
    /// * `line` - Source line where the condition was detected
    #[error("Missing interop metadata - {file}:{line}: {message}")]
    MissingMetadata {
        /// The message describing the missing metadata
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An index or capacity argument was outside the valid range for the collection.
    #[error("Argument out of range: {0}")]
    ArgumentOutOfRange(&'static str),

    /// An `insert` found the key already present.
    #[error("An item with the same key has already been added")]
    DuplicateKey,

    /// A hash table grow request exceeded the largest entry in the curated prime table.
    #[error("Hash table capacity exceeds the maximum supported prime")]
    CapacityOverflow,

    /// The requested operation is not available in this configuration.
    #[error("Operation is not supported: {0}")]
    NotSupported(&'static str),

    /// `QueryInterface` failed: the object does not implement the requested interface.
    ///
    /// Carries the type handle that was requested, when known, for diagnostics.
    #[error("The object does not support the requested interface ({0:?})")]
    NoSuchInterface(TypeHandle),

    /// The underlying native object has already been released.
    #[error("Cannot access a disposed object")]
    ObjectDisposed,

    /// A failure result code returned by a native call that does not map to a more
    /// specific variant.
    #[error("Native call failed with result code {0}")]
    Com(HResult),
}

impl Error {
    /// Translate this error to the result code reported across the native boundary.
    ///
    /// This mapping is total: every error maps to some failure `HResult`.
    #[must_use]
    pub fn to_hresult(&self) -> HResult {
        match self {
            Error::InvalidCast => HResult::COR_E_INVALIDCAST,
            Error::MissingMetadata { .. } => HResult::E_FAIL,
            Error::ArgumentOutOfRange(_) => HResult::E_BOUNDS,
            Error::DuplicateKey => HResult::E_INVALIDARG,
            Error::CapacityOverflow => HResult::E_OUTOFMEMORY,
            Error::NotSupported(_) => HResult::E_NOTIMPL,
            Error::NoSuchInterface(_) => HResult::E_NOINTERFACE,
            Error::ObjectDisposed => HResult::COR_E_OBJECTDISPOSED,
            Error::Com(hr) => {
                if hr.is_failure() {
                    *hr
                } else {
                    HResult::E_FAIL
                }
            }
        }
    }
}
