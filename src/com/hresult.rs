//! The signed 32-bit result-code convention of the native boundary.
//!
//! Native-facing entry points never unwind; they return an [`HResult`] where zero and
//! positive values denote success variants and negative values denote failures. The
//! well-known failure codes used inside this crate are defined here as associated
//! constants; the managed-side [`crate::Error`] taxonomy maps onto them in
//! [`crate::marshal`].

use std::fmt;

/// A COM-style result code.
///
/// Success iff the value is non-negative. The type is `#[repr(transparent)]` so it
/// can sit directly in vtable signatures.
///
/// # Examples
///
/// ```rust
/// use combridge::com::HResult;
///
/// assert!(HResult::S_OK.is_success());
/// assert!(HResult::E_NOINTERFACE.is_failure());
/// assert_eq!(format!("{}", HResult::E_NOINTERFACE), "0x80004002");
/// ```
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HResult(pub i32);

impl HResult {
    /// Operation succeeded.
    pub const S_OK: HResult = HResult(0);
    /// Operation succeeded with a negative/false outcome.
    pub const S_FALSE: HResult = HResult(1);

    /// Member not implemented.
    pub const E_NOTIMPL: HResult = HResult(0x8000_4001_u32 as i32);
    /// The object does not support the requested interface.
    pub const E_NOINTERFACE: HResult = HResult(0x8000_4002_u32 as i32);
    /// Invalid pointer argument.
    pub const E_POINTER: HResult = HResult(0x8000_4003_u32 as i32);
    /// Unspecified failure.
    pub const E_FAIL: HResult = HResult(0x8000_4005_u32 as i32);
    /// Bounds violation in a collection access.
    pub const E_BOUNDS: HResult = HResult(0x8000_000B_u32 as i32);
    /// A collection was mutated during enumeration.
    pub const E_CHANGED_STATE: HResult = HResult(0x8000_000C_u32 as i32);
    /// Invalid argument value.
    pub const E_INVALIDARG: HResult = HResult(0x8007_0057_u32 as i32);
    /// Allocation failed.
    pub const E_OUTOFMEMORY: HResult = HResult(0x8007_000E_u32 as i32);

    /// The class does not support aggregation.
    pub const CLASS_E_NOAGGREGATION: HResult = HResult(0x8004_0110_u32 as i32);
    /// The requested class is not available.
    pub const CLASS_E_CLASSNOTAVAILABLE: HResult = HResult(0x8004_0111_u32 as i32);

    /// The underlying object has been disconnected from its proxy.
    pub const RPC_E_DISCONNECTED: HResult = HResult(0x8001_0108_u32 as i32);
    /// The call was made from the wrong context/apartment.
    pub const RPC_E_WRONG_THREAD: HResult = HResult(0x8001_010E_u32 as i32);

    /// Managed invalid-cast failure (shares the E_NOINTERFACE value by convention).
    pub const COR_E_INVALIDCAST: HResult = HResult(0x8000_4002_u32 as i32);
    /// Managed object-disposed failure.
    pub const COR_E_OBJECTDISPOSED: HResult = HResult(0x8013_1622_u32 as i32);

    /// Returns `true` for zero and positive values.
    #[must_use]
    pub fn is_success(self) -> bool {
        self.0 >= 0
    }

    /// Returns `true` for negative values.
    #[must_use]
    pub fn is_failure(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0 as u32)
    }
}

impl fmt::Debug for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HResult(0x{:08X})", self.0 as u32)
    }
}

impl From<i32> for HResult {
    fn from(value: i32) -> Self {
        HResult(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_and_failure_split_on_sign() {
        assert!(HResult::S_OK.is_success());
        assert!(HResult::S_FALSE.is_success());
        assert!(HResult(42).is_success());

        assert!(HResult::E_FAIL.is_failure());
        assert!(HResult::E_NOINTERFACE.is_failure());
        assert!(HResult::CLASS_E_NOAGGREGATION.is_failure());
    }

    #[test]
    fn test_well_known_values() {
        assert_eq!(HResult::E_NOINTERFACE.0 as u32, 0x8000_4002);
        assert_eq!(HResult::E_NOTIMPL.0 as u32, 0x8000_4001);
        assert_eq!(HResult::CLASS_E_NOAGGREGATION.0 as u32, 0x8004_0110);
        assert_eq!(HResult::E_OUTOFMEMORY.0 as u32, 0x8007_000E);
        assert_eq!(HResult::E_POINTER.0 as u32, 0x8000_4003);
    }
}
