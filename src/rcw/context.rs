//! Context cookies: where a native interface pointer may legally be used.
//!
//! Apartment-threaded native objects are affine to the context that created them;
//! a wrapper records its creation context and refuses to hand cached pointers to a
//! different one. The cookie is opaque to this crate. The embedding runtime sets
//! the current thread's cookie; the default cookie opts a thread out of all
//! context checks, which is also the behavior for free-threaded objects.

use std::cell::Cell;

/// Opaque identifier of a native context.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ContextCookie(usize);

impl ContextCookie {
    /// The context-agnostic cookie. Matches every context.
    pub const DEFAULT: ContextCookie = ContextCookie(0);

    /// Builds a cookie from the embedder's raw context value.
    #[must_use]
    pub const fn from_raw(raw: usize) -> ContextCookie {
        ContextCookie(raw)
    }

    /// The raw context value.
    #[must_use]
    pub const fn raw(self) -> usize {
        self.0
    }

    /// Returns `true` for the context-agnostic cookie.
    #[must_use]
    pub const fn is_default(self) -> bool {
        self.0 == 0
    }

    /// Whether a pointer bound to `self` may be used from `other`.
    #[must_use]
    pub fn matches(self, other: ContextCookie) -> bool {
        self.is_default() || other.is_default() || self == other
    }
}

thread_local! {
    static CURRENT: Cell<ContextCookie> = const { Cell::new(ContextCookie::DEFAULT) };
}

/// The calling thread's current context cookie.
#[must_use]
pub fn current_context() -> ContextCookie {
    CURRENT.with(Cell::get)
}

/// Sets the calling thread's context cookie, returning the previous one.
///
/// Called by the embedding runtime when a thread enters or leaves a context;
/// tests use it to simulate cross-context calls.
pub fn set_current_context(cookie: ContextCookie) -> ContextCookie {
    CURRENT.with(|current| current.replace(cookie))
}
