//! Managed proxies for native objects, with identity-unified creation.
//!
//! The invariant of this module: for one native identity and one context there is
//! at most one live [`ComObject`]. Everything else follows from it — cache hits
//! return the existing wrapper, interface pointers are queried once and cached on
//! the wrapper, and dropping the last handle releases every native reference the
//! wrapper accumulated.
//!
//! # Key Components
//!
//! - [`ComObject`] - the wrapper: identity, context, type, interface cache
//! - [`ComObjectCache`] - weak identity map enforcing the uniqueness invariant
//! - [`create_com_object`] - the only constructor path (see its pipeline doc)
//! - [`ContextCookie`] - opaque context identity with a thread-current value

mod cache;
mod comobject;
mod context;
mod create;

#[cfg(test)]
pub(crate) use create::fixtures;

pub use cache::ComObjectCache;
pub use comobject::{CachedInterface, ComObject};
pub use context::{current_context, set_current_context, ContextCookie};
pub use create::{create_com_object, try_unbox};
