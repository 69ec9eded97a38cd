//! Concurrent and layout-controlled collections purpose-built for interop hot paths.
//!
//! Nothing in this module is a general-purpose replacement for the standard
//! collections. Each type exists because an interop code path needs explicit
//! control the standard library does not give:
//!
//! - [`Dictionary`] - open-chaining map with struct-of-arrays layout, external
//!   hash codes and slot enumeration; backs the RCW identity cache
//! - [`KeyedSet`] - hash set exposing its bucket chains so the caller can apply
//!   its own identity rules per candidate; backs the CCW lookup map
//! - [`FixedHashTable`] - fixed-size flat-array index for immutable metadata
//!   tables (GUID maps, compressed name maps)
//! - [`AppendList`] / [`InlineAppendList`] - single-writer append list whose
//!   readers never block; backs the per-RCW interface pointer cache
//! - [`primes`] - the curated prime table every bucket array is sized from

mod appendlist;
mod dictionary;
mod fixed;
mod keyedset;
pub mod primes;

pub use appendlist::{AppendList, AppendListIter, InlineAppendList, InlineAppendListIter};
pub use dictionary::{mask_hash, Dictionary};
pub use fixed::FixedHashTable;
pub use keyedset::KeyedSet;
