// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]
//#![deny(unsafe_code)]
// - 'collections/appendlist.rs' writes array slots guarded by a publish fence
// - 'com/abi.rs' dispatches through foreign vtables
// - 'ccw/vtable.rs' implements the native-callable vtable slots

//! # combridge
//!
//! A runtime bridge between a managed object model and native COM/WinRT objects.
//! `combridge` creates and tracks Runtime Callable Wrappers (RCWs) that let managed
//! code call into native COM objects, and COM Callable Wrappers (CCWs) that expose
//! managed objects to native callers through vtable-based interfaces. Around those
//! two pipelines it maintains process-wide identity caches keyed by native pointers
//! and the low-contention concurrent collections the interop hot paths are built on.
//!
//! ## Features
//!
//! - **🪞 Identity-preserving wrappers** - at most one RCW per native identity per
//!   context, exactly one CCW per managed target
//! - **🧵 Dual lifetime management** - native reference counts bridged to managed
//!   reachability with an explicit strong/weak ownership bridge
//! - **📚 Interop metadata registry** - priority-ordered module tables answering
//!   type ↔ name ↔ GUID ↔ vtable queries
//! - **⚡ Purpose-built collections** - open-chaining hash tables with explicit
//!   memory layout and a single-writer append list with non-blocking readers
//! - **🛡️ Boundary-safe errors** - exceptions on the managed side, result codes on
//!   the native side, with a round-trippable translation layer between them
//!
//! ## Quick Start
//!
//! Add `combridge` to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! combridge = "0.2"
//! ```
//!
//! ### Using the Prelude
//!
//! For convenient access to the most commonly used types, import the prelude:
//!
//! ```rust
//! use combridge::prelude::*;
//!
//! let registry = ModuleRegistry::new();
//! assert!(registry.try_get_class_type_from_name("Windows.Foundation.Uri").is_none());
//! ```
//!
//! ### Registering interop metadata
//!
//! ```rust
//! use combridge::registry::{ModuleBuilder, ModuleRegistry, TypeHandle};
//! use combridge::com::IID_IUNKNOWN;
//!
//! let module = ModuleBuilder::new(10)
//!     .interface("MyApp.IWidget", TypeHandle::from_raw(0x1000), IID_IUNKNOWN)
//!     .build();
//!
//! let registry = ModuleRegistry::new();
//! registry.register(module);
//!
//! let itf = registry.try_get_interface_type_from_name("MyApp.IWidget");
//! assert_eq!(itf, Some(TypeHandle::from_raw(0x1000)));
//! ```
//!
//! ## Architecture
//!
//! `combridge` is organized into several key modules:
//!
//! - [`prelude`] - Convenient re-exports of commonly used types
//! - [`collections`] - Hash table primitives and the concurrent append list
//! - [`com`] - The native vtable ABI: result codes, IIDs, raw-call primitives
//! - [`registry`] - Interop metadata modules and the process-wide registry
//! - [`rcw`] - Runtime Callable Wrappers and the native-identity cache
//! - [`ccw`] - COM Callable Wrappers, vtable dispatch and the class factory
//! - [`marshal`] - The orchestration facade: object ↔ pointer, error ↔ result code
//! - [`Error`] and [`Result`] - Comprehensive error handling
//!
//! ### Data flow
//!
//! Native code calling into the process invokes a CCW vtable slot; dispatch resolves
//! the target managed object and calls it. Managed code holding an RCW resolves and
//! caches the correct native interface pointer and invokes through its vtable. Both
//! paths are keyed by identity: COM identity (the identity `IUnknown` pointer) on
//! the native side, object identity on the managed side.

#[macro_use]
mod macros;

mod error;

pub mod ccw;
pub mod collections;
pub mod com;
pub mod marshal;
pub mod prelude;
pub mod rcw;
pub mod registry;

/// The error type covering every failure this library reports on the managed side.
///
/// See [`Error`] for the taxonomy; native-facing entry points translate these to
/// [`com::HResult`] values instead of unwinding across the boundary.
pub use error::Error;

/// `Result<T, Error>` alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
