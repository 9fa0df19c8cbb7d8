//! Workspace facade crate.
//!
//! This crate exposes feature flags that map to the individual workspace
//! crates (`core-runtime`, `core-metadata`, `core-reader`). Host applications
//! can depend on `audiofile-workspace` and enable the documented features
//! without wiring each crate individually.

#[cfg(feature = "reader")]
pub use core_metadata as metadata;
#[cfg(feature = "reader")]
pub use core_reader as reader;
#[cfg(feature = "reader")]
pub use core_runtime as runtime;
