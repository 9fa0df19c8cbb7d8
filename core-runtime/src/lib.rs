//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the audio file reader
//! crates:
//! - Logging and tracing bootstrap
//! - The shared runtime error type
//!
//! ## Overview
//!
//! Host applications call [`logging::init_logging`] once at startup. The
//! reader crates only emit `tracing` events; this crate decides where they go.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
