//! Clipforge Common Utilities
//!
//! Shared infrastructure for all Clipforge crates:
//! - Error types and result aliases
//! - Media time and time ranges
//! - Tracing/logging initialization
//! - Configuration loading

pub mod config;
pub mod error;
pub mod logging;
pub mod time;

pub use config::*;
pub use error::*;
pub use time::*;
