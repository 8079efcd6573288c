//! # NVR Common
//!
//! Common types shared across the recorder crates: error types and source
//! identifiers.

pub mod errors;
pub mod types;

// Re-export commonly used items
pub use errors::{CaptureError, CaptureResult, Error, Result};
pub use types::SourceId;
