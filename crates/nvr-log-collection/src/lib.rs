//! # NVR Log Collection
//!
//! Everything that puts capture text on disk:
//! - Credential redaction for URLs embedded in log text
//! - Per-source capture logs (`<log_root>/<source-name>.log`)
//! - The shared, serialized application log sink used by `tracing`

pub mod output;
pub mod sanitize;

// Re-export main types
pub use output::{SanitizingLogSink, SanitizingWriter, SourceLogWriter};
pub use sanitize::{sanitize_credentials, PASSWORD_PLACEHOLDER, USER_PLACEHOLDER};
