//! # NVR Recorder
//!
//! Capture supervision and tiered retention for a network video recorder.
//!
//! This crate provides:
//! - Configuration loading and validation
//! - CaptureSupervisor - per-source restart/backoff loop around the capture binary
//! - RetentionSweeper - periodic primary to backup to deleted file lifecycle
//! - Recorder - starts and stops the whole fleet

pub mod auth;
pub mod command;
pub mod config;
pub mod lifecycle;
pub mod manager;
pub mod retention;
pub mod supervisor;


// Re-export main types
pub use config::{
    GlobalSettings, RecorderConfig, RetentionOptions, Source, SupervisorOptions,
};
pub use manager::{Recorder, RecorderHandle, RecorderState, ShutdownSummary};
pub use retention::{sweep_once, RetentionPolicy, RetentionSweeper, SweepReport};
pub use supervisor::{CaptureSupervisor, SupervisorHandle, SupervisorOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
