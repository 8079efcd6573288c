//! # NVR Process
//!
//! Low-level subprocess operations used by the capture supervisors:
//! - Spawning with piped standard streams
//! - Graceful termination by PID
//! - Bounded stop of a live child (terminate, wait, then kill)

pub mod execute;
pub mod terminate;

// Re-export main functions
pub use execute::*;
pub use terminate::*;
