//! Restart policy for capture supervisors.
//!
//! Decides what happens after each capture attempt. Pure apart from the
//! bookkeeping counters, so every branch is testable without a subprocess.

use std::time::Duration;
use tracing::{debug, info};

/// Result of one capture attempt, scoped to that attempt only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptOutcome {
    /// Exit code, `None` if killed by a signal or never spawned
    pub exit_code: Option<i32>,
    /// An authorization failure marker was seen in the output
    pub auth_failure: bool,
    /// Why the subprocess could not be started, if it could not
    pub spawn_error: Option<String>,
}

impl AttemptOutcome {
    pub fn exited(exit_code: Option<i32>, auth_failure: bool) -> Self {
        Self {
            exit_code,
            auth_failure,
            spawn_error: None,
        }
    }

    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        Self {
            exit_code: None,
            auth_failure: false,
            spawn_error: Some(reason.into()),
        }
    }

    /// Short human-readable description for state history.
    pub fn describe(&self) -> String {
        if let Some(ref err) = self.spawn_error {
            return format!("spawn failed: {}", err);
        }
        let code = match self.exit_code {
            Some(code) => code.to_string(),
            None => "signal".to_string(),
        };
        if self.auth_failure {
            format!("exit {} (authorization failure)", code)
        } else {
            format!("exit {}", code)
        }
    }
}

/// What the supervisor does after an attempt ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    /// Stop was requested
    Stop,
    /// Credentials were rejected; give up on this source
    HaltAuth,
    /// Transient failure; try again after the delay
    RetryAfter(Duration),
}

/// Tracks restarts of one source and applies the fixed-delay policy.
#[derive(Debug, Clone)]
pub struct CaptureLifecycle {
    source_id: String,
    restart_delay: Duration,
    restart_attempts: u32,
}

impl CaptureLifecycle {
    pub fn new(source_id: &str, restart_delay: Duration) -> Self {
        Self {
            source_id: source_id.to_string(),
            restart_delay,
            restart_attempts: 0,
        }
    }

    /// Decide the next step. Stop wins over everything, then authorization
    /// failure, then retry.
    pub fn next_step(&mut self, outcome: &AttemptOutcome, stop_requested: bool) -> NextStep {
        if stop_requested {
            debug!(source = %self.source_id, "Stop requested, not restarting");
            return NextStep::Stop;
        }

        // Spawn failures never carry the auth flag
        if outcome.auth_failure && outcome.spawn_error.is_none() {
            return NextStep::HaltAuth;
        }

        self.restart_attempts += 1;
        info!(
            source = %self.source_id,
            attempt = self.restart_attempts,
            delay = ?self.restart_delay,
            "Restarting capture after {}",
            outcome.describe()
        );
        NextStep::RetryAfter(self.restart_delay)
    }

    /// Restarts scheduled so far.
    pub fn restart_attempts(&self) -> u32 {
        self.restart_attempts
    }
}
