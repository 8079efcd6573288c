//! # NVR Capture State
//!
//! State machine for one capture supervisor. The supervisor drives it; the
//! fleet manager reads snapshots of it for status reporting.

use chrono::{DateTime, Utc};
use nvr_common::{CaptureError, CaptureResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of transitions kept in history.
const HISTORY_LIMIT: usize = 100;

/// Capture supervisor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    /// Constructed, not yet running
    Idle,
    /// Building the capture command and spawning the subprocess
    Attempting,
    /// Subprocess alive, output being drained
    Running,
    /// Subprocess ended or failed to spawn
    Exited,
    /// Waiting out a fixed delay before the next attempt
    BackingOff,
    /// Stop was requested
    Stopped,
    /// Authorization failure observed; no further attempts this run
    FailedAuth,
    /// Source is disabled; no attempts are made
    Disabled,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureState::Idle => write!(f, "idle"),
            CaptureState::Attempting => write!(f, "attempting"),
            CaptureState::Running => write!(f, "running"),
            CaptureState::Exited => write!(f, "exited"),
            CaptureState::BackingOff => write!(f, "backing_off"),
            CaptureState::Stopped => write!(f, "stopped"),
            CaptureState::FailedAuth => write!(f, "failed_auth"),
            CaptureState::Disabled => write!(f, "disabled"),
        }
    }
}

impl CaptureState {
    /// Terminal states are never left.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CaptureState::Stopped | CaptureState::FailedAuth | CaptureState::Disabled
        )
    }
}

/// Represents a state transition with timestamp and optional reason
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from_state: CaptureState,
    pub to_state: CaptureState,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Tracks the current state of one capture supervisor and validates moves.
#[derive(Debug, Clone)]
pub struct CaptureStateMachine {
    source_id: String,
    current_state: CaptureState,
    state_history: Vec<StateTransition>,
    last_transition_time: DateTime<Utc>,
    attempts: u64,
}

impl CaptureStateMachine {
    pub fn new(source_id: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            current_state: CaptureState::Idle,
            state_history: Vec::new(),
            last_transition_time: Utc::now(),
            attempts: 0,
        }
    }

    pub fn current_state(&self) -> CaptureState {
        self.current_state
    }

    pub fn state_history(&self) -> &[StateTransition] {
        &self.state_history
    }

    pub fn last_transition_time(&self) -> DateTime<Utc> {
        self.last_transition_time
    }

    /// Number of times the machine entered `Attempting`. Not bounded by the
    /// history limit.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn is_valid_transition(&self, target_state: CaptureState) -> bool {
        use CaptureState::*;

        match (self.current_state, target_state) {
            // Terminal states are sticky
            (state, _) if state.is_terminal() => state == target_state,

            (Idle, Attempting) => true,
            (Idle, Disabled) => true,
            (Idle, Stopped) => true, // stop requested before run

            (Attempting, Running) => true,
            (Attempting, Exited) => true, // spawn failure
            (Attempting, BackingOff) => true, // unresolved URL
            (Attempting, Stopped) => true,

            (Running, Exited) => true,

            (Exited, Stopped) => true,
            (Exited, FailedAuth) => true,
            (Exited, BackingOff) => true,

            (BackingOff, Attempting) => true,
            (BackingOff, Stopped) => true,

            (state, target) if state == target => true,

            _ => false,
        }
    }

    /// Transition to a new state with optional reason
    pub fn transition_to(
        &mut self,
        target_state: CaptureState,
        reason: Option<String>,
    ) -> CaptureResult<()> {
        if !self.is_valid_transition(target_state) {
            return Err(CaptureError::invalid_state(
                &self.source_id,
                target_state.to_string(),
                self.current_state.to_string(),
            ));
        }

        if target_state == self.current_state {
            return Ok(());
        }

        let now = Utc::now();
        let from_state = self.current_state;
        self.state_history.push(StateTransition {
            from_state,
            to_state: target_state,
            timestamp: now,
            reason,
        });
        if self.state_history.len() > HISTORY_LIMIT {
            self.state_history.remove(0);
        }

        self.current_state = target_state;
        self.last_transition_time = now;
        if target_state == CaptureState::Attempting {
            self.attempts += 1;
        }

        tracing::debug!(
            source = %self.source_id,
            from = %from_state,
            to = %target_state,
            "Capture state transition"
        );

        Ok(())
    }

    pub fn last_transition(&self) -> Option<&StateTransition> {
        self.state_history.last()
    }

    /// Point-in-time copy for status reporting.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            source_id: self.source_id.clone(),
            state: self.current_state,
            since: self.last_transition_time,
            attempts: self.attempts,
            last_reason: self.last_transition().and_then(|t| t.reason.clone()),
        }
    }
}

/// Status view of a supervisor, cheap to clone and hand out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub source_id: String,
    pub state: CaptureState,
    pub since: DateTime<Utc>,
    pub attempts: u64,
    pub last_reason: Option<String>,
}
