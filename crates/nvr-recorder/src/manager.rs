//! Fleet manager: one supervisor per source plus the retention sweeper.
//!
//! Every unit is started once and shares a single shutdown token. Stopping
//! the fleet cancels the token, then joins each unit until it reaches a
//! terminal state.

use crate::config::RecorderConfig;
use crate::retention::{RetentionPolicy, RetentionSweeper};
use crate::supervisor::{CaptureSupervisor, SupervisorHandle, SupervisorOutcome};
use nvr_capture_state::StateSnapshot;
use nvr_common::{Error, Result, SourceId};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Overall recorder state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Running,
    Stopping,
    Stopped,
}

/// Final outcome of every supervisor after shutdown.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSummary {
    pub outcomes: BTreeMap<SourceId, SupervisorOutcome>,
    /// Units whose task panicked or was aborted
    pub crashed: Vec<String>,
}

impl ShutdownSummary {
    pub fn count(&self, outcome: SupervisorOutcome) -> usize {
        self.outcomes.values().filter(|o| **o == outcome).count()
    }
}

struct SupervisorTask {
    handle: SupervisorHandle,
    task: JoinHandle<SupervisorOutcome>,
}

pub struct Recorder;

impl Recorder {
    /// Spawn all supervisors and the sweeper on the current runtime.
    pub fn start(config: &RecorderConfig) -> RecorderHandle {
        let settings = Arc::new(config.settings.clone());
        let shutdown = CancellationToken::new();

        info!(
            "Starting recorder with {} cameras ({} enabled)",
            config.cameras.len(),
            config.enabled_sources().len()
        );

        let supervisors = config
            .cameras
            .iter()
            .map(|source| {
                let supervisor = CaptureSupervisor::with_token(
                    source.clone(),
                    Arc::clone(&settings),
                    config.supervisor.clone(),
                    shutdown.child_token(),
                );
                let handle = supervisor.handle();
                let task = tokio::spawn(supervisor.run());
                SupervisorTask { handle, task }
            })
            .collect();

        let sweeper = RetentionSweeper::new(
            RetentionPolicy::from_settings(&settings),
            &config.retention,
            shutdown.child_token(),
        );
        let sweeper = tokio::spawn(sweeper.run());

        RecorderHandle {
            shutdown,
            supervisors,
            sweeper,
            state: Arc::new(Mutex::new(RecorderState::Running)),
        }
    }
}

/// Control handle for a running recorder.
pub struct RecorderHandle {
    shutdown: CancellationToken,
    supervisors: Vec<SupervisorTask>,
    sweeper: JoinHandle<()>,
    state: Arc<Mutex<RecorderState>>,
}

impl RecorderHandle {
    pub fn state(&self) -> RecorderState {
        *self.state.lock()
    }

    pub fn source_ids(&self) -> Vec<SourceId> {
        self.supervisors
            .iter()
            .map(|s| s.handle.source_id().clone())
            .collect()
    }

    /// Stop one source's supervisor. The rest of the fleet keeps running.
    pub fn stop_source(&self, source_id: &SourceId) -> Result<()> {
        let supervisor = self
            .supervisors
            .iter()
            .find(|s| s.handle.source_id() == source_id)
            .ok_or_else(|| Error::source_not_found(source_id.clone()))?;

        info!("Stopping capture for {}", source_id);
        supervisor.handle.stop();
        Ok(())
    }

    pub fn source_states(&self) -> Vec<StateSnapshot> {
        self.supervisors.iter().map(|s| s.handle.snapshot()).collect()
    }

    /// True once every supervisor has reached a terminal state.
    pub fn all_terminal(&self) -> bool {
        self.supervisors
            .iter()
            .all(|s| s.handle.state().is_terminal())
    }

    /// Signal every unit to stop and wait for each to finish.
    pub async fn shutdown(self) -> ShutdownSummary {
        info!("Shutting down recorder");
        *self.state.lock() = RecorderState::Stopping;
        self.shutdown.cancel();

        let mut summary = ShutdownSummary::default();
        for SupervisorTask { handle, task } in self.supervisors {
            match task.await {
                Ok(outcome) => {
                    summary.outcomes.insert(handle.source_id().clone(), outcome);
                }
                Err(e) => {
                    error!("Supervisor for {} did not finish cleanly: {}", handle.source_id(), e);
                    summary.crashed.push(handle.source_id().to_string());
                }
            }
        }

        if let Err(e) = self.sweeper.await {
            error!("Retention sweeper did not finish cleanly: {}", e);
            summary.crashed.push("retention".to_string());
        }

        *self.state.lock() = RecorderState::Stopped;
        info!(
            stopped = summary.count(SupervisorOutcome::Stopped),
            failed_auth = summary.count(SupervisorOutcome::FailedAuth),
            disabled = summary.count(SupervisorOutcome::Disabled),
            "Recorder shut down"
        );
        summary
    }
}
