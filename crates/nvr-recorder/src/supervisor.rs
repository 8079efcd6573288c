//! Capture supervisor: keeps one capture subprocess alive per source.
//!
//! The supervisor owns at most one child at a time. It restarts the child
//! after transient failures, halts for good once the source rejects our
//! credentials, and stops promptly when cancelled. All output is drained
//! in this task, sanitized, and appended to the source's own log file.

use crate::auth::is_auth_failure;
use crate::command::CaptureCommand;
use crate::config::{GlobalSettings, Source, SupervisorOptions};
use crate::lifecycle::{AttemptOutcome, CaptureLifecycle, NextStep};
use nvr_capture_state::{CaptureState, CaptureStateMachine, StateSnapshot};
use nvr_common::SourceId;
use nvr_log_collection::{sanitize_credentials, SourceLogWriter};
use nvr_process::{spawn_piped, stop_child};
use parking_lot::RwLock;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Split};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Terminal result of [`CaptureSupervisor::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorOutcome {
    Disabled,
    Stopped,
    FailedAuth,
}

/// Cloneable control and status handle for a running supervisor.
#[derive(Clone)]
pub struct SupervisorHandle {
    source_id: SourceId,
    token: CancellationToken,
    state: Arc<RwLock<CaptureStateMachine>>,
}

impl SupervisorHandle {
    pub fn source_id(&self) -> &SourceId {
        &self.source_id
    }

    /// Request stop. Idempotent, and safe before the supervisor runs. A live
    /// subprocess is terminated so its output stream unblocks.
    pub fn stop(&self) {
        if !self.token.is_cancelled() {
            debug!(source = %self.source_id, "Stop requested");
        }
        self.token.cancel();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn state(&self) -> CaptureState {
        self.state.read().current_state()
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.state.read().snapshot()
    }
}

pub struct CaptureSupervisor {
    source: Source,
    settings: Arc<GlobalSettings>,
    options: SupervisorOptions,
    token: CancellationToken,
    state: Arc<RwLock<CaptureStateMachine>>,
}

enum Stream {
    Stdout,
    Stderr,
}

impl CaptureSupervisor {
    pub fn new(source: Source, settings: Arc<GlobalSettings>, options: SupervisorOptions) -> Self {
        Self::with_token(source, settings, options, CancellationToken::new())
    }

    /// Construct with a caller-provided token, typically a child of a
    /// fleet-wide shutdown token.
    pub fn with_token(
        source: Source,
        settings: Arc<GlobalSettings>,
        options: SupervisorOptions,
        token: CancellationToken,
    ) -> Self {
        let state = Arc::new(RwLock::new(CaptureStateMachine::new(source.id.as_str())));
        Self {
            source,
            settings,
            options,
            token,
            state,
        }
    }

    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            source_id: self.source.id.clone(),
            token: self.token.clone(),
            state: Arc::clone(&self.state),
        }
    }

    /// Same as [`SupervisorHandle::stop`].
    pub fn stop(&self) {
        self.handle().stop();
    }

    /// Run until a terminal state is reached.
    pub async fn run(self) -> SupervisorOutcome {
        if !self.source.enabled {
            info!(
                source = %self.source.id,
                "Skipping recorder for camera {} because it is disabled",
                self.source.name
            );
            self.set_state(CaptureState::Disabled, Some("source disabled".into()));
            return SupervisorOutcome::Disabled;
        }

        let mut lifecycle =
            CaptureLifecycle::new(self.source.id.as_str(), self.options.restart_delay);

        loop {
            if self.token.is_cancelled() {
                return self.finish_stopped(lifecycle.restart_attempts());
            }

            self.set_state(CaptureState::Attempting, None);
            let command = CaptureCommand::build(&self.source, &self.settings);

            if command.has_unusable_url() {
                info!(
                    source = %self.source.id,
                    "[{}] Invalid source URL after env expansion: {:?}, retrying in {:?}",
                    self.source.name,
                    sanitize_credentials(&command.url),
                    self.options.invalid_url_delay
                );
                self.set_state(CaptureState::BackingOff, Some("unresolved source URL".into()));
                if !self.sleep_unless_stopped(self.options.invalid_url_delay).await {
                    return self.finish_stopped(lifecycle.restart_attempts());
                }
                continue;
            }

            let outcome = self.run_attempt(&command).await;
            self.set_state(CaptureState::Exited, Some(outcome.describe()));

            match lifecycle.next_step(&outcome, self.token.is_cancelled()) {
                NextStep::Stop => return self.finish_stopped(lifecycle.restart_attempts()),
                NextStep::HaltAuth => {
                    error!(
                        source = %self.source.id,
                        restarts = lifecycle.restart_attempts(),
                        "[{}] Authorization error detected; will not retry connecting to this camera",
                        self.source.name
                    );
                    self.set_state(CaptureState::FailedAuth, Some(outcome.describe()));
                    return SupervisorOutcome::FailedAuth;
                }
                NextStep::RetryAfter(delay) => {
                    self.set_state(CaptureState::BackingOff, None);
                    if !self.sleep_unless_stopped(delay).await {
                        return self.finish_stopped(lifecycle.restart_attempts());
                    }
                }
            }
        }
    }

    /// Spawn the capture subprocess once and drain its output until it exits
    /// or stop is requested.
    async fn run_attempt(&self, command: &CaptureCommand) -> AttemptOutcome {
        let id = self.source.id.as_str();

        if let Err(e) = std::fs::create_dir_all(&command.output_dir) {
            warn!(
                source = %id,
                "Failed to create output directory {}: {}",
                command.output_dir.display(),
                e
            );
        }

        let mut log = match SourceLogWriter::open(&self.settings.log_root, id, &self.source.name)
        {
            Ok(log) => Some(log),
            Err(e) => {
                warn!(source = %id, error = %e, "Capture output will not be persisted");
                None
            }
        };

        info!(
            source = %id,
            "[{}] Starting capture: {}",
            self.source.name,
            command.display_sanitized()
        );

        let mut child = match spawn_piped(&command.program, &command.args) {
            Ok(child) => child,
            Err(e) => {
                error!(source = %id, "[{}] Error starting capture: {}", self.source.name, e);
                return AttemptOutcome::spawn_failed(e.to_string());
            }
        };

        let pid = child.id();
        self.set_state(
            CaptureState::Running,
            pid.map(|pid| format!("pid {}", pid)),
        );

        // Raw segments: capture output is not guaranteed to be UTF-8
        let mut stdout = child.stdout.take().map(|s| BufReader::new(s).split(b'\n'));
        let mut stderr = child.stderr.take().map(|s| BufReader::new(s).split(b'\n'));
        let mut auth_failure = false;

        while stdout.is_some() || stderr.is_some() {
            let (stream, read) = tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                read = next_line(stdout.as_mut()), if stdout.is_some() => (Stream::Stdout, read),
                read = next_line(stderr.as_mut()), if stderr.is_some() => (Stream::Stderr, read),
            };

            match read {
                Ok(Some(raw)) => {
                    let line = decode_line(&raw);
                    if is_auth_failure(&line) && !auth_failure {
                        warn!(source = %id, "Authorization failure marker in capture output");
                        auth_failure = true;
                    }
                    let failed = log.as_mut().and_then(|w| w.write_line(&line).err());
                    if let Some(e) = failed {
                        warn!(source = %id, error = %e, "Dropping capture log output");
                        log = None;
                    }
                }
                Ok(None) => close(&stream, &mut stdout, &mut stderr),
                Err(e) => {
                    debug!(source = %id, error = %e, "Capture output stream failed");
                    close(&stream, &mut stdout, &mut stderr);
                }
            }
        }

        let status = tokio::select! {
            status = child.wait() => status.map_err(|e| e.to_string()),
            _ = self.token.cancelled() => stop_child(&mut child, self.options.stop_grace)
                .await
                .map_err(|e| e.to_string()),
        };

        if let Some(e) = log.as_mut().and_then(|w| w.flush().err()) {
            warn!(source = %id, error = %e, "Failed to flush capture log");
        }

        match status {
            Ok(status) => {
                info!(
                    source = %id,
                    "[{}] Capture exited with code {:?} (auth_error_detected={})",
                    self.source.name,
                    status.code(),
                    auth_failure
                );
                AttemptOutcome::exited(status.code(), auth_failure)
            }
            Err(e) => {
                error!(source = %id, "[{}] Failed to reap capture process: {}", self.source.name, e);
                AttemptOutcome::exited(None, auth_failure)
            }
        }
    }

    /// Sleep for `delay`; false if stop was requested meanwhile.
    async fn sleep_unless_stopped(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(delay) => !self.token.is_cancelled(),
        }
    }

    fn finish_stopped(&self, restarts: u32) -> SupervisorOutcome {
        self.set_state(CaptureState::Stopped, Some("stop requested".into()));
        info!(
            source = %self.source.id,
            restarts,
            "[{}] Capture supervisor stopped",
            self.source.name
        );
        SupervisorOutcome::Stopped
    }

    fn set_state(&self, state: CaptureState, reason: Option<String>) {
        if let Err(e) = self.state.write().transition_to(state, reason) {
            warn!(source = %self.source.id, error = %e, "Unexpected capture state transition");
        }
    }
}

/// Next raw line from an optional reader; pending forever when there is none.
async fn next_line<R>(lines: Option<&mut Split<BufReader<R>>>) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    match lines {
        Some(lines) => lines.next_segment().await,
        None => std::future::pending().await,
    }
}

/// Lossy UTF-8 decode without the trailing carriage return.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

fn close<A, B>(stream: &Stream, stdout: &mut Option<A>, stderr: &mut Option<B>) {
    match stream {
        Stream::Stdout => *stdout = None,
        Stream::Stderr => *stderr = None,
    }
}
