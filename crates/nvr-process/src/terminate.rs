//! Process termination primitives.

use nvr_common::{CaptureError, CaptureResult};
use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::Child;
use tracing::{debug, warn};

/// Terminate a process gracefully (SIGTERM).
pub fn terminate_gracefully(pid: u32) -> CaptureResult<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
            .map_err(|e| CaptureError::stop_failed(pid.to_string(), e.to_string()))
    }

    #[cfg(not(unix))]
    {
        Err(CaptureError::stop_failed(
            pid.to_string(),
            "graceful termination is not supported on this platform",
        ))
    }
}

/// Stop a live child: SIGTERM, wait up to `grace`, then kill and reap.
///
/// Returns the exit status once the child has been reaped.
pub async fn stop_child(child: &mut Child, grace: Duration) -> CaptureResult<ExitStatus> {
    let pid = match child.id() {
        Some(pid) => pid,
        // Already reaped
        None => return wait_child(child).await,
    };

    match terminate_gracefully(pid) {
        Ok(()) => {
            debug!(pid, "Sent termination signal");
            if let Ok(status) = tokio::time::timeout(grace, child.wait()).await {
                return status
                    .map_err(|e| CaptureError::stop_failed(pid.to_string(), e.to_string()));
            }
            warn!(pid, grace = ?grace, "Child did not exit within grace period, killing");
        }
        Err(e) => {
            warn!(pid, error = %e, "Graceful termination failed, killing");
        }
    }

    child
        .start_kill()
        .map_err(|e| CaptureError::stop_failed(pid.to_string(), e.to_string()))?;
    wait_child(child).await
}

async fn wait_child(child: &mut Child) -> CaptureResult<ExitStatus> {
    child
        .wait()
        .await
        .map_err(|e| CaptureError::stop_failed("child", e.to_string()))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::spawn_piped;
    use std::path::Path;

    #[tokio::test]
    async fn test_stop_child_terminates_sleeper() {
        let mut child = spawn_piped(Path::new("/bin/sh"), &["-c".into(), "sleep 30".into()])
            .unwrap();
        let status = stop_child(&mut child, Duration::from_secs(2)).await.unwrap();
        assert!(!status.success());
    }

    #[tokio::test]
    async fn test_stop_child_kills_after_grace() {
        // Ignores SIGTERM, so only the hard kill ends it
        let mut child = spawn_piped(
            Path::new("/bin/sh"),
            &["-c".into(), "trap '' TERM; exec sleep 30".into()],
        )
        .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let started = std::time::Instant::now();
        let status = stop_child(&mut child, Duration::from_millis(200)).await.unwrap();
        assert!(!status.success());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_stop_child_already_exited() {
        let mut child = spawn_piped(Path::new("/bin/sh"), &["-c".into(), "exit 3".into()])
            .unwrap();
        let status = child.wait().await.unwrap();
        assert_eq!(status.code(), Some(3));
        let again = stop_child(&mut child, Duration::from_millis(100)).await.unwrap();
        assert_eq!(again.code(), Some(3));
    }
}
