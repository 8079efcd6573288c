//! Process execution primitives.

use nvr_common::{CaptureError, CaptureResult};
use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, Command};

/// Spawn `executable` with `args`, stdout and stderr piped, stdin closed.
///
/// The child is killed if its handle is dropped, so a supervisor task that
/// is torn down never leaves an orphan behind.
pub fn spawn_piped(executable: &Path, args: &[String]) -> CaptureResult<Child> {
    let mut cmd = Command::new(executable);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    cmd.spawn()
        .map_err(|e| CaptureError::spawn_failed(executable.display().to_string(), e.to_string()))
}
