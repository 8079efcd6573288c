//! Output writers for capture logs and the shared application log.

use crate::sanitize::sanitize_credentials;
use nvr_common::{CaptureError, CaptureResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Append-only log of one source's subprocess output.
///
/// Every line is sanitized before it reaches the file. The writer is owned by
/// the supervisor of that source and needs no locking.
pub struct SourceLogWriter {
    source_id: String,
    path: PathBuf,
    writer: LineWriter<File>,
}

impl SourceLogWriter {
    /// Open (creating if needed) `<log_root>/<source_name>.log`.
    pub fn open(log_root: &Path, source_id: &str, source_name: &str) -> CaptureResult<Self> {
        let path = log_root.join(format!("{}.log", source_name));
        let file = open_append(&path).map_err(|e| {
            CaptureError::output_error(
                source_id,
                format!("Failed to open capture log {}: {}", path.display(), e),
            )
        })?;

        Ok(Self {
            source_id: source_id.to_string(),
            path,
            writer: LineWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sanitize `line` and append it with a trailing newline.
    pub fn write_line(&mut self, line: &str) -> CaptureResult<()> {
        let safe = sanitize_credentials(line);
        self.writer
            .write_all(safe.as_bytes())
            .and_then(|_| self.writer.write_all(b"\n"))
            .map_err(|e| {
                CaptureError::output_error(
                    &self.source_id,
                    format!("Failed to write capture log: {}", e),
                )
            })
    }

    pub fn flush(&mut self) -> CaptureResult<()> {
        self.writer.flush().map_err(|e| {
            CaptureError::output_error(&self.source_id, format!("Failed to flush capture log: {}", e))
        })
    }
}

/// Shared append-only sink for the application log.
///
/// Cloning is cheap; all clones append through one mutex, so concurrent
/// writers never interleave within an event. Plugged into
/// `tracing_subscriber::fmt` as a [`MakeWriter`], it sanitizes each formatted
/// event before it is persisted.
#[derive(Clone)]
pub struct SanitizingLogSink {
    target: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl SanitizingLogSink {
    /// Sink appending to `path`, creating parent directories as needed.
    pub fn file(path: impl AsRef<Path>) -> nvr_common::Result<Self> {
        let file = open_append(path.as_ref())?;
        Ok(Self::from_writer(file))
    }

    /// Sink writing to standard error.
    pub fn stderr() -> Self {
        Self::from_writer(io::stderr())
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            target: Arc::new(Mutex::new(Box::new(writer))),
        }
    }
}

impl<'a> MakeWriter<'a> for SanitizingLogSink {
    type Writer = SanitizingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SanitizingWriter {
            target: Arc::clone(&self.target),
        }
    }
}

/// Per-event writer handed out by [`SanitizingLogSink`].
pub struct SanitizingWriter {
    target: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Write for SanitizingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        let safe = sanitize_credentials(&text);
        let mut target = self.target.lock();
        target.write_all(safe.as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.target.lock().flush()
    }
}
