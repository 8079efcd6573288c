//! Two-tier retention.
//!
//! Segments older than the primary window move from `<primary>/<source>/`
//! into `<backup>/<source>/`. Files in the backup tier older than both
//! windows combined are deleted. A file lives in exactly one tier at a time.

use crate::config::{GlobalSettings, RetentionOptions};
use filetime::FileTime;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Only segment files are moved out of the primary tier.
const SEGMENT_EXTENSION: &str = "mp4";

#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    pub primary_root: PathBuf,
    pub backup_root: PathBuf,
    pub primary_retention: Duration,
    pub backup_retention: Duration,
}

/// Age thresholds for one cycle. `delete_cutoff <= move_cutoff` always.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cutoffs {
    pub move_cutoff: SystemTime,
    pub delete_cutoff: SystemTime,
}

impl RetentionPolicy {
    pub fn from_settings(settings: &GlobalSettings) -> Self {
        Self {
            primary_root: settings.primary_root.clone(),
            backup_root: settings.backup_root.clone(),
            primary_retention: settings.primary_retention,
            backup_retention: settings.backup_retention,
        }
    }

    pub fn cutoffs(&self, now: SystemTime) -> Cutoffs {
        let before = |age: Duration| now.checked_sub(age).unwrap_or(UNIX_EPOCH);
        Cutoffs {
            move_cutoff: before(self.primary_retention),
            delete_cutoff: before(self.primary_retention.saturating_add(self.backup_retention)),
        }
    }
}

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub moved: usize,
    pub deleted: usize,
    /// Files that disappeared between listing and action
    pub vanished: usize,
    /// Files left in place because of an I/O error
    pub failed: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Run one full cycle: drain primary into backup, then expire backup.
pub fn sweep_once(policy: &RetentionPolicy, now: SystemTime) -> SweepReport {
    let cutoffs = policy.cutoffs(now);
    let mut report = SweepReport::default();

    for source_dir in source_dirs(&policy.primary_root) {
        let Some(source_name) = source_dir.file_name() else {
            continue;
        };
        let target_dir = policy.backup_root.join(source_name);

        for file in aged_files(&source_dir, cutoffs.move_cutoff, &mut report) {
            if file.extension().and_then(|e| e.to_str()) != Some(SEGMENT_EXTENSION) {
                continue;
            }
            let Some(file_name) = file.file_name() else {
                continue;
            };
            let target = target_dir.join(file_name);

            match move_file(&file, &target) {
                Ok(()) => {
                    info!("[Retention] Moved {} to {}", file.display(), target.display());
                    report.moved += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => report.vanished += 1,
                Err(e) => {
                    warn!("[Retention] Failed to move {}: {}", file.display(), e);
                    report.failed += 1;
                }
            }
        }
    }

    for source_dir in source_dirs(&policy.backup_root) {
        for file in aged_files(&source_dir, cutoffs.delete_cutoff, &mut report) {
            match fs::remove_file(&file) {
                Ok(()) => {
                    info!("[Retention] Deleted expired file: {}", file.display());
                    report.deleted += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => report.vanished += 1,
                Err(e) => {
                    warn!("[Retention] Failed to delete {}: {}", file.display(), e);
                    report.failed += 1;
                }
            }
        }
    }

    report
}

/// Per-source subdirectories of a tier root. A missing root is empty.
fn source_dirs(root: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("[Retention] Tier root {} does not exist yet", root.display());
            return Vec::new();
        }
        Err(e) => {
            warn!("[Retention] Cannot list {}: {}", root.display(), e);
            return Vec::new();
        }
    };

    let mut dirs: Vec<PathBuf> = entries
        .flatten()
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|entry| entry.path())
        .collect();
    dirs.sort();
    dirs
}

/// Regular files in `dir` last modified strictly before `cutoff`.
fn aged_files(dir: &Path, cutoff: SystemTime, report: &mut SweepReport) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!("[Retention] Cannot list {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut files = Vec::new();
    for entry in entries.flatten() {
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        match entry.metadata().and_then(|m| m.modified()) {
            Ok(modified) if modified < cutoff => files.push(path),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => report.vanished += 1,
            Err(e) => {
                warn!("[Retention] Cannot stat {}: {}", path.display(), e);
                report.failed += 1;
            }
        }
    }
    // Segment names embed their start time, so this is chronological
    files.sort();
    files
}

/// Move `src` to `dst`, falling back to copy-and-remove when a rename is
/// refused (e.g. across filesystems). Never leaves the file in both places.
pub(crate) fn move_file(src: &Path, dst: &Path) -> io::Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }

    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(e),
        Err(e) => {
            debug!(
                "[Retention] Rename {} failed ({}), copying instead",
                src.display(),
                e
            );
            copy_then_remove(src, dst)
        }
    }
}

pub(crate) fn copy_then_remove(src: &Path, dst: &Path) -> io::Result<()> {
    let metadata = fs::metadata(src)?;
    let partial = partial_path(dst);

    let copied = fs::copy(src, &partial)
        .and_then(|_| {
            filetime::set_file_mtime(&partial, FileTime::from_last_modification_time(&metadata))
        })
        .and_then(|_| fs::rename(&partial, dst));
    if let Err(e) = copied {
        let _ = fs::remove_file(&partial);
        return Err(e);
    }

    match fs::remove_file(src) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            // Source stays authoritative
            let _ = fs::remove_file(dst);
            Err(e)
        }
    }
}

fn partial_path(dst: &Path) -> PathBuf {
    let mut name = dst.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    dst.with_file_name(name)
}

/// Periodic sweeper running [`sweep_once`] off the async runtime.
pub struct RetentionSweeper {
    policy: Arc<RetentionPolicy>,
    interval: Duration,
    token: CancellationToken,
}

impl RetentionSweeper {
    pub fn new(policy: RetentionPolicy, options: &RetentionOptions, token: CancellationToken) -> Self {
        Self {
            policy: Arc::new(policy),
            interval: options.interval,
            token,
        }
    }

    /// Sweep immediately, then every interval, until cancelled. A cycle in
    /// progress finishes before the sweeper returns.
    pub async fn run(self) {
        info!(
            "Retention sweeper started (interval {:?}, primary {:?}, backup {:?})",
            self.interval, self.policy.primary_retention, self.policy.backup_retention
        );

        while !self.token.is_cancelled() {
            let policy = Arc::clone(&self.policy);
            match tokio::task::spawn_blocking(move || sweep_once(&policy, SystemTime::now())).await
            {
                Ok(report) if report.is_empty() => debug!("Retention cycle found nothing to do"),
                Ok(report) => info!(
                    moved = report.moved,
                    deleted = report.deleted,
                    vanished = report.vanished,
                    failed = report.failed,
                    "Retention cycle complete"
                ),
                Err(e) => error!("Retention cycle panicked: {}", e),
            }

            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Retention sweeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DAY: Duration = Duration::from_secs(86_400);

    fn policy(dir: &Path, primary_days: u64, backup_days: u64) -> RetentionPolicy {
        RetentionPolicy {
            primary_root: dir.join("primary"),
            backup_root: dir.join("backup"),
            primary_retention: DAY * primary_days as u32,
            backup_retention: DAY * backup_days as u32,
        }
    }

    fn touch(path: &Path, mtime: SystemTime) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"segment").unwrap();
        filetime::set_file_mtime(path, FileTime::from_system_time(mtime)).unwrap();
    }

    #[test]
    fn test_cutoffs() {
        let p = policy(Path::new("/x"), 7, 3);
        let now = UNIX_EPOCH + DAY * 100;
        let c = p.cutoffs(now);
        assert_eq!(c.move_cutoff, UNIX_EPOCH + DAY * 93);
        assert_eq!(c.delete_cutoff, UNIX_EPOCH + DAY * 90);

        let zero = policy(Path::new("/x"), 7, 0).cutoffs(now);
        assert_eq!(zero.move_cutoff, zero.delete_cutoff);
    }

    #[test]
    fn test_cutoffs_saturate_at_epoch() {
        let c = policy(Path::new("/x"), 7, 3).cutoffs(UNIX_EPOCH + DAY);
        assert_eq!(c.move_cutoff, UNIX_EPOCH);
        assert_eq!(c.delete_cutoff, UNIX_EPOCH);
    }

    #[test]
    fn test_one_cycle_moves_and_expires() {
        let dir = TempDir::new().unwrap();
        let p = policy(dir.path(), 7, 3);
        let now = SystemTime::now();

        let aged = p.primary_root.join("cam1/20250101_000000_300s.mp4");
        let fresh = p.primary_root.join("cam1/20250108_000000_300s.mp4");
        let expired = p.backup_root.join("cam1/20241201_000000_300s.mp4");
        let kept = p.backup_root.join("cam1/20241231_000000_300s.mp4");
        touch(&aged, now - DAY * 8);
        touch(&fresh, now - DAY);
        touch(&expired, now - DAY * 11);
        touch(&kept, now - DAY * 9);

        let report = sweep_once(&p, now);

        assert!(!aged.exists());
        assert!(p.backup_root.join("cam1/20250101_000000_300s.mp4").exists());
        assert!(fresh.exists());
        assert!(!expired.exists());
        assert!(kept.exists());
        assert_eq!(report.moved, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.failed, 0);
    }

    #[test]
    fn test_moved_file_keeps_mtime() {
        let dir = TempDir::new().unwrap();
        let p = policy(dir.path(), 7, 30);
        let now = SystemTime::now();
        let mtime = now - DAY * 8;
        touch(&p.primary_root.join("cam1/a.mp4"), mtime);

        sweep_once(&p, now);

        let moved = fs::metadata(p.backup_root.join("cam1/a.mp4")).unwrap();
        assert_eq!(
            FileTime::from_last_modification_time(&moved),
            FileTime::from_system_time(mtime)
        );
    }

    #[test]
    fn test_zero_backup_window_expires_moved_files() {
        let dir = TempDir::new().unwrap();
        let p = policy(dir.path(), 7, 0);
        let now = SystemTime::now();
        let aged = p.primary_root.join("cam1/a.mp4");
        touch(&aged, now - DAY * 8);
        touch(&p.backup_root.join("cam1/recent.mp4"), now - DAY * 6);

        let moved = p.backup_root.join("cam1/a.mp4");

        // Expiry runs after the move, so the moved file goes in the same cycle
        let first = sweep_once(&p, now);
        assert_eq!(first.moved, 1);
        assert_eq!(first.deleted, 1);
        assert!(!aged.exists());
        assert!(!moved.exists());
        assert!(p.backup_root.join("cam1/recent.mp4").exists());

        let second = sweep_once(&p, now);
        assert_eq!(second.moved, 0);
        assert_eq!(second.deleted, 0);
        assert!(!moved.exists());
        assert!(p.backup_root.join("cam1/recent.mp4").exists());
    }

    #[test]
    fn test_only_segments_leave_primary() {
        let dir = TempDir::new().unwrap();
        let p = policy(dir.path(), 7, 3);
        let now = SystemTime::now();
        let notes = p.primary_root.join("cam1/notes.txt");
        let stray = p.primary_root.join("stray.mp4");
        touch(&notes, now - DAY * 30);
        touch(&stray, now - DAY * 30);

        let report = sweep_once(&p, now);

        assert!(notes.exists());
        assert!(stray.exists());
        assert_eq!(report.moved, 0);
    }

    #[test]
    fn test_backup_expires_any_file() {
        let dir = TempDir::new().unwrap();
        let p = policy(dir.path(), 7, 3);
        let now = SystemTime::now();
        let leftover = p.backup_root.join("cam1/old.mp4.partial");
        touch(&leftover, now - DAY * 20);

        assert_eq!(sweep_once(&p, now).deleted, 1);
        assert!(!leftover.exists());
    }

    #[test]
    fn test_missing_roots_are_empty() {
        let dir = TempDir::new().unwrap();
        let report = sweep_once(&policy(dir.path(), 7, 3), SystemTime::now());
        assert!(report.is_empty());
    }

    #[test]
    fn test_copy_then_remove() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a/seg.mp4");
        let dst = dir.path().join("b/seg.mp4");
        let mtime = SystemTime::now() - DAY * 8;
        touch(&src, mtime);
        fs::create_dir_all(dst.parent().unwrap()).unwrap();

        copy_then_remove(&src, &dst).unwrap();

        assert!(!src.exists());
        assert!(!partial_path(&dst).exists());
        assert_eq!(fs::read(&dst).unwrap(), b"segment");
        let meta = fs::metadata(&dst).unwrap();
        assert_eq!(
            FileTime::from_last_modification_time(&meta),
            FileTime::from_system_time(mtime)
        );
    }

    #[test]
    fn test_move_vanished_file() {
        let dir = TempDir::new().unwrap();
        let err = move_file(&dir.path().join("gone.mp4"), &dir.path().join("b/gone.mp4"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_sweeper_runs_until_cancelled() {
        let dir = TempDir::new().unwrap();
        let p = policy(dir.path(), 7, 3);
        let aged = p.primary_root.join("cam1/a.mp4");
        touch(&aged, SystemTime::now() - DAY * 8);
        let moved = p.backup_root.join("cam1/a.mp4");

        let token = CancellationToken::new();
        let options = RetentionOptions {
            interval: Duration::from_millis(50),
        };
        let sweeper = RetentionSweeper::new(p, &options, token.clone());
        let task = tokio::spawn(sweeper.run());

        tokio::time::timeout(Duration::from_secs(5), async {
            while !moved.exists() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();

        token.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(!aged.exists());
    }
}
