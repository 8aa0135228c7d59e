//! Backup retention
//!
//! Old backups are removed keeping at most `max_backups` of them, as long as
//! none of the kept ones is older than `max_age`. Age is judged by the
//! timestamp encoded in the name (the rotation time), not by file metadata.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use rowlog_core::{Clock, Error, Result, RetentionPolicy};

use crate::fs::Filesystem;
use crate::naming::{BackupDescriptor, BackupNaming};

/// Outcome of a retention pass that could list the backup directory
#[derive(Debug, Default)]
pub struct RetentionReport {
    /// Number of backups found
    pub scanned: usize,
    /// Backups that were deleted
    pub removed: Vec<PathBuf>,
}

/// Index in `backups` (sorted newest first) from which everything is stale.
/// `backups.len()` means keep all.
///
/// The count limit cuts first; the age limit can only move the cut further
/// toward the newest entry, never past what the count limit kept.
pub fn select_stale(
    backups: &[BackupDescriptor],
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> usize {
    let mut cut = backups.len();

    if let Some(max) = policy.count_limit() {
        if backups.len() > max {
            cut = max;
        }
    }

    if let Some(max_age) = policy.age_limit() {
        let cutoff = now
            .checked_sub_signed(max_age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        if let Some(i) = backups[..cut].iter().position(|b| b.timestamp < cutoff) {
            cut = i;
        }
    }

    cut
}

/// Retention engine for one backup directory
pub struct Retention {
    fs: Arc<dyn Filesystem>,
    clock: Arc<dyn Clock>,
    dir: PathBuf,
    naming: BackupNaming,
    policy: RetentionPolicy,
}

impl Retention {
    pub fn new(
        fs: Arc<dyn Filesystem>,
        clock: Arc<dyn Clock>,
        dir: PathBuf,
        naming: BackupNaming,
        policy: RetentionPolicy,
    ) -> Self {
        Self {
            fs,
            clock,
            dir,
            naming,
            policy,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Backups in the directory, newest first. Entries that don't decode as
    /// backups of this file are left out.
    pub fn backups(&self) -> Result<Vec<BackupDescriptor>> {
        let names = self
            .fs
            .list_dir(&self.dir)
            .map_err(|source| Error::RetentionReadFailed {
                dir: self.dir.clone(),
                source,
            })?;

        let mut backups: Vec<BackupDescriptor> = names
            .iter()
            .filter_map(|name| self.naming.describe(name))
            .collect();
        backups.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.name.cmp(&a.name))
        });
        Ok(backups)
    }

    /// Run one retention pass.
    ///
    /// Deletion carries on past failures; only the last failure is returned.
    pub fn run_once(&self) -> Result<RetentionReport> {
        if self.policy.is_disabled() {
            return Ok(RetentionReport::default());
        }

        let backups = self.backups()?;
        let cut = select_stale(&backups, &self.policy, self.clock.now());
        debug!(
            "Retention pass on {}: {} backups, {} stale",
            self.dir.display(),
            backups.len(),
            backups.len() - cut
        );

        let mut report = RetentionReport {
            scanned: backups.len(),
            removed: Vec::new(),
        };
        let mut last_err = None;
        for backup in &backups[cut..] {
            let path = self.dir.join(&backup.name);
            match self.fs.remove(&path) {
                Ok(()) => {
                    info!("Removed old backup {}", path.display());
                    report.removed.push(path);
                }
                Err(source) => {
                    warn!("Failed to remove old backup {}: {}", path.display(), source);
                    last_err = Some(Error::RetentionDeleteFailed { path, source });
                }
            }
        }

        match last_err {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{FsOp, MemoryFilesystem};
    use crate::naming::encode;
    use chrono::{Duration, TimeZone};
    use rowlog_core::{MockClock, TimestampMode};
    use std::time::Duration as StdDuration;

    const DIR: &str = "/logs/backup";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 6, 8, 12, 0, 0).unwrap()
    }

    fn setup(policy: RetentionPolicy) -> (MemoryFilesystem, Retention) {
        let fs = MemoryFilesystem::new();
        fs.create_dir_all(Path::new(DIR)).unwrap();
        let retention = Retention::new(
            Arc::new(fs.clone()),
            Arc::new(MockClock::new(now())),
            PathBuf::from(DIR),
            BackupNaming::new("a", ".json", TimestampMode::Utc),
            policy,
        );
        (fs, retention)
    }

    /// Add a backup rotated `age` ago and return its name
    fn add_backup(fs: &MemoryFilesystem, age: Duration) -> String {
        let name = encode("a", ".json", &(now() - age).naive_utc());
        fs.add_file(Path::new(DIR).join(&name), b"old");
        name
    }

    fn descriptor(name: &str, age: Duration) -> BackupDescriptor {
        BackupDescriptor {
            name: name.to_string(),
            timestamp: now() - age,
        }
    }

    #[test]
    fn test_select_keeps_all_without_limits() {
        let backups = vec![descriptor("x", Duration::hours(1))];
        assert_eq!(select_stale(&backups, &RetentionPolicy::default(), now()), 1);
        assert_eq!(select_stale(&[], &RetentionPolicy::new(1, StdDuration::ZERO), now()), 0);
    }

    #[test]
    fn test_select_count_then_age() {
        let backups = vec![
            descriptor("a", Duration::minutes(10)),
            descriptor("b", Duration::minutes(20)),
            descriptor("c", Duration::hours(2)),
            descriptor("d", Duration::hours(3)),
        ];
        let count_only = RetentionPolicy::new(3, StdDuration::ZERO);
        assert_eq!(select_stale(&backups, &count_only, now()), 3);

        let both = RetentionPolicy::new(3, StdDuration::from_secs(3600));
        assert_eq!(select_stale(&backups, &both, now()), 2);

        // The age limit never keeps more than the count limit allows
        let loose_age = RetentionPolicy::new(1, StdDuration::from_secs(86400));
        assert_eq!(select_stale(&backups, &loose_age, now()), 1);
    }

    #[test]
    fn test_select_age_boundary_is_exclusive() {
        let backups = vec![descriptor("a", Duration::hours(1))];
        let policy = RetentionPolicy::new(0, StdDuration::from_secs(3600));
        assert_eq!(select_stale(&backups, &policy, now()), 1);
    }

    #[test]
    fn test_backups_sorted_newest_first() {
        let (fs, retention) = setup(RetentionPolicy::new(10, StdDuration::ZERO));
        let oldest = add_backup(&fs, Duration::hours(3));
        let newest = add_backup(&fs, Duration::minutes(1));
        let middle = add_backup(&fs, Duration::hours(1));
        fs.add_file(Path::new(DIR).join("other.json"), b"not a backup");

        let names: Vec<String> = retention
            .backups()
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec![newest, middle, oldest]);
    }

    #[test]
    fn test_retention_count() {
        let (fs, retention) = setup(RetentionPolicy::new(2, StdDuration::ZERO));
        let names: Vec<String> = (1..=5)
            .map(|h| add_backup(&fs, Duration::hours(h)))
            .collect();

        let report = retention.run_once().unwrap();
        assert_eq!(report.scanned, 5);
        assert_eq!(report.removed.len(), 3);

        let mut expected = vec![names[0].clone(), names[1].clone()];
        expected.sort();
        assert_eq!(fs.file_names(Path::new(DIR)), expected);
    }

    #[test]
    fn test_retention_age() {
        let (fs, retention) = setup(RetentionPolicy::new(0, StdDuration::from_secs(24 * 3600)));
        let fresh = add_backup(&fs, Duration::hours(1));
        add_backup(&fs, Duration::hours(25));
        add_backup(&fs, Duration::hours(48));

        let report = retention.run_once().unwrap();
        assert_eq!(report.removed.len(), 2);
        assert_eq!(fs.file_names(Path::new(DIR)), vec![fresh]);
    }

    #[test]
    fn test_retention_age_ignores_count_limit() {
        let (fs, retention) = setup(RetentionPolicy::new(10, StdDuration::from_secs(24 * 3600)));
        let fresh = add_backup(&fs, Duration::hours(1));
        add_backup(&fs, Duration::hours(25));
        add_backup(&fs, Duration::hours(48));

        retention.run_once().unwrap();
        assert_eq!(fs.file_names(Path::new(DIR)), vec![fresh]);
    }

    #[test]
    fn test_retention_combined_limits() {
        let (fs, retention) = setup(RetentionPolicy::new(3, StdDuration::from_secs(3600)));
        let a = add_backup(&fs, Duration::minutes(10));
        let b = add_backup(&fs, Duration::minutes(20));
        add_backup(&fs, Duration::hours(2));
        add_backup(&fs, Duration::hours(3));

        retention.run_once().unwrap();

        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(fs.file_names(Path::new(DIR)), expected);
    }

    #[test]
    fn test_retention_ignores_non_backups() {
        let (fs, retention) = setup(RetentionPolicy::new(1, StdDuration::from_secs(3600)));
        fs.add_file(Path::new(DIR).join("other.json"), b"x");
        fs.add_file(Path::new(DIR).join("a.json"), b"x");
        fs.add_file(Path::new(DIR).join("a-yesterday.json"), b"x");
        let kept = add_backup(&fs, Duration::minutes(5));

        let report = retention.run_once().unwrap();
        assert_eq!(report.scanned, 1);
        assert!(report.removed.is_empty());
        assert_eq!(
            fs.file_names(Path::new(DIR)),
            vec![kept, "a-yesterday.json".to_string(), "a.json".into(), "other.json".into()]
        );
    }

    #[test]
    fn test_retention_disabled_never_deletes() {
        let (fs, retention) = setup(RetentionPolicy::default());
        for h in 1..=5 {
            add_backup(&fs, Duration::days(h * 100));
        }
        // A disabled pass doesn't even list the directory
        fs.fail_on(FsOp::ListDir, DIR);

        for _ in 0..3 {
            let report = retention.run_once().unwrap();
            assert_eq!(report.scanned, 0);
            assert!(report.removed.is_empty());
        }
        assert_eq!(fs.file_names(Path::new(DIR)).len(), 5);
    }

    #[test]
    fn test_retention_read_failure() {
        let (fs, retention) = setup(RetentionPolicy::new(1, StdDuration::ZERO));
        fs.fail_on(FsOp::ListDir, DIR);

        let err = retention.run_once().unwrap_err();
        assert!(matches!(err, Error::RetentionReadFailed { .. }));
    }

    #[test]
    fn test_retention_continues_and_reports_last_error() {
        let (fs, retention) = setup(RetentionPolicy::new(1, StdDuration::ZERO));
        add_backup(&fs, Duration::hours(1));
        let second = add_backup(&fs, Duration::hours(2));
        let third = add_backup(&fs, Duration::hours(3));
        let fourth = add_backup(&fs, Duration::hours(4));
        fs.fail_on(FsOp::Remove, Path::new(DIR).join(&second));
        fs.fail_on(FsOp::Remove, Path::new(DIR).join(&fourth));

        let err = retention.run_once().unwrap_err();

        // The one in between was still deleted
        assert!(!fs.exists(&Path::new(DIR).join(&third)));
        assert!(fs.exists(&Path::new(DIR).join(&second)));
        // Only the failure that happened last (the oldest backup) is reported
        match err {
            Error::RetentionDeleteFailed { path, .. } => {
                assert_eq!(path, Path::new(DIR).join(&fourth))
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
