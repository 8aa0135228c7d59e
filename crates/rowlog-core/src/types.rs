//! Core types for rowlog

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which zone backup timestamps are written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampMode {
    #[default]
    Utc,
    Local,
}

impl TimestampMode {
    pub fn from_local_time(local_time: bool) -> Self {
        if local_time {
            TimestampMode::Local
        } else {
            TimestampMode::Utc
        }
    }

    /// Wall-clock reading of `t` in this zone
    pub fn wall_clock(&self, t: DateTime<Utc>) -> NaiveDateTime {
        match self {
            TimestampMode::Utc => t.naive_utc(),
            TimestampMode::Local => t.with_timezone(&Local).naive_local(),
        }
    }

    /// Map a wall-clock reading in this zone back to an instant.
    ///
    /// Ambiguous local times take the earliest mapping; local times that fall
    /// in a DST gap have no instant and yield `None`.
    pub fn to_instant(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        match self {
            TimestampMode::Utc => Some(Utc.from_utc_datetime(&naive)),
            TimestampMode::Local => Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|t| t.with_timezone(&Utc)),
        }
    }
}

/// Count and age limits for retained backups. Zero disables a limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetentionPolicy {
    /// Maximum number of backups to keep (0 = unlimited)
    pub max_backups: usize,
    /// Maximum age of a backup, judged by the timestamp in its name
    /// (zero = unlimited)
    pub max_age: Duration,
}

impl RetentionPolicy {
    pub fn new(max_backups: usize, max_age: Duration) -> Self {
        Self {
            max_backups,
            max_age,
        }
    }

    /// No limit active: a retention pass never deletes anything
    pub fn is_disabled(&self) -> bool {
        self.max_backups == 0 && self.max_age.is_zero()
    }

    pub fn count_limit(&self) -> Option<usize> {
        (self.max_backups > 0).then_some(self.max_backups)
    }

    pub fn age_limit(&self) -> Option<chrono::Duration> {
        if self.max_age.is_zero() {
            return None;
        }
        Some(chrono::Duration::from_std(self.max_age).unwrap_or(chrono::Duration::MAX))
    }
}
