//! Backup file naming
//!
//! A backup of `/var/log/foo/server.log` rotated at 6:30pm on Nov 4 2016 is
//! named `server-2016-11-04T18-30-00.000.log`: the stem, a dash, the rotation
//! time, then the original extension. Timestamps keep millisecond precision;
//! anything finer is dropped when the name is encoded.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::Path;

use rowlog_core::constants::{BACKUP_TIME_FORMAT, BACKUP_TIME_LEN};
use rowlog_core::TimestampMode;

/// A backup file found in the backup directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupDescriptor {
    pub name: String,
    pub timestamp: DateTime<Utc>,
}

/// Split a file name into stem and extension (extension keeps its dot).
/// `server.log` gives `("server", ".log")`, `server` gives `("server", "")`.
pub fn split_file_name(name: &str) -> (String, String) {
    let path = Path::new(name);
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let stem = name[..name.len() - ext.len()].to_string();
    (stem, ext)
}

/// Render a wall-clock time in the backup layout
pub fn format_timestamp(t: &NaiveDateTime) -> String {
    t.format(BACKUP_TIME_FORMAT).to_string()
}

/// Parse a complete backup timestamp. Anything that is not exactly the
/// layout (including a fraction of other than three digits) is rejected.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    if s.len() != BACKUP_TIME_LEN || s.as_bytes()[19] != b'.' {
        return None;
    }
    let t = NaiveDateTime::parse_from_str(s, BACKUP_TIME_FORMAT).ok()?;
    // chrono tolerates padding spaces and signed years; only the exact
    // rendering of the parsed value counts
    (format_timestamp(&t) == s).then_some(t)
}

/// `{stem}-{timestamp}{ext}`
pub fn encode(stem: &str, ext: &str, t: &NaiveDateTime) -> String {
    format!("{}-{}{}", stem, format_timestamp(t), ext)
}

/// Timestamp embedded in `name`, or `None` if `name` isn't a backup of
/// `stem`/`ext`
pub fn decode(name: &str, stem: &str, ext: &str) -> Option<NaiveDateTime> {
    let middle = name
        .strip_prefix(stem)?
        .strip_prefix('-')?
        .strip_suffix(ext)?;
    parse_timestamp(middle)
}

/// Backup naming for one active file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupNaming {
    stem: String,
    ext: String,
    mode: TimestampMode,
}

impl BackupNaming {
    pub fn new<S: Into<String>, E: Into<String>>(stem: S, ext: E, mode: TimestampMode) -> Self {
        Self {
            stem: stem.into(),
            ext: ext.into(),
            mode,
        }
    }

    /// Naming for backups of the file called `file_name`
    pub fn for_file_name(file_name: &str, mode: TimestampMode) -> Self {
        let (stem, ext) = split_file_name(file_name);
        Self::new(stem, ext, mode)
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn ext(&self) -> &str {
        &self.ext
    }

    pub fn mode(&self) -> TimestampMode {
        self.mode
    }

    /// Name of a backup rotated at `t`
    pub fn encode(&self, t: DateTime<Utc>) -> String {
        encode(&self.stem, &self.ext, &self.mode.wall_clock(t))
    }

    /// Rotation instant embedded in `name`
    pub fn decode(&self, name: &str) -> Option<DateTime<Utc>> {
        decode(name, &self.stem, &self.ext).and_then(|t| self.mode.to_instant(t))
    }

    /// Descriptor for `name` if it is one of our backups
    pub fn describe(&self, name: &str) -> Option<BackupDescriptor> {
        self.decode(name).map(|timestamp| BackupDescriptor {
            name: name.to_string(),
            timestamp,
        })
    }
}
