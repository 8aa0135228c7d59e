//! Constants and default values for rowlog

use std::path::PathBuf;

/// Layout of the timestamp embedded in backup file names (chrono syntax).
/// Renders as `2006-01-02T15-04-05.000`.
pub const BACKUP_TIME_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.3f";

/// Rendered length of [`BACKUP_TIME_FORMAT`]
pub const BACKUP_TIME_LEN: usize = 23;

/// Default per-write size limit in megabytes
pub const DEFAULT_MAX_SIZE_MB: u64 = 5;

/// Conversion factor between a size in megabytes and bytes
pub const MEGABYTE: u64 = 1024 * 1024;

/// Mode given to a new active file when there is no previous one to copy
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Mode used when creating missing directories
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// Suffix appended to the process name for the default active file
pub const DEFAULT_FILE_SUFFIX: &str = "-rotate-on-write.log";

/// Config file names to search for (in priority order)
pub const CONFIG_FILES: &[&str] = &["rowlog.toml", "rowlog.yaml", "rowlog.yml", "rowlog.json"];

/// Name of the running executable, without directories
pub fn process_name() -> String {
    std::env::args_os()
        .next()
        .map(PathBuf::from)
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "rowlog".to_string())
}

/// Active file used when none is configured:
/// `<temp dir>/<process name>-rotate-on-write.log`
pub fn default_active_path() -> PathBuf {
    std::env::temp_dir().join(format!("{}{}", process_name(), DEFAULT_FILE_SUFFIX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_active_path() {
        let path = default_active_path();
        assert!(path.starts_with(std::env::temp_dir()));
        assert!(path.to_string_lossy().ends_with("-rotate-on-write.log"));
    }

    #[test]
    fn test_process_name_has_no_separator() {
        let name = process_name();
        assert!(!name.is_empty());
        assert!(!name.contains(std::path::MAIN_SEPARATOR));
    }

    #[test]
    fn test_default_max_size_bytes() {
        assert_eq!(DEFAULT_MAX_SIZE_MB * MEGABYTE, 5 * 1024 * 1024);
    }
}
