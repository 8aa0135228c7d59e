//! Configuration for a rotate-on-write stream
//!
//! Every field has a default, so an empty file (or `RotateConfig::default()`)
//! is a valid configuration. Files may be TOML, YAML, or JSON:
//!
//! ```toml
//! path = "/var/log/foo/server.log"
//! backup_dir = "/var/log/foo/backup"
//! max_size = 10
//! max_backups = 7
//! max_age = 86400      # seconds, fractions allowed
//! local_time = false
//! skip_empty = true
//! ```

use serde::{Deserialize, Deserializer};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, Result};
use crate::types::{RetentionPolicy, TimestampMode};

/// Formats a config file may be written in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Format of `path`, judged by its extension (case-insensitive)
    pub fn of(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match ext.as_deref() {
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("yaml" | "yml") => Ok(ConfigFormat::Yaml),
            Some("json") => Ok(ConfigFormat::Json),
            _ => Err(Error::config(format!(
                "{}: config must be .toml, .yaml, .yml or .json",
                path.display()
            ))),
        }
    }
}

/// Reads `max_age` as seconds, keeping any fraction
fn deserialize_age<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Duration, D::Error> {
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

/// Settings for one rotate-on-write stream
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RotateConfig {
    /// File to write to. Defaults to
    /// `<temp dir>/<process name>-rotate-on-write.log`.
    pub path: Option<PathBuf>,
    /// Directory backups are moved into. Defaults to the active file's
    /// directory. Must be on the same volume as the active file.
    pub backup_dir: Option<PathBuf>,
    /// Maximum size of a single write, in megabytes (0 = default of 5)
    pub max_size: u64,
    /// Maximum number of backups to keep (0 = keep all)
    pub max_backups: usize,
    /// Maximum backup age, by the timestamp in the name (zero = no limit).
    /// Config files give it in seconds.
    #[serde(deserialize_with = "deserialize_age")]
    pub max_age: Duration,
    /// Use local time instead of UTC for backup timestamps
    pub local_time: bool,
    /// Skip creating the new file when a write carries no bytes
    pub skip_empty: bool,
}

impl Default for RotateConfig {
    fn default() -> Self {
        Self {
            path: None,
            backup_dir: None,
            max_size: DEFAULT_MAX_SIZE_MB,
            max_backups: 0,
            max_age: Duration::ZERO,
            local_time: false,
            skip_empty: false,
        }
    }
}

impl RotateConfig {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn with_backup_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.backup_dir = Some(dir.into());
        self
    }

    pub fn with_max_size(mut self, megabytes: u64) -> Self {
        self.max_size = megabytes;
        self
    }

    pub fn with_max_backups(mut self, max_backups: usize) -> Self {
        self.max_backups = max_backups;
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_local_time(mut self, local_time: bool) -> Self {
        self.local_time = local_time;
        self
    }

    pub fn with_skip_empty(mut self, skip_empty: bool) -> Self {
        self.skip_empty = skip_empty;
        self
    }

    /// Active file path, falling back to the temp-dir default
    pub fn active_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(default_active_path)
    }

    /// Per-write limit in bytes
    pub fn max_size_bytes(&self) -> u64 {
        let mb = if self.max_size == 0 {
            DEFAULT_MAX_SIZE_MB
        } else {
            self.max_size
        };
        mb.saturating_mul(MEGABYTE)
    }

    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy::new(self.max_backups, self.max_age)
    }

    pub fn timestamp_mode(&self) -> TimestampMode {
        TimestampMode::from_local_time(self.local_time)
    }

    /// Load a config file; the format comes from the extension
    pub fn load(path: &Path) -> Result<Self> {
        let format = ConfigFormat::of(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::ConfigNotFound(path.to_path_buf()),
            _ => Error::IoError(e),
        })?;
        Self::parse(&content, format)
    }

    /// Parse config text. Missing keys take their defaults.
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        let config = match format {
            ConfigFormat::Toml => toml::from_str(content)?,
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
        };
        Ok(config)
    }

    /// Load the first of the conventional config files present in `dir`
    pub fn find_and_load(dir: &Path) -> Result<(Self, PathBuf)> {
        let path = CONFIG_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
            .ok_or_else(|| Error::ConfigNotFound(dir.to_path_buf()))?;

        let config = Self::load(&path)?;
        Ok((config, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_config_format_of() {
        assert_eq!(ConfigFormat::of(Path::new("rowlog.toml")).unwrap(), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::of(Path::new("a/B.YAML")).unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::of(Path::new("rowlog.yml")).unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::of(Path::new("rowlog.json")).unwrap(), ConfigFormat::Json);
        assert!(matches!(
            ConfigFormat::of(Path::new("rowlog.txt")),
            Err(Error::ConfigError(_))
        ));
        assert!(ConfigFormat::of(Path::new("rowlog")).is_err());
    }

    #[test]
    fn test_empty_file_is_default_in_every_format() {
        for (content, format) in [
            ("", ConfigFormat::Toml),
            ("{}", ConfigFormat::Yaml),
            ("{}", ConfigFormat::Json),
        ] {
            assert_eq!(RotateConfig::parse(content, format).unwrap(), RotateConfig::default());
        }
    }

    #[test]
    fn test_sub_second_max_age_is_kept() {
        let config = RotateConfig::default().with_max_age(Duration::from_millis(500));
        assert!(!config.retention().is_disabled());
        assert_eq!(config.retention().max_age, Duration::from_millis(500));

        let config = RotateConfig::default().with_max_age(Duration::from_millis(1500));
        assert_eq!(config.retention().max_age, Duration::from_millis(1500));
    }

    #[test]
    fn test_fractional_max_age_in_file() {
        let config = RotateConfig::parse("max_age = 1.5", ConfigFormat::Toml).unwrap();
        assert_eq!(config.retention().max_age, Duration::from_millis(1500));

        let config = RotateConfig::parse(r#"{ "max_age": 0.25 }"#, ConfigFormat::Json).unwrap();
        assert_eq!(config.max_age, Duration::from_millis(250));

        let result = RotateConfig::parse("max_age: -1", ConfigFormat::Yaml);
        assert!(matches!(result, Err(Error::YamlError(_))));
    }

    #[test]
    fn test_defaults() {
        let config = RotateConfig::default();
        assert_eq!(config.max_size_bytes(), 5 * 1024 * 1024);
        assert!(config.retention().is_disabled());
        assert_eq!(config.timestamp_mode(), TimestampMode::Utc);
        assert!(!config.skip_empty);
        assert!(config.active_path().ends_with(
            format!("{}{}", process_name(), DEFAULT_FILE_SUFFIX)
        ));
    }

    #[test]
    fn test_zero_max_size_means_default() {
        let config = RotateConfig::default().with_max_size(0);
        assert_eq!(config.max_size_bytes(), DEFAULT_MAX_SIZE_MB * MEGABYTE);

        let config = RotateConfig::default().with_max_size(10);
        assert_eq!(config.max_size_bytes(), 10 * MEGABYTE);
    }

    #[test]
    fn test_config_parse_toml() {
        let content = r#"
path = "/var/log/foo/server.log"
backup_dir = "/var/log/foo/backup"
max_size = 10
max_backups = 7
max_age = 86400
skip_empty = true
"#;
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        file.write_all(content.as_bytes()).unwrap();

        let config = RotateConfig::load(file.path()).unwrap();
        assert_eq!(config.path, Some(PathBuf::from("/var/log/foo/server.log")));
        assert_eq!(config.backup_dir, Some(PathBuf::from("/var/log/foo/backup")));
        assert_eq!(config.max_size_bytes(), 10 * MEGABYTE);
        assert_eq!(
            config.retention(),
            RetentionPolicy::new(7, Duration::from_secs(86400))
        );
        assert!(!config.local_time);
        assert!(config.skip_empty);
    }

    #[test]
    fn test_config_parse_yaml() {
        let content = r#"
path: ./test-dir/test/test-p.json
backup_dir: ./test-dir/backup
max_backups: 100
local_time: true
"#;
        let mut file = NamedTempFile::with_suffix(".yml").unwrap();
        file.write_all(content.as_bytes()).unwrap();

        let config = RotateConfig::load(file.path()).unwrap();
        assert_eq!(config.path, Some(PathBuf::from("./test-dir/test/test-p.json")));
        assert_eq!(config.max_backups, 100);
        assert_eq!(config.max_size, DEFAULT_MAX_SIZE_MB);
        assert_eq!(config.timestamp_mode(), TimestampMode::Local);
    }

    #[test]
    fn test_config_parse_json() {
        let content = r#"{ "path": "/tmp/a.json", "max_age": 3600 }"#;
        let config = RotateConfig::parse(content, ConfigFormat::Json).unwrap();
        assert_eq!(config.path, Some(PathBuf::from("/tmp/a.json")));
        assert_eq!(config.retention().max_age, Duration::from_secs(3600));
        assert_eq!(config.backup_dir, None);
    }

    #[test]
    fn test_config_parse_rejects_bad_type() {
        let result = RotateConfig::parse("max_backups = \"three\"", ConfigFormat::Toml);
        assert!(matches!(result, Err(Error::TomlError(_))));
    }

    #[test]
    fn test_config_not_found() {
        let result = RotateConfig::load(Path::new("/nonexistent/rowlog.toml"));
        assert!(matches!(result, Err(Error::ConfigNotFound(_))));
    }

    #[test]
    fn test_config_unsupported_extension() {
        let file = NamedTempFile::with_suffix(".ini").unwrap();
        let result = RotateConfig::load(file.path());
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_find_and_load() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("rowlog.yaml"), "max_backups: 2\n").unwrap();

        let (config, path) = RotateConfig::find_and_load(dir.path()).unwrap();
        assert_eq!(config.max_backups, 2);
        assert_eq!(path, dir.path().join("rowlog.yaml"));

        let empty = TempDir::new().unwrap();
        assert!(matches!(
            RotateConfig::find_and_load(empty.path()),
            Err(Error::ConfigNotFound(_))
        ));
    }

    #[test]
    fn test_builder_methods() {
        let config = RotateConfig::new("/tmp/x.log")
            .with_backup_dir("/tmp/bk")
            .with_max_backups(3)
            .with_max_age(Duration::from_secs(60))
            .with_local_time(true)
            .with_skip_empty(true);
        assert_eq!(config.backup_dir, Some(PathBuf::from("/tmp/bk")));
        assert_eq!(config.max_backups, 3);
        assert_eq!(config.max_age, Duration::from_secs(60));
        assert!(config.local_time);
        assert!(config.skip_empty);
    }
}
