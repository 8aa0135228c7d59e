//! Error types for rowlog

use std::io;
use std::path::PathBuf;

/// rowlog error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("write length {len} exceeds maximum file size {max}")]
    ExceedsMaxSize { len: usize, max: usize },

    #[error("can't make directories: {dir} for new file: {file}")]
    DirectoryCreateFailed {
        dir: PathBuf,
        file: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("get file: {path} info fail")]
    StatFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("can't rename file, old name: {from}, new name: {to}")]
    RenameFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("can't open new file: {path}")]
    CreateFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("write len: {len} fail: {path}")]
    WriteFailed {
        len: usize,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("propagate ownership to {path} fail")]
    OwnershipPropagationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("can't read backup directory: {dir}")]
    RetentionReadFailed {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("rm backup file: {path} fail")]
    RetentionDeleteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

/// Result type alias for rowlog
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::ConfigError(msg.into())
    }

    /// The `io::ErrorKind` a writer surfaces for this error
    pub fn io_kind(&self) -> io::ErrorKind {
        match self {
            Error::ExceedsMaxSize { .. } => io::ErrorKind::InvalidInput,
            Error::DirectoryCreateFailed { source, .. }
            | Error::StatFailed { source, .. }
            | Error::RenameFailed { source, .. }
            | Error::CreateFailed { source, .. }
            | Error::WriteFailed { source, .. }
            | Error::OwnershipPropagationFailed { source, .. }
            | Error::RetentionReadFailed { source, .. }
            | Error::RetentionDeleteFailed { source, .. } => source.kind(),
            Error::IoError(e) => e.kind(),
            _ => io::ErrorKind::Other,
        }
    }

    /// True for the errors that only come out of a retention pass
    pub fn is_retention(&self) -> bool {
        matches!(
            self,
            Error::RetentionReadFailed { .. } | Error::RetentionDeleteFailed { .. }
        )
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        io::Error::new(err.io_kind(), err)
    }
}
