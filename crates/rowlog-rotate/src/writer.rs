//! Rotate-on-write file writer
//!
//! Every write replaces the active file. If the file already exists it is
//! renamed to `<stem>-<timestamp><ext>` in the backup directory first, then a
//! fresh file is created at the original path and the payload is written to
//! it. After each write a retention pass is scheduled on a background thread.
//!
//! The writer is meant to be the only one writing to its path: if another
//! process recreates the file between the rename and the create, that
//! content is truncated away.

use crossbeam_channel::Receiver;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use rowlog_core::constants::DEFAULT_FILE_MODE;
use rowlog_core::{Clock, Error, Result, RotateConfig, SystemClock};

use crate::fs::{FileStat, Filesystem, OsFilesystem};
use crate::mill::Mill;
use crate::naming::{BackupDescriptor, BackupNaming};
use crate::ownership::{default_ownership, Ownership};
use crate::retention::{Retention, RetentionReport};

/// The file being written and the values derived from its path.
///
/// Everything is derived once, in [`RotationTarget::new`]. There is no way
/// to change the path afterwards; writing somewhere else takes a new writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationTarget {
    path: PathBuf,
    file_name: String,
    dir: PathBuf,
    backup_dir: PathBuf,
    max_size: usize,
}

impl RotationTarget {
    pub fn new(path: PathBuf, backup_dir: Option<PathBuf>, max_size: usize) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(String::from)
            .ok_or_else(|| {
                Error::config(format!(
                    "active path has no usable file name: {}",
                    path.display()
                ))
            })?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let backup_dir = backup_dir.unwrap_or_else(|| dir.clone());

        Ok(Self {
            path,
            file_name,
            dir,
            backup_dir,
            max_size,
        })
    }

    pub fn from_config(config: &RotateConfig) -> Result<Self> {
        let max_size = usize::try_from(config.max_size_bytes()).unwrap_or(usize::MAX);
        Self::new(config.active_path(), config.backup_dir.clone(), max_size)
    }

    /// Active file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name of the active file, e.g. `server.log`
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Directory holding the active file
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Directory backups are moved into
    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn has_separate_backup_dir(&self) -> bool {
        self.backup_dir != self.dir
    }

    /// Largest payload a single write accepts, in bytes
    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

/// Builder for [`RotateOnWrite`] with injectable capabilities
pub struct RotateOnWriteBuilder {
    config: RotateConfig,
    fs: Arc<dyn Filesystem>,
    ownership: Arc<dyn Ownership>,
    clock: Arc<dyn Clock>,
}

impl RotateOnWriteBuilder {
    pub fn filesystem(mut self, fs: Arc<dyn Filesystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn ownership(mut self, ownership: Arc<dyn Ownership>) -> Self {
        self.ownership = ownership;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> Result<RotateOnWrite> {
        let target = RotationTarget::from_config(&self.config)?;
        let naming = BackupNaming::for_file_name(target.file_name(), self.config.timestamp_mode());
        let retention = Arc::new(Retention::new(
            Arc::clone(&self.fs),
            Arc::clone(&self.clock),
            target.backup_dir().to_path_buf(),
            naming.clone(),
            self.config.retention(),
        ));

        Ok(RotateOnWrite {
            target,
            naming,
            skip_empty: self.config.skip_empty,
            fs: self.fs,
            ownership: self.ownership,
            clock: self.clock,
            mill: Mill::new(Arc::clone(&retention)),
            retention,
        })
    }
}

/// A writer that moves the previous file aside on every write
pub struct RotateOnWrite {
    target: RotationTarget,
    naming: BackupNaming,
    skip_empty: bool,
    fs: Arc<dyn Filesystem>,
    ownership: Arc<dyn Ownership>,
    clock: Arc<dyn Clock>,
    retention: Arc<Retention>,
    mill: Mill,
}

impl RotateOnWrite {
    /// Writer on the real filesystem with the system clock
    pub fn new(config: RotateConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: RotateConfig) -> RotateOnWriteBuilder {
        RotateOnWriteBuilder {
            config,
            fs: Arc::new(OsFilesystem),
            ownership: default_ownership(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn target(&self) -> &RotationTarget {
        &self.target
    }

    pub fn naming(&self) -> &BackupNaming {
        &self.naming
    }

    /// Replace the active file's content with `p`, archiving the previous
    /// file first. Returns the number of bytes written.
    pub fn write_record(&mut self, p: &[u8]) -> Result<usize> {
        let max = self.target.max_size();
        if p.len() > max {
            return Err(Error::ExceedsMaxSize { len: p.len(), max });
        }

        self.rotate_and_write(p)
    }

    /// Backups currently in the backup directory, newest first
    pub fn backups(&self) -> Result<Vec<BackupDescriptor>> {
        self.retention.backups()
    }

    /// Run a retention pass on the calling thread
    pub fn run_retention(&self) -> Result<RetentionReport> {
        self.retention.run_once()
    }

    /// Results of the background retention passes
    pub fn subscribe(&self) -> Receiver<Result<RetentionReport>> {
        self.mill.subscribe()
    }

    /// Stop the background worker, waiting for a pending pass to finish
    pub fn shutdown(&mut self) {
        self.mill.shutdown();
    }

    fn rotate_and_write(&mut self, p: &[u8]) -> Result<usize> {
        self.ensure_dirs()?;

        let path = self.target.path();
        let previous = match self.fs.stat(path) {
            Ok(None) => None,
            Ok(Some(stat)) => {
                self.archive()?;
                Some(stat)
            }
            Err(source) => {
                return Err(Error::StatFailed {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        if self.skip_empty && p.is_empty() {
            self.mill.trigger();
            return Ok(0);
        }

        let n = self.write_new_file(p, previous.as_ref())?;
        self.mill.trigger();
        Ok(n)
    }

    fn ensure_dirs(&self) -> Result<()> {
        let mut dirs = vec![self.target.dir()];
        if self.target.has_separate_backup_dir() {
            dirs.push(self.target.backup_dir());
        }

        for dir in dirs {
            self.fs
                .create_dir_all(dir)
                .map_err(|source| Error::DirectoryCreateFailed {
                    dir: dir.to_path_buf(),
                    file: self.target.path().to_path_buf(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Move the active file into the backup directory
    fn archive(&self) -> Result<()> {
        let from = self.target.path();
        let to = self
            .target
            .backup_dir()
            .join(self.naming.encode(self.clock.now()));

        self.fs
            .rename(from, &to)
            .map_err(|source| Error::RenameFailed {
                from: from.to_path_buf(),
                to: to.clone(),
                source,
            })?;

        debug!("Rotated {} -> {}", from.display(), to.display());
        Ok(())
    }

    fn write_new_file(&self, p: &[u8], previous: Option<&FileStat>) -> Result<usize> {
        let path = self.target.path();
        let mode = previous.map_or(DEFAULT_FILE_MODE, |stat| stat.mode);

        // Truncate: between the rename and here the path should be ours
        let mut file = self
            .fs
            .create_truncate(path, mode)
            .map_err(|source| Error::CreateFailed {
                path: path.to_path_buf(),
                source,
            })?;

        if let Some(owner) = previous.and_then(|stat| stat.owner.as_ref()) {
            self.ownership
                .apply(path, owner)
                .map_err(|source| Error::OwnershipPropagationFailed {
                    path: path.to_path_buf(),
                    source,
                })?;
        }

        file.write_all(p)
            .and_then(|()| file.flush())
            .map_err(|source| Error::WriteFailed {
                len: p.len(),
                path: path.to_path_buf(),
                source,
            })?;

        Ok(p.len())
    }
}

impl Write for RotateOnWrite {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_record(buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
