//! Filesystem capability
//!
//! The rotation protocol and the retention engine only touch the disk through
//! [`Filesystem`]. [`OsFilesystem`] is the real thing; [`MemoryFilesystem`]
//! keeps everything in memory and can inject failures per operation and path.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rowlog_core::constants::DEFAULT_FILE_MODE;

/// Owner of a file, on platforms that have one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerInfo {
    pub uid: u32,
    pub gid: u32,
}

/// What `stat` reports about an existing file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    /// Permission bits
    pub mode: u32,
    pub owner: Option<OwnerInfo>,
}

/// Writable handle returned by [`Filesystem::create_truncate`].
/// Dropping it releases the file.
pub type FileHandle = Box<dyn Write + Send>;

/// Filesystem operations needed by rotation and retention
pub trait Filesystem: Send + Sync {
    /// Status of `path`, or `None` if it does not exist
    fn stat(&self, path: &Path) -> io::Result<Option<FileStat>>;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Create `path` (or truncate it if present) for writing. `mode` only
    /// applies when the file is created.
    fn create_truncate(&self, path: &Path, mode: u32) -> io::Result<FileHandle>;

    /// Names of the non-directory entries in `dir`
    fn list_dir(&self, dir: &Path) -> io::Result<Vec<String>>;

    fn remove(&self, path: &Path) -> io::Result<()>;

    /// Create directory and parents if needed
    fn create_dir_all(&self, dir: &Path) -> io::Result<()>;
}

/// Real filesystem implementation
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFilesystem;

impl Filesystem for OsFilesystem {
    fn stat(&self, path: &Path) -> io::Result<Option<FileStat>> {
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        #[cfg(unix)]
        let (mode, owner) = {
            use std::os::unix::fs::{MetadataExt, PermissionsExt};
            (
                meta.permissions().mode() & 0o7777,
                Some(OwnerInfo {
                    uid: meta.uid(),
                    gid: meta.gid(),
                }),
            )
        };
        #[cfg(not(unix))]
        let (mode, owner) = (DEFAULT_FILE_MODE, None);

        Ok(Some(FileStat {
            size: meta.len(),
            mode,
            owner,
        }))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn create_truncate(&self, path: &Path, mode: u32) -> io::Result<FileHandle> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;

        Ok(Box::new(options.open(path)?))
    }

    fn list_dir(&self, dir: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                continue;
            }
            // Names that aren't UTF-8 can't be backups
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        Ok(names)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn create_dir_all(&self, dir: &Path) -> io::Result<()> {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);

        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(rowlog_core::constants::DEFAULT_DIR_MODE);
        }

        builder.create(dir)
    }
}

/// Operations [`MemoryFilesystem`] can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsOp {
    Stat,
    Rename,
    Create,
    Write,
    ListDir,
    Remove,
    CreateDir,
}

#[derive(Debug, Clone)]
struct MemFile {
    data: Vec<u8>,
    mode: u32,
    owner: Option<OwnerInfo>,
}

#[derive(Debug, Default)]
struct MemState {
    files: HashMap<PathBuf, MemFile>,
    dirs: HashSet<PathBuf>,
    failures: HashSet<(FsOp, PathBuf)>,
}

impl MemState {
    fn check(&self, op: FsOp, path: &Path) -> io::Result<()> {
        if self.failures.contains(&(op, path.to_path_buf())) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("injected {:?} failure: {}", op, path.display()),
            ));
        }
        Ok(())
    }

    fn require_parent(&self, path: &Path) -> io::Result<()> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !self.dirs.contains(parent) => {
                Err(not_found(parent))
            }
            _ => Ok(()),
        }
    }

    fn add_dirs(&mut self, dir: &Path) {
        for ancestor in dir.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            self.dirs.insert(ancestor.to_path_buf());
        }
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file or directory: {}", path.display()),
    )
}

/// In-memory filesystem for tests.
/// Cloning creates a new handle to the same underlying data.
#[derive(Debug, Clone, Default)]
pub struct MemoryFilesystem {
    state: Arc<RwLock<MemState>>,
}

impl MemoryFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file directly (for test setup). Parent directories are created.
    pub fn add_file<P: Into<PathBuf>>(&self, path: P, data: &[u8]) {
        self.add_file_with(path, data, DEFAULT_FILE_MODE, None);
    }

    pub fn add_file_with<P: Into<PathBuf>>(
        &self,
        path: P,
        data: &[u8],
        mode: u32,
        owner: Option<OwnerInfo>,
    ) {
        let path = path.into();
        let mut state = self.state.write();
        if let Some(parent) = path.parent() {
            state.add_dirs(parent);
        }
        state.files.insert(
            path,
            MemFile {
                data: data.to_vec(),
                mode,
                owner,
            },
        );
    }

    /// Content of a specific file
    pub fn read(&self, path: &Path) -> Option<Vec<u8>> {
        self.state.read().files.get(path).map(|f| f.data.clone())
    }

    /// Permission bits of a specific file
    pub fn mode(&self, path: &Path) -> Option<u32> {
        self.state.read().files.get(path).map(|f| f.mode)
    }

    pub fn exists(&self, path: &Path) -> bool {
        let state = self.state.read();
        state.files.contains_key(path) || state.dirs.contains(path)
    }

    pub fn dir_exists(&self, path: &Path) -> bool {
        self.state.read().dirs.contains(path)
    }

    /// Sorted names of the files directly inside `dir`
    pub fn file_names(&self, dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .read()
            .files
            .keys()
            .filter(|p| p.parent() == Some(dir))
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(String::from))
            .collect();
        names.sort();
        names
    }

    /// Make every future `op` on `path` fail with `PermissionDenied`
    pub fn fail_on<P: Into<PathBuf>>(&self, op: FsOp, path: P) {
        self.state.write().failures.insert((op, path.into()));
    }

    pub fn clear_failures(&self) {
        self.state.write().failures.clear();
    }
}

impl Filesystem for MemoryFilesystem {
    fn stat(&self, path: &Path) -> io::Result<Option<FileStat>> {
        let state = self.state.read();
        state.check(FsOp::Stat, path)?;
        Ok(state.files.get(path).map(|f| FileStat {
            size: f.data.len() as u64,
            mode: f.mode,
            owner: f.owner,
        }))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut state = self.state.write();
        state.check(FsOp::Rename, from)?;
        state.require_parent(to)?;
        let file = state.files.remove(from).ok_or_else(|| not_found(from))?;
        state.files.insert(to.to_path_buf(), file);
        Ok(())
    }

    fn create_truncate(&self, path: &Path, mode: u32) -> io::Result<FileHandle> {
        let mut state = self.state.write();
        state.check(FsOp::Create, path)?;
        state.require_parent(path)?;
        state
            .files
            .entry(path.to_path_buf())
            .and_modify(|f| f.data.clear())
            .or_insert(MemFile {
                data: Vec::new(),
                mode,
                owner: None,
            });
        let fail = state.check(FsOp::Write, path).is_err();
        Ok(Box::new(MemoryHandle {
            state: Arc::clone(&self.state),
            path: path.to_path_buf(),
            fail,
        }))
    }

    fn list_dir(&self, dir: &Path) -> io::Result<Vec<String>> {
        let state = self.state.read();
        state.check(FsOp::ListDir, dir)?;
        if !state.dirs.contains(dir) {
            return Err(not_found(dir));
        }
        Ok(state
            .files
            .keys()
            .filter(|p| p.parent() == Some(dir))
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(String::from))
            .collect())
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state.write();
        state.check(FsOp::Remove, path)?;
        state
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }

    fn create_dir_all(&self, dir: &Path) -> io::Result<()> {
        let mut state = self.state.write();
        state.check(FsOp::CreateDir, dir)?;
        state.add_dirs(dir);
        Ok(())
    }
}

struct MemoryHandle {
    state: Arc<RwLock<MemState>>,
    path: PathBuf,
    fail: bool,
}

impl Write for MemoryHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.fail {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("injected write failure: {}", self.path.display()),
            ));
        }
        let mut state = self.state.write();
        let file = state
            .files
            .get_mut(&self.path)
            .ok_or_else(|| not_found(&self.path))?;
        file.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
