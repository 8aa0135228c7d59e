//! Ownership propagation
//!
//! After a rotation the new active file is created by this process, so it is
//! owned by us. [`Ownership`] hands the previous file's owner over to the new
//! one. Which implementation is used is decided when the writer is composed;
//! the rotation protocol only calls [`Ownership::apply`].

use std::io;
use std::path::Path;
use std::sync::Arc;

use crate::fs::OwnerInfo;

/// Applies a previous file's owner to a newly created file
pub trait Ownership: Send + Sync {
    fn apply(&self, path: &Path, owner: &OwnerInfo) -> io::Result<()>;
}

/// Does nothing. Used where files have no owner to carry over.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopOwnership;

impl Ownership for NoopOwnership {
    fn apply(&self, _path: &Path, _owner: &OwnerInfo) -> io::Result<()> {
        Ok(())
    }
}

/// `chown(2)` the new file to the previous uid/gid
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct ChownOwnership;

#[cfg(unix)]
impl Ownership for ChownOwnership {
    fn apply(&self, path: &Path, owner: &OwnerInfo) -> io::Result<()> {
        std::os::unix::fs::chown(path, Some(owner.uid), Some(owner.gid))
    }
}

/// Ownership propagation for the current platform: `chown` on Linux,
/// a no-op everywhere else.
pub fn default_ownership() -> Arc<dyn Ownership> {
    #[cfg(target_os = "linux")]
    {
        Arc::new(ChownOwnership)
    }
    #[cfg(not(target_os = "linux"))]
    {
        Arc::new(NoopOwnership)
    }
}

/// Records every call, optionally failing. For tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingOwnership {
    calls: parking_lot::Mutex<Vec<(std::path::PathBuf, OwnerInfo)>>,
    fail: bool,
}

#[cfg(test)]
impl RecordingOwnership {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<(std::path::PathBuf, OwnerInfo)> {
        self.calls.lock().clone()
    }
}

#[cfg(test)]
impl Ownership for RecordingOwnership {
    fn apply(&self, path: &Path, owner: &OwnerInfo) -> io::Result<()> {
        self.calls.lock().push((path.to_path_buf(), *owner));
        if self.fail {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "operation not permitted",
            ));
        }
        Ok(())
    }
}
