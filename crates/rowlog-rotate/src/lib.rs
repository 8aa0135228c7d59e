//! rowlog rotate - rotate-on-write file sink with backup retention
//!
//! [`RotateOnWrite`] keeps exactly one record in its active file. Each write
//! moves the previous file aside as a timestamped backup, and a background
//! worker prunes backups by count and age.

pub mod fs;
pub mod mill;
pub mod naming;
pub mod ownership;
pub mod retention;
pub mod writer;

pub use fs::{FileStat, Filesystem, FsOp, MemoryFilesystem, OsFilesystem, OwnerInfo};
pub use mill::Mill;
pub use naming::{BackupDescriptor, BackupNaming};
pub use ownership::{default_ownership, NoopOwnership, Ownership};
pub use retention::{select_stale, Retention, RetentionReport};
pub use writer::{RotateOnWrite, RotateOnWriteBuilder, RotationTarget};

#[cfg(unix)]
pub use ownership::ChownOwnership;

pub use rowlog_core::{Clock, Error, Result, RotateConfig, SystemClock};
