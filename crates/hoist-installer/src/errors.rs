use std::io;
use std::path::PathBuf;

/// Lock acquisition failures. Callers never retry on these.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("lock {} is held by another process", path.display())]
    Busy { path: PathBuf },
    #[error("work folder is in use by another process (see {})", path.display())]
    AlreadyLocked { path: PathBuf },
    #[error("failed to manage lock {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

/// Install failures a caller may need to tell apart.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("can't install {package}: {problem}")]
    CannotDetermineVersion { package: String, problem: String },
    #[error(
        "{package} is currently being installed by another process; if that is incorrect, please delete {}",
        lock_path.display()
    )]
    Locked { package: String, lock_path: PathBuf },
    #[error("failed to build {package} {version}: {reason}")]
    Build {
        package: String,
        version: String,
        reason: String,
    },
    #[error("failed to deliver {package}: {reason}")]
    Delivery { package: String, reason: String },
}
