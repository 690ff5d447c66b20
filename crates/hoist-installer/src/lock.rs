use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use filetime::FileTime;
use fs4::FileExt;
use tracing::{debug, warn};

use crate::errors::LockError;
use crate::fs_utils::now_unix;

pub const PING_FILE: &str = ".ping";

/// Immediate-fail mutex backed by a `<target>.lock` marker file.
///
/// A marker older than the validity window is considered abandoned by a
/// crashed holder and is reclaimed. Reclaiming happens under an advisory lock
/// on `<target>.lock.reclaim` so that only one process can replace a given
/// stale marker. The marker is removed when the handle is released or dropped.
#[derive(Debug)]
pub struct SoftLock {
    marker: PathBuf,
    released: bool,
}

impl SoftLock {
    pub fn acquire(target: &Path, validity: Duration) -> Result<Self, LockError> {
        let marker = lock_marker_path(target);
        if let Some(parent) = marker.parent() {
            fs::create_dir_all(parent).map_err(|source| LockError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        match create_marker(&marker) {
            Ok(()) => return Ok(Self::held(marker)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
            Err(source) => return Err(LockError::Io { path: marker, source }),
        }

        if marker_is_young(&marker, validity)? {
            return Err(LockError::Busy { path: marker });
        }

        let Some(_guard) = try_reclaim_guard(&marker)? else {
            return Err(LockError::Busy { path: marker });
        };
        // Another process may have reclaimed it since the first look.
        if marker_is_young(&marker, validity)? {
            return Err(LockError::Busy { path: marker });
        }

        warn!("reclaiming stale lock {}", marker.display());
        match fs::remove_file(&marker) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(LockError::Io { path: marker, source }),
        }
        match create_marker(&marker) {
            Ok(()) => Ok(Self::held(marker)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                Err(LockError::Busy { path: marker })
            }
            Err(source) => Err(LockError::Io { path: marker, source }),
        }
    }

    fn held(marker: PathBuf) -> Self {
        debug!("acquired lock {}", marker.display());
        Self {
            marker,
            released: false,
        }
    }

    pub fn marker_path(&self) -> &Path {
        &self.marker
    }

    /// Re-touches the marker so a long-running holder is not mistaken for a
    /// crashed one.
    pub fn refresh(&self) -> Result<(), LockError> {
        filetime::set_file_mtime(&self.marker, FileTime::now()).map_err(|source| LockError::Io {
            path: self.marker.clone(),
            source,
        })
    }

    pub fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        match fs::remove_file(&self.marker) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(LockError::Io {
                path: self.marker.clone(),
                source,
            }),
        }
    }
}

impl Drop for SoftLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = fs::remove_file(&self.marker);
        }
    }
}

/// Work-folder lock for background upgrades: `<work>/.ping` younger than the
/// validity window means another process is already on it. The whole work
/// folder is deleted on exit.
#[derive(Debug)]
pub struct PingLock {
    work_dir: PathBuf,
}

impl PingLock {
    pub fn enter(work_dir: &Path, validity: Duration) -> Result<Self, LockError> {
        let ping = work_dir.join(PING_FILE);
        let age = marker_age(&ping).map_err(|source| LockError::Io {
            path: ping.clone(),
            source,
        })?;
        if matches!(age, Some(age) if age < validity) {
            return Err(LockError::AlreadyLocked { path: ping });
        }

        match fs::remove_dir_all(work_dir) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(LockError::Io {
                    path: work_dir.to_path_buf(),
                    source,
                })
            }
        }
        fs::create_dir_all(work_dir).map_err(|source| LockError::Io {
            path: work_dir.to_path_buf(),
            source,
        })?;

        let lock = Self {
            work_dir: work_dir.to_path_buf(),
        };
        lock.touch()?;
        Ok(lock)
    }

    pub fn ping_path(&self) -> PathBuf {
        self.work_dir.join(PING_FILE)
    }

    pub fn touch(&self) -> Result<(), LockError> {
        let ping = self.ping_path();
        fs::write(&ping, format!("{}\n", now_unix()))
            .map_err(|source| LockError::Io { path: ping, source })
    }
}

impl Drop for PingLock {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.work_dir);
    }
}

pub fn lock_marker_path(target: &Path) -> PathBuf {
    let mut raw = OsString::from(target.as_os_str());
    raw.push(".lock");
    PathBuf::from(raw)
}

pub fn reclaim_guard_path(marker: &Path) -> PathBuf {
    let mut raw = OsString::from(marker.as_os_str());
    raw.push(".reclaim");
    PathBuf::from(raw)
}

/// Takes the advisory lock that serializes reclamation of `marker`, `None`
/// when another process holds it.
fn try_reclaim_guard(marker: &Path) -> Result<Option<fs::File>, LockError> {
    let path = reclaim_guard_path(marker);
    let file = fs::OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&path)
        .map_err(|source| LockError::Io {
            path: path.clone(),
            source,
        })?;

    match file.try_lock_exclusive() {
        Ok(()) => Ok(Some(file)),
        Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(None),
        #[cfg(windows)]
        Err(err) if matches!(err.raw_os_error(), Some(32 | 33)) => Ok(None),
        Err(source) => Err(LockError::Io { path, source }),
    }
}

fn marker_is_young(marker: &Path, validity: Duration) -> Result<bool, LockError> {
    let age = marker_age(marker).map_err(|source| LockError::Io {
        path: marker.to_path_buf(),
        source,
    })?;
    Ok(matches!(age, Some(age) if age < validity))
}

fn create_marker(marker: &Path) -> io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(marker)?;
    file.write_all(
        format!(
            "pid={}\nacquired_at_unix={}\n",
            std::process::id(),
            now_unix()
        )
        .as_bytes(),
    )?;
    file.flush()
}

/// Age of a marker file, `None` when it does not exist. Markers dated in the
/// future count as brand new.
fn marker_age(marker: &Path) -> io::Result<Option<Duration>> {
    let metadata = match fs::metadata(marker) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    let modified = metadata.modified()?;
    Ok(Some(
        SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO),
    ))
}
