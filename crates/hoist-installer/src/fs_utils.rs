use anyhow::{Context, Result};
use filetime::FileTime;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;

pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// Removes a file, symlink or folder. Symlinks are removed, never followed.
pub fn remove_path_if_exists(path: &Path) -> io::Result<bool> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if metadata.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(true)
}

pub fn path_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Modification time in epoch seconds, following symlinks when the target
/// exists.
pub fn modified_unix(path: &Path) -> io::Result<i64> {
    let metadata = fs::metadata(path).or_else(|_| fs::symlink_metadata(path))?;
    Ok(FileTime::from_last_modification_time(&metadata).unix_seconds())
}

/// Writes `contents` next to `path` then renames it into place, so readers
/// never observe a partial file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("no parent folder for {}", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create {}", parent.display()))?;

    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
    tmp.write_all(contents)
        .with_context(|| format!("failed to write temp file for {}", path.display()))?;
    tmp.flush()
        .with_context(|| format!("failed to flush temp file for {}", path.display()))?;
    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to persist {}", path.display()))?;
    Ok(())
}

pub fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mut permissions = fs::metadata(path)
            .with_context(|| format!("failed to stat {}", path.display()))?
            .permissions();
        permissions.set_mode(permissions.mode() | 0o755);
        fs::set_permissions(path, permissions)
            .with_context(|| format!("failed to make {} executable", path.display()))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Copies a single file, keeping its permissions and modification time.
pub fn copy_file_preserving_mtime(src: &Path, dst: &Path) -> Result<()> {
    fs::copy(src, dst).with_context(|| {
        format!("failed to copy {} to {}", src.display(), dst.display())
    })?;
    let metadata =
        fs::metadata(src).with_context(|| format!("failed to stat {}", src.display()))?;
    filetime::set_file_mtime(dst, FileTime::from_last_modification_time(&metadata))
        .with_context(|| format!("failed to set mtime on {}", dst.display()))?;
    Ok(())
}

pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).with_context(|| format!("failed to create {}", dst.display()))?;
    for entry in fs::read_dir(src).with_context(|| format!("failed to read {}", src.display()))? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let metadata = fs::symlink_metadata(&src_path)
            .with_context(|| format!("failed to stat {}", src_path.display()))?;
        if metadata.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
            continue;
        }

        #[cfg(unix)]
        if metadata.file_type().is_symlink() {
            let target = fs::read_link(&src_path)
                .with_context(|| format!("failed to read symlink {}", src_path.display()))?;
            std::os::unix::fs::symlink(&target, &dst_path).with_context(|| {
                format!(
                    "failed to create symlink {} -> {}",
                    dst_path.display(),
                    target.display()
                )
            })?;
            continue;
        }

        copy_file_preserving_mtime(&src_path, &dst_path)?;
    }

    let metadata = fs::metadata(src).with_context(|| format!("failed to stat {}", src.display()))?;
    filetime::set_file_mtime(dst, FileTime::from_last_modification_time(&metadata))
        .with_context(|| format!("failed to set mtime on {}", dst.display()))?;
    Ok(())
}

/// Moves `src` to `dst`, replacing whatever `dst` held. Falls back to a copy
/// when a rename is not possible.
pub fn move_replacing(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    remove_path_if_exists(dst)
        .with_context(|| format!("failed to replace {}", dst.display()))?;

    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    let metadata =
        fs::symlink_metadata(src).with_context(|| format!("failed to stat {}", src.display()))?;
    if metadata.is_dir() {
        copy_dir_recursive(src, dst)?;
        fs::remove_dir_all(src)
            .with_context(|| format!("failed to cleanup {}", src.display()))?;
    } else {
        copy_file_preserving_mtime(src, dst)?;
        fs::remove_file(src).with_context(|| format!("failed to cleanup {}", src.display()))?;
    }
    Ok(())
}
