use anyhow::{Context, Result};
use hoist_core::{validate_entry_point_name, DeliveryKind, HoistConfig, RecordRole};
use std::fs;
use std::io;
use std::path::Path;
use tracing::{info, warn};

use crate::delivery::{is_wrapper_for, remove_delivered};
use crate::errors::{InstallError, LockError};
use crate::fs_utils::remove_path_if_exists;
use crate::lock::SoftLock;
use crate::records::{load_entry_points, load_record, load_removed_entry_points};
use crate::InstallLayout;

/// Clears whatever occupies a delivery target before hoist first takes it
/// over.
pub trait ForeignUninstaller {
    fn uninstall_foreign(&self, target: &Path) -> Result<()>;
}

/// Removes files and symlinks. Folders are left in place with a warning.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveOccupant;

impl ForeignUninstaller for RemoveOccupant {
    fn uninstall_foreign(&self, target: &Path) -> Result<()> {
        let metadata = match fs::symlink_metadata(target) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to stat {}", target.display()))
            }
        };
        if metadata.is_dir() {
            warn!(
                "{} is a folder not managed by hoist, leaving it in place",
                target.display()
            );
            return Ok(());
        }
        fs::remove_file(target)
            .with_context(|| format!("failed to remove existing {}", target.display()))?;
        info!("removed existing {}", target.display());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UninstallStatus {
    NotInstalled,
    Uninstalled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UninstallResult {
    pub name: String,
    pub version: Option<String>,
    pub status: UninstallStatus,
    pub removed_entry_points: Vec<String>,
}

/// Removes a package's delivered entry points and its meta folder.
///
/// Only targets hoist can prove it delivered are removed: symlinks and
/// wrappers pointing into the package folder, and copies of recorded entry
/// points when the package was delivered by copy.
pub fn uninstall_package(
    layout: &InstallLayout,
    config: &HoistConfig,
    name: &str,
) -> Result<UninstallResult> {
    let package_dir = layout.package_dir(name);
    if !package_dir.exists() {
        return Ok(UninstallResult {
            name: name.to_string(),
            version: None,
            status: UninstallStatus::NotInstalled,
            removed_entry_points: Vec::new(),
        });
    }

    let lock = SoftLock::acquire(&layout.build_dir(name), config.install_timeout()).map_err(
        |err| match err {
            LockError::Busy { path } => anyhow::Error::new(InstallError::Locked {
                package: name.to_string(),
                lock_path: path,
            }),
            other => anyhow::Error::new(other),
        },
    )?;

    let current = load_record(layout, name, RecordRole::Current);
    let entry_points = load_entry_points(layout, name).unwrap_or_else(|err| {
        warn!("{err:#}");
        Default::default()
    });
    let removed = load_removed_entry_points(layout, name).unwrap_or_else(|err| {
        warn!("{err:#}");
        Vec::new()
    });
    let copied = current.delivery_kind() == Some(DeliveryKind::Copy);

    let mut removed_entry_points = Vec::new();
    let candidates = entry_points
        .names()
        .map(str::to_string)
        .chain(removed)
        .filter(|entry_point| validate_entry_point_name(entry_point).is_ok())
        .collect::<std::collections::BTreeSet<_>>();
    for entry_point in candidates {
        let target = layout.delivery_target(&entry_point);
        let recorded = entry_points.contains(&entry_point);
        if !delivered_by_hoist(&target, &package_dir, copied && recorded) {
            continue;
        }
        remove_delivered(&target)?;
        removed_entry_points.push(entry_point);
    }

    remove_path_if_exists(&package_dir)
        .with_context(|| format!("failed to remove {}", package_dir.display()))?;
    lock.release()?;

    let version = current.is_valid().then(|| current.version.clone());
    info!("uninstalled {name}");
    Ok(UninstallResult {
        name: name.to_string(),
        version,
        status: UninstallStatus::Uninstalled,
        removed_entry_points,
    })
}

fn delivered_by_hoist(target: &Path, package_dir: &Path, recorded_copy: bool) -> bool {
    let Ok(metadata) = fs::symlink_metadata(target) else {
        return false;
    };
    if metadata.file_type().is_symlink() {
        return fs::read_link(target)
            .map(|link| link.starts_with(package_dir))
            .unwrap_or(false);
    }
    recorded_copy || is_wrapper_for(target, package_dir)
}
