use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

use hoist_core::EntryPointSet;
use tracing::{debug, warn};

use crate::fs_utils::{modified_unix, remove_path_if_exists};
use crate::records::clear_removed_entry_points;
use crate::InstallLayout;

/// What retention decided for one package folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPlan {
    /// File names to delete, newest first within each bucket.
    pub delete: Vec<String>,
    /// Every removed entry point has been fully reclaimed.
    pub drop_removed_record: bool,
    /// Deletions the record drop depends on: every entry of a removed bucket
    /// that is being reclaimed.
    pub reclaim: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub deleted: Vec<PathBuf>,
    pub removed_record_dropped: bool,
}

/// Decides which installed artifacts to delete.
///
/// `entries` are `(file name, mtime)` pairs of the non-hidden entries of the
/// package folder. Each is bucketed under the longest registered name it
/// starts with; unmatched entries are left alone. An entry is old once its
/// mtime is at or before `cutoff_unix`.
pub fn plan_retention(
    entries: &[(String, i64)],
    package: &str,
    entry_points: &[String],
    removed: &[String],
    cutoff_unix: i64,
) -> RetentionPlan {
    let active = std::iter::once(package)
        .chain(entry_points.iter().map(String::as_str))
        .collect::<BTreeSet<_>>();
    let removed = removed
        .iter()
        .map(String::as_str)
        .filter(|name| !active.contains(name))
        .collect::<BTreeSet<_>>();

    let mut buckets: BTreeMap<&str, Vec<(i64, &str)>> = active
        .iter()
        .chain(removed.iter())
        .filter(|name| !name.is_empty())
        .map(|name| (*name, Vec::new()))
        .collect();

    for (file_name, mtime) in entries {
        if file_name.starts_with('.') {
            continue;
        }
        let owner = buckets
            .keys()
            .filter(|name| file_name.starts_with(**name))
            .max_by_key(|name| name.len())
            .copied();
        if let Some(owner) = owner {
            if let Some(bucket) = buckets.get_mut(owner) {
                bucket.push((*mtime, file_name.as_str()));
            }
        }
    }

    let mut plan = RetentionPlan::default();
    let mut reclaimed = 0usize;
    for (name, mut bucket) in buckets {
        bucket.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(a.1)));
        let is_removed = removed.contains(name);
        let Some(&(newest, _)) = bucket.first() else {
            if is_removed {
                reclaimed += 1;
            }
            continue;
        };

        let newest_is_old = newest <= cutoff_unix;
        let keep = match (is_removed, newest_is_old) {
            (false, true) => 1,
            (false, false) => 2,
            (true, true) => {
                reclaimed += 1;
                plan.reclaim
                    .extend(bucket.iter().map(|(_, file_name)| (*file_name).to_string()));
                0
            }
            (true, false) => 1,
        };
        plan.delete.extend(
            bucket
                .iter()
                .skip(keep)
                .map(|(_, file_name)| (*file_name).to_string()),
        );
    }

    plan.drop_removed_record = reclaimed >= removed.len();
    plan
}

/// Applies retention to a package folder. Failures are logged and skipped.
pub fn cleanup_package(
    layout: &InstallLayout,
    package: &str,
    entry_points: &EntryPointSet,
    removed: &[String],
    cutoff_unix: i64,
) -> CleanupReport {
    let folder = layout.package_dir(package);
    let mut entries = Vec::new();
    match fs::read_dir(&folder) {
        Ok(read_dir) => {
            for entry in read_dir.flatten() {
                let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                if file_name.starts_with('.') {
                    continue;
                }
                match modified_unix(&entry.path()) {
                    Ok(mtime) => entries.push((file_name, mtime)),
                    Err(err) => warn!("failed to stat {}: {err}", entry.path().display()),
                }
            }
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            warn!("failed to read {}: {err}", folder.display());
            return CleanupReport::default();
        }
    }

    let names = entry_points.names().map(str::to_string).collect::<Vec<_>>();
    let plan = plan_retention(&entries, package, &names, removed, cutoff_unix);

    let mut report = CleanupReport::default();
    let mut reclaim_failed = false;
    for file_name in &plan.delete {
        let path = folder.join(file_name);
        match remove_path_if_exists(&path) {
            Ok(_) => {
                debug!("deleted old install {}", path.display());
                report.deleted.push(path);
            }
            Err(err) => {
                warn!("failed to delete {}: {err}", path.display());
                reclaim_failed |= plan.reclaim.contains(file_name);
            }
        }
    }

    // Leftovers of a removed entry point are only bucketed while it is recorded.
    if plan.drop_removed_record && !reclaim_failed {
        match clear_removed_entry_points(layout, package) {
            Ok(dropped) => report.removed_record_dropped = dropped,
            Err(err) => warn!("{err:#}"),
        }
    }
    report
}
