use anyhow::{Context, Result};
use hoist_core::{
    EntryPointSet, HoistConfig, RecordRole, VersionRecord, LATEST_CHANNEL, PINNED_CHANNEL,
};
use hoist_resolver::VersionResolver;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::fs_utils::{remove_file_if_exists, write_atomic};
use crate::InstallLayout;

/// Loads a persisted record. A missing file yields an empty record; an
/// unreadable or corrupt one yields an invalid record carrying the problem.
pub fn load_record(layout: &InstallLayout, name: &str, role: RecordRole) -> VersionRecord {
    let path = layout.record_path(name, role);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return VersionRecord::empty(name),
        Err(err) => {
            warn!("failed to read {} record {}: {err}", role.as_str(), path.display());
            return VersionRecord::invalid(name, format!("can't read {}: {err}", path.display()));
        }
    };

    match serde_json::from_str::<VersionRecord>(&raw) {
        Ok(record) => VersionRecord {
            name: name.to_string(),
            ..record
        },
        Err(err) => {
            warn!("corrupt {} record {}: {err}", role.as_str(), path.display());
            VersionRecord::invalid(name, format!("corrupt {}: {err}", path.display()))
        }
    }
}

pub fn save_record(
    layout: &InstallLayout,
    record: &VersionRecord,
    role: RecordRole,
) -> Result<PathBuf> {
    let path = layout.record_path(&record.name, role);
    let mut payload = serde_json::to_string_pretty(record)
        .with_context(|| format!("failed to serialize {} record", role.as_str()))?;
    payload.push('\n');
    write_atomic(&path, payload.as_bytes())
        .with_context(|| format!("failed to write {} record: {}", role.as_str(), path.display()))?;
    Ok(path)
}

/// Returns the cached `latest` record while it is still valid, otherwise asks
/// the resolver. Only valid determinations are persisted.
pub fn refresh_latest(
    layout: &InstallLayout,
    config: &HoistConfig,
    resolver: &dyn VersionResolver,
    name: &str,
    force: bool,
    now_unix: u64,
) -> VersionRecord {
    let cached = load_record(layout, name, RecordRole::Latest);
    if !force && cached.still_valid(config.version_check_window(), now_unix) {
        debug!("using cached latest version of {name}: {}", cached.version);
        return cached;
    }

    let index = config.index_url();
    let source = config.index.clone().unwrap_or_else(|| "pypi".to_string());
    let template = VersionRecord::determined(name, "", LATEST_CHANNEL, source);
    let problem = match resolver.latest_version(index, name) {
        Ok(version) if is_concrete_version(&version) => {
            let record = VersionRecord {
                version: version.trim().to_string(),
                ..template
            }
            .stamped(now_unix);
            if let Err(err) = save_record(layout, &record, RecordRole::Latest) {
                warn!("{err:#}");
            }
            return record;
        }
        Ok(text) | Err(text) => text,
    };

    let problem = if problem.trim().is_empty() {
        format!("can't determine latest version from '{index}'")
    } else {
        problem
    };
    template.invalidated(problem)
}

/// Version the configuration asks for: a pin wins, then an explicit channel
/// entry, then the `latest` channel mirrors [`refresh_latest`].
pub fn refresh_desired(
    layout: &InstallLayout,
    config: &HoistConfig,
    resolver: &dyn VersionResolver,
    name: &str,
    force: bool,
    now_unix: u64,
) -> VersionRecord {
    let config_source = layout.config_path().display().to_string();
    if let Some(version) = config.pinned_version(name) {
        return VersionRecord::determined(name, version, PINNED_CHANNEL, config_source);
    }

    let channel = config.channel.as_str();
    if let Some(version) = config.channel_version(channel, name) {
        return VersionRecord::determined(name, version, channel, config_source);
    }

    if channel == LATEST_CHANNEL {
        let latest = refresh_latest(layout, config, resolver, name, force, now_unix);
        return VersionRecord::empty(name).derived_from(&latest);
    }

    VersionRecord::determined(name, "", channel, config_source)
        .invalidated(format!("can't determine {channel} version"))
}

fn is_concrete_version(text: &str) -> bool {
    let text = text.trim();
    !text.is_empty() && !text.starts_with("can't")
}

/// Older installs stored entry points as a bare list of names.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredEntryPoints {
    Mapping(EntryPointSet),
    Names(Vec<String>),
}

pub fn load_entry_points(layout: &InstallLayout, name: &str) -> Result<EntryPointSet> {
    let path = layout.entry_points_path(name);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(EntryPointSet::new()),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read entry points: {}", path.display()))
        }
    };

    let stored: StoredEntryPoints = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse entry points: {}", path.display()))?;
    Ok(match stored {
        StoredEntryPoints::Mapping(set) => set,
        StoredEntryPoints::Names(names) => names.into_iter().map(|name| (name, "")).collect(),
    })
}

pub fn save_entry_points(
    layout: &InstallLayout,
    name: &str,
    entry_points: &EntryPointSet,
) -> Result<PathBuf> {
    let path = layout.entry_points_path(name);
    let mut payload =
        serde_json::to_string_pretty(entry_points).context("failed to serialize entry points")?;
    payload.push('\n');
    write_atomic(&path, payload.as_bytes())
        .with_context(|| format!("failed to write entry points: {}", path.display()))?;
    Ok(path)
}

pub fn load_removed_entry_points(layout: &InstallLayout, name: &str) -> Result<Vec<String>> {
    let path = layout.removed_entry_points_path(name);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err).with_context(|| {
                format!("failed to read removed entry points: {}", path.display())
            })
        }
    };
    let names: Vec<String> = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse removed entry points: {}", path.display()))?;
    Ok(names)
}

/// Adds `newly_removed` to the removed-entry-points record, dropping any name
/// that is exposed again by `active`. The record is kept sorted and
/// de-duplicated, and deleted once it would be empty.
pub fn merge_removed_entry_points(
    layout: &InstallLayout,
    name: &str,
    newly_removed: &[String],
    active: &EntryPointSet,
) -> Result<Vec<String>> {
    let existing = load_removed_entry_points(layout, name)?;
    let merged = existing
        .into_iter()
        .chain(newly_removed.iter().cloned())
        .filter(|entry_point| !active.contains(entry_point))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>();

    if merged.is_empty() {
        clear_removed_entry_points(layout, name)?;
        return Ok(merged);
    }

    let path = layout.removed_entry_points_path(name);
    let mut payload =
        serde_json::to_string_pretty(&merged).context("failed to serialize removed entry points")?;
    payload.push('\n');
    write_atomic(&path, payload.as_bytes())
        .with_context(|| format!("failed to write removed entry points: {}", path.display()))?;
    Ok(merged)
}

pub fn clear_removed_entry_points(layout: &InstallLayout, name: &str) -> Result<bool> {
    let path = layout.removed_entry_points_path(name);
    if !path.exists() {
        return Ok(false);
    }
    remove_file_if_exists(&path)
        .with_context(|| format!("failed to remove {}", path.display()))?;
    Ok(true)
}

/// Packages that have a `current` record, sorted by name.
pub fn installed_packages(layout: &InstallLayout) -> Result<Vec<String>> {
    let meta = layout.meta();
    if !meta.exists() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(meta)
        .with_context(|| format!("failed to read meta folder: {}", meta.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        if layout.record_path(&name, RecordRole::Current).exists() {
            names.push(name);
        }
    }

    names.sort();
    Ok(names)
}
