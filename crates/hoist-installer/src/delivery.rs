use anyhow::{anyhow, Context, Result};
use hoist_core::{DeliveryKind, HOIST_VERSION};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::fs_utils::{
    copy_dir_recursive, copy_file_preserving_mtime, make_executable, path_exists,
    remove_path_if_exists,
};

/// Information a delivery may embed in what it produces.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryContext<'a> {
    pub package: &'a str,
    /// Base folder the package lives in, handed back to hoist by wrappers.
    pub base: &'a Path,
    /// The hoist executable, used by wrappers to trigger background upgrades.
    pub hoist_program: Option<&'a Path>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Delivered,
    Skipped { reason: String },
}

/// Exposes `source` at `target` using `kind`.
///
/// The result is staged under a hidden sibling of `target` and renamed into
/// place. A missing source is an error; a symlink the platform refuses, or a
/// real folder already sitting at `target`, is reported as skipped.
pub fn deliver(
    kind: DeliveryKind,
    source: &Path,
    target: &Path,
    context: &DeliveryContext<'_>,
) -> Result<DeliveryStatus> {
    if !source.exists() {
        return Err(anyhow!(
            "can't deliver {}: {} does not exist",
            target.display(),
            source.display()
        ));
    }
    if is_real_dir(target) {
        let reason = format!("{} is a folder, leaving it in place", target.display());
        warn!("{reason}");
        return Ok(DeliveryStatus::Skipped { reason });
    }

    let staging = staging_path(target)?;
    remove_path_if_exists(&staging)
        .with_context(|| format!("failed to clear {}", staging.display()))?;

    let staged = match kind {
        DeliveryKind::Symlink => stage_symlink(source, &staging),
        DeliveryKind::Copy => stage_copy(source, &staging),
        DeliveryKind::Wrap => stage_wrapper(source, &staging, context),
    };
    if let Err(err) = staged {
        let _ = remove_path_if_exists(&staging);
        if kind == DeliveryKind::Symlink {
            warn!("{err:#}");
            return Ok(DeliveryStatus::Skipped {
                reason: format!("{err:#}"),
            });
        }
        return Err(err);
    }

    if let Err(err) = replace_target(&staging, target) {
        let _ = remove_path_if_exists(&staging);
        return Err(err);
    }
    debug!(
        "delivered {} -> {} ({kind})",
        target.display(),
        source.display()
    );
    Ok(DeliveryStatus::Delivered)
}

/// Deletes a delivered entry point; missing targets are fine.
pub fn remove_delivered(target: &Path) -> Result<bool> {
    remove_path_if_exists(target).with_context(|| format!("failed to remove {}", target.display()))
}

pub fn staging_path(target: &Path) -> Result<PathBuf> {
    let parent = target
        .parent()
        .with_context(|| format!("no parent folder for {}", target.display()))?;
    let file_name = target
        .file_name()
        .with_context(|| format!("invalid delivery target {}", target.display()))?;
    let mut staged = OsString::from(".");
    staged.push(file_name);
    staged.push(".hoist-staging");
    Ok(parent.join(staged))
}

fn stage_symlink(source: &Path, staging: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(source, staging).with_context(|| {
            format!(
                "failed to create symlink {} -> {}",
                staging.display(),
                source.display()
            )
        })
    }

    #[cfg(not(unix))]
    {
        let _ = staging;
        Err(anyhow!(
            "symlinks are not supported on this platform, can't link {}",
            source.display()
        ))
    }
}

fn stage_copy(source: &Path, staging: &Path) -> Result<()> {
    if source.is_dir() {
        return copy_dir_recursive(source, staging);
    }
    copy_file_preserving_mtime(source, staging)?;
    make_executable(staging)
}

fn stage_wrapper(source: &Path, staging: &Path, context: &DeliveryContext<'_>) -> Result<()> {
    fs::write(staging, render_wrapper(source, context))
        .with_context(|| format!("failed to write wrapper {}", staging.display()))?;
    make_executable(staging)
}

fn is_real_dir(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|metadata| metadata.is_dir())
        .unwrap_or(false)
}

fn replace_target(staging: &Path, target: &Path) -> Result<()> {
    fs::rename(staging, target).with_context(|| {
        format!(
            "failed to move {} into place at {}",
            staging.display(),
            target.display()
        )
    })
}

/// Shell launcher that kicks off a background upgrade check, then runs the
/// real executable with the caller's arguments.
pub fn render_wrapper(source: &Path, context: &DeliveryContext<'_>) -> String {
    let mut script = String::from("#!/bin/sh\n");
    script.push_str(&format!(
        "# Wrapper generated by hoist v{HOIST_VERSION}, do not edit\n"
    ));
    if let Some(program) = context.hoist_program {
        let program = shell_quote(&program.display().to_string());
        script.push_str(&format!("if [ -x {program} ]; then\n"));
        script.push_str(&format!(
            "    nohup {program} --base {} auto-upgrade {} >/dev/null 2>&1 &\n",
            shell_quote(&context.base.display().to_string()),
            shell_quote(context.package)
        ));
        script.push_str("fi\n");
    }
    script.push_str(&format!(
        "exec {} \"$@\"\n",
        shell_quote(&source.display().to_string())
    ));
    script
}

/// Whether `target` is a wrapper this module generated for `source_dir`.
pub fn is_wrapper_for(target: &Path, source_dir: &Path) -> bool {
    if !path_exists(target) || target.is_dir() {
        return false;
    }
    let Ok(raw) = fs::read(target) else {
        return false;
    };
    if raw.len() > 8192 {
        return false;
    }
    let text = String::from_utf8_lossy(&raw);
    text.contains("# Wrapper generated by hoist")
        && text.contains(&source_dir.display().to_string())
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
