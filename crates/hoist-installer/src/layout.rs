use anyhow::{Context, Result};
use hoist_core::{PackagerKind, RecordRole};
use std::fs;
use std::path::{Path, PathBuf};

pub const META_DIR_NAME: &str = ".hoist";

/// Paths hoist manages under a base folder.
///
/// Delivered commands land directly in `base`; everything else lives in the
/// hidden meta folder `<base>/.hoist`, one subfolder per package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    base: PathBuf,
    meta: PathBuf,
}

impl InstallLayout {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        let meta = base.join(META_DIR_NAME);
        Self { base, meta }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn meta(&self) -> &Path {
        &self.meta
    }

    pub fn config_path(&self) -> PathBuf {
        self.meta.join("config.toml")
    }

    pub fn package_dir(&self, name: &str) -> PathBuf {
        self.meta.join(name)
    }

    pub fn record_path(&self, name: &str, role: RecordRole) -> PathBuf {
        self.package_dir(name).join(role.file_name())
    }

    pub fn entry_points_path(&self, name: &str) -> PathBuf {
        self.package_dir(name).join(".entry-points.json")
    }

    pub fn removed_entry_points_path(&self, name: &str) -> PathBuf {
        self.package_dir(name).join(".removed-entry-points.json")
    }

    pub fn work_dir(&self, name: &str) -> PathBuf {
        self.package_dir(name).join(".work")
    }

    /// Scratch area builders write into. Its `.lock` sibling is the package's
    /// install lock.
    pub fn build_dir(&self, name: &str) -> PathBuf {
        self.package_dir(name).join(".tmp")
    }

    pub fn install_lock_path(&self, name: &str) -> PathBuf {
        self.package_dir(name).join(".tmp.lock")
    }

    pub fn artifact_path(&self, name: &str, version: &str) -> PathBuf {
        self.package_dir(name).join(format!("{name}-{version}"))
    }

    pub fn delivery_target(&self, entry_point: &str) -> PathBuf {
        self.base.join(entry_point)
    }

    /// Installed executable a delivered entry point should run.
    pub fn entry_point_source(
        &self,
        packager: PackagerKind,
        name: &str,
        version: &str,
        entry_point: &str,
    ) -> PathBuf {
        match packager {
            PackagerKind::Venv => self
                .artifact_path(name, version)
                .join("bin")
                .join(entry_point),
            PackagerKind::Pex => self
                .package_dir(name)
                .join(format!("{entry_point}-{version}")),
        }
    }

    pub fn ensure_base_dirs(&self) -> Result<()> {
        for dir in [&self.base, &self.meta] {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn ensure_package_dir(&self, name: &str) -> Result<PathBuf> {
        let dir = self.package_dir(name);
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create package dir: {}", dir.display()))?;
        Ok(dir)
    }
}

pub fn default_base() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME is not set; cannot resolve hoist base folder")?;
    Ok(PathBuf::from(home).join(".local").join("bin"))
}
