use anyhow::{Context, Result};
use hoist_core::{
    validate_entry_point_name, validate_package_name, DeliveryKind, EntryPointSet, HoistConfig,
    PackagerKind, RecordRole, VersionRecord,
};
use hoist_resolver::VersionResolver;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::builder::{BuildOutput, BuildRequest, PackageBuilder};
use crate::delivery::{deliver, remove_delivered, DeliveryContext, DeliveryStatus};
use crate::errors::{InstallError, LockError};
use crate::fs_utils::{move_replacing, now_unix, path_exists, remove_path_if_exists};
use crate::lock::{PingLock, SoftLock};
use crate::records::{
    load_entry_points, load_record, load_removed_entry_points, merge_removed_entry_points,
    refresh_desired, save_entry_points, save_record,
};
use crate::retention::{cleanup_package, CleanupReport};
use crate::runtime::{RuntimeSelector, TargetRuntime};
use crate::uninstall::{uninstall_package, ForeignUninstaller, UninstallResult};
use crate::InstallLayout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPhase {
    DeterminingDesired,
    CheckingCurrent,
    AcquiringLock,
    Building,
    Delivering,
    UpdatingState,
    CleaningUp,
}

impl InstallPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DeterminingDesired => "determining-desired",
            Self::CheckingCurrent => "checking-current",
            Self::AcquiringLock => "acquiring-lock",
            Self::Building => "building",
            Self::Delivering => "delivering",
            Self::UpdatingState => "updating-state",
            Self::CleaningUp => "cleaning-up",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed(VersionRecord),
    AlreadyInstalled(VersionRecord),
}

impl InstallOutcome {
    pub fn record(&self) -> &VersionRecord {
        match self {
            Self::Installed(record) | Self::AlreadyInstalled(record) => record,
        }
    }

    pub fn summary(&self, verbose: bool, index: Option<&str>) -> String {
        match self {
            Self::Installed(record) => {
                format!("Installed {}", record.representation(verbose, None, index))
            }
            Self::AlreadyInstalled(record) => {
                record.representation(verbose, Some("is already installed"), index)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoUpgradeOutcome {
    /// Another process is already upgrading this package.
    Skipped,
    Finished(InstallOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    UpToDate(VersionRecord),
    UpgradeAvailable {
        current: VersionRecord,
        desired: VersionRecord,
    },
    NotInstalled {
        desired: VersionRecord,
    },
    Problem(VersionRecord),
}

/// Drives install decisions for packages under one layout.
///
/// Collaborators are borrowed so tests can substitute fakes for the index,
/// the build tooling, the interpreter choice and the occupant remover.
pub struct Installer<'a> {
    layout: &'a InstallLayout,
    config: &'a HoistConfig,
    resolver: &'a dyn VersionResolver,
    builder: &'a dyn PackageBuilder,
    runtime: &'a dyn RuntimeSelector,
    occupant: &'a dyn ForeignUninstaller,
    hoist_program: Option<PathBuf>,
}

impl<'a> Installer<'a> {
    pub fn new(
        layout: &'a InstallLayout,
        config: &'a HoistConfig,
        resolver: &'a dyn VersionResolver,
        builder: &'a dyn PackageBuilder,
        runtime: &'a dyn RuntimeSelector,
        occupant: &'a dyn ForeignUninstaller,
    ) -> Self {
        Self {
            layout,
            config,
            resolver,
            builder,
            runtime,
            occupant,
            hoist_program: None,
        }
    }

    /// Lets wrapper deliveries call back into hoist for background upgrades.
    pub fn with_hoist_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.hoist_program = Some(program.into());
        self
    }

    pub fn layout(&self) -> &InstallLayout {
        self.layout
    }

    pub fn install(&self, name: &str, force: bool) -> Result<InstallOutcome> {
        validate_package_name(name)?;
        let now = now_unix();

        self.enter_phase(name, InstallPhase::DeterminingDesired, None)?;
        let desired = refresh_desired(self.layout, self.config, self.resolver, name, force, now);
        if !desired.is_valid() {
            return Err(InstallError::CannotDetermineVersion {
                package: name.to_string(),
                problem: desired
                    .problem
                    .clone()
                    .unwrap_or_else(|| "no version".to_string()),
            }
            .into());
        }

        self.enter_phase(name, InstallPhase::CheckingCurrent, None)?;
        let current = load_record(self.layout, name, RecordRole::Current);
        let packager = self.config.packager_for(name);
        let delivery = self.config.delivery_for(name, current.delivery_kind());
        let runtime = self.runtime.target_runtime(name);
        let desired = desired.with_dynamic_fields(packager, delivery, &runtime.program, now);
        if !force && current.is_valid() && current.equivalent(&desired) {
            debug!("{name} {} is already installed", current.version);
            self.enter_phase(name, InstallPhase::CleaningUp, None)?;
            self.cleanup_best_effort(name);
            return Ok(InstallOutcome::AlreadyInstalled(current));
        }

        self.enter_phase(name, InstallPhase::AcquiringLock, None)?;
        self.layout.ensure_base_dirs()?;
        self.layout.ensure_package_dir(name)?;
        let lock = self.acquire_install_lock(name)?;

        self.enter_phase(name, InstallPhase::Building, Some(&lock))?;
        let output = self.build(name, &desired.version, packager, &runtime)?;

        self.enter_phase(name, InstallPhase::Delivering, Some(&lock))?;
        let fresh = !path_exists(&self.layout.record_path(name, RecordRole::Current));
        self.deliver_entry_points(name, &desired.version, packager, delivery, &output, fresh)?;

        self.enter_phase(name, InstallPhase::UpdatingState, Some(&lock))?;
        let removed = self.update_entry_point_state(name, &output.entry_points)?;
        let current = desired.with_dynamic_fields(packager, delivery, &runtime.program, now_unix());
        save_record(self.layout, &current, RecordRole::Current)?;

        self.enter_phase(name, InstallPhase::CleaningUp, Some(&lock))?;
        let report = cleanup_package(
            self.layout,
            name,
            &output.entry_points,
            &removed,
            self.cleanup_cutoff(),
        );
        debug!("cleanup of {name} deleted {} entries", report.deleted.len());

        lock.release()?;
        info!("installed {}", current.representation(true, None, None));
        Ok(InstallOutcome::Installed(current))
    }

    /// Installs in the background on behalf of a wrapper. Silently skips when
    /// another process is already on it.
    pub fn auto_upgrade(&self, name: &str) -> Result<AutoUpgradeOutcome> {
        validate_package_name(name)?;
        let work_dir = self.layout.work_dir(name);
        let _ping = match PingLock::enter(&work_dir, self.config.auto_upgrade_window()) {
            Ok(lock) => lock,
            Err(LockError::AlreadyLocked { path }) => {
                debug!("skipping auto-upgrade of {name}, {} is young", path.display());
                return Ok(AutoUpgradeOutcome::Skipped);
            }
            Err(err) => return Err(err.into()),
        };

        match self.install(name, false) {
            Ok(outcome) => Ok(AutoUpgradeOutcome::Finished(outcome)),
            Err(err)
                if matches!(
                    err.downcast_ref::<InstallError>(),
                    Some(InstallError::Locked { .. })
                ) =>
            {
                debug!("skipping auto-upgrade of {name}: {err}");
                Ok(AutoUpgradeOutcome::Skipped)
            }
            Err(err) => Err(err),
        }
    }

    pub fn check(&self, name: &str) -> Result<CheckStatus> {
        validate_package_name(name)?;
        let now = now_unix();
        let desired = refresh_desired(self.layout, self.config, self.resolver, name, false, now);
        if !desired.is_valid() {
            return Ok(CheckStatus::Problem(desired));
        }

        let current = load_record(self.layout, name, RecordRole::Current);
        let packager = self.config.packager_for(name);
        let delivery = self.config.delivery_for(name, current.delivery_kind());
        let runtime = self.runtime.target_runtime(name);
        let desired = desired.with_dynamic_fields(packager, delivery, &runtime.program, now);
        if !current.is_valid() {
            return Ok(CheckStatus::NotInstalled { desired });
        }
        if current.equivalent(&desired) {
            return Ok(CheckStatus::UpToDate(current));
        }
        Ok(CheckStatus::UpgradeAvailable { current, desired })
    }

    /// Runs retention for an installed package.
    pub fn cleanup(&self, name: &str) -> Result<CleanupReport> {
        validate_package_name(name)?;
        let entry_points = load_entry_points(self.layout, name)?;
        let removed = load_removed_entry_points(self.layout, name)?;
        Ok(cleanup_package(
            self.layout,
            name,
            &entry_points,
            &removed,
            self.cleanup_cutoff(),
        ))
    }

    pub fn uninstall(&self, name: &str) -> Result<UninstallResult> {
        validate_package_name(name)?;
        uninstall_package(self.layout, self.config, name)
    }

    fn enter_phase(&self, name: &str, phase: InstallPhase, lock: Option<&SoftLock>) -> Result<()> {
        debug!("{name}: {}", phase.as_str());
        if let Some(lock) = lock {
            lock.refresh()?;
        }
        Ok(())
    }

    fn acquire_install_lock(&self, name: &str) -> Result<SoftLock> {
        SoftLock::acquire(&self.layout.build_dir(name), self.config.install_timeout()).map_err(
            |err| match err {
                LockError::Busy { path } => anyhow::Error::new(InstallError::Locked {
                    package: name.to_string(),
                    lock_path: path,
                }),
                other => anyhow::Error::new(other),
            },
        )
    }

    fn build(
        &self,
        name: &str,
        version: &str,
        packager: PackagerKind,
        runtime: &TargetRuntime,
    ) -> Result<BuildOutput> {
        let build_dir = self.layout.build_dir(name);
        let destination_dir = self.layout.package_dir(name);
        let build_error = |reason: String| InstallError::Build {
            package: name.to_string(),
            version: version.to_string(),
            reason,
        };

        remove_path_if_exists(&build_dir)
            .with_context(|| format!("failed to clear {}", build_dir.display()))?;
        fs::create_dir_all(&build_dir)
            .with_context(|| format!("failed to create {}", build_dir.display()))?;

        let request = BuildRequest {
            package: name,
            version,
            index: self.config.index_url(),
            packager,
            runtime,
            build_dir: &build_dir,
            destination_dir: &destination_dir,
        };
        let result: Result<BuildOutput> = match self.builder.build(&request) {
            Err(err) => Err(build_error(format!("{err:#}")).into()),
            Ok(output) if output.entry_points.is_empty() => Err(build_error(format!(
                "'{name}' is not a CLI, it has no console_scripts entry points"
            ))
            .into()),
            Ok(output) => match check_entry_point_names(&output.entry_points)
                .and_then(|()| self.collect_artifacts(&output.artifacts, &destination_dir))
            {
                Ok(()) => Ok(output),
                Err(err) => Err(build_error(format!("{err:#}")).into()),
            },
        };

        if let Err(err) = remove_path_if_exists(&build_dir) {
            warn!("failed to clean build folder {}: {err}", build_dir.display());
        }
        result
    }

    fn collect_artifacts(&self, artifacts: &[PathBuf], destination_dir: &Path) -> Result<()> {
        for artifact in artifacts {
            if !path_exists(artifact) {
                anyhow::bail!("expected artifact {} was not produced", artifact.display());
            }
            let file_name = artifact
                .file_name()
                .with_context(|| format!("invalid artifact path {}", artifact.display()))?;
            move_replacing(artifact, &destination_dir.join(file_name))?;
        }
        Ok(())
    }

    fn deliver_entry_points(
        &self,
        name: &str,
        version: &str,
        packager: PackagerKind,
        delivery: DeliveryKind,
        output: &BuildOutput,
        fresh: bool,
    ) -> Result<()> {
        let context = DeliveryContext {
            package: name,
            base: self.layout.base(),
            hoist_program: self.hoist_program.as_deref(),
        };
        let delivery_error = |reason: String| InstallError::Delivery {
            package: name.to_string(),
            reason,
        };

        let mut delivered = 0usize;
        for entry_point in output.entry_points.names() {
            let target = self.layout.delivery_target(entry_point);
            if fresh {
                if let Err(err) = self.occupant.uninstall_foreign(&target) {
                    warn!("{err:#}");
                }
            }
            let source = self
                .layout
                .entry_point_source(packager, name, version, entry_point);
            match deliver(delivery, &source, &target, &context)
                .map_err(|err| delivery_error(format!("{err:#}")))?
            {
                DeliveryStatus::Delivered => delivered += 1,
                DeliveryStatus::Skipped { reason } => {
                    warn!("skipped delivery of {entry_point}: {reason}");
                }
            }
        }

        if delivered == 0 {
            return Err(delivery_error("no entry point could be delivered".to_string()).into());
        }
        Ok(())
    }

    /// Records entry points the new version dropped and deletes their
    /// delivered targets, then saves the new entry point set.
    fn update_entry_point_state(
        &self,
        name: &str,
        entry_points: &EntryPointSet,
    ) -> Result<Vec<String>> {
        let previous = load_entry_points(self.layout, name).unwrap_or_else(|err| {
            warn!("{err:#}");
            EntryPointSet::new()
        });
        let dropped = previous
            .removed_in(entry_points)
            .into_iter()
            .filter(|entry_point| match validate_entry_point_name(entry_point) {
                Ok(()) => true,
                Err(err) => {
                    warn!("ignoring recorded entry point: {err:#}");
                    false
                }
            })
            .collect::<Vec<_>>();
        for entry_point in &dropped {
            let target = self.layout.delivery_target(entry_point);
            if let Err(err) = remove_delivered(&target) {
                warn!("{err:#}");
            }
        }

        let removed = merge_removed_entry_points(self.layout, name, &dropped, entry_points)?;
        save_entry_points(self.layout, name, entry_points)?;
        Ok(removed)
    }

    fn cleanup_best_effort(&self, name: &str) {
        match self.cleanup(name) {
            Ok(report) => debug!("cleanup of {name} deleted {} entries", report.deleted.len()),
            Err(err) => warn!("cleanup of {name} failed: {err:#}"),
        }
    }

    fn cleanup_cutoff(&self) -> i64 {
        let age = self.config.cleanup_age().as_secs();
        now_unix().saturating_sub(age) as i64
    }
}

/// Entry points are delivered as `<base>/<name>`, so each name must stay a
/// plain file name.
fn check_entry_point_names(entry_points: &EntryPointSet) -> Result<()> {
    for name in entry_points.names() {
        validate_entry_point_name(name)?;
    }
    Ok(())
}
