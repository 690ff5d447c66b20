mod builder;
mod delivery;
mod errors;
mod fs_utils;
mod layout;
mod lock;
mod orchestrator;
mod records;
mod retention;
mod runtime;
mod uninstall;

pub use builder::{
    is_universal, pip_index, relocate_script, wheel_entry_points, BuildOutput, BuildRequest,
    PackageBuilder, SystemBuilder,
};
pub use delivery::{deliver, remove_delivered, render_wrapper, DeliveryContext, DeliveryStatus};
pub use errors::{InstallError, LockError};
pub use layout::{default_base, InstallLayout, META_DIR_NAME};
pub use lock::{lock_marker_path, reclaim_guard_path, PingLock, SoftLock, PING_FILE};
pub use orchestrator::{
    AutoUpgradeOutcome, CheckStatus, InstallOutcome, InstallPhase, Installer,
};
pub use records::{
    clear_removed_entry_points, installed_packages, load_entry_points, load_record,
    load_removed_entry_points, merge_removed_entry_points, refresh_desired, refresh_latest,
    save_entry_points, save_record,
};
pub use retention::{cleanup_package, plan_retention, CleanupReport, RetentionPlan};
pub use runtime::{ConfiguredRuntime, RuntimeSelector, TargetRuntime, DEFAULT_PYTHON};
pub use uninstall::{
    uninstall_package, ForeignUninstaller, RemoveOccupant, UninstallResult, UninstallStatus,
};
