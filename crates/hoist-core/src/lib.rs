mod config;
mod entry_points;
mod kinds;
mod record;

pub use config::{
    validate_entry_point_name, validate_package_name, HoistConfig, DEFAULT_INDEX,
    LATEST_CHANNEL, PINNED_CHANNEL,
};
pub use entry_points::EntryPointSet;
pub use kinds::{DeliveryKind, PackagerKind};
pub use record::{RecordRole, VersionRecord, HOIST_VERSION};

#[cfg(test)]
mod tests;
