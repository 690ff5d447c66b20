use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use crate::kinds::{DeliveryKind, PackagerKind};

pub const LATEST_CHANNEL: &str = "latest";
pub const PINNED_CHANNEL: &str = "pinned";
pub const DEFAULT_INDEX: &str = "https://pypi.org/pypi/{name}/json";

/// Effective settings for one hoist invocation.
///
/// Loaded from `config.toml` in the meta folder and overlaid by command-line
/// flags, then handed to every component that needs it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct HoistConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DeliveryKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packager: Option<PackagerKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub python: Option<String>,
    pub install_timeout_minutes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup_age_minutes: Option<u64>,
    pub version_check_seconds: u64,
    pub auto_upgrade_seconds: u64,
    pub pinned: BTreeMap<String, String>,
    pub channels: BTreeMap<String, BTreeMap<String, String>>,
    pub delivery_overrides: BTreeMap<String, DeliveryKind>,
    pub packager_overrides: BTreeMap<String, PackagerKind>,
}

impl Default for HoistConfig {
    fn default() -> Self {
        Self {
            index: None,
            channel: LATEST_CHANNEL.to_string(),
            delivery: None,
            packager: None,
            python: None,
            install_timeout_minutes: 30,
            cleanup_age_minutes: None,
            version_check_seconds: 600,
            auto_upgrade_seconds: 3600,
            pinned: BTreeMap::new(),
            channels: BTreeMap::new(),
            delivery_overrides: BTreeMap::new(),
            packager_overrides: BTreeMap::new(),
        }
    }
}

impl HoistConfig {
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(input).context("failed to parse hoist config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("failed to render hoist config")
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.channel.trim().is_empty() {
            return Err(anyhow!("channel must not be empty"));
        }
        if self.channel == PINNED_CHANNEL {
            return Err(anyhow!(
                "channel '{PINNED_CHANNEL}' is reserved; use the [pinned] table instead"
            ));
        }
        if self.install_timeout_minutes == 0 {
            return Err(anyhow!("install_timeout_minutes must be greater than zero"));
        }
        if self.auto_upgrade_seconds == 0 {
            return Err(anyhow!("auto_upgrade_seconds must be greater than zero"));
        }
        for (name, version) in &self.pinned {
            validate_package_name(name).context("invalid [pinned] entry")?;
            if version.trim().is_empty() {
                return Err(anyhow!("pinned version for '{name}' must not be empty"));
            }
        }
        for (channel, versions) in &self.channels {
            for (name, version) in versions {
                validate_package_name(name)
                    .with_context(|| format!("invalid [channels.{channel}] entry"))?;
                if version.trim().is_empty() {
                    return Err(anyhow!(
                        "version for '{name}' in channel '{channel}' must not be empty"
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn index_url(&self) -> &str {
        self.index.as_deref().unwrap_or(DEFAULT_INDEX)
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_minutes.saturating_mul(60))
    }

    /// Age after which retention stops keeping the previous install around.
    /// Defaults to the install timeout.
    pub fn cleanup_age(&self) -> Duration {
        let minutes = self
            .cleanup_age_minutes
            .unwrap_or(self.install_timeout_minutes);
        Duration::from_secs(minutes.saturating_mul(60))
    }

    pub fn version_check_window(&self) -> Duration {
        Duration::from_secs(self.version_check_seconds)
    }

    pub fn auto_upgrade_window(&self) -> Duration {
        Duration::from_secs(self.auto_upgrade_seconds)
    }

    pub fn pinned_version(&self, package: &str) -> Option<&str> {
        self.pinned
            .get(package)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn channel_version(&self, channel: &str, package: &str) -> Option<&str> {
        self.channels
            .get(channel)
            .and_then(|versions| versions.get(package))
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn packager_for(&self, package: &str) -> PackagerKind {
        self.packager_overrides
            .get(package)
            .copied()
            .or(self.packager)
            .unwrap_or_default()
    }

    /// Per-package override, then the global setting, then whatever the package
    /// was last delivered with.
    pub fn delivery_for(&self, package: &str, previous: Option<DeliveryKind>) -> DeliveryKind {
        self.delivery_overrides
            .get(package)
            .copied()
            .or(self.delivery)
            .or(previous)
            .unwrap_or_default()
    }
}

pub fn validate_package_name(name: &str) -> anyhow::Result<()> {
    if name.is_empty() || name.len() > 128 {
        anyhow::bail!("invalid package name: must be 1-128 characters");
    }
    if name.starts_with('.') {
        anyhow::bail!("invalid package name '{name}': must not start with '.'");
    }
    let valid = name
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.');
    if !valid {
        anyhow::bail!("invalid package name '{name}'");
    }
    Ok(())
}

/// Entry point names become file names in the base folder.
pub fn validate_entry_point_name(name: &str) -> anyhow::Result<()> {
    if name.is_empty() {
        anyhow::bail!("invalid entry point name: must not be empty");
    }
    if name.starts_with('.') {
        anyhow::bail!("invalid entry point name '{name}': must not start with '.'");
    }
    if name.contains(['/', '\\', '\0']) || std::path::Path::new(name).is_absolute() {
        anyhow::bail!("invalid entry point name '{name}': must be a plain file name");
    }
    Ok(())
}
