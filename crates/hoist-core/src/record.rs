use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::kinds::{DeliveryKind, PackagerKind};

pub const HOIST_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Persisted roles a [`VersionRecord`] can be stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordRole {
    Current,
    Latest,
}

impl RecordRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Latest => "latest",
        }
    }

    pub fn file_name(self) -> String {
        format!(".{}.json", self.as_str())
    }
}

/// Version determination for one package.
///
/// Records are plain values: every transition returns a new record instead of
/// mutating the one it was derived from. `name` and `problem` are never written
/// to disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionRecord {
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub packager: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub delivery: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub runtime: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hoist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    #[serde(skip)]
    pub problem: Option<String>,
}

impl VersionRecord {
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn determined(
        name: impl Into<String>,
        version: impl Into<String>,
        channel: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            channel: channel.into(),
            source: source.into(),
            ..Self::default()
        }
    }

    pub fn invalid(name: impl Into<String>, problem: impl Into<String>) -> Self {
        Self::empty(name).invalidated(problem)
    }

    pub fn is_valid(&self) -> bool {
        !self.version.is_empty() && self.problem.is_none()
    }

    /// A valid record stays usable for `window` after its timestamp. Records
    /// without a timestamp carry no cache contract and remain valid.
    pub fn still_valid(&self, window: Duration, now_unix: u64) -> bool {
        if !self.is_valid() {
            return false;
        }
        match self.timestamp {
            None => true,
            Some(timestamp) => now_unix.saturating_sub(timestamp) < window.as_secs(),
        }
    }

    pub fn equivalent(&self, other: &VersionRecord) -> bool {
        self.version == other.version
            && self.packager == other.packager
            && self.delivery == other.delivery
    }

    pub fn invalidated(&self, problem: impl Into<String>) -> Self {
        Self {
            version: String::new(),
            problem: Some(problem.into()),
            ..self.clone()
        }
    }

    /// Stamps the moment this determination was made.
    pub fn stamped(&self, now_unix: u64) -> Self {
        Self {
            hoist: HOIST_VERSION.to_string(),
            timestamp: Some(now_unix),
            ..self.clone()
        }
    }

    /// Records the install mechanism alongside the version, as done for every
    /// role except `latest`.
    pub fn with_dynamic_fields(
        &self,
        packager: PackagerKind,
        delivery: DeliveryKind,
        runtime: &str,
        now_unix: u64,
    ) -> Self {
        Self {
            packager: packager.as_str().to_string(),
            delivery: delivery.as_str().to_string(),
            runtime: runtime.to_string(),
            ..self.stamped(now_unix)
        }
    }

    /// Carries the version determination (and its problem, if any) of `other`
    /// over to a record for `self.name`.
    pub fn derived_from(&self, other: &VersionRecord) -> Self {
        Self {
            name: self.name.clone(),
            version: other.version.clone(),
            channel: other.channel.clone(),
            source: other.source.clone(),
            problem: other.problem.clone(),
            ..self.clone()
        }
    }

    pub fn packager_kind(&self) -> Option<PackagerKind> {
        PackagerKind::parse(&self.packager)
    }

    pub fn delivery_kind(&self) -> Option<DeliveryKind> {
        DeliveryKind::parse(&self.delivery)
    }

    pub fn representation(&self, verbose: bool, note: Option<&str>, index: Option<&str>) -> String {
        let lead = if let Some(problem) = &self.problem {
            format!("{}: {}", self.name, problem)
        } else if !self.version.is_empty() {
            format!("{} {}", self.name, self.version)
        } else {
            format!("{}: no version", self.name)
        };

        let mut notice = String::new();
        if verbose {
            let mut parts = Vec::new();
            if self.problem.is_none()
                && !self.version.is_empty()
                && (!self.packager.is_empty() || !self.delivery.is_empty())
            {
                let mut info = "as".to_string();
                for value in [&self.packager, &self.delivery] {
                    if !value.is_empty() {
                        info.push(' ');
                        info.push_str(value);
                    }
                }
                parts.push(info);
            }
            if !self.channel.is_empty() {
                parts.push(format!("channel: {}", self.channel));
            }
            if !parts.is_empty() && !self.source.is_empty() && Some(self.source.as_str()) != index {
                parts.push(format!("source: {}", self.source));
            }
            if !parts.is_empty() {
                notice = format!(" ({})", parts.join(", "));
            }
        }

        match note {
            Some(note) => format!("{lead} {note}{notice}"),
            None => format!("{lead}{notice}"),
        }
    }
}

impl fmt::Display for VersionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.representation(false, None, None))
    }
}
