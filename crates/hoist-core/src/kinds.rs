use serde::{Deserialize, Serialize};

/// Mechanism that turns a package version into installed artifacts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PackagerKind {
    #[default]
    Venv,
    Pex,
}

impl PackagerKind {
    pub fn all() -> [Self; 2] {
        [Self::Venv, Self::Pex]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Venv => "venv",
            Self::Pex => "pex",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "venv" | "virtualenv" => Some(Self::Venv),
            "pex" => Some(Self::Pex),
            _ => None,
        }
    }
}

/// Mechanism that exposes an installed artifact as a runnable path entry.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryKind {
    #[default]
    Symlink,
    Copy,
    Wrap,
}

impl DeliveryKind {
    pub fn all() -> [Self; 3] {
        [Self::Symlink, Self::Copy, Self::Wrap]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Symlink => "symlink",
            Self::Copy => "copy",
            Self::Wrap => "wrap",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "symlink" => Some(Self::Symlink),
            "copy" => Some(Self::Copy),
            "wrap" | "wrapper" => Some(Self::Wrap),
            _ => None,
        }
    }
}

impl std::fmt::Display for PackagerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for DeliveryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
