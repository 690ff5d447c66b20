use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Commands exposed by a package, keyed by command name. Values are launch
/// specs such as `black:patched_main`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct EntryPointSet {
    entries: BTreeMap<String, String>,
}

impl EntryPointSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, launch_spec: impl Into<String>) {
        self.entries.insert(name.into(), launch_spec.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names present in `self` that `newer` no longer exposes.
    pub fn removed_in(&self, newer: &EntryPointSet) -> Vec<String> {
        self.entries
            .keys()
            .filter(|name| !newer.contains(name))
            .cloned()
            .collect()
    }

    /// Reads the `[console_scripts]` section of an `entry_points.txt` file.
    pub fn parse_console_scripts(raw: &str) -> Self {
        let mut set = Self::new();
        let mut in_section = false;
        for line in raw.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(section) = line.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
                in_section = section.trim() == "console_scripts";
                continue;
            }
            if !in_section {
                continue;
            }
            let Some((name, spec)) = line.split_once('=') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            set.insert(name, spec.trim());
        }
        set
    }
}

impl<K, V> FromIterator<(K, V)> for EntryPointSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (name, spec) in iter {
            set.insert(name, spec);
        }
        set
    }
}
