// Copyright 2025 Archon (https://github.com/archon-engine)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Project settings.
//!
//! `project.json#settings` is a free-form object: unknown keys survive
//! round-trips untouched. Recognized keys are read through typed
//! accessors that walk dotted paths (`secretsPolicy.returnValues` is the
//! `returnValues` member of the nested `secretsPolicy` object).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default LFS cutoff for attachments: 1 MiB.
pub const DEFAULT_LFS_THRESHOLD_BYTES: u64 = 1_048_576;

/// Default auto-snapshot mutation threshold.
pub const DEFAULT_AUTO_SNAPSHOT_THRESHOLD: u64 = 100;

/// Environment variable forcing index-disabled mode.
pub const DISABLE_INDEX_ENV: &str = "ARCHON_DISABLE_INDEX";

/// Free-form project settings with typed accessors for recognized keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings(pub Map<String, Value>);

impl Settings {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Look up a dotted path through nested objects.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current: &Value = &Value::Null;
        for (i, segment) in path.split('.').enumerate() {
            current = if i == 0 {
                self.0.get(segment)?
            } else {
                current.as_object()?.get(segment)?
            };
        }
        Some(current)
    }

    /// Set a dotted path, creating intermediate objects as needed.
    /// Returns false when an intermediate segment exists but is not an
    /// object.
    pub fn set(&mut self, path: &str, value: Value) -> bool {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return false;
        }
        set_path(&mut self.0, &segments, value)
    }

    fn bool_at(&self, path: &str, default: bool) -> bool {
        self.get(path).and_then(Value::as_bool).unwrap_or(default)
    }

    fn u64_at(&self, path: &str, default: u64) -> u64 {
        self.get(path).and_then(Value::as_u64).unwrap_or(default)
    }

    /// `secretsPolicy.returnValues` — whether `SecretsGet` returns raw
    /// values (default false: redacted).
    pub fn secrets_return_values(&self) -> bool {
        self.bool_at("secretsPolicy.returnValues", false)
    }

    /// `autoSnapshot.enabled` (default false).
    pub fn auto_snapshot_enabled(&self) -> bool {
        self.bool_at("autoSnapshot.enabled", false)
    }

    /// `autoSnapshot.thresholdChanges` (default 100).
    pub fn auto_snapshot_threshold(&self) -> u64 {
        self.u64_at("autoSnapshot.thresholdChanges", DEFAULT_AUTO_SNAPSHOT_THRESHOLD)
    }

    /// `lfs.thresholdBytes` (default 1 MiB).
    pub fn lfs_threshold_bytes(&self) -> u64 {
        self.u64_at("lfs.thresholdBytes", DEFAULT_LFS_THRESHOLD_BYTES)
    }

    /// `index.disabled` (default false). The `ARCHON_DISABLE_INDEX`
    /// environment variable overrides this regardless of value.
    pub fn index_disabled(&self) -> bool {
        if std::env::var(DISABLE_INDEX_ENV).map(|v| v == "1").unwrap_or(false) {
            return true;
        }
        self.bool_at("index.disabled", false)
    }
}

fn set_path(map: &mut Map<String, Value>, segments: &[&str], value: Value) -> bool {
    let Some((head, rest)) = segments.split_first() else {
        return false;
    };
    if rest.is_empty() {
        map.insert(head.to_string(), value);
        return true;
    }
    let entry = map
        .entry(head.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    match entry.as_object_mut() {
        Some(child) => set_path(child, rest, value),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(!settings.secrets_return_values());
        assert!(!settings.auto_snapshot_enabled());
        assert_eq!(settings.lfs_threshold_bytes(), DEFAULT_LFS_THRESHOLD_BYTES);
        assert_eq!(settings.auto_snapshot_threshold(), DEFAULT_AUTO_SNAPSHOT_THRESHOLD);
    }

    #[test]
    fn test_dotted_get_set() {
        let mut settings = Settings::default();
        assert!(settings.set("secretsPolicy.returnValues", json!(true)));
        assert!(settings.secrets_return_values());
        assert_eq!(settings.get("secretsPolicy.returnValues"), Some(&json!(true)));
        assert!(settings.get("secretsPolicy.missing").is_none());
    }

    #[test]
    fn test_set_refuses_non_object_intermediate() {
        let mut settings = Settings::default();
        settings.set("lfs", json!(42));
        assert!(!settings.set("lfs.thresholdBytes", json!(1)));
    }

    #[test]
    fn test_unknown_keys_survive_round_trip() {
        let raw = json!({ "customTool": { "option": [1, 2, 3] } });
        let settings: Settings = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&settings).unwrap(), raw);
    }
}
