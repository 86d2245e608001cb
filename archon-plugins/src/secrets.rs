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

//! Project secrets with a redaction policy.
//!
//! Secrets live in `.archon/secrets.json` as a flat name→value map.
//! Whether `get` returns raw values is governed by the project setting
//! `secretsPolicy.returnValues` (default false): redacted responses
//! still carry the name, so metadata flows while values stay put. The
//! capability check happens *before* any lookup — an unauthorized caller
//! cannot probe for key existence.

use crate::error::PluginResult;
use archon_core::layout;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// A secret as returned to a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretValue {
    pub name: String,
    /// Empty when redacted.
    pub value: String,
    pub redacted: bool,
}

/// `.archon/secrets.json` access.
pub struct SecretsStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl SecretsStore {
    /// Load the store for a project (missing file = empty store).
    pub fn open(project_root: &Path) -> PluginResult<Self> {
        let path = project_root.join(layout::SECRETS_FILE);
        let entries = if path.is_file() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Keys matching `prefix`, sorted. Values never leave this method.
    pub fn list(&self, prefix: &str) -> Vec<String> {
        self.entries
            .read()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Fetch a secret, applying the redaction policy.
    pub fn get(&self, name: &str, return_values: bool) -> Option<SecretValue> {
        let entries = self.entries.read();
        let value = entries.get(name)?;
        Some(if return_values {
            SecretValue {
                name: name.to_string(),
                value: value.clone(),
                redacted: false,
            }
        } else {
            SecretValue {
                name: name.to_string(),
                value: String::new(),
                redacted: true,
            }
        })
    }

    /// Insert or replace a secret and persist.
    pub fn set(&self, name: &str, value: &str) -> PluginResult<()> {
        {
            let mut entries = self.entries.write();
            entries.insert(name.to_string(), value.to_string());
        }
        self.save()
    }

    pub fn remove(&self, name: &str) -> PluginResult<bool> {
        let removed = self.entries.write().remove(name).is_some();
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    fn save(&self) -> PluginResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let entries = self.entries.read();
        let body = serde_json::to_string_pretty(&*entries)?;
        fs::write(&self.path, body)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_redaction_policy() {
        let dir = TempDir::new().unwrap();
        let store = SecretsStore::open(dir.path()).unwrap();
        store.set("jira.token", "S").unwrap();

        let redacted = store.get("jira.token", false).unwrap();
        assert_eq!(redacted.value, "");
        assert!(redacted.redacted);
        assert_eq!(redacted.name, "jira.token");

        let raw = store.get("jira.token", true).unwrap();
        assert_eq!(raw.value, "S");
        assert!(!raw.redacted);

        assert!(store.get("missing", true).is_none());
    }

    #[test]
    fn test_list_by_prefix() {
        let dir = TempDir::new().unwrap();
        let store = SecretsStore::open(dir.path()).unwrap();
        store.set("jira.token", "a").unwrap();
        store.set("jira.url", "b").unwrap();
        store.set("github.token", "c").unwrap();

        assert_eq!(store.list("jira"), vec!["jira.token", "jira.url"]);
        assert_eq!(store.list("").len(), 3);
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = TempDir::new().unwrap();
        {
            let store = SecretsStore::open(dir.path()).unwrap();
            store.set("k", "v").unwrap();
        }
        let reopened = SecretsStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get("k", true).unwrap().value, "v");

        assert!(reopened.remove("k").unwrap());
        assert!(!reopened.remove("k").unwrap());
    }
}
