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

//! Registered migration steps.
//!
//! Steps operate on raw JSON values, never on the typed model — the
//! whole point is that pre-migration files do not parse as the current
//! types. Each step is idempotent so a re-run after a mid-migration
//! crash converges.

use crate::error::{MigrateError, MigrateResult};
use archon_core::{layout, to_canonical_json};
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;
use tracing::debug;

/// One forward migration. `version()` is the schema version the project
/// reports after this step succeeds.
pub trait MigrationStep: Send + Sync {
    fn version(&self) -> u32;
    fn name(&self) -> &str;
    fn apply(&self, project_root: &Path) -> MigrateResult<()>;
}

fn read_json(path: &Path) -> MigrateResult<Value> {
    let raw = fs::read_to_string(path)?;
    serde_json::from_str(&raw)
        .map_err(|e| MigrateError::BadProjectFile(format!("{}: {e}", path.display())))
}

fn write_json(path: &Path, value: &Value) -> MigrateResult<()> {
    let body = to_canonical_json(value)
        .map_err(|e| MigrateError::BadProjectFile(e.to_string()))?;
    fs::write(path, body)?;
    Ok(())
}

fn for_each_node_file(
    project_root: &Path,
    mut f: impl FnMut(&mut Value) -> bool,
) -> MigrateResult<()> {
    let nodes_dir = project_root.join(layout::NODES_DIR);
    if !nodes_dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(&nodes_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().map(|e| e != "json").unwrap_or(true) {
            continue;
        }
        let mut value = read_json(&path)?;
        if f(&mut value) {
            write_json(&path, &value)?;
            debug!(file = %path.display(), "migrated node file");
        }
    }
    Ok(())
}

/// v1: guarantee `settings` and project timestamps exist.
pub struct SettingsAndTimestamps;

impl MigrationStep for SettingsAndTimestamps {
    fn version(&self) -> u32 {
        1
    }

    fn name(&self) -> &str {
        "add project settings and timestamps"
    }

    fn apply(&self, project_root: &Path) -> MigrateResult<()> {
        let path = project_root.join(layout::PROJECT_FILE);
        let mut value = read_json(&path)?;
        let Some(object) = value.as_object_mut() else {
            return Err(MigrateError::BadProjectFile(
                "project.json is not an object".to_string(),
            ));
        };
        let now = json!(Utc::now().to_rfc3339());
        object
            .entry("settings".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        object.entry("createdAt".to_string()).or_insert_with(|| now.clone());
        object.entry("updatedAt".to_string()).or_insert_with(|| now.clone());
        write_json(&path, &value)
    }
}

/// v2: wrap bare scalar property values into `{value: ...}` objects.
pub struct PropertyShapes;

impl MigrationStep for PropertyShapes {
    fn version(&self) -> u32 {
        2
    }

    fn name(&self) -> &str {
        "normalize property shapes"
    }

    fn apply(&self, project_root: &Path) -> MigrateResult<()> {
        for_each_node_file(project_root, |node| {
            let Some(properties) = node.get_mut("properties").and_then(Value::as_object_mut)
            else {
                return false;
            };
            let mut changed = false;
            for value in properties.values_mut() {
                let is_wrapped = value
                    .as_object()
                    .map(|obj| obj.contains_key("value"))
                    .unwrap_or(false);
                if !is_wrapped {
                    *value = json!({ "value": value.take() });
                    changed = true;
                }
            }
            changed
        })
    }
}

/// v3: guarantee `children` arrays and node timestamps, drop
/// explicit-null descriptions.
pub struct ChildrenAndDescriptions;

impl MigrationStep for ChildrenAndDescriptions {
    fn version(&self) -> u32 {
        3
    }

    fn name(&self) -> &str {
        "ensure children arrays and timestamps, drop null descriptions"
    }

    fn apply(&self, project_root: &Path) -> MigrateResult<()> {
        let now = json!(Utc::now().to_rfc3339());
        for_each_node_file(project_root, |node| {
            let Some(object) = node.as_object_mut() else {
                return false;
            };
            let mut changed = false;
            if !object.contains_key("children") {
                object.insert("children".to_string(), Value::Array(Vec::new()));
                changed = true;
            }
            for key in ["createdAt", "updatedAt"] {
                if !object.contains_key(key) {
                    object.insert(key.to_string(), now.clone());
                    changed = true;
                }
            }
            if object.get("description").map(Value::is_null).unwrap_or(false) {
                object.remove("description");
                changed = true;
            }
            changed
        })
    }
}
