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

//! Migration planner and executor.

use crate::error::{MigrateError, MigrateResult};
use crate::steps::{
    ChildrenAndDescriptions, MigrationStep, PropertyShapes, SettingsAndTimestamps,
};
use archon_core::{layout, to_canonical_json, CURRENT_SCHEMA_VERSION};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Plan entry describing one step to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDescriptor {
    pub version: u32,
    pub name: String,
}

/// Outcome of a successful `execute`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub from: u32,
    pub to: u32,
    pub applied: Vec<StepDescriptor>,
    /// Absent when no migration was needed (no backup is taken then).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<PathBuf>,
}

/// Ordered registry of migration steps.
pub struct MigrationEngine {
    steps: Vec<Arc<dyn MigrationStep>>,
    target: u32,
}

impl MigrationEngine {
    /// Empty engine targeting `target`; register steps before use.
    pub fn new(target: u32) -> Self {
        Self {
            steps: Vec::new(),
            target,
        }
    }

    /// Engine with every step this build knows, targeting
    /// [`CURRENT_SCHEMA_VERSION`].
    pub fn with_default_steps() -> Self {
        let mut engine = Self::new(CURRENT_SCHEMA_VERSION);
        let steps: [Arc<dyn MigrationStep>; 3] = [
            Arc::new(SettingsAndTimestamps),
            Arc::new(PropertyShapes),
            Arc::new(ChildrenAndDescriptions),
        ];
        for step in steps {
            if let Err(e) = engine.register(step) {
                // Static registration; a failure here is a programming error.
                unreachable!("default step registration failed: {e}");
            }
        }
        engine
    }

    /// Register a step. Versions must be strictly increasing, one step
    /// per version gap.
    pub fn register(&mut self, step: Arc<dyn MigrationStep>) -> MigrateResult<()> {
        let expected = self.steps.last().map(|s| s.version() + 1).unwrap_or(1);
        if step.version() != expected {
            return Err(MigrateError::BadRegistration(step.version()));
        }
        self.steps.push(step);
        Ok(())
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    pub fn registered_steps(&self) -> Vec<StepDescriptor> {
        self.steps
            .iter()
            .map(|step| StepDescriptor {
                version: step.version(),
                name: step.name().to_string(),
            })
            .collect()
    }

    /// Read `schemaVersion` without assuming the file parses as the
    /// current typed model.
    pub fn read_schema_version(project_root: &Path) -> MigrateResult<u32> {
        let path = project_root.join(layout::PROJECT_FILE);
        if !path.is_file() {
            return Err(MigrateError::ProjectNotFound(project_root.to_path_buf()));
        }
        let raw = fs::read_to_string(&path)?;
        let value: Value = serde_json::from_str(&raw)
            .map_err(|e| MigrateError::BadProjectFile(e.to_string()))?;
        value
            .get("schemaVersion")
            .and_then(Value::as_u64)
            .map(|v| v as u32)
            .ok_or_else(|| MigrateError::BadProjectFile("missing schemaVersion".to_string()))
    }

    /// Steps needed to bring the project to the target version.
    pub fn plan(&self, project_root: &Path) -> MigrateResult<Vec<StepDescriptor>> {
        let current = Self::read_schema_version(project_root)?;
        if current > self.target {
            return Err(MigrateError::SchemaTooNew {
                found: current,
                supported: self.target,
            });
        }
        let mut plan = Vec::new();
        for version in (current + 1)..=self.target {
            let step = self
                .steps
                .iter()
                .find(|step| step.version() == version)
                .ok_or(MigrateError::MissingStep { from: version - 1 })?;
            plan.push(StepDescriptor {
                version,
                name: step.name().to_string(),
            });
        }
        Ok(plan)
    }

    /// Back up, run the plan, verify. A step failure halts execution,
    /// keeps the backup, and reports the version actually reached.
    pub fn execute(&self, project_root: &Path) -> MigrateResult<MigrationReport> {
        let from = Self::read_schema_version(project_root)?;
        let plan = self.plan(project_root)?;
        if plan.is_empty() {
            return Ok(MigrationReport {
                from,
                to: from,
                applied: Vec::new(),
                backup: None,
            });
        }

        let backup = self.create_backup(project_root)?;
        info!(
            from,
            to = self.target,
            steps = plan.len(),
            backup = %backup.display(),
            "starting migration"
        );

        let mut applied = Vec::new();
        for descriptor in &plan {
            let step = self
                .steps
                .iter()
                .find(|step| step.version() == descriptor.version)
                .ok_or(MigrateError::MissingStep {
                    from: descriptor.version - 1,
                })?;

            if let Err(e) = step.apply(project_root) {
                let reached = Self::read_schema_version(project_root).unwrap_or(from);
                warn!(step = %descriptor.name, error = %e, "migration step failed");
                return Err(MigrateError::StepFailed {
                    version: descriptor.version,
                    name: descriptor.name.clone(),
                    partially_applied: reached,
                    message: e.to_string(),
                });
            }
            self.bump_schema_version(project_root, descriptor.version)?;
            info!(step = %descriptor.name, version = descriptor.version, "applied migration step");
            applied.push(descriptor.clone());
        }

        let reached = Self::read_schema_version(project_root)?;
        if reached != self.target {
            return Err(MigrateError::VerificationFailed {
                expected: self.target,
                found: reached,
            });
        }

        Ok(MigrationReport {
            from,
            to: reached,
            applied,
            backup: Some(backup),
        })
    }

    fn bump_schema_version(&self, project_root: &Path, version: u32) -> MigrateResult<()> {
        let path = project_root.join(layout::PROJECT_FILE);
        let raw = fs::read_to_string(&path)?;
        let mut value: Value = serde_json::from_str(&raw)
            .map_err(|e| MigrateError::BadProjectFile(e.to_string()))?;
        let Some(object) = value.as_object_mut() else {
            return Err(MigrateError::BadProjectFile(
                "project.json is not an object".to_string(),
            ));
        };
        object.insert("schemaVersion".to_string(), version.into());
        object.insert(
            "updatedAt".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        let body = to_canonical_json(&value)
            .map_err(|e| MigrateError::BadProjectFile(e.to_string()))?;
        fs::write(&path, body)?;
        Ok(())
    }

    /// `backups/<RFC3339>/` with `project.json` and the `nodes/` subtree.
    fn create_backup(&self, project_root: &Path) -> MigrateResult<PathBuf> {
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let backup_dir = project_root.join(layout::BACKUPS_DIR).join(stamp);
        fs::create_dir_all(&backup_dir)?;

        fs::copy(
            project_root.join(layout::PROJECT_FILE),
            backup_dir.join(layout::PROJECT_FILE),
        )?;

        let nodes_dir = project_root.join(layout::NODES_DIR);
        if nodes_dir.is_dir() {
            let backup_nodes = backup_dir.join(layout::NODES_DIR);
            fs::create_dir_all(&backup_nodes)?;
            for entry in fs::read_dir(&nodes_dir)? {
                let entry = entry?;
                if entry.path().is_file() {
                    fs::copy(entry.path(), backup_nodes.join(entry.file_name()))?;
                }
            }
        }
        Ok(backup_dir)
    }
}

impl Default for MigrationEngine {
    fn default() -> Self {
        Self::with_default_steps()
    }
}
