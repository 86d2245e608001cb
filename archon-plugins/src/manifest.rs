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

//! Plugin manifest schema and validation.
//!
//! Every plugin ships an `archon-plugin.toml` declaring its identity,
//! its entry point, the permissions it wants, and the host API range it
//! was built against. Validation is strict: unknown permission strings
//! and malformed version requirements reject the manifest outright.

use crate::error::{PluginError, PluginResult};
use crate::permissions::Permission;
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Host API version this build exposes to plugins.
pub const PLUGIN_API_VERSION: &str = "1.0.0";

/// Manifest filename inside a plugin directory.
pub const MANIFEST_FILENAME: &str = "archon-plugin.toml";

/// Parsed `archon-plugin.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Unique plugin identifier (e.g. `archon-jira-sync`).
    pub id: String,

    /// Human-readable name.
    pub name: String,

    /// Plugin version (semver).
    pub version: String,

    /// Plugin type.
    #[serde(rename = "type")]
    pub plugin_type: PluginType,

    #[serde(default)]
    pub description: String,

    /// Permissions the plugin wants; granting is a separate runtime act.
    #[serde(default)]
    pub permissions: Vec<String>,

    /// Semver requirement on the host API (e.g. `^1.0`).
    pub api_compatibility: String,

    /// WASM component path relative to the plugin directory.
    #[serde(default = "default_entry")]
    pub entry: String,
}

fn default_entry() -> String {
    "plugin.wasm".to_string()
}

/// Plugin type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginType {
    /// Reacts to project changes and applies batched mutations.
    Automation,
    /// Pulls external data into the tree.
    Importer,
    /// Publishes tree content to external systems.
    Exporter,
    /// Read-only analysis and reporting.
    Analyzer,
    /// Bidirectional integration with an external service.
    Integration,
}

impl std::fmt::Display for PluginType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PluginType::Automation => "automation",
            PluginType::Importer => "importer",
            PluginType::Exporter => "exporter",
            PluginType::Analyzer => "analyzer",
            PluginType::Integration => "integration",
        };
        f.write_str(name)
    }
}

impl PluginManifest {
    /// Parse a manifest from TOML text.
    pub fn parse(raw: &str) -> PluginResult<Self> {
        let manifest: PluginManifest = toml::from_str(raw)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Load `archon-plugin.toml` from a plugin directory.
    pub fn load(plugin_dir: &Path) -> PluginResult<Self> {
        let path = plugin_dir.join(MANIFEST_FILENAME);
        let raw = std::fs::read_to_string(&path)
            .map_err(|_| PluginError::ManifestNotFound(path.display().to_string()))?;
        Self::parse(&raw)
    }

    /// Structural validation beyond what serde enforces.
    pub fn validate(&self) -> PluginResult<()> {
        if self.id.trim().is_empty() {
            return Err(PluginError::InvalidManifest("id must not be empty".to_string()));
        }
        if !self
            .id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(PluginError::InvalidManifest(format!(
                "id {:?} may only contain alphanumerics, '-', '_'",
                self.id
            )));
        }
        if self.name.trim().is_empty() {
            return Err(PluginError::InvalidManifest(
                "name must not be empty".to_string(),
            ));
        }
        Version::parse(&self.version)?;

        for raw in &self.permissions {
            raw.parse::<Permission>()?;
        }

        let requirement = VersionReq::parse(&self.api_compatibility)
            .map_err(|e| PluginError::InvalidManifest(format!("api_compatibility: {e}")))?;
        let provided = Version::parse(PLUGIN_API_VERSION)?;
        if !requirement.matches(&provided) {
            return Err(PluginError::IncompatibleApi {
                required: self.api_compatibility.clone(),
                provided: PLUGIN_API_VERSION.to_string(),
            });
        }
        Ok(())
    }

    /// Parsed declared permissions. Valid after [`validate`].
    pub fn declared_permissions(&self) -> Vec<Permission> {
        self.permissions
            .iter()
            .filter_map(|raw| raw.parse().ok())
            .collect()
    }
}
