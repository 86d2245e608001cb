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

//! Plugin discovery and lifecycle.
//!
//! Installed plugins live under `.archon/plugins/<id>/` next to a
//! `state.json` recording which are enabled. Installation validates the
//! manifest before copying anything; a plugin is disabled until enabled
//! explicitly.

use crate::error::{PluginError, PluginResult};
use crate::manifest::{PluginManifest, PluginType, MANIFEST_FILENAME};
use archon_core::layout;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Installed-plugin summary for the admin surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInfo {
    pub id: String,
    pub name: String,
    pub version: String,
    pub plugin_type: PluginType,
    pub description: String,
    pub enabled: bool,
    pub path: PathBuf,
    /// Declared (not necessarily granted) permission strings.
    pub permissions: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    enabled: BTreeMap<String, bool>,
}

/// Manages the per-project plugins directory.
pub struct PluginInstaller {
    plugins_dir: PathBuf,
    state_path: PathBuf,
    state: RwLock<StateFile>,
}

impl PluginInstaller {
    /// Open the installer. The plugins directory is created lazily on
    /// first install so read-only projects stay untouched.
    pub fn open(project_root: &Path) -> PluginResult<Self> {
        let plugins_dir = project_root.join(layout::PLUGINS_DIR);
        let state_path = project_root.join(layout::PLUGIN_STATE_FILE);
        let state = if state_path.is_file() {
            serde_json::from_str(&fs::read_to_string(&state_path)?)?
        } else {
            StateFile::default()
        };
        Ok(Self {
            plugins_dir,
            state_path,
            state: RwLock::new(state),
        })
    }

    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    /// Discover every installed plugin with a readable manifest.
    /// Directories with broken manifests are skipped with a warning.
    pub fn scan(&self) -> PluginResult<Vec<PluginInfo>> {
        let mut plugins = Vec::new();
        if !self.plugins_dir.is_dir() {
            return Ok(plugins);
        }
        for entry in fs::read_dir(&self.plugins_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            match PluginManifest::load(&path) {
                Ok(manifest) => plugins.push(self.info_for(&manifest, &path)),
                Err(e) => {
                    warn!(dir = %path.display(), error = %e, "skipping plugin with bad manifest")
                }
            }
        }
        plugins.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(plugins)
    }

    pub fn get(&self, id: &str) -> PluginResult<PluginInfo> {
        let dir = self.plugins_dir.join(id);
        if !dir.is_dir() {
            return Err(PluginError::NotInstalled(id.to_string()));
        }
        let manifest = PluginManifest::load(&dir)?;
        Ok(self.info_for(&manifest, &dir))
    }

    pub fn enabled_plugins(&self) -> PluginResult<Vec<PluginInfo>> {
        Ok(self.scan()?.into_iter().filter(|p| p.enabled).collect())
    }

    /// Validate and copy a plugin directory into the project.
    pub fn install(&self, source: &Path) -> PluginResult<PluginInfo> {
        let manifest = PluginManifest::load(source)?;
        fs::create_dir_all(&self.plugins_dir)?;
        let target = self.plugins_dir.join(&manifest.id);
        if target.exists() {
            return Err(PluginError::AlreadyInstalled(manifest.id.clone()));
        }

        for entry in WalkDir::new(source) {
            let entry = entry.map_err(|e| PluginError::InstallFailed(e.to_string()))?;
            let relative = entry
                .path()
                .strip_prefix(source)
                .map_err(|e| PluginError::InstallFailed(e.to_string()))?;
            let destination = target.join(relative);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&destination)?;
            } else {
                if let Some(parent) = destination.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(entry.path(), &destination)?;
            }
        }

        info!(plugin = %manifest.id, "installed plugin");
        self.set_enabled(&manifest.id, false)?;
        self.get(&manifest.id)
    }

    pub fn uninstall(&self, id: &str) -> PluginResult<()> {
        let dir = self.plugins_dir.join(id);
        if !dir.is_dir() {
            return Err(PluginError::NotInstalled(id.to_string()));
        }
        fs::remove_dir_all(&dir)?;
        {
            let mut state = self.state.write();
            state.enabled.remove(id);
        }
        self.save_state()?;
        info!(plugin = %id, "uninstalled plugin");
        Ok(())
    }

    pub fn enable(&self, id: &str) -> PluginResult<()> {
        self.get(id)?;
        self.set_enabled(id, true)
    }

    pub fn disable(&self, id: &str) -> PluginResult<()> {
        self.get(id)?;
        self.set_enabled(id, false)
    }

    /// Validate a manifest file without installing anything.
    pub fn validate_manifest(path: &Path) -> PluginResult<PluginManifest> {
        let dir = if path.ends_with(MANIFEST_FILENAME) {
            path.parent().unwrap_or(path)
        } else {
            path
        };
        PluginManifest::load(dir)
    }

    fn info_for(&self, manifest: &PluginManifest, path: &Path) -> PluginInfo {
        let enabled = self
            .state
            .read()
            .enabled
            .get(&manifest.id)
            .copied()
            .unwrap_or(false);
        PluginInfo {
            id: manifest.id.clone(),
            name: manifest.name.clone(),
            version: manifest.version.clone(),
            plugin_type: manifest.plugin_type,
            description: manifest.description.clone(),
            enabled,
            path: path.to_path_buf(),
            permissions: manifest.permissions.clone(),
        }
    }

    fn set_enabled(&self, id: &str, enabled: bool) -> PluginResult<()> {
        {
            let mut state = self.state.write();
            state.enabled.insert(id.to_string(), enabled);
        }
        self.save_state()
    }

    fn save_state(&self) -> PluginResult<()> {
        let state = self.state.read();
        let body = serde_json::to_string_pretty(&*state)?;
        fs::write(&self.state_path, body)?;
        Ok(())
    }
}
