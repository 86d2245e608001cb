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

//! Plugin error types.
//!
//! Raw platform errors never cross into plugin-visible results; they are
//! flattened to taxonomy codes here.

use archon_core::{ArchonError, ErrorCode};
use thiserror::Error;

pub type PluginResult<T> = Result<T, PluginError>;

#[derive(Debug, Error)]
pub enum PluginError {
    // Manifest errors
    #[error("manifest not found at {0}")]
    ManifestNotFound(String),

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("manifest parse error: {0}")]
    ManifestParse(String),

    #[error("unknown permission string: {0}")]
    UnknownPermission(String),

    #[error("plugin requires host API {required}, this build provides {provided}")]
    IncompatibleApi { required: String, provided: String },

    // Installation errors
    #[error("plugin already installed: {0}")]
    AlreadyInstalled(String),

    #[error("plugin not installed: {0}")]
    NotInstalled(String),

    #[error("installation failed: {0}")]
    InstallFailed(String),

    // Authorization
    #[error("plugin {plugin} lacks permission {permission}")]
    Unauthorized { plugin: String, permission: String },

    // Runtime
    #[error("plugin call timed out")]
    Timeout,

    #[error("plugin resource budget exceeded: {0}")]
    ResourceExceeded(String),

    #[error("project is read-only")]
    ReadOnly,

    #[error("plugin execution failed: {0}")]
    Execution(String),

    #[error("host call failed: {0}")]
    Host(#[source] ArchonError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<toml::de::Error> for PluginError {
    fn from(e: toml::de::Error) -> Self {
        PluginError::ManifestParse(e.to_string())
    }
}

impl From<semver::Error> for PluginError {
    fn from(e: semver::Error) -> Self {
        PluginError::InvalidManifest(format!("invalid version: {e}"))
    }
}

impl PluginError {
    pub fn code(&self) -> ErrorCode {
        match self {
            PluginError::ManifestNotFound(_) | PluginError::NotInstalled(_) => ErrorCode::NotFound,
            PluginError::InvalidManifest(_)
            | PluginError::ManifestParse(_)
            | PluginError::UnknownPermission(_)
            | PluginError::IncompatibleApi { .. }
            | PluginError::AlreadyInstalled(_) => ErrorCode::InvalidInput,
            PluginError::InstallFailed(_) | PluginError::Io(_) | PluginError::Serde(_) => {
                ErrorCode::StorageFailure
            }
            PluginError::Unauthorized { .. } => ErrorCode::Unauthorized,
            PluginError::Timeout | PluginError::ResourceExceeded(_) => {
                ErrorCode::PluginResourceExceeded
            }
            PluginError::ReadOnly => ErrorCode::SchemaVersion,
            PluginError::Execution(_) => ErrorCode::InvalidInput,
            PluginError::Host(inner) => inner.code,
        }
    }
}

impl From<PluginError> for ArchonError {
    fn from(e: PluginError) -> Self {
        match e {
            PluginError::Host(inner) => inner,
            other => ArchonError::new(other.code(), other.to_string()),
        }
    }
}
