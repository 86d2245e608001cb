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

//! Project metadata and on-disk layout.

use crate::id::NodeId;
use crate::settings::Settings;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Schema version written by this build. Projects below it are migrated
/// forward on open; projects above it open read-only.
pub const CURRENT_SCHEMA_VERSION: u32 = 3;

/// Contents of `project.json` — exactly one per repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// ID of the root node.
    pub root_id: NodeId,
    /// Positive, monotonically increasing schema version.
    pub schema_version: u32,
    #[serde(default)]
    pub settings: Settings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(root_id: NodeId, settings: Settings) -> Self {
        let now = Utc::now();
        Self {
            root_id,
            schema_version: CURRENT_SCHEMA_VERSION,
            settings,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// On-disk layout, relative to the project root.
pub mod layout {
    pub const PROJECT_FILE: &str = "project.json";
    pub const NODES_DIR: &str = "nodes";
    pub const ATTACHMENTS_DIR: &str = "attachments";
    pub const BACKUPS_DIR: &str = "backups";
    pub const GITATTRIBUTES_FILE: &str = ".gitattributes";

    pub const ARCHON_DIR: &str = ".archon";
    pub const INDEX_DIR: &str = ".archon/index";
    pub const INDEX_DB_FILE: &str = ".archon/index/archon.db";
    pub const PLUGINS_DIR: &str = ".archon/plugins";
    pub const PLUGIN_STATE_FILE: &str = ".archon/plugins/state.json";
    pub const PLUGIN_DATA_DIR: &str = ".archon/plugin_data";
    pub const SECRETS_FILE: &str = ".archon/secrets.json";
    pub const LOGS_DIR: &str = ".archon/logs";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_json_shape() {
        let project = Project::new(NodeId::generate(), Settings::default());
        let json = serde_json::to_value(&project).unwrap();
        for key in ["rootId", "schemaVersion", "settings", "createdAt", "updatedAt"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["schemaVersion"], CURRENT_SCHEMA_VERSION);
    }
}
