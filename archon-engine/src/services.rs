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

//! The service surface consumed by the UI/CLI transport.
//!
//! One method per wire operation. Mutations run through
//! `ProjectController::with_write` (read-only latch + writer lock);
//! reads go straight to the open project's stores. Every error leaves
//! as an [`ArchonError`] envelope with a stable code.

use crate::controller::ProjectController;
use crate::logging::{LogRecord, LoggingConfig};
use archon_core::{
    ArchonError, ErrorCode, IndexHealth, Node, NodeId, Property, Result, SearchHit, SnapshotInfo,
    SnapshotRequest,
};
use archon_migrate::{MigrationEngine, MigrationReport, StepDescriptor};
use archon_plugins::{
    Permission, PluginHost, PluginInfo, PluginInstaller, PluginManifest,
};
use archon_core::AttachmentRef;
use archon_storage::{AttachmentInfo, GcOutcome};
use archon_vcs::{
    semantic_diff, three_way_merge, CommitInfo, Git2Backend, MergeResult, RepoStatus,
    SemanticDiff, TreeState,
};
use archon_storage::{CreateNodeRequest, UpdateNodeRequest};
use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// A plugin permission grant as reported to the admin surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantInfo {
    pub permission: String,
    pub granted_at: chrono::DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<chrono::DateTime<Utc>>,
}

impl ProjectController {
    // === Node service ===

    pub async fn create_node(
        &self,
        parent_id: NodeId,
        request: CreateNodeRequest,
    ) -> Result<Node> {
        self.with_write(|open| {
            open.nodes
                .create_node(&parent_id, request)
                .map_err(ArchonError::from)
        })
        .await
    }

    pub fn get_node(&self, id: NodeId) -> Result<Node> {
        let open = self.current()?;
        open.nodes.get_node(&id).map_err(ArchonError::from)
    }

    pub async fn update_node(&self, id: NodeId, request: UpdateNodeRequest) -> Result<Node> {
        self.with_write(|open| {
            open.nodes
                .update_node(&id, request)
                .map_err(ArchonError::from)
        })
        .await
    }

    pub async fn delete_node(&self, id: NodeId) -> Result<()> {
        self.with_write(|open| open.nodes.delete_node(&id).map_err(ArchonError::from))
            .await
    }

    pub async fn move_node(
        &self,
        id: NodeId,
        new_parent_id: NodeId,
        position: Option<i64>,
    ) -> Result<()> {
        self.with_write(|open| {
            open.nodes
                .move_node(&id, &new_parent_id, position)
                .map_err(ArchonError::from)
        })
        .await
    }

    pub async fn reorder_children(&self, parent_id: NodeId, ordered: Vec<NodeId>) -> Result<()> {
        self.with_write(|open| {
            open.nodes
                .reorder_children(&parent_id, ordered)
                .map_err(ArchonError::from)
        })
        .await
    }

    pub fn list_children(&self, id: NodeId) -> Result<Vec<Node>> {
        let open = self.current()?;
        open.nodes.list_children(&id).map_err(ArchonError::from)
    }

    pub fn get_node_path(&self, id: NodeId) -> Result<Vec<Node>> {
        let open = self.current()?;
        open.nodes.node_path(&id).map_err(ArchonError::from)
    }

    pub fn get_root_node(&self) -> Result<Node> {
        let open = self.current()?;
        open.nodes.root().map_err(ArchonError::from)
    }

    pub async fn set_property(&self, id: NodeId, key: String, property: Property) -> Result<Node> {
        self.with_write(|open| {
            open.nodes
                .set_property(&id, &key, property)
                .map_err(ArchonError::from)
        })
        .await
    }

    pub async fn delete_property(&self, id: NodeId, key: String) -> Result<Node> {
        self.with_write(|open| {
            open.nodes
                .delete_property(&id, &key)
                .map_err(ArchonError::from)
        })
        .await
    }

    // === Attachment service ===

    pub async fn store_attachment(&self, bytes: Vec<u8>, filename: String) -> Result<AttachmentRef> {
        self.with_write(|open| {
            let mut cursor = std::io::Cursor::new(bytes);
            open.attachments
                .store(&mut cursor, &filename)
                .map_err(ArchonError::from)
        })
        .await
    }

    pub fn attachment_info(&self, hash: &str) -> Result<AttachmentInfo> {
        let open = self.current()?;
        open.attachments.info(hash).map_err(ArchonError::from)
    }

    pub async fn collect_attachment_garbage(&self) -> Result<GcOutcome> {
        self.with_write(|open| {
            open.attachments
                .garbage_collect(open.nodes.loader())
                .map_err(ArchonError::from)
        })
        .await
    }

    // === Snapshot service ===

    pub async fn create_snapshot(&self, request: SnapshotRequest) -> Result<SnapshotInfo> {
        self.with_write(|open| open.snapshots.create(&request).map_err(ArchonError::from))
            .await
    }

    pub fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>> {
        let open = self.current()?;
        open.snapshots.list().map_err(ArchonError::from)
    }

    pub fn get_snapshot(&self, name: &str) -> Result<SnapshotInfo> {
        let open = self.current()?;
        open.snapshots
            .get(name)
            .map_err(ArchonError::from)?
            .ok_or_else(|| {
                ArchonError::new(ErrorCode::NotFound, format!("no snapshot named {name:?}"))
            })
    }

    /// Restore a snapshot's tree into the working directory, reload the
    /// cached project metadata, and rebuild the index from storage.
    pub async fn restore_snapshot(&self, name: &str) -> Result<SnapshotInfo> {
        let result = self
            .with_write(|open| {
                let info = open.snapshots.restore(name).map_err(ArchonError::from)?;

                let reloaded = open.nodes.loader().read_project().map_err(ArchonError::from)?;
                *open.project.write() = reloaded;

                let records = open.nodes.all_records().map_err(ArchonError::from)?;
                open.index.rebuild(&records).map_err(|e| {
                    ArchonError::new(ErrorCode::SearchFailure, e.to_string())
                })?;
                open.nodes.clear_index_dirty();
                Ok(info)
            })
            .await?;
        Ok(result)
    }

    pub async fn delete_snapshot(&self, name: &str) -> Result<()> {
        let name = name.to_string();
        self.with_write(move |open| open.snapshots.delete(&name).map_err(ArchonError::from))
            .await
    }

    pub fn get_snapshot_history(&self, limit: usize) -> Result<Vec<CommitInfo>> {
        let open = self.current()?;
        open.backend.history(limit).map_err(ArchonError::from)
    }

    pub fn compare_snapshots(&self, from: &str, to: &str) -> Result<SemanticDiff> {
        let open = self.current()?;
        open.snapshots.compare(from, to).map_err(ArchonError::from)
    }

    // === Git service ===

    pub fn git_status(&self) -> Result<RepoStatus> {
        let open = self.current()?;
        open.backend.status().map_err(ArchonError::from)
    }

    /// Idempotent: opening a project always leaves a repository behind.
    pub fn initialize_repository(&self) -> Result<()> {
        let open = self.writable()?;
        if open.backend.is_repository() {
            return Ok(());
        }
        Git2Backend::init(&open.path).map_err(ArchonError::from)?;
        Ok(())
    }

    pub fn is_repository(&self, path: &Path) -> bool {
        Git2Backend::repository_exists(path)
    }

    pub async fn set_remote_url(&self, url: String) -> Result<()> {
        self.with_write(move |open| open.backend.set_remote_url(&url).map_err(ArchonError::from))
            .await
    }

    pub fn get_remote_url(&self) -> Result<Option<String>> {
        let open = self.current()?;
        open.backend.get_remote_url().map_err(ArchonError::from)
    }

    pub async fn initialize_lfs(&self) -> Result<()> {
        self.with_write(|open| open.backend.init_lfs().map_err(ArchonError::from))
            .await
    }

    pub async fn track_lfs_pattern(&self, pattern: String) -> Result<()> {
        self.with_write(move |open| {
            open.backend
                .track_lfs_pattern(&pattern)
                .map_err(ArchonError::from)
        })
        .await
    }

    // === Diff / merge service ===

    pub fn diff(&self, ref_a: &str, ref_b: &str) -> Result<SemanticDiff> {
        let open = self.current()?;
        semantic_diff(open.backend.as_ref(), ref_a, ref_b).map_err(ArchonError::from)
    }

    pub fn merge_three_way(&self, base: &str, ours: &str, theirs: &str) -> Result<MergeResult> {
        let open = self.current()?;
        let backend = open.backend.as_ref();
        let base_state = TreeState::load(backend, base).map_err(ArchonError::from)?;
        let ours_state = TreeState::load(backend, ours).map_err(ArchonError::from)?;
        let theirs_state = TreeState::load(backend, theirs).map_err(ArchonError::from)?;
        Ok(three_way_merge(&base_state, &ours_state, &theirs_state))
    }

    // === Index service ===

    pub async fn rebuild_index(&self) -> Result<usize> {
        self.with_write(|open| {
            let records = open.nodes.all_records().map_err(ArchonError::from)?;
            open.index
                .rebuild(&records)
                .map_err(|e| ArchonError::new(ErrorCode::SearchFailure, e.to_string()))?;
            open.nodes.clear_index_dirty();
            Ok(records.len())
        })
        .await
    }

    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let open = self.current()?;
        open.index
            .search(query, limit)
            .map_err(|e| ArchonError::new(ErrorCode::SearchFailure, e.to_string()))
    }

    pub fn nodes_by_depth(&self, depth: u32, limit: usize) -> Result<Vec<NodeId>> {
        let open = self.current()?;
        open.index
            .nodes_by_depth(depth, limit)
            .map_err(|e| ArchonError::new(ErrorCode::SearchFailure, e.to_string()))
    }

    pub fn index_health(&self) -> Result<IndexHealth> {
        let open = self.current()?;
        Ok(open.index.health())
    }

    // === Migration service ===

    pub fn list_registered_steps(&self) -> Vec<StepDescriptor> {
        self.migrations().registered_steps()
    }

    pub fn plan_migration(&self, path: &Path) -> Result<Vec<StepDescriptor>> {
        self.migrations().plan(path).map_err(ArchonError::from)
    }

    pub fn execute_migration(&self, path: &Path) -> Result<MigrationReport> {
        if self.is_open() {
            return Err(ArchonError::new(
                ErrorCode::InvalidInput,
                "close the project before migrating it explicitly",
            ));
        }
        self.migrations().execute(path).map_err(ArchonError::from)
    }

    pub fn read_schema_version(&self, path: &Path) -> Result<u32> {
        MigrationEngine::read_schema_version(path).map_err(ArchonError::from)
    }

    // === Plugin service ===

    pub fn initialize_plugin_system(&self) -> Result<Vec<PluginInfo>> {
        self.get_plugins()
    }

    pub fn get_plugins(&self) -> Result<Vec<PluginInfo>> {
        let open = self.current()?;
        open.installer.scan().map_err(ArchonError::from)
    }

    pub fn get_enabled_plugins(&self) -> Result<Vec<PluginInfo>> {
        let open = self.current()?;
        open.installer.enabled_plugins().map_err(ArchonError::from)
    }

    pub fn install_plugin(&self, source: &Path) -> Result<PluginInfo> {
        let open = self.writable()?;
        open.installer.install(source).map_err(ArchonError::from)
    }

    pub fn uninstall_plugin(&self, id: &str) -> Result<()> {
        let open = self.writable()?;
        open.permissions.revoke_all(id);
        open.installer.uninstall(id).map_err(ArchonError::from)
    }

    pub fn enable_plugin(&self, id: &str) -> Result<()> {
        let open = self.writable()?;
        open.installer.enable(id).map_err(ArchonError::from)
    }

    pub fn disable_plugin(&self, id: &str) -> Result<()> {
        let open = self.writable()?;
        open.installer.disable(id).map_err(ArchonError::from)
    }

    pub fn get_plugin_permissions(&self, id: &str) -> Result<Vec<GrantInfo>> {
        let open = self.current()?;
        Ok(open
            .permissions
            .granted(id)
            .into_iter()
            .map(|grant| GrantInfo {
                permission: grant.permission.to_string(),
                granted_at: grant.granted_at,
                expires_at: grant.expires_at,
            })
            .collect())
    }

    /// Grant a permission, optionally expiring after `duration_ms`.
    pub fn grant_permission(
        &self,
        id: &str,
        permission: &str,
        temporary: bool,
        duration_ms: u64,
    ) -> Result<()> {
        let open = self.current()?;
        let parsed: Permission = permission
            .parse()
            .map_err(|e: archon_plugins::PluginError| ArchonError::from(e))?;
        let expires_at = if temporary {
            Some(Utc::now() + ChronoDuration::milliseconds(duration_ms as i64))
        } else {
            None
        };
        open.permissions.grant(id, parsed, expires_at);
        Ok(())
    }

    pub fn revoke_permission(&self, id: &str, permission: &str) -> Result<bool> {
        let open = self.current()?;
        let parsed: Permission = permission
            .parse()
            .map_err(|e: archon_plugins::PluginError| ArchonError::from(e))?;
        Ok(open.permissions.revoke(id, &parsed))
    }

    pub fn validate_plugin_manifest(&self, path: &Path) -> Result<PluginManifest> {
        PluginInstaller::validate_manifest(path).map_err(ArchonError::from)
    }

    /// The host API instance plugins talk to.
    pub fn plugin_host(&self) -> Result<Arc<PluginHost>> {
        let open = self.current()?;
        Ok(Arc::clone(&open.host))
    }

    // === Logging service ===

    pub fn log_message(&self, level: &str, message: &str) {
        self.logging().log_message(level, message);
    }

    pub fn get_logging_config(&self) -> LoggingConfig {
        self.logging().config()
    }

    pub fn set_log_level(&self, level: &str) -> Result<()> {
        self.logging().set_level(level)
    }

    pub fn get_recent_logs(&self, limit: usize) -> Vec<LogRecord> {
        self.logging().recent(limit)
    }

    pub fn update_logging_config(&self, config: &LoggingConfig) -> Result<()> {
        self.logging().set_level(&config.level)
    }
}
