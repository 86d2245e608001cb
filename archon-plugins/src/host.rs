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

//! The capability-scoped host API.
//!
//! Every call takes the calling plugin's ID first and proceeds in a
//! fixed order: permission check, read-only latch (for mutating calls),
//! then the guarded operation under the per-call timeout and the
//! plugin's cumulative time budget. Batched mutations are all-or-none:
//! the node files are captured up front and restored byte-for-byte if
//! any mutation in the batch fails.

use crate::error::{PluginError, PluginResult};
use crate::permissions::{Capability, PermissionRegistry};
use crate::secrets::{SecretValue, SecretsStore};
use archon_core::{Node, NodeId, NodeIndex, Property, SearchHit, SnapshotInfo, SnapshotRequest};
use archon_storage::{CreateNodeRequest, NodeStore, UpdateNodeRequest};
use archon_vcs::SnapshotManager;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Host limits; per spec defaults are 5 s per call and a cumulative
/// per-plugin execution budget.
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub call_timeout: Duration,
    pub plugin_budget: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(5),
            plugin_budget: Duration::from_secs(60),
        }
    }
}

/// One entry of a batched mutation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    #[serde(rename_all = "camelCase")]
    Create {
        parent_id: NodeId,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        properties: Option<BTreeMap<String, Property>>,
    },
    #[serde(rename_all = "camelCase")]
    Update {
        id: NodeId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        properties: Option<BTreeMap<String, Property>>,
    },
    #[serde(rename_all = "camelCase")]
    Delete { id: NodeId },
    #[serde(rename_all = "camelCase")]
    Move {
        id: NodeId,
        new_parent_id: NodeId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<i64>,
    },
}

/// Mediates all plugin-initiated access to storage, search, and Git.
pub struct PluginHost {
    nodes: Arc<NodeStore>,
    snapshots: Arc<SnapshotManager>,
    index: Arc<dyn NodeIndex>,
    secrets: Arc<SecretsStore>,
    permissions: Arc<PermissionRegistry>,
    read_only: Arc<AtomicBool>,
    /// Latched from `secretsPolicy.returnValues` when the host is built.
    return_secret_values: bool,
    config: HostConfig,
    spent: DashMap<String, Duration>,
}

impl PluginHost {
    pub fn new(
        nodes: Arc<NodeStore>,
        snapshots: Arc<SnapshotManager>,
        secrets: Arc<SecretsStore>,
        permissions: Arc<PermissionRegistry>,
        read_only: Arc<AtomicBool>,
        return_secret_values: bool,
        config: HostConfig,
    ) -> Self {
        let index = nodes.index();
        Self {
            nodes,
            snapshots,
            index,
            secrets,
            permissions,
            read_only,
            return_secret_values,
            config,
            spent: DashMap::new(),
        }
    }

    pub fn permissions(&self) -> Arc<PermissionRegistry> {
        Arc::clone(&self.permissions)
    }

    // === Read surface ===

    pub async fn get_node(&self, plugin_id: &str, id: NodeId) -> PluginResult<Node> {
        self.permissions.check(plugin_id, Capability::NodesRead, None)?;
        let nodes = Arc::clone(&self.nodes);
        self.guarded(plugin_id, move || {
            nodes.get_node(&id).map_err(|e| PluginError::Host(e.into()))
        })
        .await
    }

    pub async fn list_children(&self, plugin_id: &str, id: NodeId) -> PluginResult<Vec<Node>> {
        self.permissions.check(plugin_id, Capability::NodesRead, None)?;
        let nodes = Arc::clone(&self.nodes);
        self.guarded(plugin_id, move || {
            nodes
                .list_children(&id)
                .map_err(|e| PluginError::Host(e.into()))
        })
        .await
    }

    pub async fn query(
        &self,
        plugin_id: &str,
        text: String,
        limit: usize,
    ) -> PluginResult<Vec<SearchHit>> {
        self.permissions.check(plugin_id, Capability::IndexRead, None)?;
        let index = Arc::clone(&self.index);
        self.guarded(plugin_id, move || {
            index
                .search(&text, limit)
                .map_err(|e| PluginError::Execution(e.to_string()))
        })
        .await
    }

    // === Mutating surface ===

    /// Apply a batch of mutations atomically: either every entry lands
    /// or the node files are restored to their pre-batch bytes.
    pub async fn apply_mutations(
        &self,
        plugin_id: &str,
        mutations: Vec<Mutation>,
    ) -> PluginResult<usize> {
        self.permissions.check(plugin_id, Capability::NodesWrite, None)?;
        self.ensure_writable()?;
        if mutations.is_empty() {
            return Ok(0);
        }

        let nodes = Arc::clone(&self.nodes);
        let index = Arc::clone(&self.index);
        let plugin = plugin_id.to_string();
        self.guarded(plugin_id, move || {
            let checkpoint = Checkpoint::capture(&nodes)?;
            let applied = apply_batch(&nodes, &mutations);
            match applied {
                Ok(count) => {
                    info!(plugin = %plugin, count, "applied plugin mutation batch");
                    Ok(count)
                }
                Err(e) => {
                    warn!(plugin = %plugin, error = %e, "mutation batch failed; rolling back");
                    checkpoint.restore(&nodes, index.as_ref());
                    Err(e)
                }
            }
        })
        .await
    }

    pub async fn commit(&self, plugin_id: &str, message: String) -> PluginResult<String> {
        self.permissions.check(plugin_id, Capability::GitCommit, None)?;
        self.ensure_writable()?;
        let snapshots = Arc::clone(&self.snapshots);
        self.guarded(plugin_id, move || {
            let backend = snapshots.backend();
            backend
                .stage_all()
                .and_then(|_| backend.commit(&message, &archon_core::Author::default()))
                .map_err(|e| PluginError::Host(e.into()))
        })
        .await
    }

    pub async fn snapshot(&self, plugin_id: &str, message: String) -> PluginResult<SnapshotInfo> {
        self.permissions
            .check(plugin_id, Capability::GitSnapshot, None)?;
        self.ensure_writable()?;
        let snapshots = Arc::clone(&self.snapshots);
        let name = format!(
            "plugin-{plugin_id}-{}",
            Utc::now().format("%Y%m%dT%H%M%S%3fZ")
        );
        self.guarded(plugin_id, move || {
            snapshots
                .create(&SnapshotRequest {
                    name,
                    message,
                    description: None,
                    labels: vec!["plugin".to_string()],
                })
                .map_err(|e| PluginError::Host(e.into()))
        })
        .await
    }

    pub async fn index_put(
        &self,
        plugin_id: &str,
        node_id: NodeId,
        content: String,
    ) -> PluginResult<()> {
        self.permissions.check(plugin_id, Capability::IndexWrite, None)?;
        self.ensure_writable()?;
        let index = Arc::clone(&self.index);
        let source = plugin_id.to_string();
        self.guarded(plugin_id, move || {
            index
                .index_external(&node_id, &source, &content)
                .map_err(|e| PluginError::Execution(e.to_string()))
        })
        .await
    }

    // === Secrets ===

    pub async fn secrets_list(&self, plugin_id: &str, prefix: String) -> PluginResult<Vec<String>> {
        self.permissions
            .check(plugin_id, Capability::Secrets, Some(&prefix))?;
        let keys = self.secrets.list(&prefix);
        // A scoped grant narrows the listing to what it covers.
        Ok(keys
            .into_iter()
            .filter(|key| self.permissions.allows(plugin_id, Capability::Secrets, Some(key)))
            .collect())
    }

    /// The capability check precedes existence and policy: an
    /// unauthorized caller cannot tell whether a key exists.
    pub async fn secrets_get(&self, plugin_id: &str, key: String) -> PluginResult<SecretValue> {
        self.permissions
            .check(plugin_id, Capability::Secrets, Some(&key))?;
        self.secrets
            .get(&key, self.return_secret_values)
            .ok_or_else(|| {
                PluginError::Host(archon_core::ArchonError::new(
                    archon_core::ErrorCode::NotFound,
                    format!("no secret named {key:?}"),
                ))
            })
    }

    // === Internals ===

    fn ensure_writable(&self) -> PluginResult<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(PluginError::ReadOnly);
        }
        Ok(())
    }

    /// Run `f` off the async runtime under the per-call timeout, charging
    /// elapsed time against the plugin's cumulative budget.
    async fn guarded<T: Send + 'static>(
        &self,
        plugin_id: &str,
        f: impl FnOnce() -> PluginResult<T> + Send + 'static,
    ) -> PluginResult<T> {
        let spent = self
            .spent
            .get(plugin_id)
            .map(|entry| *entry.value())
            .unwrap_or_default();
        if spent >= self.config.plugin_budget {
            return Err(PluginError::ResourceExceeded(format!(
                "plugin {plugin_id} exhausted its {:?} execution budget",
                self.config.plugin_budget
            )));
        }

        let started = Instant::now();
        let outcome = tokio::time::timeout(self.config.call_timeout, tokio::task::spawn_blocking(f))
            .await;
        let elapsed = started.elapsed();
        *self
            .spent
            .entry(plugin_id.to_string())
            .or_insert(Duration::ZERO) += elapsed;

        match outcome {
            Err(_) => Err(PluginError::Timeout),
            Ok(Err(join_error)) => Err(PluginError::Execution(join_error.to_string())),
            Ok(Ok(result)) => result,
        }
    }
}

fn apply_batch(nodes: &NodeStore, mutations: &[Mutation]) -> PluginResult<usize> {
    for mutation in mutations {
        let applied = match mutation.clone() {
            Mutation::Create {
                parent_id,
                name,
                description,
                properties,
            } => nodes
                .create_node(
                    &parent_id,
                    CreateNodeRequest {
                        name,
                        description,
                        properties,
                    },
                )
                .map(|_| ()),
            Mutation::Update {
                id,
                name,
                description,
                properties,
            } => nodes
                .update_node(
                    &id,
                    UpdateNodeRequest {
                        name,
                        description,
                        properties,
                    },
                )
                .map(|_| ()),
            Mutation::Delete { id } => nodes.delete_node(&id),
            Mutation::Move {
                id,
                new_parent_id,
                position,
            } => nodes.move_node(&id, &new_parent_id, position),
        };
        applied.map_err(|e| PluginError::Host(e.into()))?;
    }
    Ok(mutations.len())
}

/// Byte-level capture of the node files, for batch rollback.
struct Checkpoint {
    files: Vec<(PathBuf, Vec<u8>)>,
    nodes_dir: PathBuf,
}

impl Checkpoint {
    fn capture(nodes: &NodeStore) -> PluginResult<Self> {
        let loader = nodes.loader();
        let nodes_dir = loader.nodes_dir();
        let mut files = Vec::new();
        if nodes_dir.is_dir() {
            for entry in fs::read_dir(&nodes_dir)? {
                let entry = entry?;
                if entry.path().is_file() {
                    files.push((entry.path(), fs::read(entry.path())?));
                }
            }
        }
        Ok(Self { files, nodes_dir })
    }

    fn restore(self, nodes: &NodeStore, index: &dyn NodeIndex) {
        let keep: std::collections::HashSet<&PathBuf> =
            self.files.iter().map(|(path, _)| path).collect();
        if let Ok(entries) = fs::read_dir(&self.nodes_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_file() && !keep.contains(&path) {
                    let _ = fs::remove_file(&path);
                }
            }
        }
        for (path, bytes) in &self.files {
            if let Err(e) = fs::write(path, bytes) {
                warn!(file = %path.display(), error = %e, "rollback write failed");
            }
        }
        // The incremental index updates of the failed batch are stale now.
        match nodes.all_records() {
            Ok(records) => {
                if let Err(e) = index.rebuild(&records) {
                    warn!(error = %e, "index rebuild after rollback failed");
                }
            }
            Err(e) => warn!(error = %e, "could not re-enumerate records after rollback"),
        }
    }
}
