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

//! Project lifecycle.
//!
//! One project per process. `open_project` runs the schema decision
//! tree: a newer-than-supported project opens read-only (no backup, no
//! migration, no index rebuild); an older one is backed up and migrated
//! forward before opening; a current one opens normally. The read-only
//! latch is set once at open and checked by every mutating service
//! call, and all mutations serialize behind one writer lock.

use crate::logging::LoggingService;
use archon_core::{
    layout, ArchonError, ErrorCode, Node, NodeIndex, Project, Result, Settings,
    SnapshotRequest, CURRENT_SCHEMA_VERSION,
};
use archon_index::open_index;
use archon_migrate::MigrationEngine;
use archon_plugins::{HostConfig, PermissionRegistry, PluginHost, PluginInstaller, SecretsStore};
use archon_storage::{validate_tree, AttachmentStore, Loader, NodeStore};
use archon_vcs::{BackendLfsHook, Git2Backend, GitBackend, SnapshotManager};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

/// Public view of the open project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    pub path: PathBuf,
    pub root_id: archon_core::NodeId,
    pub schema_version: u32,
    pub read_only: bool,
    pub settings: Settings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything wired up for one open project.
pub(crate) struct OpenProject {
    pub path: PathBuf,
    pub project: RwLock<Project>,
    pub nodes: Arc<NodeStore>,
    pub attachments: Arc<AttachmentStore>,
    pub index: Arc<dyn NodeIndex>,
    pub backend: Arc<dyn GitBackend>,
    pub snapshots: Arc<SnapshotManager>,
    pub secrets: Arc<SecretsStore>,
    pub permissions: Arc<PermissionRegistry>,
    pub installer: Arc<PluginInstaller>,
    pub host: Arc<PluginHost>,
    pub read_only: Arc<AtomicBool>,
    /// Serializes every mutation on this project.
    pub write_lock: AsyncMutex<()>,
    pub mutations_since_snapshot: AtomicU64,
    rebuild_running: Arc<AtomicBool>,
    rebuild_task: parking_lot::Mutex<Option<tokio::task::AbortHandle>>,
}

impl OpenProject {
    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::SeqCst)
    }

    pub fn info(&self) -> ProjectInfo {
        let project = self.project.read();
        ProjectInfo {
            path: self.path.clone(),
            root_id: project.root_id,
            schema_version: project.schema_version,
            read_only: self.is_read_only(),
            settings: project.settings.clone(),
            created_at: project.created_at,
            updated_at: project.updated_at,
        }
    }
}

/// Owns the single open project and its services.
pub struct ProjectController {
    current: RwLock<Option<Arc<OpenProject>>>,
    migrations: MigrationEngine,
    logging: Arc<LoggingService>,
}

impl ProjectController {
    pub fn new(logging: Arc<LoggingService>) -> Self {
        Self {
            current: RwLock::new(None),
            migrations: MigrationEngine::with_default_steps(),
            logging,
        }
    }

    pub fn logging(&self) -> Arc<LoggingService> {
        Arc::clone(&self.logging)
    }

    pub(crate) fn migrations(&self) -> &MigrationEngine {
        &self.migrations
    }

    // === Lifecycle ===

    /// Create a fresh project at `path`: root node, `project.json`,
    /// repository, and an initial commit.
    pub fn create_project(&self, path: &Path, settings: Settings) -> Result<ProjectInfo> {
        if path.as_os_str().is_empty() {
            return Err(ArchonError::new(ErrorCode::InvalidPath, "empty project path"));
        }
        let loader = Loader::new(path);
        if loader.project_exists() {
            return Err(ArchonError::new(
                ErrorCode::ProjectExists,
                format!("a project already exists at {}", path.display()),
            ));
        }
        std::fs::create_dir_all(path)
            .map_err(|e| ArchonError::new(ErrorCode::InvalidPath, e.to_string()))?;

        let root = Node::new("Root");
        loader.write_node(&root).map_err(ArchonError::from)?;
        let project = Project::new(root.id, settings);
        loader.write_project(&project).map_err(ArchonError::from)?;

        let backend = Git2Backend::init(path).map_err(ArchonError::from)?;
        backend.stage_all().map_err(ArchonError::from)?;
        backend
            .commit("Initialize project", &archon_core::Author::default())
            .map_err(ArchonError::from)?;

        info!(path = %path.display(), root = %root.id, "created project");
        self.open_project(path)
    }

    /// Open a project, running the schema-version decision tree.
    pub fn open_project(&self, path: &Path) -> Result<ProjectInfo> {
        let loader = Loader::new(path);
        if !loader.project_exists() {
            return Err(ArchonError::new(
                ErrorCode::ProjectNotFound,
                format!("no project at {}", path.display()),
            ));
        }
        if self.is_open() {
            info!("closing previously open project");
            let _ = self.close_project();
        }

        let found = MigrationEngine::read_schema_version(path).map_err(ArchonError::from)?;
        let read_only = found > CURRENT_SCHEMA_VERSION;
        if read_only {
            warn!(
                found,
                supported = CURRENT_SCHEMA_VERSION,
                "project schema is newer than this build; opening read-only"
            );
        } else if found < CURRENT_SCHEMA_VERSION {
            let report = self.migrations.execute(path).map_err(ArchonError::from)?;
            info!(
                from = report.from,
                to = report.to,
                backup = ?report.backup,
                "migrated project forward"
            );
        }

        let project = loader.read_project().map_err(ArchonError::from)?;
        if project.schema_version == 0 && !read_only {
            return Err(ArchonError::new(
                ErrorCode::SchemaVersion,
                "schemaVersion must be positive",
            ));
        }

        // Read-only projects must not be written to: no on-disk index
        // database, only an in-memory scan populated below.
        let index: Arc<dyn NodeIndex> = if read_only {
            Arc::new(archon_index::ScanIndex::new())
        } else {
            open_index(path, &project.settings)
        };
        let backend: Arc<dyn GitBackend> = if Git2Backend::repository_exists(path) {
            Arc::new(Git2Backend::open(path).map_err(ArchonError::from)?)
        } else {
            Arc::new(Git2Backend::init(path).map_err(ArchonError::from)?)
        };

        let attachments = Arc::new(
            AttachmentStore::new(path)
                .with_lfs_threshold(project.settings.lfs_threshold_bytes())
                .with_lfs_hook(Arc::new(BackendLfsHook::new(Arc::clone(&backend)))),
        );
        let nodes = Arc::new(NodeStore::new(loader.clone(), Arc::clone(&index)));
        let snapshots = Arc::new(SnapshotManager::new(Arc::clone(&backend), path));
        let secrets = Arc::new(SecretsStore::open(path).map_err(ArchonError::from)?);
        let permissions = Arc::new(PermissionRegistry::new());
        let installer = Arc::new(PluginInstaller::open(path).map_err(ArchonError::from)?);
        let read_only_flag = Arc::new(AtomicBool::new(read_only));
        let host = Arc::new(PluginHost::new(
            Arc::clone(&nodes),
            Arc::clone(&snapshots),
            Arc::clone(&secrets),
            Arc::clone(&permissions),
            Arc::clone(&read_only_flag),
            project.settings.secrets_return_values(),
            HostConfig::default(),
        ));

        match validate_tree(&loader) {
            Ok(violations) if violations.is_empty() => {}
            Ok(violations) => warn!(
                count = violations.len(),
                "tree invariant violations found at open"
            ),
            Err(e) => warn!(error = %e, "tree validation failed at open"),
        }

        // The index is a rebuildable cache; reconcile it with storage up
        // front so stale or empty databases never serve queries. For a
        // read-only project this fills the in-memory scan index and
        // touches no files.
        if !self.rebuild_index_now(&nodes, index.as_ref()) {
            warn!("initial index rebuild failed; search is degraded until repaired");
        }

        let open = Arc::new(OpenProject {
            path: path.to_path_buf(),
            project: RwLock::new(project),
            nodes,
            attachments,
            index,
            backend,
            snapshots,
            secrets,
            permissions,
            installer,
            host,
            read_only: read_only_flag,
            write_lock: AsyncMutex::new(()),
            mutations_since_snapshot: AtomicU64::new(0),
            rebuild_running: Arc::new(AtomicBool::new(false)),
            rebuild_task: parking_lot::Mutex::new(None),
        });
        *self.current.write() = Some(Arc::clone(&open));
        info!(path = %path.display(), read_only, "opened project");
        Ok(open.info())
    }

    pub fn close_project(&self) -> Result<()> {
        let taken = self.current.write().take();
        match taken {
            Some(open) => {
                if let Some(rebuild) = open.rebuild_task.lock().take() {
                    rebuild.abort();
                }
                info!(path = %open.path.display(), "closed project");
                Ok(())
            }
            None => Err(ArchonError::new(ErrorCode::NoProject, "no project is open")),
        }
    }

    pub fn project_exists(&self, path: &Path) -> bool {
        path.join(layout::PROJECT_FILE).is_file()
    }

    pub fn is_open(&self) -> bool {
        self.current.read().is_some()
    }

    pub fn project_info(&self) -> Result<ProjectInfo> {
        Ok(self.current()?.info())
    }

    /// Merge top-level keys into the project settings. Policy values
    /// latched at open (secrets redaction) take effect on the next open.
    pub async fn update_settings(
        &self,
        patch: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ProjectInfo> {
        let open = self.writable()?;
        let _guard = open.write_lock.lock().await;
        let updated = {
            let mut project = open.project.write();
            for (key, value) in patch {
                project.settings.0.insert(key, value);
            }
            project.touch();
            project.clone()
        };
        open.nodes
            .loader()
            .write_project(&updated)
            .map_err(ArchonError::from)?;
        Ok(open.info())
    }

    // === Internal plumbing for the service layer ===

    pub(crate) fn current(&self) -> Result<Arc<OpenProject>> {
        self.current
            .read()
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| ArchonError::new(ErrorCode::NoProject, "no project is open"))
    }

    /// Current project, rejecting read-only mode with `SCHEMA_VERSION`.
    pub(crate) fn writable(&self) -> Result<Arc<OpenProject>> {
        let open = self.current()?;
        if open.is_read_only() {
            return Err(ArchonError::new(
                ErrorCode::SchemaVersion,
                "project is read-only: its schema is newer than this build supports",
            ));
        }
        Ok(open)
    }

    /// Run one mutation under the writer lock, then handle auto-snapshot
    /// and deferred index repair.
    pub(crate) async fn with_write<T>(
        &self,
        f: impl FnOnce(&OpenProject) -> Result<T>,
    ) -> Result<T> {
        let open = self.writable()?;
        let _guard = open.write_lock.lock().await;
        let out = f(&open)?;
        self.after_mutation(&open);
        Ok(out)
    }

    fn after_mutation(&self, open: &Arc<OpenProject>) {
        // Deferred index repair after a failed incremental update.
        if open.nodes.index_dirty() {
            self.schedule_rebuild(open);
        }

        // Auto-snapshot when the configured mutation threshold is hit.
        let settings = open.project.read().settings.clone();
        if !settings.auto_snapshot_enabled() {
            return;
        }
        let count = open.mutations_since_snapshot.fetch_add(1, Ordering::SeqCst) + 1;
        if count >= settings.auto_snapshot_threshold() {
            open.mutations_since_snapshot.store(0, Ordering::SeqCst);
            let name = format!("auto-{}", Utc::now().format("%Y-%m-%dT%H-%M-%S%.3fZ"));
            match open.snapshots.create(&SnapshotRequest {
                name: name.clone(),
                message: format!("Automatic snapshot after {count} changes"),
                description: None,
                labels: vec!["auto".to_string()],
            }) {
                Ok(_) => info!(snapshot = %name, "auto-snapshot created"),
                Err(e) => warn!(error = %e, "auto-snapshot failed"),
            }
        }
    }

    /// Kick off an asynchronous full rebuild unless one is running.
    pub(crate) fn schedule_rebuild(&self, open: &Arc<OpenProject>) {
        if open
            .rebuild_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let task_open = Arc::clone(open);
        let task = tokio::spawn(async move {
            let open = task_open;
            info!("background index rebuild started");
            let nodes = Arc::clone(&open.nodes);
            let index = Arc::clone(&open.index);
            let outcome = tokio::task::spawn_blocking(move || {
                let records = nodes.all_records()?;
                index
                    .rebuild(&records)
                    .map_err(|e| archon_storage::StorageError::InvalidInput(e.to_string()))?;
                Ok::<usize, archon_storage::StorageError>(records.len())
            })
            .await;
            match outcome {
                Ok(Ok(count)) => {
                    open.nodes.clear_index_dirty();
                    info!(count, "background index rebuild finished");
                }
                Ok(Err(e)) => warn!(error = %e, "background index rebuild failed"),
                Err(e) => warn!(error = %e, "background index rebuild panicked"),
            }
            open.rebuild_running.store(false, Ordering::SeqCst);
        });
        *open.rebuild_task.lock() = Some(task.abort_handle());
    }

    fn rebuild_index_now(&self, nodes: &NodeStore, index: &dyn NodeIndex) -> bool {
        match nodes.all_records() {
            Ok(records) => match index.rebuild(&records) {
                Ok(()) => {
                    nodes.clear_index_dirty();
                    true
                }
                Err(e) => {
                    warn!(error = %e, "index rebuild failed");
                    false
                }
            },
            Err(e) => {
                warn!(error = %e, "could not enumerate records for index rebuild");
                false
            }
        }
    }
}
