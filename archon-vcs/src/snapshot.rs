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

//! Snapshots: commit + annotated tag pairs.
//!
//! Snapshot metadata (message, description, labels, author, creation
//! time) travels as canonical JSON in the tag annotation, so a snapshot
//! survives any round-trip through plain Git tooling. Deleting a
//! snapshot removes only the tag; history is additive.

use crate::backend::GitBackend;
use crate::diff::{semantic_diff, SemanticDiff};
use crate::error::{VcsError, VcsResult};
use archon_core::{layout, Author, NodeId, SnapshotInfo, SnapshotRequest};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Structured payload stored in the tag annotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TagMetadata {
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    labels: Vec<String>,
    author: Author,
    created_at: chrono::DateTime<Utc>,
}

/// Creates, lists, restores, and deletes snapshots over a [`GitBackend`].
pub struct SnapshotManager {
    backend: Arc<dyn GitBackend>,
    project_root: PathBuf,
    author: Author,
}

impl SnapshotManager {
    pub fn new(backend: Arc<dyn GitBackend>, project_root: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            project_root: project_root.into(),
            author: Author::default(),
        }
    }

    pub fn with_author(mut self, author: Author) -> Self {
        self.author = author;
        self
    }

    pub fn backend(&self) -> Arc<dyn GitBackend> {
        Arc::clone(&self.backend)
    }

    /// Stage everything, commit, and tag. The working tree is already
    /// canonical; nothing is reformatted on the way in.
    pub fn create(&self, request: &SnapshotRequest) -> VcsResult<SnapshotInfo> {
        if self.get(&request.name)?.is_some() {
            return Err(VcsError::SnapshotExists(request.name.clone()));
        }

        self.backend.stage_all()?;
        let commit = self.backend.commit(&request.message, &self.author)?;

        let metadata = TagMetadata {
            message: request.message.clone(),
            description: request.description.clone(),
            labels: request.labels.clone(),
            author: self.author.clone(),
            created_at: Utc::now(),
        };
        let annotation = serde_json::to_string_pretty(&metadata)?;
        self.backend.tag(&request.name, &annotation)?;

        info!(snapshot = %request.name, %commit, "created snapshot");
        Ok(SnapshotInfo {
            name: request.name.clone(),
            commit,
            message: metadata.message,
            description: metadata.description,
            labels: metadata.labels,
            author: metadata.author,
            created_at: metadata.created_at,
        })
    }

    /// All snapshots, most recent first.
    pub fn list(&self) -> VcsResult<Vec<SnapshotInfo>> {
        let mut snapshots: Vec<SnapshotInfo> = self
            .backend
            .list_tags()?
            .into_iter()
            .map(|tag| {
                match serde_json::from_str::<TagMetadata>(&tag.message) {
                    Ok(metadata) => SnapshotInfo {
                        name: tag.name,
                        commit: tag.target,
                        message: metadata.message,
                        description: metadata.description,
                        labels: metadata.labels,
                        author: metadata.author,
                        created_at: metadata.created_at,
                    },
                    // Tag created by other tooling: degrade gracefully.
                    Err(_) => SnapshotInfo {
                        name: tag.name,
                        commit: tag.target,
                        message: tag.message,
                        description: None,
                        labels: Vec::new(),
                        author: Author::default(),
                        created_at: tag.created_at,
                    },
                }
            })
            .collect();
        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(snapshots)
    }

    pub fn get(&self, name: &str) -> VcsResult<Option<SnapshotInfo>> {
        Ok(self.list()?.into_iter().find(|s| s.name == name))
    }

    /// Check the snapshot's tree out into the working directory. Node
    /// files created after the snapshot are removed so the on-disk tree
    /// matches exactly; the caller is responsible for reloading caches
    /// and rebuilding the index.
    pub fn restore(&self, name: &str) -> VcsResult<SnapshotInfo> {
        let snapshot = self
            .get(name)?
            .ok_or_else(|| VcsError::SnapshotNotFound(name.to_string()))?;

        let wanted: HashSet<String> = self
            .backend
            .list_dir_at(name, layout::NODES_DIR)?
            .into_iter()
            .collect();

        self.backend.checkout(name)?;

        let nodes_dir = self.project_root.join(layout::NODES_DIR);
        if nodes_dir.is_dir() {
            for entry in fs::read_dir(&nodes_dir)? {
                let entry = entry?;
                let filename = entry.file_name().to_string_lossy().into_owned();
                let is_node_file = filename
                    .strip_suffix(".json")
                    .map(|stem| NodeId::parse(stem).is_ok())
                    .unwrap_or(false);
                if is_node_file && !wanted.contains(&filename) {
                    fs::remove_file(entry.path())?;
                }
            }
        }

        info!(snapshot = %name, "restored snapshot into working tree");
        Ok(snapshot)
    }

    /// Remove the tag only; the commit stays in history.
    pub fn delete(&self, name: &str) -> VcsResult<()> {
        if self.get(name)?.is_none() {
            return Err(VcsError::SnapshotNotFound(name.to_string()));
        }
        self.backend.delete_tag(name)?;
        debug!(snapshot = %name, "deleted snapshot tag");
        Ok(())
    }

    /// Semantic diff between two snapshots (or any two refs).
    pub fn compare(&self, from: &str, to: &str) -> VcsResult<SemanticDiff> {
        semantic_diff(self.backend.as_ref(), from, to)
    }
}
