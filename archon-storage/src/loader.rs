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

//! Lowest-level filesystem access: `project.json` and `nodes/<id>.json`.
//!
//! Every write is atomic (temp file, fsync, rename) and canonical, so a
//! crash never leaves a half-written file and Git never sees formatting
//! churn. No cross-file invariants live here; that is `NodeStore`'s job.

use crate::error::{StorageError, StorageResult};
use archon_core::{layout, to_canonical_json, Node, NodeId, Project};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Reads and writes the project's sharded JSON files.
#[derive(Debug, Clone)]
pub struct Loader {
    root: PathBuf,
}

impl Loader {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project_path(&self) -> PathBuf {
        self.root.join(layout::PROJECT_FILE)
    }

    pub fn nodes_dir(&self) -> PathBuf {
        self.root.join(layout::NODES_DIR)
    }

    pub fn node_path(&self, id: &NodeId) -> PathBuf {
        self.nodes_dir().join(format!("{id}.json"))
    }

    pub fn project_exists(&self) -> bool {
        self.project_path().is_file()
    }

    pub fn read_project(&self) -> StorageResult<Project> {
        let path = self.project_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::ProjectNotFound(self.root.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_project(&self, project: &Project) -> StorageResult<()> {
        let body = to_canonical_json(project)
            .map_err(|e| StorageError::InvalidInput(e.to_string()))?;
        self.write_atomic(&self.project_path(), body.as_bytes())
    }

    pub fn node_exists(&self, id: &NodeId) -> bool {
        self.node_path(id).is_file()
    }

    pub fn read_node(&self, id: &NodeId) -> StorageResult<Node> {
        let path = self.node_path(id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NodeNotFound(*id))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_node(&self, node: &Node) -> StorageResult<()> {
        let dir = self.nodes_dir();
        if !dir.is_dir() {
            fs::create_dir_all(&dir)?;
        }
        let body = to_canonical_json(node)
            .map_err(|e| StorageError::InvalidInput(e.to_string()))?;
        self.write_atomic(&self.node_path(&node.id), body.as_bytes())
    }

    pub fn delete_node_file(&self, id: &NodeId) -> StorageResult<()> {
        match fs::remove_file(self.node_path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NodeNotFound(*id))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// IDs of every node file. Filenames that do not parse as canonical
    /// UUIDs (editor droppings, temp files) are skipped.
    pub fn list_node_ids(&self) -> StorageResult<Vec<NodeId>> {
        let dir = self.nodes_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let Some(stem) = name.strip_suffix(".json") else {
                continue;
            };
            match NodeId::parse(stem) {
                Ok(id) => ids.push(id),
                Err(_) => warn!(file = %name, "skipping non-UUID file in nodes/"),
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Write-to-temp, fsync, rename. The temp file lives next to the
    /// target so the rename stays on one filesystem.
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> StorageResult<()> {
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(contents)?;
            file.sync_all()?;
        }
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archon_core::Settings;
    use tempfile::TempDir;

    fn loader() -> (TempDir, Loader) {
        let dir = TempDir::new().unwrap();
        let loader = Loader::new(dir.path());
        (dir, loader)
    }

    #[test]
    fn test_project_round_trip() {
        let (_dir, loader) = loader();
        assert!(matches!(
            loader.read_project(),
            Err(StorageError::ProjectNotFound(_))
        ));

        let project = Project::new(NodeId::generate(), Settings::default());
        loader.write_project(&project).unwrap();
        assert_eq!(loader.read_project().unwrap(), project);
    }

    #[test]
    fn test_project_file_is_canonical() {
        let (_dir, loader) = loader();
        let project = Project::new(NodeId::generate(), Settings::default());
        loader.write_project(&project).unwrap();
        let raw = fs::read_to_string(loader.project_path()).unwrap();
        assert!(raw.ends_with('\n'));
        assert!(raw.find("\"createdAt\"").unwrap() < raw.find("\"rootId\"").unwrap());
    }

    #[test]
    fn test_node_round_trip_and_missing() {
        let (_dir, loader) = loader();
        let node = Node::new("Rack");
        loader.write_node(&node).unwrap();
        assert_eq!(loader.read_node(&node.id).unwrap(), node);

        let missing = NodeId::generate();
        assert!(matches!(
            loader.read_node(&missing),
            Err(StorageError::NodeNotFound(id)) if id == missing
        ));
    }

    #[test]
    fn test_list_node_ids_skips_garbage() {
        let (_dir, loader) = loader();
        let a = Node::new("a");
        let b = Node::new("b");
        loader.write_node(&a).unwrap();
        loader.write_node(&b).unwrap();
        fs::write(loader.nodes_dir().join("README.json"), "{}").unwrap();
        fs::write(loader.nodes_dir().join("notes.txt"), "x").unwrap();

        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(loader.list_node_ids().unwrap(), expected);
    }

    #[test]
    fn test_no_tmp_files_left_behind() {
        let (_dir, loader) = loader();
        loader.write_node(&Node::new("n")).unwrap();
        let leftovers: Vec<_> = fs::read_dir(loader.nodes_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
