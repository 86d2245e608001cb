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

//! Tree-aware node CRUD.
//!
//! `NodeStore` owns the structural invariants: sibling names unique
//! case-insensitively, no cycles, ordered `children` arrays referencing
//! existing files. Every successful mutation writes the node file, then
//! the affected parent(s), then the incremental index update, in that
//! order. Index failures never fail the caller; they flip the dirty flag
//! so the controller schedules a rebuild.

use crate::error::{StorageError, StorageResult};
use crate::loader::Loader;
use archon_core::{
    names_collide, normalized_name, validate_properties, IndexRecord, Node, NodeId, NodeIndex,
    Property, SearchError, ValidationError,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Request to create a node under a parent.
#[derive(Debug, Clone, Default)]
pub struct CreateNodeRequest {
    pub name: String,
    pub description: Option<String>,
    pub properties: Option<BTreeMap<String, Property>>,
}

/// Partial update of a node. `None` fields are left untouched; an empty
/// description clears it.
#[derive(Debug, Clone, Default)]
pub struct UpdateNodeRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub properties: Option<BTreeMap<String, Property>>,
}

/// Tree-aware CRUD over [`Loader`], feeding the search index.
pub struct NodeStore {
    loader: Loader,
    index: Arc<dyn NodeIndex>,
    index_dirty: Arc<AtomicBool>,
}

impl NodeStore {
    pub fn new(loader: Loader, index: Arc<dyn NodeIndex>) -> Self {
        Self {
            loader,
            index,
            index_dirty: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    pub fn index(&self) -> Arc<dyn NodeIndex> {
        Arc::clone(&self.index)
    }

    /// True when an incremental index update failed since the last
    /// rebuild; the controller polls this to schedule background repair.
    pub fn index_dirty(&self) -> bool {
        self.index_dirty.load(Ordering::SeqCst)
    }

    pub fn clear_index_dirty(&self) {
        self.index_dirty.store(false, Ordering::SeqCst);
    }

    fn root_id(&self) -> StorageResult<NodeId> {
        Ok(self.loader.read_project()?.root_id)
    }

    pub fn root(&self) -> StorageResult<Node> {
        let id = self.root_id()?;
        self.loader.read_node(&id)
    }

    // === CRUD ===

    pub fn create_node(&self, parent_id: &NodeId, req: CreateNodeRequest) -> StorageResult<Node> {
        let name = normalized_name(&req.name).to_string();
        if name.is_empty() {
            return Err(StorageError::NameRequired);
        }
        if let Some(props) = &req.properties {
            let mut errors = Vec::new();
            validate_properties(props, &mut errors);
            if !errors.is_empty() {
                return Err(StorageError::Validation(errors));
            }
        }

        let mut parent = self.loader.read_node(parent_id)?;
        self.check_sibling_name(&parent, &name, None)?;

        let mut node = Node::new(name);
        node.description = req.description.filter(|d| !d.is_empty());
        node.properties = req.properties.unwrap_or_default();
        self.loader.write_node(&node)?;

        let depth = self.depth_of(parent_id)? + 1;
        let path = format!("{}/{}", self.path_string(parent_id)?, node.name);
        self.index_quietly(|ix| {
            ix.index_node(&IndexRecord {
                node: node.clone(),
                parent_id: Some(*parent_id),
                depth,
                path: path.clone(),
            })
        });

        parent.children.push(node.id);
        parent.touch();
        if let Err(e) = self.loader.write_node(&parent) {
            warn!(node = %node.id, error = %e, "parent update failed; rolling back create");
            let _ = self.loader.delete_node_file(&node.id);
            self.index_quietly(|ix| ix.remove_node(&node.id));
            return Err(e);
        }
        self.index_quietly(|ix| ix.update_child_count(&parent.id, parent.children.len() as u32));

        debug!(node = %node.id, parent = %parent.id, "created node");
        Ok(node)
    }

    pub fn get_node(&self, id: &NodeId) -> StorageResult<Node> {
        self.loader.read_node(id)
    }

    pub fn update_node(&self, id: &NodeId, req: UpdateNodeRequest) -> StorageResult<Node> {
        let mut node = self.loader.read_node(id)?;

        let new_name = match &req.name {
            Some(raw) => {
                let name = normalized_name(raw).to_string();
                if name.is_empty() {
                    return Err(StorageError::NameRequired);
                }
                Some(name)
            }
            None => None,
        };
        if let Some(props) = &req.properties {
            let mut errors = Vec::new();
            validate_properties(props, &mut errors);
            if !errors.is_empty() {
                return Err(StorageError::Validation(errors));
            }
        }

        let name_changed = new_name
            .as_ref()
            .map(|n| n != &node.name)
            .unwrap_or(false);
        if name_changed {
            if let (Some(name), Some(parent)) = (&new_name, self.find_parent(id)?) {
                self.check_sibling_name(&parent, name, Some(id))?;
            }
        }

        if let Some(name) = new_name {
            node.name = name;
        }
        if let Some(description) = req.description {
            node.description = if description.is_empty() {
                None
            } else {
                Some(description)
            };
        }
        if let Some(properties) = req.properties {
            node.properties = properties;
        }
        node.touch();
        self.loader.write_node(&node)?;

        if name_changed {
            // Descendant paths embed this node's name.
            self.reindex_subtree(id);
        } else {
            self.index_single(id, &node);
        }
        Ok(node)
    }

    pub fn delete_node(&self, id: &NodeId) -> StorageResult<()> {
        if *id == self.root_id()? {
            return Err(StorageError::InvalidInput(
                "the root node cannot be deleted".to_string(),
            ));
        }
        let node = self.loader.read_node(id)?;

        // Depth-first: children before their parents.
        let mut subtree = Vec::new();
        self.collect_subtree(&node, &mut subtree)?;
        for descendant in subtree.iter().rev() {
            if *descendant == *id {
                continue;
            }
            if let Err(e) = self.loader.delete_node_file(descendant) {
                warn!(node = %descendant, error = %e, "descendant already gone during delete");
            }
            self.index_quietly(|ix| ix.remove_node(descendant));
        }

        if let Some(mut parent) = self.find_parent(id)? {
            parent.children.retain(|child| child != id);
            parent.touch();
            self.loader.write_node(&parent)?;
            self.index_quietly(|ix| {
                ix.update_child_count(&parent.id, parent.children.len() as u32)
            });
        }

        self.loader.delete_node_file(id)?;
        self.index_quietly(|ix| ix.remove_node(id));
        debug!(node = %id, removed = subtree.len(), "deleted subtree");
        Ok(())
    }

    pub fn move_node(
        &self,
        id: &NodeId,
        new_parent_id: &NodeId,
        position: Option<i64>,
    ) -> StorageResult<()> {
        if id == new_parent_id {
            return Err(StorageError::CircularReference(
                "a node cannot be its own parent".to_string(),
            ));
        }
        if *id == self.root_id()? {
            return Err(StorageError::InvalidParent(
                "the root node cannot be moved".to_string(),
            ));
        }
        let node = self.loader.read_node(id)?;
        let mut new_parent = self.loader.read_node(new_parent_id)?;

        // Reject moves under the node's own subtree.
        let mut ancestor = Some(*new_parent_id);
        let mut steps = 0usize;
        let limit = self.loader.list_node_ids()?.len() + 1;
        while let Some(current) = ancestor {
            if current == *id {
                return Err(StorageError::CircularReference(format!(
                    "{new_parent_id} is inside the subtree of {id}"
                )));
            }
            steps += 1;
            if steps > limit {
                return Err(StorageError::CircularReference(
                    "parent chain does not terminate".to_string(),
                ));
            }
            ancestor = self.find_parent(&current)?.map(|n| n.id);
        }

        let mut old_parent = self.find_parent(id)?.ok_or_else(|| {
            StorageError::InvalidParent(format!("{id} is not referenced by any parent"))
        })?;

        if old_parent.id == *new_parent_id {
            // Same parent: degrade to a reorder.
            let parent_id = old_parent.id;
            old_parent.children.retain(|child| child != id);
            let at = clamp_position(position, old_parent.children.len());
            old_parent.children.insert(at, *id);
            old_parent.touch();
            self.loader.write_node(&old_parent)?;
            self.index_single(&parent_id, &old_parent);
            return Ok(());
        }

        self.check_sibling_name(&new_parent, &node.name, None)?;

        let original_position = old_parent
            .children
            .iter()
            .position(|child| child == id)
            .unwrap_or(old_parent.children.len());
        old_parent.children.retain(|child| child != id);
        let at = clamp_position(position, new_parent.children.len());
        new_parent.children.insert(at, *id);
        old_parent.touch();
        new_parent.touch();

        self.loader.write_node(&old_parent)?;
        if let Err(e) = self.loader.write_node(&new_parent) {
            // Restore the old parent so the node is not orphaned.
            let mut restored = old_parent.clone();
            let at = original_position.min(restored.children.len());
            restored.children.insert(at, *id);
            if let Err(restore_err) = self.loader.write_node(&restored) {
                warn!(node = %id, error = %restore_err, "rollback of move failed");
            }
            return Err(e);
        }

        self.index_quietly(|ix| {
            ix.update_child_count(&old_parent.id, old_parent.children.len() as u32)
        });
        self.index_quietly(|ix| {
            ix.update_child_count(&new_parent.id, new_parent.children.len() as u32)
        });
        self.reindex_subtree(id);
        debug!(node = %id, from = %old_parent.id, to = %new_parent.id, "moved node");
        Ok(())
    }

    /// Replace a parent's child order. The new order must be exactly the
    /// current child set: same IDs, no omissions, no duplicates.
    pub fn reorder_children(
        &self,
        parent_id: &NodeId,
        ordered: Vec<NodeId>,
    ) -> StorageResult<()> {
        let mut parent = self.loader.read_node(parent_id)?;

        let current: HashSet<NodeId> = parent.children.iter().copied().collect();
        let proposed: HashSet<NodeId> = ordered.iter().copied().collect();
        if ordered.len() != parent.children.len()
            || proposed.len() != ordered.len()
            || current != proposed
        {
            return Err(StorageError::InvalidInput(
                "reorder must permute the exact current child set".to_string(),
            ));
        }

        parent.children = ordered;
        parent.touch();
        self.loader.write_node(&parent)?;
        self.index_single(parent_id, &parent);
        Ok(())
    }

    pub fn list_children(&self, id: &NodeId) -> StorageResult<Vec<Node>> {
        let parent = self.loader.read_node(id)?;
        let mut children = Vec::with_capacity(parent.children.len());
        for child_id in &parent.children {
            children.push(self.loader.read_node(child_id)?);
        }
        Ok(children)
    }

    /// Root-to-node chain, the node itself last.
    pub fn node_path(&self, id: &NodeId) -> StorageResult<Vec<Node>> {
        let mut chain = vec![self.loader.read_node(id)?];
        let limit = self.loader.list_node_ids()?.len() + 1;
        let mut current = *id;
        for _ in 0..limit {
            match self.find_parent(&current)? {
                Some(parent) => {
                    current = parent.id;
                    chain.push(parent);
                }
                None => break,
            }
        }
        chain.reverse();
        Ok(chain)
    }

    // === Convenience property operations ===

    pub fn set_property(&self, id: &NodeId, key: &str, property: Property) -> StorageResult<Node> {
        let node = self.loader.read_node(id)?;
        let mut properties = node.properties.clone();
        properties.insert(key.to_string(), property);
        let mut errors = Vec::new();
        validate_properties(&properties, &mut errors);
        if !errors.is_empty() {
            return Err(StorageError::Validation(errors));
        }
        self.update_node(
            id,
            UpdateNodeRequest {
                properties: Some(properties),
                ..Default::default()
            },
        )
    }

    pub fn delete_property(&self, id: &NodeId, key: &str) -> StorageResult<Node> {
        let node = self.loader.read_node(id)?;
        let mut properties = node.properties.clone();
        if properties.remove(key).is_none() {
            return Err(StorageError::InvalidInput(format!(
                "no property {key:?} on {id}"
            )));
        }
        self.update_node(
            id,
            UpdateNodeRequest {
                properties: Some(properties),
                ..Default::default()
            },
        )
    }

    // === Structure queries ===

    /// The parent whose `children` references `id`, by linear scan.
    /// O(N), acceptable at target scales; unreadable files are skipped.
    pub fn find_parent(&self, id: &NodeId) -> StorageResult<Option<Node>> {
        for candidate_id in self.loader.list_node_ids()? {
            if candidate_id == *id {
                continue;
            }
            let candidate = match self.loader.read_node(&candidate_id) {
                Ok(node) => node,
                Err(e) => {
                    warn!(node = %candidate_id, error = %e, "unreadable node during parent scan");
                    continue;
                }
            };
            if candidate.children.contains(id) {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// depth(root) = 0; depth(n) = depth(parent) + 1. If the chain breaks
    /// mid-walk the best-effort depth so far is returned.
    pub fn depth_of(&self, id: &NodeId) -> StorageResult<u32> {
        let root = self.root_id()?;
        let limit = self.loader.list_node_ids()?.len() + 1;
        let mut depth = 0u32;
        let mut current = *id;
        for _ in 0..limit {
            if current == root {
                return Ok(depth);
            }
            match self.find_parent(&current)? {
                Some(parent) => {
                    depth += 1;
                    current = parent.id;
                }
                None => break,
            }
        }
        Ok(depth)
    }

    fn path_string(&self, id: &NodeId) -> StorageResult<String> {
        let names: Vec<String> = self
            .node_path(id)?
            .into_iter()
            .map(|node| node.name)
            .collect();
        Ok(names.join("/"))
    }

    /// Index records for every node reachable from the root, for full
    /// rebuilds and consistency checks.
    pub fn all_records(&self) -> StorageResult<Vec<IndexRecord>> {
        let root = self.root()?;
        let mut out = Vec::new();
        let mut stack = vec![(root.clone(), None::<NodeId>, 0u32, root.name.clone())];
        while let Some((node, parent_id, depth, path)) = stack.pop() {
            for child_id in node.children.iter().rev() {
                match self.loader.read_node(child_id) {
                    Ok(child) => {
                        let child_path = format!("{path}/{}", child.name);
                        stack.push((child, Some(node.id), depth + 1, child_path));
                    }
                    Err(e) => warn!(node = %child_id, error = %e, "dangling child reference"),
                }
            }
            out.push(IndexRecord {
                node,
                parent_id,
                depth,
                path,
            });
        }
        Ok(out)
    }

    // === Internals ===

    fn check_sibling_name(
        &self,
        parent: &Node,
        name: &str,
        exclude: Option<&NodeId>,
    ) -> StorageResult<()> {
        for child_id in &parent.children {
            if Some(child_id) == exclude {
                continue;
            }
            let child = match self.loader.read_node(child_id) {
                Ok(child) => child,
                Err(e) => {
                    warn!(node = %child_id, error = %e, "unreadable sibling during name check");
                    continue;
                }
            };
            if names_collide(&child.name, name) {
                return Err(StorageError::DuplicateName {
                    name: name.to_string(),
                    parent: parent.id,
                });
            }
        }
        Ok(())
    }

    /// Pre-order IDs of `node` and every descendant.
    fn collect_subtree(&self, node: &Node, out: &mut Vec<NodeId>) -> StorageResult<()> {
        out.push(node.id);
        for child_id in &node.children {
            match self.loader.read_node(child_id) {
                Ok(child) => self.collect_subtree(&child, out)?,
                Err(e) => warn!(node = %child_id, error = %e, "dangling child during traversal"),
            }
        }
        Ok(())
    }

    fn index_single(&self, id: &NodeId, node: &Node) {
        let parent_id = match self.find_parent(id) {
            Ok(parent) => parent.map(|p| p.id),
            Err(_) => None,
        };
        let depth = self.depth_of(id).unwrap_or(0);
        let path = self.path_string(id).unwrap_or_else(|_| node.name.clone());
        self.index_quietly(|ix| {
            ix.index_node(&IndexRecord {
                node: node.clone(),
                parent_id,
                depth,
                path: path.clone(),
            })
        });
    }

    /// Recompute parent, depth, and ancestor path for a node and its
    /// whole subtree.
    pub fn reindex_subtree(&self, id: &NodeId) {
        let node = match self.loader.read_node(id) {
            Ok(node) => node,
            Err(e) => {
                warn!(node = %id, error = %e, "cannot reindex missing node");
                return;
            }
        };
        let parent_id = self.find_parent(id).ok().flatten().map(|p| p.id);
        let depth = self.depth_of(id).unwrap_or(0);
        let path = self.path_string(id).unwrap_or_else(|_| node.name.clone());

        let mut stack = vec![(node, parent_id, depth, path)];
        while let Some((node, parent_id, depth, path)) = stack.pop() {
            for child_id in node.children.iter().rev() {
                if let Ok(child) = self.loader.read_node(child_id) {
                    let child_path = format!("{path}/{}", child.name);
                    stack.push((child, Some(node.id), depth + 1, child_path));
                }
            }
            self.index_quietly(|ix| {
                ix.index_node(&IndexRecord {
                    node: node.clone(),
                    parent_id,
                    depth,
                    path: path.clone(),
                })
            });
        }
    }

    fn index_quietly(&self, f: impl FnOnce(&dyn NodeIndex) -> Result<(), SearchError>) {
        if let Err(e) = f(self.index.as_ref()) {
            warn!(error = %e, "incremental index update failed; marking index dirty");
            self.index_dirty.store(true, Ordering::SeqCst);
        }
    }
}

fn clamp_position(position: Option<i64>, len: usize) -> usize {
    match position {
        Some(p) if p >= 0 && (p as usize) <= len => p as usize,
        _ => len,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archon_core::{IndexHealth, Project, SearchHit, Settings};
    use parking_lot::Mutex;
    use tempfile::TempDir;

    /// Minimal in-memory index for asserting incremental updates.
    #[derive(Default)]
    struct FakeIndex {
        records: Mutex<BTreeMap<NodeId, IndexRecord>>,
        fail_writes: AtomicBool,
    }

    impl NodeIndex for FakeIndex {
        fn index_node(&self, record: &IndexRecord) -> Result<(), SearchError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(SearchError::Backend("injected".to_string()));
            }
            self.records.lock().insert(record.node.id, record.clone());
            Ok(())
        }

        fn remove_node(&self, id: &NodeId) -> Result<(), SearchError> {
            self.records.lock().remove(id);
            Ok(())
        }

        fn update_child_count(&self, _id: &NodeId, _count: u32) -> Result<(), SearchError> {
            Ok(())
        }

        fn rebuild(&self, records: &[IndexRecord]) -> Result<(), SearchError> {
            let mut map = self.records.lock();
            map.clear();
            for record in records {
                map.insert(record.node.id, record.clone());
            }
            Ok(())
        }

        fn search(&self, _query: &str, _limit: usize) -> Result<Vec<SearchHit>, SearchError> {
            Ok(Vec::new())
        }

        fn nodes_by_depth(&self, depth: u32, limit: usize) -> Result<Vec<NodeId>, SearchError> {
            Ok(self
                .records
                .lock()
                .values()
                .filter(|r| r.depth == depth)
                .take(limit)
                .map(|r| r.node.id)
                .collect())
        }

        fn health(&self) -> IndexHealth {
            IndexHealth::healthy(1)
        }
    }

    fn fixture() -> (TempDir, NodeStore, Arc<FakeIndex>, NodeId) {
        let dir = TempDir::new().unwrap();
        let loader = Loader::new(dir.path());
        let root = Node::new("Root");
        let root_id = root.id;
        loader.write_node(&root).unwrap();
        loader
            .write_project(&Project::new(root_id, Settings::default()))
            .unwrap();
        let index = Arc::new(FakeIndex::default());
        let store = NodeStore::new(loader, index.clone());
        (dir, store, index, root_id)
    }

    fn create(store: &NodeStore, parent: &NodeId, name: &str) -> Node {
        store
            .create_node(
                parent,
                CreateNodeRequest {
                    name: name.to_string(),
                    ..Default::default()
                },
            )
            .unwrap()
    }

    #[test]
    fn test_create_updates_parent_and_index() {
        let (_dir, store, index, root_id) = fixture();
        let a = create(&store, &root_id, "A");

        let root = store.get_node(&root_id).unwrap();
        assert_eq!(root.children, vec![a.id]);

        let records = index.records.lock();
        let record = records.get(&a.id).unwrap();
        assert_eq!(record.depth, 1);
        assert_eq!(record.path, "Root/A");
        assert_eq!(record.parent_id, Some(root_id));
    }

    #[test]
    fn test_create_rejects_duplicate_name_case_insensitively() {
        let (_dir, store, _index, root_id) = fixture();
        create(&store, &root_id, "A");
        let err = store
            .create_node(
                &root_id,
                CreateNodeRequest {
                    name: "  a ".to_string(),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateName { .. }));
        // Project state unchanged.
        assert_eq!(store.get_node(&root_id).unwrap().children.len(), 1);
    }

    #[test]
    fn test_create_requires_name() {
        let (_dir, store, _index, root_id) = fixture();
        let err = store
            .create_node(
                &root_id,
                CreateNodeRequest {
                    name: "   ".to_string(),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, StorageError::NameRequired));
    }

    #[test]
    fn test_create_missing_parent() {
        let (_dir, store, _index, _root) = fixture();
        let ghost = NodeId::generate();
        let err = store
            .create_node(
                &ghost,
                CreateNodeRequest {
                    name: "x".to_string(),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, StorageError::NodeNotFound(_)));
    }

    #[test]
    fn test_rename_reindexes_descendant_paths() {
        let (_dir, store, index, root_id) = fixture();
        let a = create(&store, &root_id, "A");
        let b = create(&store, &a.id, "B");

        store
            .update_node(
                &a.id,
                UpdateNodeRequest {
                    name: Some("Alpha".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        let records = index.records.lock();
        assert_eq!(records.get(&b.id).unwrap().path, "Root/Alpha/B");
    }

    #[test]
    fn test_move_rejects_cycles() {
        let (_dir, store, _index, root_id) = fixture();
        let a = create(&store, &root_id, "A");
        let b = create(&store, &a.id, "B");

        let err = store.move_node(&a.id, &a.id, None).unwrap_err();
        assert!(matches!(err, StorageError::CircularReference(_)));
        let err = store.move_node(&a.id, &b.id, None).unwrap_err();
        assert!(matches!(err, StorageError::CircularReference(_)));
    }

    #[test]
    fn test_move_appends_and_reindexes() {
        let (_dir, store, index, root_id) = fixture();
        let a = create(&store, &root_id, "A");
        let b = create(&store, &a.id, "B");
        let c = create(&store, &b.id, "C");

        store.move_node(&b.id, &root_id, Some(-1)).unwrap();

        let root = store.get_node(&root_id).unwrap();
        assert_eq!(root.children, vec![a.id, b.id]);
        let a_node = store.get_node(&a.id).unwrap();
        assert!(a_node.children.is_empty());

        let records = index.records.lock();
        assert_eq!(records.get(&b.id).unwrap().depth, 1);
        assert_eq!(records.get(&c.id).unwrap().depth, 2);
        assert_eq!(records.get(&c.id).unwrap().path, "Root/B/C");
    }

    #[test]
    fn test_move_same_parent_degrades_to_reorder() {
        let (_dir, store, _index, root_id) = fixture();
        let a = create(&store, &root_id, "A");
        let b = create(&store, &root_id, "B");

        store.move_node(&b.id, &root_id, Some(0)).unwrap();
        let root = store.get_node(&root_id).unwrap();
        assert_eq!(root.children, vec![b.id, a.id]);
    }

    #[test]
    fn test_move_duplicate_name_in_target() {
        let (_dir, store, _index, root_id) = fixture();
        let a = create(&store, &root_id, "A");
        create(&store, &a.id, "Shared");
        let b = create(&store, &root_id, "B");
        let dup = create(&store, &b.id, "shared");

        let err = store.move_node(&dup.id, &a.id, None).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateName { .. }));
    }

    #[test]
    fn test_reorder_requires_exact_set() {
        let (_dir, store, _index, root_id) = fixture();
        let a = create(&store, &root_id, "A");
        let b = create(&store, &root_id, "B");

        store.reorder_children(&root_id, vec![b.id, a.id]).unwrap();
        assert_eq!(store.get_node(&root_id).unwrap().children, vec![b.id, a.id]);

        for bad in [
            vec![a.id],
            vec![a.id, b.id, NodeId::generate()],
            vec![a.id, a.id],
        ] {
            let err = store.reorder_children(&root_id, bad).unwrap_err();
            assert!(matches!(err, StorageError::InvalidInput(_)));
        }
    }

    #[test]
    fn test_delete_removes_subtree_recursively() {
        let (_dir, store, index, root_id) = fixture();
        let a = create(&store, &root_id, "A");
        let b = create(&store, &a.id, "B");
        let c = create(&store, &b.id, "C");

        store.delete_node(&a.id).unwrap();

        for id in [a.id, b.id, c.id] {
            assert!(matches!(
                store.get_node(&id),
                Err(StorageError::NodeNotFound(_))
            ));
            assert!(!index.records.lock().contains_key(&id));
        }
        assert!(store.get_node(&root_id).unwrap().children.is_empty());
    }

    #[test]
    fn test_delete_root_rejected() {
        let (_dir, store, _index, root_id) = fixture();
        assert!(matches!(
            store.delete_node(&root_id),
            Err(StorageError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_node_path_and_depth() {
        let (_dir, store, _index, root_id) = fixture();
        let a = create(&store, &root_id, "A");
        let b = create(&store, &a.id, "B");

        let path = store.node_path(&b.id).unwrap();
        let names: Vec<_> = path.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["Root", "A", "B"]);
        assert_eq!(store.depth_of(&root_id).unwrap(), 0);
        assert_eq!(store.depth_of(&b.id).unwrap(), 2);
    }

    #[test]
    fn test_index_failure_marks_dirty_not_error() {
        let (_dir, store, index, root_id) = fixture();
        index.fail_writes.store(true, Ordering::SeqCst);
        let a = create(&store, &root_id, "A");
        assert!(store.index_dirty());
        // The write itself succeeded.
        assert_eq!(store.get_node(&a.id).unwrap().name, "A");
    }

    #[test]
    fn test_set_and_delete_property() {
        let (_dir, store, _index, root_id) = fixture();
        let a = create(&store, &root_id, "A");
        store.set_property(&a.id, "voltage", Property::number(24)).unwrap();
        assert!(store
            .get_node(&a.id)
            .unwrap()
            .properties
            .contains_key("voltage"));

        assert!(matches!(
            store.set_property(&a.id, "_hidden", Property::boolean(true)),
            Err(StorageError::Validation(_))
        ));

        store.delete_property(&a.id, "voltage").unwrap();
        assert!(matches!(
            store.delete_property(&a.id, "voltage"),
            Err(StorageError::InvalidInput(_))
        ));
    }
}
