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

//! Semantic diff over node IDs.
//!
//! Instead of comparing file paths, both refs are loaded into ID-keyed
//! tree states and compared node by node: an ID whose parent changed is
//! a *move*, never a remove-plus-add, and content changes are reported
//! at (node, property-key) granularity. Child reordering is a structural
//! change of the parent, distinct from moves.

use crate::backend::GitBackend;
use crate::error::VcsResult;
use archon_core::{layout, Node, NodeId, Property};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// ID-keyed view of one tree at one ref.
#[derive(Debug, Clone, Default)]
pub struct TreeState {
    pub nodes: HashMap<NodeId, Node>,
    pub parent_of: HashMap<NodeId, NodeId>,
}

impl TreeState {
    pub fn from_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        let nodes: HashMap<NodeId, Node> =
            nodes.into_iter().map(|node| (node.id, node)).collect();
        let parent_of = nodes
            .values()
            .flat_map(|node| node.children.iter().map(|child| (*child, node.id)))
            .collect();
        Self { nodes, parent_of }
    }

    /// Load the node files under `nodes/` at `reference`.
    pub fn load(backend: &dyn GitBackend, reference: &str) -> VcsResult<Self> {
        let mut nodes = Vec::new();
        for filename in backend.list_dir_at(reference, layout::NODES_DIR)? {
            let Some(stem) = filename.strip_suffix(".json") else {
                continue;
            };
            if NodeId::parse(stem).is_err() {
                continue;
            }
            let path = format!("{}/{}", layout::NODES_DIR, filename);
            let Some(raw) = backend.read_file_at(reference, &path)? else {
                continue;
            };
            match serde_json::from_slice::<Node>(&raw) {
                Ok(node) => nodes.push(node),
                Err(e) => warn!(file = %filename, reference, error = %e, "unparseable node at ref"),
            }
        }
        Ok(Self::from_nodes(nodes))
    }

    pub fn parent(&self, id: &NodeId) -> Option<NodeId> {
        self.parent_of.get(id).copied()
    }
}

/// A change to one field of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "camelCase")]
pub enum FieldChange {
    Name {
        from: String,
        to: String,
    },
    Description {
        from: Option<String>,
        to: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Property {
        key: String,
        from: Option<Property>,
        to: Option<Property>,
    },
    /// Same child set, different order.
    ChildrenReordered,
}

/// One node-level change between two refs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NodeChange {
    #[serde(rename_all = "camelCase")]
    Added { id: NodeId, parent: Option<NodeId> },
    #[serde(rename_all = "camelCase")]
    Removed { id: NodeId },
    #[serde(rename_all = "camelCase")]
    Moved {
        id: NodeId,
        from_parent: Option<NodeId>,
        to_parent: Option<NodeId>,
    },
    #[serde(rename_all = "camelCase")]
    Modified {
        id: NodeId,
        changes: Vec<FieldChange>,
    },
}

/// Full semantic diff between two refs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticDiff {
    pub changes: Vec<NodeChange>,
}

impl SemanticDiff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Diff the trees at two refs.
pub fn semantic_diff(
    backend: &dyn GitBackend,
    ref_a: &str,
    ref_b: &str,
) -> VcsResult<SemanticDiff> {
    let a = TreeState::load(backend, ref_a)?;
    let b = TreeState::load(backend, ref_b)?;
    Ok(diff_states(&a, &b))
}

/// Diff two loaded tree states (`a` is the old side).
pub fn diff_states(a: &TreeState, b: &TreeState) -> SemanticDiff {
    let mut changes = Vec::new();

    let mut ids: Vec<NodeId> = a.nodes.keys().chain(b.nodes.keys()).copied().collect();
    ids.sort();
    ids.dedup();

    for id in ids {
        match (a.nodes.get(&id), b.nodes.get(&id)) {
            (None, Some(_)) => changes.push(NodeChange::Added {
                id,
                parent: b.parent(&id),
            }),
            (Some(_), None) => changes.push(NodeChange::Removed { id }),
            (Some(old), Some(new)) => {
                if a.parent(&id) != b.parent(&id) {
                    changes.push(NodeChange::Moved {
                        id,
                        from_parent: a.parent(&id),
                        to_parent: b.parent(&id),
                    });
                }
                let field_changes = diff_fields(old, new);
                if !field_changes.is_empty() {
                    changes.push(NodeChange::Modified {
                        id,
                        changes: field_changes,
                    });
                }
            }
            (None, None) => unreachable!("id came from one of the maps"),
        }
    }

    SemanticDiff { changes }
}

fn diff_fields(old: &Node, new: &Node) -> Vec<FieldChange> {
    let mut changes = Vec::new();

    if old.name != new.name {
        changes.push(FieldChange::Name {
            from: old.name.clone(),
            to: new.name.clone(),
        });
    }
    if old.description != new.description {
        changes.push(FieldChange::Description {
            from: old.description.clone(),
            to: new.description.clone(),
        });
    }

    let mut keys: Vec<&String> = old.properties.keys().chain(new.properties.keys()).collect();
    keys.sort();
    keys.dedup();
    for key in keys {
        let from = old.properties.get(key);
        let to = new.properties.get(key);
        if from != to {
            changes.push(FieldChange::Property {
                key: key.clone(),
                from: from.cloned(),
                to: to.cloned(),
            });
        }
    }

    if children_reordered(&old.children, &new.children) {
        changes.push(FieldChange::ChildrenReordered);
    }

    changes
}

/// True when the children common to both sides appear in a different
/// relative order. Pure additions/removals are reported on the children
/// themselves, not as a reorder of the parent.
fn children_reordered(old: &[NodeId], new: &[NodeId]) -> bool {
    let old_common: Vec<NodeId> = old.iter().filter(|id| new.contains(id)).copied().collect();
    let new_common: Vec<NodeId> = new.iter().filter(|id| old.contains(id)).copied().collect();
    old_common != new_common
}
