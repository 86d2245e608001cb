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

//! Three-way merge at field granularity.
//!
//! For each node the merge compares base, ours, and theirs field by
//! field: an edit on one side only wins automatically; edits on both
//! sides that agree collapse; disagreements become explicit conflicts.
//! The engine never guesses — every conflict carries all three values
//! so a caller (or a human) can resolve it deliberately.

use crate::diff::TreeState;
use archon_core::{Node, NodeId, Property};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which branch an operation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Ours,
    Theirs,
}

/// One unresolved merge conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MergeConflict {
    /// Both branches changed the same property relative to base.
    #[serde(rename_all = "camelCase")]
    Property {
        id: NodeId,
        key: String,
        base: Option<Property>,
        ours: Option<Property>,
        theirs: Option<Property>,
    },
    #[serde(rename_all = "camelCase")]
    Name {
        id: NodeId,
        base: String,
        ours: String,
        theirs: String,
    },
    #[serde(rename_all = "camelCase")]
    Description {
        id: NodeId,
        base: Option<String>,
        ours: Option<String>,
        theirs: Option<String>,
    },
    /// One branch deleted a node the other modified or moved.
    #[serde(rename_all = "camelCase")]
    DeleteModify { id: NodeId, deleted_by: Side },
    /// Both branches moved the node under different parents.
    #[serde(rename_all = "camelCase")]
    DoubleMove {
        id: NodeId,
        ours_parent: Option<NodeId>,
        theirs_parent: Option<NodeId>,
    },
    /// Both branches reordered the same child list differently.
    #[serde(rename_all = "camelCase")]
    ChildOrder { id: NodeId },
}

impl MergeConflict {
    pub fn node_id(&self) -> NodeId {
        match self {
            MergeConflict::Property { id, .. }
            | MergeConflict::Name { id, .. }
            | MergeConflict::Description { id, .. }
            | MergeConflict::DeleteModify { id, .. }
            | MergeConflict::DoubleMove { id, .. }
            | MergeConflict::ChildOrder { id } => *id,
        }
    }
}

/// Outcome of a three-way merge: resolved nodes plus whatever needs a
/// human.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeResult {
    pub merged: Vec<Node>,
    pub conflicts: Vec<MergeConflict>,
}

impl MergeResult {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// Whether a node differs from base in content or parent.
fn edited(base: &TreeState, side: &TreeState, id: &NodeId) -> bool {
    match (base.nodes.get(id), side.nodes.get(id)) {
        (Some(b), Some(s)) => {
            b.name != s.name
                || b.description != s.description
                || b.properties != s.properties
                || b.children != s.children
                || base.parent(id) != side.parent(id)
        }
        _ => true,
    }
}

/// Merge `ours` and `theirs` against their common `base`.
pub fn three_way_merge(base: &TreeState, ours: &TreeState, theirs: &TreeState) -> MergeResult {
    let mut merged = Vec::new();
    let mut conflicts = Vec::new();

    let ids: BTreeSet<NodeId> = base
        .nodes
        .keys()
        .chain(ours.nodes.keys())
        .chain(theirs.nodes.keys())
        .copied()
        .collect();

    for id in ids {
        let in_base = base.nodes.get(&id);
        let in_ours = ours.nodes.get(&id);
        let in_theirs = theirs.nodes.get(&id);

        match (in_base, in_ours, in_theirs) {
            // Added on one side only.
            (None, Some(node), None) => merged.push(node.clone()),
            (None, None, Some(node)) => merged.push(node.clone()),
            // Added on both sides with the same ID: merge with empty base.
            (None, Some(our_node), Some(their_node)) => {
                merge_node(
                    &id, None, our_node, their_node, base, ours, theirs, &mut merged,
                    &mut conflicts,
                );
            }
            // Deleted on both sides.
            (Some(_), None, None) => {}
            // Deleted on one side; conflict if the survivor edited it.
            (Some(_), Some(survivor), None) => {
                if edited(base, ours, &id) {
                    conflicts.push(MergeConflict::DeleteModify {
                        id,
                        deleted_by: Side::Theirs,
                    });
                    merged.push(survivor.clone());
                }
            }
            (Some(_), None, Some(survivor)) => {
                if edited(base, theirs, &id) {
                    conflicts.push(MergeConflict::DeleteModify {
                        id,
                        deleted_by: Side::Ours,
                    });
                    merged.push(survivor.clone());
                }
            }
            (Some(base_node), Some(our_node), Some(their_node)) => {
                merge_node(
                    &id,
                    Some(base_node),
                    our_node,
                    their_node,
                    base,
                    ours,
                    theirs,
                    &mut merged,
                    &mut conflicts,
                );
            }
            (None, None, None) => unreachable!("id came from one of the maps"),
        }
    }

    MergeResult { merged, conflicts }
}

#[allow(clippy::too_many_arguments)]
fn merge_node(
    id: &NodeId,
    base_node: Option<&Node>,
    our_node: &Node,
    their_node: &Node,
    base: &TreeState,
    ours: &TreeState,
    theirs: &TreeState,
    merged: &mut Vec<Node>,
    conflicts: &mut Vec<MergeConflict>,
) {
    let mut result = our_node.clone();
    result.updated_at = our_node.updated_at.max(their_node.updated_at);

    // Parent placement (moves).
    let base_parent = base.parent(id);
    let our_parent = ours.parent(id);
    let their_parent = theirs.parent(id);
    if our_parent != their_parent && our_parent != base_parent && their_parent != base_parent {
        conflicts.push(MergeConflict::DoubleMove {
            id: *id,
            ours_parent: our_parent,
            theirs_parent: their_parent,
        });
    }

    // Name.
    let base_name = base_node.map(|n| n.name.as_str());
    if our_node.name != their_node.name {
        if Some(our_node.name.as_str()) == base_name {
            result.name = their_node.name.clone();
        } else if Some(their_node.name.as_str()) == base_name {
            // ours already in result
        } else {
            conflicts.push(MergeConflict::Name {
                id: *id,
                base: base_name.unwrap_or_default().to_string(),
                ours: our_node.name.clone(),
                theirs: their_node.name.clone(),
            });
        }
    }

    // Description.
    let base_description = base_node.and_then(|n| n.description.clone());
    if our_node.description != their_node.description {
        if our_node.description == base_description {
            result.description = their_node.description.clone();
        } else if their_node.description == base_description {
            // ours already in result
        } else {
            conflicts.push(MergeConflict::Description {
                id: *id,
                base: base_description,
                ours: our_node.description.clone(),
                theirs: their_node.description.clone(),
            });
        }
    }

    // Properties, key by key.
    let keys: BTreeSet<&String> = our_node
        .properties
        .keys()
        .chain(their_node.properties.keys())
        .chain(base_node.map(|n| n.properties.keys()).into_iter().flatten())
        .collect();
    for key in keys {
        let base_value = base_node.and_then(|n| n.properties.get(key));
        let our_value = our_node.properties.get(key);
        let their_value = their_node.properties.get(key);

        let resolved = if our_value == their_value {
            our_value
        } else if our_value == base_value {
            their_value
        } else if their_value == base_value {
            our_value
        } else {
            conflicts.push(MergeConflict::Property {
                id: *id,
                key: key.clone(),
                base: base_value.cloned(),
                ours: our_value.cloned(),
                theirs: their_value.cloned(),
            });
            our_value
        };
        match resolved {
            Some(property) => {
                result.properties.insert(key.clone(), property.clone());
            }
            None => {
                result.properties.remove(key);
            }
        }
    }

    // Child order: base order is preserved where unchanged; divergent
    // orders need explicit resolution.
    let base_children = base_node.map(|n| n.children.as_slice());
    if our_node.children != their_node.children {
        if Some(our_node.children.as_slice()) == base_children {
            result.children = their_node.children.clone();
        } else if Some(their_node.children.as_slice()) == base_children {
            // ours already in result
        } else {
            conflicts.push(MergeConflict::ChildOrder { id: *id });
        }
    }

    merged.push(result);
}

#[cfg(test)]
mod tests {
    use super::*;
    use archon_core::Property;

    fn base_tree() -> (Node, Node, Node) {
        let mut root = Node::new("Root");
        let mut a = Node::new("A");
        let b = Node::new("B");
        a.properties
            .insert("voltage".to_string(), Property::number(12));
        a.properties
            .insert("vendor".to_string(), Property::text("acme"));
        root.children = vec![a.id, b.id];
        (root, a, b)
    }

    fn state(nodes: &[&Node]) -> TreeState {
        TreeState::from_nodes(nodes.iter().map(|n| (*n).clone()))
    }

    // P8: disjoint property edits merge without conflicts into the
    // element-wise union.
    #[test]
    fn test_disjoint_property_edits_auto_merge() {
        let (root, a, b) = base_tree();
        let base = state(&[&root, &a, &b]);

        let mut a_ours = a.clone();
        a_ours
            .properties
            .insert("voltage".to_string(), Property::number(24));
        let ours = state(&[&root, &a_ours, &b]);

        let mut a_theirs = a.clone();
        a_theirs
            .properties
            .insert("vendor".to_string(), Property::text("globex"));
        let theirs = state(&[&root, &a_theirs, &b]);

        let result = three_way_merge(&base, &ours, &theirs);
        assert!(result.is_clean(), "conflicts: {:?}", result.conflicts);

        let merged_a = result.merged.iter().find(|n| n.id == a.id).unwrap();
        assert_eq!(merged_a.properties["voltage"], Property::number(24));
        assert_eq!(merged_a.properties["vendor"], Property::text("globex"));
    }

    #[test]
    fn test_same_key_double_edit_conflicts() {
        let (root, a, b) = base_tree();
        let base = state(&[&root, &a, &b]);

        let mut a_ours = a.clone();
        a_ours
            .properties
            .insert("voltage".to_string(), Property::number(24));
        let mut a_theirs = a.clone();
        a_theirs
            .properties
            .insert("voltage".to_string(), Property::number(48));

        let result = three_way_merge(&base, &state(&[&root, &a_ours, &b]), &state(&[&root, &a_theirs, &b]));
        assert_eq!(result.conflicts.len(), 1);
        assert!(matches!(
            &result.conflicts[0],
            MergeConflict::Property { key, .. } if key == "voltage"
        ));
    }

    #[test]
    fn test_delete_vs_modify_conflicts() {
        let (root, a, b) = base_tree();
        let base = state(&[&root, &a, &b]);

        // Ours deletes A; theirs edits it.
        let mut root_ours = root.clone();
        root_ours.children = vec![b.id];
        let ours = state(&[&root_ours, &b]);

        let mut a_theirs = a.clone();
        a_theirs.description = Some("still needed".to_string());
        let theirs = state(&[&root, &a_theirs, &b]);

        let result = three_way_merge(&base, &ours, &theirs);
        assert!(result.conflicts.iter().any(|c| matches!(
            c,
            MergeConflict::DeleteModify { id, deleted_by: Side::Ours } if *id == a.id
        )));
        // The modified survivor is kept pending resolution.
        assert!(result.merged.iter().any(|n| n.id == a.id));
    }

    #[test]
    fn test_delete_vs_untouched_deletes() {
        let (root, a, b) = base_tree();
        let base = state(&[&root, &a, &b]);

        let mut root_ours = root.clone();
        root_ours.children = vec![b.id];
        let ours = state(&[&root_ours, &b]);
        let theirs = state(&[&root, &a, &b]);

        let result = three_way_merge(&base, &ours, &theirs);
        assert!(result.is_clean());
        assert!(!result.merged.iter().any(|n| n.id == a.id));
    }

    #[test]
    fn test_double_move_conflicts() {
        let mut root = Node::new("Root");
        let mut p1 = Node::new("P1");
        let mut p2 = Node::new("P2");
        let x = Node::new("X");
        root.children = vec![p1.id, p2.id];
        p1.children = vec![x.id];
        let base = state(&[&root, &p1, &p2, &x]);

        // Ours moves X under P2.
        let mut p1_ours = p1.clone();
        p1_ours.children.clear();
        let mut p2_ours = p2.clone();
        p2_ours.children = vec![x.id];
        let ours = state(&[&root, &p1_ours, &p2_ours, &x]);

        // Theirs moves X under the root.
        let mut p1_theirs = p1.clone();
        p1_theirs.children.clear();
        let mut root_theirs = root.clone();
        root_theirs.children = vec![p1.id, p2.id, x.id];
        let theirs = state(&[&root_theirs, &p1_theirs, &p2, &x]);

        let result = three_way_merge(&base, &ours, &theirs);
        assert!(result.conflicts.iter().any(|c| matches!(
            c,
            MergeConflict::DoubleMove { id, .. } if *id == x.id
        )));
    }

    #[test]
    fn test_conflicting_reorder_surfaces() {
        let mut root = Node::new("Root");
        let a = Node::new("A");
        let b = Node::new("B");
        let c = Node::new("C");
        root.children = vec![a.id, b.id, c.id];
        let base = state(&[&root, &a, &b, &c]);

        let mut root_ours = root.clone();
        root_ours.children = vec![b.id, a.id, c.id];
        let ours = state(&[&root_ours, &a, &b, &c]);

        let mut root_theirs = root.clone();
        root_theirs.children = vec![c.id, b.id, a.id];
        let theirs = state(&[&root_theirs, &a, &b, &c]);

        let result = three_way_merge(&base, &ours, &theirs);
        assert!(result.conflicts.iter().any(|conflict| matches!(
            conflict,
            MergeConflict::ChildOrder { id } if *id == root.id
        )));
    }

    #[test]
    fn test_one_sided_reorder_wins() {
        let mut root = Node::new("Root");
        let a = Node::new("A");
        let b = Node::new("B");
        root.children = vec![a.id, b.id];
        let base = state(&[&root, &a, &b]);

        let mut root_theirs = root.clone();
        root_theirs.children = vec![b.id, a.id];
        let result = three_way_merge(&base, &base.clone(), &state(&[&root_theirs, &a, &b]));

        assert!(result.is_clean());
        let merged_root = result.merged.iter().find(|n| n.id == root.id).unwrap();
        assert_eq!(merged_root.children, vec![b.id, a.id]);
    }

    #[test]
    fn test_additions_from_both_sides_union() {
        let (root, a, b) = base_tree();
        let base = state(&[&root, &a, &b]);

        let mut root_ours = root.clone();
        let ours_new = Node::new("OursNew");
        root_ours.children.push(ours_new.id);
        let ours = state(&[&root_ours, &a, &b, &ours_new]);

        let mut root_theirs = root.clone();
        let theirs_new = Node::new("TheirsNew");
        root_theirs.children.push(theirs_new.id);
        let theirs = state(&[&root_theirs, &a, &b, &theirs_new]);

        let result = three_way_merge(&base, &ours, &theirs);
        // Both additions survive; the parent's diverged child lists are a
        // structural conflict to resolve explicitly.
        assert!(result.merged.iter().any(|n| n.id == ours_new.id));
        assert!(result.merged.iter().any(|n| n.id == theirs_new.id));
    }
}
