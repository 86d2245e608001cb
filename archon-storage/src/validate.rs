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

//! Whole-tree integrity checking.
//!
//! Walks every node file and reports violations of the structural
//! invariants: orphans, dangling or duplicated child references, cycles,
//! and sibling name collisions. Used by tests and as a GC preflight;
//! mutation paths enforce the same rules incrementally.

use crate::error::StorageResult;
use crate::loader::Loader;
use archon_core::{names_collide, Node, NodeId, ValidationError};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Check every structural invariant across the project.
///
/// Returns an empty list when the tree is sound. Unreadable node files
/// are themselves reported as violations.
pub fn validate_tree(loader: &Loader) -> StorageResult<Vec<ValidationError>> {
    let mut errors = Vec::new();

    let project = loader.read_project()?;
    let ids = loader.list_node_ids()?;
    let id_set: HashSet<NodeId> = ids.iter().copied().collect();

    let mut nodes: HashMap<NodeId, Node> = HashMap::with_capacity(ids.len());
    for id in &ids {
        match loader.read_node(id) {
            Ok(node) => {
                if node.id != *id {
                    errors.push(ValidationError::new(
                        format!("nodes.{id}"),
                        format!("file name disagrees with embedded id {}", node.id),
                    ));
                }
                nodes.insert(*id, node);
            }
            Err(e) => {
                warn!(node = %id, error = %e, "unreadable node file");
                errors.push(ValidationError::new(
                    format!("nodes.{id}"),
                    format!("unreadable: {e}"),
                ));
            }
        }
    }

    if !id_set.contains(&project.root_id) {
        errors.push(ValidationError::new(
            "project.rootId",
            format!("root node {} has no file", project.root_id),
        ));
    }

    // Each node must be referenced by exactly one parent, except the root.
    let mut reference_counts: HashMap<NodeId, usize> = HashMap::new();
    for (id, node) in &nodes {
        let mut seen = HashSet::new();
        for child_id in &node.children {
            if !seen.insert(*child_id) {
                errors.push(ValidationError::new(
                    format!("nodes.{id}.children"),
                    format!("duplicate reference to {child_id}"),
                ));
            }
            if !id_set.contains(child_id) {
                errors.push(ValidationError::new(
                    format!("nodes.{id}.children"),
                    format!("dangling reference to {child_id}"),
                ));
            }
            *reference_counts.entry(*child_id).or_default() += 1;
        }

        // Sibling name collisions.
        let children: Vec<&Node> = node
            .children
            .iter()
            .filter_map(|child_id| nodes.get(child_id))
            .collect();
        for (i, a) in children.iter().enumerate() {
            for b in &children[i + 1..] {
                if names_collide(&a.name, &b.name) {
                    errors.push(ValidationError::new(
                        format!("nodes.{id}.children"),
                        format!("sibling name collision: {:?} vs {:?}", a.name, b.name),
                    ));
                }
            }
        }
    }

    for id in &ids {
        let count = reference_counts.get(id).copied().unwrap_or(0);
        if *id == project.root_id {
            if count != 0 {
                errors.push(ValidationError::new(
                    format!("nodes.{id}"),
                    "the root node must not appear in any children list",
                ));
            }
        } else if count == 0 {
            errors.push(ValidationError::new(
                format!("nodes.{id}"),
                "orphan: referenced by no parent",
            ));
        } else if count > 1 {
            errors.push(ValidationError::new(
                format!("nodes.{id}"),
                format!("referenced by {count} parents"),
            ));
        }
    }

    // Every parent chain must terminate at the root within N steps.
    let parent_of: HashMap<NodeId, NodeId> = nodes
        .iter()
        .flat_map(|(id, node)| node.children.iter().map(|child| (*child, *id)))
        .collect();
    for id in &ids {
        let mut current = *id;
        let mut steps = 0usize;
        loop {
            if current == project.root_id {
                break;
            }
            match parent_of.get(&current) {
                Some(parent) => current = *parent,
                None => break, // orphan, already reported
            }
            steps += 1;
            if steps > ids.len() {
                errors.push(ValidationError::new(
                    format!("nodes.{id}"),
                    "parent chain does not terminate at the root (cycle)",
                ));
                break;
            }
        }
    }

    Ok(errors)
}
