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

//! Rebuild parity: after any mutation sequence, a fresh index rebuilt
//! from storage answers queries exactly like the incrementally
//! maintained one.

use archon_core::{Node, NodeId, NodeIndex, Project, Property, Settings};
use archon_index::SqliteIndex;
use archon_storage::{CreateNodeRequest, Loader, NodeStore, UpdateNodeRequest};
use std::sync::Arc;
use tempfile::TempDir;

fn seeded() -> (TempDir, NodeStore, NodeId) {
    let dir = TempDir::new().unwrap();
    let loader = Loader::new(dir.path());
    let root = Node::new("Root");
    let root_id = root.id;
    loader.write_node(&root).unwrap();
    loader
        .write_project(&Project::new(root_id, Settings::default()))
        .unwrap();
    let index = Arc::new(SqliteIndex::open_memory().unwrap());
    let store = NodeStore::new(loader, index.clone());
    index.rebuild(&store.all_records().unwrap()).unwrap();
    (dir, store, root_id)
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

// P5: incremental index ≡ rebuild from a snapshot of storage.
#[test]
fn incremental_matches_rebuild() {
    let (_dir, store, root_id) = seeded();

    let rack = create(&store, &root_id, "Rack");
    let pump = create(&store, &rack.id, "Pump");
    let valve = create(&store, &rack.id, "Valve");
    store
        .set_property(&pump.id, "vendor", Property::text("Grundfos"))
        .unwrap();
    store
        .update_node(
            &valve.id,
            UpdateNodeRequest {
                name: Some("Relief Valve".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    store.move_node(&valve.id, &root_id, Some(0)).unwrap();
    store.delete_node(&pump.id).unwrap();

    let rebuilt = SqliteIndex::open_memory().unwrap();
    rebuilt.rebuild(&store.all_records().unwrap()).unwrap();

    let incremental = store.index();
    for query in ["rack", "relief", "grundfos", "pump", "valve"] {
        let mut a: Vec<NodeId> = incremental
            .search(query, 50)
            .unwrap()
            .into_iter()
            .map(|h| h.node_id)
            .collect();
        let mut b: Vec<NodeId> = rebuilt
            .search(query, 50)
            .unwrap()
            .into_iter()
            .map(|h| h.node_id)
            .collect();
        a.sort();
        b.sort();
        assert_eq!(a, b, "query {query:?} diverged");
    }
    for depth in 0..4 {
        let mut a = incremental.nodes_by_depth(depth, 50).unwrap();
        let mut b = rebuilt.nodes_by_depth(depth, 50).unwrap();
        a.sort();
        b.sort();
        assert_eq!(a, b, "depth {depth} diverged");
    }
}

// Scenario: move + depth query through the real index.
#[test]
fn depth_query_tracks_moves() {
    let (_dir, store, root_id) = seeded();
    let a = create(&store, &root_id, "A");
    let b = create(&store, &a.id, "B");
    create(&store, &a.id, "C");

    store.move_node(&b.id, &root_id, Some(-1)).unwrap();

    let depth1 = store.index().nodes_by_depth(1, 10).unwrap();
    assert!(depth1.contains(&a.id) && depth1.contains(&b.id));
}
