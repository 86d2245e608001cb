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

//! End-to-end lifecycle scenarios through the full service surface.

use archon_core::{
    ErrorCode, Node, NodeId, Project, Settings, SnapshotRequest, CURRENT_SCHEMA_VERSION,
};
use archon_engine::{LoggingService, ProjectController};
use archon_storage::{CreateNodeRequest, Loader};
use serde_json::json;
use tempfile::TempDir;

fn controller() -> ProjectController {
    ProjectController::new(LoggingService::detached("info"))
}

async fn create_child(
    controller: &ProjectController,
    parent: NodeId,
    name: &str,
) -> archon_core::Result<Node> {
    controller
        .create_node(
            parent,
            CreateNodeRequest {
                name: name.to_string(),
                ..Default::default()
            },
        )
        .await
}

// Scenario 1: create a project, build a small tree, snapshot it.
#[tokio::test]
async fn create_and_snapshot() {
    let dir = TempDir::new().unwrap();
    let controller = controller();
    let info = controller
        .create_project(dir.path(), Settings::default())
        .unwrap();
    assert!(!info.read_only);
    assert_eq!(info.schema_version, CURRENT_SCHEMA_VERSION);

    let root = info.root_id;
    let a1 = create_child(&controller, root, "A").await.unwrap();
    let b1 = create_child(&controller, a1.id, "B").await.unwrap();

    controller
        .create_snapshot(SnapshotRequest {
            name: "v1".to_string(),
            message: "initial".to_string(),
            description: None,
            labels: Vec::new(),
        })
        .await
        .unwrap();

    let snapshots = controller.list_snapshots().unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].name, "v1");

    // Project init + the snapshot commit.
    assert_eq!(controller.get_snapshot_history(10).unwrap().len(), 2);

    let path = controller.get_node_path(b1.id).unwrap();
    let ids: Vec<NodeId> = path.iter().map(|n| n.id).collect();
    let names: Vec<&str> = path.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(ids, vec![root, a1.id, b1.id]);
    assert_eq!(names, vec!["Root", "A", "B"]);
}

// Scenario 2: move with subtree reindex.
#[tokio::test]
async fn move_with_subtree_reindex() {
    let dir = TempDir::new().unwrap();
    let controller = controller();
    let info = controller
        .create_project(dir.path(), Settings::default())
        .unwrap();
    let root = info.root_id;

    let a1 = create_child(&controller, root, "A").await.unwrap();
    let b1 = create_child(&controller, a1.id, "B").await.unwrap();
    let _c1 = create_child(&controller, b1.id, "C").await.unwrap();

    controller.move_node(b1.id, root, Some(-1)).await.unwrap();

    let root_node = controller.get_root_node().unwrap();
    assert_eq!(root_node.children, vec![a1.id, b1.id]);

    let depth1 = controller.nodes_by_depth(1, 10).unwrap();
    assert!(depth1.contains(&a1.id) && depth1.contains(&b1.id));
    let depth2 = controller.nodes_by_depth(2, 10).unwrap();
    assert_eq!(depth2.len(), 1); // C moved up with its parent
}

// Scenario 3: duplicate sibling names are rejected, state unchanged.
#[tokio::test]
async fn duplicate_sibling_rejected() {
    let dir = TempDir::new().unwrap();
    let controller = controller();
    let info = controller
        .create_project(dir.path(), Settings::default())
        .unwrap();
    let root = info.root_id;
    let a1 = create_child(&controller, root, "A").await.unwrap();
    let b1 = create_child(&controller, root, "B").await.unwrap();

    let err = create_child(&controller, root, "a").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::DuplicateName);
    assert_eq!(controller.get_root_node().unwrap().children, vec![a1.id, b1.id]);
}

// Scenario 4: newer-than-supported schema opens read-only, writes are
// rejected, and no backup is taken.
#[tokio::test]
async fn read_only_on_newer_schema() {
    let dir = TempDir::new().unwrap();
    let loader = Loader::new(dir.path());
    let root = Node::new("Root");
    loader.write_node(&root).unwrap();
    let mut project = Project::new(root.id, Settings::default());
    project.schema_version = CURRENT_SCHEMA_VERSION + 1;
    loader.write_project(&project).unwrap();

    let controller = controller();
    let info = controller.open_project(dir.path()).unwrap();
    assert!(info.read_only);
    assert_eq!(info.schema_version, CURRENT_SCHEMA_VERSION + 1);

    let err = controller
        .update_settings(serde_json::Map::from_iter([(
            "k".to_string(),
            json!("v"),
        )]))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::SchemaVersion);

    let err = create_child(&controller, root.id, "X").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::SchemaVersion);

    assert!(!dir.path().join("backups").exists());
    // Reads still work.
    assert_eq!(controller.get_root_node().unwrap().id, root.id);
}

// Scenario 5: older schema is backed up and migrated forward on open.
#[tokio::test]
async fn forward_migration_on_open() {
    let dir = TempDir::new().unwrap();
    let root = Node::new("Root");
    std::fs::create_dir_all(dir.path().join("nodes")).unwrap();
    std::fs::write(
        dir.path().join("nodes").join(format!("{}.json", root.id)),
        format!(r#"{{"id": "{}", "name": "Root", "properties": {{"legacy": 5}}}}"#, root.id),
    )
    .unwrap();
    std::fs::write(
        dir.path().join("project.json"),
        format!(r#"{{"rootId": "{}", "schemaVersion": 0}}"#, root.id),
    )
    .unwrap();

    let controller = controller();
    let info = controller.open_project(dir.path()).unwrap();
    assert!(!info.read_only);
    assert_eq!(info.schema_version, CURRENT_SCHEMA_VERSION);

    // Backup directory holds the pre-migration project.json.
    let backups: Vec<_> = std::fs::read_dir(dir.path().join("backups"))
        .unwrap()
        .collect();
    assert_eq!(backups.len(), 1);
    let backup_project = backups[0].as_ref().unwrap().path().join("project.json");
    assert!(backup_project.is_file());

    // The legacy property was normalized and the node parses today.
    let migrated = controller.get_node(root.id).unwrap();
    assert!(migrated.properties.contains_key("legacy"));
}

// Scenario 6 (service layer): grants + policy control secrets access.
#[tokio::test]
async fn plugin_secrets_through_services() {
    let dir = TempDir::new().unwrap();
    let controller = controller();
    controller
        .create_project(dir.path(), Settings::default())
        .unwrap();

    // Seed a secret directly, as an operator would.
    let secrets = archon_plugins::SecretsStore::open(dir.path()).unwrap();
    secrets.set("jira.token", "S").unwrap();
    // Reopen so the host sees the stored secret and default policy.
    let info = controller.open_project(dir.path()).unwrap();
    assert!(!info.read_only);

    controller
        .grant_permission("sync-bot", "secrets:jira*", false, 0)
        .unwrap();
    let host = controller.plugin_host().unwrap();
    let value = host
        .secrets_get("sync-bot", "jira.token".to_string())
        .await
        .unwrap();
    assert!(value.redacted);
    assert_eq!(value.value, "");

    // Flip the policy and re-open: raw values flow.
    controller
        .update_settings(serde_json::Map::from_iter([(
            "secretsPolicy".to_string(),
            json!({ "returnValues": true }),
        )]))
        .await
        .unwrap();
    controller.open_project(dir.path()).unwrap();
    controller
        .grant_permission("sync-bot", "secrets:jira*", false, 0)
        .unwrap();
    let host = controller.plugin_host().unwrap();
    let value = host
        .secrets_get("sync-bot", "jira.token".to_string())
        .await
        .unwrap();
    assert!(!value.redacted);
    assert_eq!(value.value, "S");

    // Without the grant the call is unauthorized regardless of policy.
    let err = host
        .secrets_get("other-bot", "jira.token".to_string())
        .await
        .unwrap_err();
    assert_eq!(
        archon_core::ArchonError::from(err).code,
        ErrorCode::Unauthorized
    );
}

#[tokio::test]
async fn open_close_and_exists() {
    let dir = TempDir::new().unwrap();
    let controller = controller();
    assert!(!controller.project_exists(dir.path()));
    assert!(matches!(
        controller.open_project(dir.path()),
        Err(e) if e.code == ErrorCode::ProjectNotFound
    ));

    controller
        .create_project(dir.path(), Settings::default())
        .unwrap();
    assert!(controller.project_exists(dir.path()));
    assert!(controller.is_open());

    assert!(matches!(
        controller.create_project(dir.path(), Settings::default()),
        Err(e) if e.code == ErrorCode::ProjectExists
    ));

    controller.close_project().unwrap();
    assert!(!controller.is_open());
    assert!(matches!(
        controller.close_project(),
        Err(e) if e.code == ErrorCode::NoProject
    ));
    assert!(matches!(
        controller.get_root_node(),
        Err(e) if e.code == ErrorCode::NoProject
    ));
}

#[tokio::test]
async fn search_via_index_service() {
    let dir = TempDir::new().unwrap();
    let controller = controller();
    let info = controller
        .create_project(dir.path(), Settings::default())
        .unwrap();
    let pump = create_child(&controller, info.root_id, "Hydraulic Pump")
        .await
        .unwrap();

    let hits = controller.search("hydraulic", 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].node_id, pump.id);

    let rebuilt = controller.rebuild_index().await.unwrap();
    assert_eq!(rebuilt, 2);
    assert_eq!(controller.search("hydraulic", 10).unwrap().len(), 1);
}
