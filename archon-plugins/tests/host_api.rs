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

//! Host API behavior: capability checks, read-only latching, secrets
//! redaction, and batch atomicity.

use archon_core::{Author, Node, NodeId, Project, Settings};
use archon_index::ScanIndex;
use archon_plugins::{
    Capability, HostConfig, Mutation, Permission, PermissionRegistry, PluginError, PluginHost,
    SecretsStore,
};
use archon_storage::{Loader, NodeStore};
use archon_vcs::{Git2Backend, GitBackend, SnapshotManager};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    host: PluginHost,
    registry: Arc<PermissionRegistry>,
    nodes: Arc<NodeStore>,
    root_id: NodeId,
    read_only: Arc<AtomicBool>,
}

fn fixture(return_secret_values: bool) -> Fixture {
    let dir = TempDir::new().unwrap();
    let loader = Loader::new(dir.path());
    let root = Node::new("Root");
    let root_id = root.id;
    loader.write_node(&root).unwrap();
    loader
        .write_project(&Project::new(root_id, Settings::default()))
        .unwrap();

    let backend = Arc::new(Git2Backend::init(dir.path()).unwrap());
    backend.stage_all().unwrap();
    backend.commit("init", &Author::default()).unwrap();

    let nodes = Arc::new(NodeStore::new(loader, Arc::new(ScanIndex::new())));
    let snapshots = Arc::new(SnapshotManager::new(backend, dir.path()));
    let secrets = Arc::new(SecretsStore::open(dir.path()).unwrap());
    secrets.set("jira.token", "S").unwrap();
    secrets.set("aws.key", "K").unwrap();

    let registry = Arc::new(PermissionRegistry::new());
    let read_only = Arc::new(AtomicBool::new(false));
    let host = PluginHost::new(
        Arc::clone(&nodes),
        snapshots,
        secrets,
        Arc::clone(&registry),
        Arc::clone(&read_only),
        return_secret_values,
        HostConfig::default(),
    );
    Fixture {
        _dir: dir,
        host,
        registry,
        nodes,
        root_id,
        read_only,
    }
}

// P10: no grant -> UNAUTHORIZED, and no observable side effects.
#[tokio::test]
async fn ungranted_calls_fail_without_side_effects() {
    let fx = fixture(false);

    let err = fx.host.get_node("rogue", fx.root_id).await.unwrap_err();
    assert!(matches!(err, PluginError::Unauthorized { .. }));

    let err = fx
        .host
        .apply_mutations(
            "rogue",
            vec![Mutation::Create {
                parent_id: fx.root_id,
                name: "intruder".to_string(),
                description: None,
                properties: None,
            }],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PluginError::Unauthorized { .. }));
    assert!(fx.nodes.get_node(&fx.root_id).unwrap().children.is_empty());

    // Secrets: denial reveals nothing, not even for nonexistent keys.
    let existing = fx.host.secrets_get("rogue", "jira.token".to_string()).await;
    let missing = fx.host.secrets_get("rogue", "no.such.key".to_string()).await;
    assert!(matches!(existing, Err(PluginError::Unauthorized { .. })));
    assert!(matches!(missing, Err(PluginError::Unauthorized { .. })));
}

#[tokio::test]
async fn granted_reads_and_writes_work() {
    let fx = fixture(false);
    fx.registry
        .grant("bot", Permission::new(Capability::NodesRead), None);
    fx.registry
        .grant("bot", Permission::new(Capability::NodesWrite), None);

    let applied = fx
        .host
        .apply_mutations(
            "bot",
            vec![
                Mutation::Create {
                    parent_id: fx.root_id,
                    name: "A".to_string(),
                    description: None,
                    properties: None,
                },
                Mutation::Create {
                    parent_id: fx.root_id,
                    name: "B".to_string(),
                    description: None,
                    properties: None,
                },
            ],
        )
        .await
        .unwrap();
    assert_eq!(applied, 2);

    let children = fx.host.list_children("bot", fx.root_id).await.unwrap();
    assert_eq!(children.len(), 2);
}

#[tokio::test]
async fn failed_batch_rolls_back_entirely() {
    let fx = fixture(false);
    fx.registry
        .grant("bot", Permission::new(Capability::NodesWrite), None);

    let err = fx
        .host
        .apply_mutations(
            "bot",
            vec![
                Mutation::Create {
                    parent_id: fx.root_id,
                    name: "created-first".to_string(),
                    description: None,
                    properties: None,
                },
                // Duplicate sibling name: rejected, so the whole batch must
                // unwind.
                Mutation::Create {
                    parent_id: fx.root_id,
                    name: "CREATED-FIRST".to_string(),
                    description: None,
                    properties: None,
                },
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PluginError::Host(_)));

    let root = fx.nodes.get_node(&fx.root_id).unwrap();
    assert!(root.children.is_empty(), "batch was not rolled back");
    assert_eq!(fx.nodes.loader().list_node_ids().unwrap().len(), 1);
}

#[tokio::test]
async fn read_only_rejects_mutations_regardless_of_grants() {
    let fx = fixture(false);
    for permission in [
        Permission::new(Capability::NodesWrite),
        Permission::new(Capability::GitCommit),
        Permission::new(Capability::GitSnapshot),
        Permission::new(Capability::IndexWrite),
    ] {
        fx.registry.grant("bot", permission, None);
    }
    fx.read_only.store(true, Ordering::SeqCst);

    let mutate = fx
        .host
        .apply_mutations(
            "bot",
            vec![Mutation::Delete { id: fx.root_id }],
        )
        .await;
    assert!(matches!(mutate, Err(PluginError::ReadOnly)));
    assert!(matches!(
        fx.host.commit("bot", "m".to_string()).await,
        Err(PluginError::ReadOnly)
    ));
    assert!(matches!(
        fx.host.snapshot("bot", "m".to_string()).await,
        Err(PluginError::ReadOnly)
    ));
    assert!(matches!(
        fx.host.index_put("bot", fx.root_id, "x".to_string()).await,
        Err(PluginError::ReadOnly)
    ));

    // Reads still flow.
    fx.registry
        .grant("bot", Permission::new(Capability::NodesRead), None);
    assert!(fx.host.get_node("bot", fx.root_id).await.is_ok());
}

// Scenario: secrets redaction policy and scoped grants.
#[tokio::test]
async fn secrets_respect_policy_and_scope() {
    let fx = fixture(false);
    fx.registry.grant(
        "jira-bot",
        Permission::scoped(Capability::Secrets, "jira*"),
        None,
    );

    let redacted = fx
        .host
        .secrets_get("jira-bot", "jira.token".to_string())
        .await
        .unwrap();
    assert_eq!(redacted.name, "jira.token");
    assert_eq!(redacted.value, "");
    assert!(redacted.redacted);

    // Scope excludes other keys entirely.
    assert!(matches!(
        fx.host.secrets_get("jira-bot", "aws.key".to_string()).await,
        Err(PluginError::Unauthorized { .. })
    ));
    assert_eq!(
        fx.host
            .secrets_list("jira-bot", "jira".to_string())
            .await
            .unwrap(),
        vec!["jira.token"]
    );

    // Same grant, values-enabled policy: raw value comes back.
    let open = fixture(true);
    open.registry.grant(
        "jira-bot",
        Permission::scoped(Capability::Secrets, "jira*"),
        None,
    );
    let raw = open
        .host
        .secrets_get("jira-bot", "jira.token".to_string())
        .await
        .unwrap();
    assert_eq!(raw.value, "S");
    assert!(!raw.redacted);
}

#[tokio::test]
async fn commit_and_snapshot_via_host() {
    let fx = fixture(false);
    fx.registry
        .grant("bot", Permission::new(Capability::GitCommit), None);
    fx.registry
        .grant("bot", Permission::new(Capability::GitSnapshot), None);

    let hash = fx.host.commit("bot", "plugin work".to_string()).await.unwrap();
    assert_eq!(hash.len(), 40);

    let info = fx
        .host
        .snapshot("bot", "plugin milestone".to_string())
        .await
        .unwrap();
    assert!(info.name.starts_with("plugin-bot-"));
    assert_eq!(info.labels, vec!["plugin"]);
}

#[tokio::test]
async fn exhausted_budget_cancels_calls() {
    let dir = TempDir::new().unwrap();
    let loader = Loader::new(dir.path());
    let root = Node::new("Root");
    let root_id = root.id;
    loader.write_node(&root).unwrap();
    loader
        .write_project(&Project::new(root_id, Settings::default()))
        .unwrap();
    let backend = Arc::new(Git2Backend::init(dir.path()).unwrap());
    let nodes = Arc::new(NodeStore::new(loader, Arc::new(ScanIndex::new())));
    let registry = Arc::new(PermissionRegistry::new());
    registry.grant("bot", Permission::new(Capability::NodesRead), None);

    let host = PluginHost::new(
        Arc::clone(&nodes),
        Arc::new(SnapshotManager::new(backend, dir.path())),
        Arc::new(SecretsStore::open(dir.path()).unwrap()),
        Arc::clone(&registry),
        Arc::new(AtomicBool::new(false)),
        false,
        HostConfig {
            plugin_budget: std::time::Duration::ZERO,
            ..HostConfig::default()
        },
    );

    let result = host.get_node("bot", root_id).await;
    assert!(matches!(result, Err(PluginError::ResourceExceeded(_))));
}
