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

//! Attachment garbage collection against real project trees.

use archon_core::{Node, Project, Property, Settings};
use archon_storage::{AttachmentStore, Loader, StorageError};
use std::fs;
use std::io::Cursor;
use tempfile::TempDir;

fn seeded() -> (TempDir, Loader, AttachmentStore, Node) {
    let dir = TempDir::new().unwrap();
    let loader = Loader::new(dir.path());
    let root = Node::new("Root");
    loader.write_node(&root).unwrap();
    loader
        .write_project(&Project::new(root.id, Settings::default()))
        .unwrap();
    let store = AttachmentStore::new(dir.path());
    (dir, loader, store, root)
}

#[test]
fn gc_deletes_only_unreferenced() {
    let (_dir, loader, store, mut root) = seeded();
    let kept = store.store(&mut Cursor::new(b"kept"), "kept.bin").unwrap();
    let dropped_a = store.store(&mut Cursor::new(b"a"), "a.bin").unwrap();
    let dropped_b = store.store(&mut Cursor::new(b"b"), "b.bin").unwrap();

    root.properties
        .insert("doc".to_string(), Property::attachment(kept.clone()));
    loader.write_node(&root).unwrap();

    let outcome = store.garbage_collect(&loader).unwrap();
    assert!(!outcome.refused);
    assert_eq!(outcome.deleted, 2);

    assert!(store.info(&kept.hash).is_ok());
    for gone in [&dropped_a.hash, &dropped_b.hash] {
        assert!(matches!(
            store.info(gone),
            Err(StorageError::AttachmentNotFound(_))
        ));
    }
}

// P6: a second pass with no intervening writes deletes nothing.
#[test]
fn gc_is_idempotent() {
    let (_dir, loader, store, _root) = seeded();
    store.store(&mut Cursor::new(b"junk"), "junk.bin").unwrap();

    assert_eq!(store.garbage_collect(&loader).unwrap().deleted, 1);
    assert_eq!(store.garbage_collect(&loader).unwrap().deleted, 0);
}

#[test]
fn gc_refuses_when_any_node_is_unreadable() {
    let (_dir, loader, store, mut root) = seeded();
    let orphaned = store.store(&mut Cursor::new(b"x"), "x.bin").unwrap();

    let broken = Node::new("Broken");
    root.children.push(broken.id);
    loader.write_node(&broken).unwrap();
    loader.write_node(&root).unwrap();
    fs::write(loader.node_path(&broken.id), "{corrupt").unwrap();

    let outcome = store.garbage_collect(&loader).unwrap();
    assert!(outcome.refused);
    assert_eq!(outcome.deleted, 0);
    assert_eq!(outcome.unreadable_nodes.len(), 1);
    // Nothing was deleted even though the blob is unreferenced.
    assert!(store.info(&orphaned.hash).is_ok());
}

#[test]
fn validate_node_attachments_reports_missing_and_mismatched() {
    let (_dir, loader, store, mut root) = seeded();
    let good = store.store(&mut Cursor::new(b"good"), "good.bin").unwrap();
    let mut stale = good.clone();
    stale.size += 1;
    let missing = archon_core::AttachmentRef::new("ef".repeat(32), "gone.bin", 3);

    root.properties
        .insert("good".to_string(), Property::attachment(good));
    root.properties
        .insert("stale".to_string(), Property::attachment(stale));
    root.properties
        .insert("missing".to_string(), Property::attachment(missing));
    loader.write_node(&root).unwrap();

    let node = loader.read_node(&root.id).unwrap();
    let errors = store.validate_node_attachments(&node);
    assert_eq!(errors.len(), 2);
}
