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

//! Content-addressed attachment store.
//!
//! Binaries live under `attachments/<hh>/<sha256>` where `<hh>` is the
//! first hash byte. Content is hashed while streaming to a temp file;
//! identical content deduplicates to the same path. Attachments are
//! shared by reference from node properties and reclaimed only by the
//! explicit reachability GC.

use crate::error::{StorageError, StorageResult};
use crate::loader::Loader;
use archon_core::{
    layout, AttachmentRef, Node, PropertyValue, ValidationError, DEFAULT_LFS_THRESHOLD_BYTES,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Pattern handed to the LFS hook for attachment payloads.
pub const LFS_TRACK_PATTERN: &str = "attachments/**";

/// Callback into the version-control layer: make sure LFS is initialized
/// and `pattern` is tracked. Implemented by `archon-vcs`; absent when the
/// project has no repository.
pub trait LfsHook: Send + Sync {
    fn ensure_tracking(&self, pattern: &str) -> Result<(), String>;
}

/// Metadata about one stored attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentInfo {
    pub hash: String,
    pub size: u64,
    pub is_lfs: bool,
    pub stored_at: DateTime<Utc>,
}

/// Aggregate store statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub count: usize,
    pub total_bytes: u64,
    pub lfs_count: usize,
}

/// Result of a reachability GC pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcOutcome {
    pub deleted: usize,
    /// True when unreadable node files made reachability undecidable and
    /// nothing was deleted.
    pub refused: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unreadable_nodes: Vec<String>,
}

/// Content-addressed binary store for one project.
pub struct AttachmentStore {
    root: PathBuf,
    lfs_threshold: u64,
    lfs_hook: Option<Arc<dyn LfsHook>>,
}

impl AttachmentStore {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            root: project_root.as_ref().to_path_buf(),
            lfs_threshold: DEFAULT_LFS_THRESHOLD_BYTES,
            lfs_hook: None,
        }
    }

    pub fn with_lfs_threshold(mut self, bytes: u64) -> Self {
        self.lfs_threshold = bytes;
        self
    }

    pub fn with_lfs_hook(mut self, hook: Arc<dyn LfsHook>) -> Self {
        self.lfs_hook = Some(hook);
        self
    }

    fn attachments_dir(&self) -> PathBuf {
        self.root.join(layout::ATTACHMENTS_DIR)
    }

    fn blob_path(&self, hash: &str) -> PathBuf {
        self.attachments_dir().join(&hash[0..2]).join(hash)
    }

    fn require_valid_hash(hash: &str) -> StorageResult<()> {
        if AttachmentRef::is_valid_hash(hash) {
            Ok(())
        } else {
            Err(StorageError::InvalidHash(hash.to_string()))
        }
    }

    /// Stream `reader` into the store, returning the reference to embed
    /// in a node property. Re-storing existing content is a no-op.
    pub fn store(&self, reader: &mut dyn Read, filename: &str) -> StorageResult<AttachmentRef> {
        let dir = self.attachments_dir();
        fs::create_dir_all(&dir)?;

        let tmp = dir.join(format!(".tmp-{}", uuid::Uuid::now_v7()));
        let mut hasher = Sha256::new();
        let mut size: u64 = 0;
        {
            let mut out = File::create(&tmp)?;
            let mut buf = [0u8; 8192];
            loop {
                let n = reader.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
                out.write_all(&buf[..n])?;
                size += n as u64;
            }
            out.sync_all()?;
        }
        let hash = hex::encode(hasher.finalize());

        let target = self.blob_path(&hash);
        if target.is_file() {
            // Lost the race or re-stored known content; identical bytes
            // either way.
            let _ = fs::remove_file(&tmp);
        } else {
            if let Some(shard) = target.parent() {
                fs::create_dir_all(shard)?;
            }
            if let Err(e) = fs::rename(&tmp, &target) {
                let _ = fs::remove_file(&tmp);
                if !target.is_file() {
                    return Err(e.into());
                }
            }
        }
        debug!(%hash, size, "stored attachment");

        if size >= self.lfs_threshold {
            if let Some(hook) = &self.lfs_hook {
                if let Err(e) = hook.ensure_tracking(LFS_TRACK_PATTERN) {
                    warn!(%hash, error = %e, "could not ensure LFS tracking");
                }
            }
        }

        Ok(AttachmentRef::new(hash, sanitize_filename(filename), size))
    }

    /// Open the stored content for reading.
    pub fn retrieve(&self, hash: &str) -> StorageResult<File> {
        Self::require_valid_hash(hash)?;
        File::open(self.blob_path(hash)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::AttachmentNotFound(hash.to_string())
            } else {
                e.into()
            }
        })
    }

    pub fn info(&self, hash: &str) -> StorageResult<AttachmentInfo> {
        Self::require_valid_hash(hash)?;
        let meta = fs::metadata(self.blob_path(hash)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::AttachmentNotFound(hash.to_string())
            } else {
                StorageError::from(e)
            }
        })?;
        let stored_at = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Ok(AttachmentInfo {
            hash: hash.to_string(),
            size: meta.len(),
            is_lfs: meta.len() >= self.lfs_threshold,
            stored_at,
        })
    }

    /// Remove the blob; prunes the shard directory when it empties.
    pub fn delete(&self, hash: &str) -> StorageResult<()> {
        Self::require_valid_hash(hash)?;
        let path = self.blob_path(hash);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::AttachmentNotFound(hash.to_string()))
            }
            Err(e) => return Err(e.into()),
        }
        if let Some(shard) = path.parent() {
            let _ = fs::remove_dir(shard);
        }
        Ok(())
    }

    /// Re-hash stored content and compare with its address.
    pub fn verify(&self, hash: &str) -> StorageResult<bool> {
        let mut file = self.retrieve(hash)?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hex::encode(hasher.finalize()) == hash)
    }

    /// Check a reference's format, existence, and size agreement.
    pub fn validate_reference(&self, reference: &AttachmentRef) -> StorageResult<()> {
        let info = self.info(&reference.hash)?;
        if info.size != reference.size {
            return Err(StorageError::InvalidInput(format!(
                "attachment {} size mismatch: stored {} bytes, reference says {}",
                reference.hash, info.size, reference.size
            )));
        }
        Ok(())
    }

    /// Validate every attachment-typed property on a node.
    pub fn validate_node_attachments(&self, node: &Node) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for (key, property) in &node.properties {
            if !property.is_attachment() {
                continue;
            }
            match &property.value {
                PropertyValue::Attachment(reference) => {
                    if let Err(e) = self.validate_reference(reference) {
                        errors.push(ValidationError::new(format!("properties.{key}"), e.to_string()));
                    }
                }
                other => errors.push(ValidationError::new(
                    format!("properties.{key}"),
                    format!("attachment type hint with non-attachment value: {other:?}"),
                )),
            }
        }
        errors
    }

    /// Delete every stored attachment not referenced by any node.
    ///
    /// If any node file fails to load the project is treated as
    /// inconsistent: nothing is deleted and the outcome says so. Safe to
    /// run repeatedly; a second pass with no intervening writes deletes
    /// nothing.
    pub fn garbage_collect(&self, loader: &Loader) -> StorageResult<GcOutcome> {
        let mut referenced: HashSet<String> = HashSet::new();
        let mut unreadable = Vec::new();
        for id in loader.list_node_ids()? {
            match loader.read_node(&id) {
                Ok(node) => {
                    referenced.extend(node.attachment_hashes().into_iter().map(String::from));
                }
                Err(e) => {
                    warn!(node = %id, error = %e, "unreadable node file during attachment GC");
                    unreadable.push(id.to_string());
                }
            }
        }
        if !unreadable.is_empty() {
            warn!(
                count = unreadable.len(),
                "refusing to garbage-collect attachments: reachability is undecidable"
            );
            return Ok(GcOutcome {
                deleted: 0,
                refused: true,
                unreadable_nodes: unreadable,
            });
        }

        let mut deleted = 0;
        for hash in self.stored_hashes()? {
            if !referenced.contains(&hash) {
                self.delete(&hash)?;
                deleted += 1;
            }
        }
        debug!(deleted, "attachment GC complete");
        Ok(GcOutcome {
            deleted,
            refused: false,
            unreadable_nodes: Vec::new(),
        })
    }

    pub fn stats(&self) -> StorageResult<StoreStats> {
        let mut stats = StoreStats::default();
        for hash in self.stored_hashes()? {
            let meta = fs::metadata(self.blob_path(&hash))?;
            stats.count += 1;
            stats.total_bytes += meta.len();
            if meta.len() >= self.lfs_threshold {
                stats.lfs_count += 1;
            }
        }
        Ok(stats)
    }

    /// Hashes whose stored content no longer matches their address.
    pub fn verify_all(&self) -> StorageResult<Vec<String>> {
        let mut corrupt = Vec::new();
        for hash in self.stored_hashes()? {
            if !self.verify(&hash)? {
                corrupt.push(hash);
            }
        }
        Ok(corrupt)
    }

    fn stored_hashes(&self) -> StorageResult<Vec<String>> {
        let dir = self.attachments_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut hashes = Vec::new();
        for shard in fs::read_dir(&dir)? {
            let shard = shard?;
            if !shard.path().is_dir() {
                continue;
            }
            for entry in fs::read_dir(shard.path())? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if AttachmentRef::is_valid_hash(&name) {
                    hashes.push(name);
                }
            }
        }
        hashes.sort();
        Ok(hashes)
    }
}

/// Strip path separators and control characters from a client-supplied
/// filename; it is display metadata, never a filesystem path.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| if c == ':' || c.is_control() { '_' } else { c })
        .collect();
    let trimmed = cleaned.trim_matches(&['.', ' '][..]);
    if trimmed.is_empty() {
        "attachment".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn store() -> (TempDir, AttachmentStore) {
        let dir = TempDir::new().unwrap();
        let store = AttachmentStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_store_and_retrieve() {
        let (_dir, store) = store();
        let reference = store.store(&mut Cursor::new(b"payload"), "data.bin").unwrap();
        assert_eq!(reference.size, 7);
        assert!(AttachmentRef::is_valid_hash(&reference.hash));

        let mut out = Vec::new();
        store.retrieve(&reference.hash).unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, b"payload");
    }

    #[test]
    fn test_dedup_by_content() {
        let (_dir, store) = store();
        let a = store.store(&mut Cursor::new(b"same"), "a.bin").unwrap();
        let b = store.store(&mut Cursor::new(b"same"), "b.bin").unwrap();
        assert_eq!(a.hash, b.hash);
        assert_eq!(store.stats().unwrap().count, 1);
    }

    #[test]
    fn test_invalid_hash_rejected() {
        let (_dir, store) = store();
        assert!(matches!(
            store.retrieve("nope"),
            Err(StorageError::InvalidHash(_))
        ));
        assert!(matches!(
            store.info(&"Z".repeat(64)),
            Err(StorageError::InvalidHash(_))
        ));
    }

    #[test]
    fn test_verify_detects_corruption() {
        let (_dir, store) = store();
        let reference = store.store(&mut Cursor::new(b"intact"), "f").unwrap();
        assert!(store.verify(&reference.hash).unwrap());

        fs::write(store.blob_path(&reference.hash), b"tampered").unwrap();
        assert!(!store.verify(&reference.hash).unwrap());
        assert_eq!(store.verify_all().unwrap(), vec![reference.hash]);
    }

    #[test]
    fn test_delete_prunes_empty_shard() {
        let (_dir, store) = store();
        let reference = store.store(&mut Cursor::new(b"x"), "f").unwrap();
        let shard = store.blob_path(&reference.hash).parent().unwrap().to_path_buf();
        store.delete(&reference.hash).unwrap();
        assert!(!shard.exists());
        assert!(matches!(
            store.delete(&reference.hash),
            Err(StorageError::AttachmentNotFound(_))
        ));
    }

    #[test]
    fn test_size_mismatch_fails_validation() {
        let (_dir, store) = store();
        let mut reference = store.store(&mut Cursor::new(b"abcdef"), "f").unwrap();
        assert!(store.validate_reference(&reference).is_ok());
        reference.size = 1;
        assert!(store.validate_reference(&reference).is_err());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("wiring diagram.pdf"), "wiring diagram.pdf");
        assert_eq!(sanitize_filename(""), "attachment");
        assert_eq!(sanitize_filename("a\u{0000}b"), "a_b");
    }
}
