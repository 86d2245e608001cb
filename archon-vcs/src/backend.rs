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

//! The Git backend abstraction.
//!
//! Object-safe so a CLI-driven backend (or a test fake) can substitute
//! for the in-process git2 implementation without callers noticing.

use crate::error::VcsResult;
use archon_core::Author;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Working-tree status summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoStatus {
    pub clean: bool,
    /// Paths with uncommitted changes (new, modified, or deleted).
    pub dirty_paths: Vec<String>,
}

/// One commit in the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    pub id: String,
    pub message: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

/// An annotated (or lightweight) tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagInfo {
    pub name: String,
    /// Commit the tag resolves to.
    pub target: String,
    /// Tag message; empty for lightweight tags.
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Kind of a path-level change between two refs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileChangeKind {
    Added,
    Removed,
    Modified,
}

/// A path-level change between two refs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    pub path: String,
    pub kind: FileChangeKind,
}

/// Capability set of a Git backend.
pub trait GitBackend: Send + Sync {
    fn is_repository(&self) -> bool;

    fn status(&self) -> VcsResult<RepoStatus>;

    /// Stage every change in the working tree, including deletions.
    fn stage_all(&self) -> VcsResult<()>;

    /// Commit the staged tree; returns the commit hash. Content on disk
    /// is already canonical, so nothing is reformatted here.
    fn commit(&self, message: &str, author: &Author) -> VcsResult<String>;

    /// Create an annotated tag at HEAD.
    fn tag(&self, name: &str, message: &str) -> VcsResult<()>;

    fn list_tags(&self) -> VcsResult<Vec<TagInfo>>;

    fn delete_tag(&self, name: &str) -> VcsResult<()>;

    /// Check the tree at `reference` out into the working directory
    /// without moving HEAD.
    fn checkout(&self, reference: &str) -> VcsResult<()>;

    /// History from HEAD, newest first.
    fn history(&self, limit: usize) -> VcsResult<Vec<CommitInfo>>;

    /// Contents of `path` at `reference`; `None` when absent.
    fn read_file_at(&self, reference: &str, path: &str) -> VcsResult<Option<Vec<u8>>>;

    /// Filenames directly under `dir` at `reference`; empty when the
    /// directory is absent.
    fn list_dir_at(&self, reference: &str, dir: &str) -> VcsResult<Vec<String>>;

    /// Path-level diff between two refs.
    fn diff_paths(&self, ref_a: &str, ref_b: &str) -> VcsResult<Vec<FileChange>>;

    fn set_remote_url(&self, url: &str) -> VcsResult<()>;

    fn get_remote_url(&self) -> VcsResult<Option<String>>;

    fn init_lfs(&self) -> VcsResult<()>;

    fn track_lfs_pattern(&self, pattern: &str) -> VcsResult<()>;

    fn is_lfs_enabled(&self) -> VcsResult<bool>;
}
