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

//! Archon Version Control
//!
//! Git plumbing for the project store: the [`GitBackend`] abstraction
//! with its git2-based implementation, snapshots as annotated tags,
//! semantic (node-ID level) diffs with move detection, and three-way
//! merge at property granularity.

pub mod backend;
pub mod diff;
pub mod error;
pub mod git2_backend;
pub mod lfs;
pub mod merge;
pub mod snapshot;

pub use backend::{CommitInfo, FileChange, FileChangeKind, GitBackend, RepoStatus, TagInfo};
pub use diff::{semantic_diff, diff_states, FieldChange, NodeChange, SemanticDiff, TreeState};
pub use error::{VcsError, VcsResult};
pub use git2_backend::Git2Backend;
pub use lfs::BackendLfsHook;
pub use merge::{three_way_merge, MergeConflict, MergeResult, Side};
pub use snapshot::SnapshotManager;
