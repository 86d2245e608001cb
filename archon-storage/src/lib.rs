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

//! Archon Storage Layer
//!
//! The on-disk project store: sharded per-node canonical JSON under
//! `nodes/`, a content-addressed attachment store under `attachments/`,
//! and the tree-aware `NodeStore` that owns the structural invariants
//! (sibling-name uniqueness, acyclicity, child-order preservation) and
//! feeds the search index incrementally on every mutation.

pub mod attachments;
pub mod error;
pub mod loader;
pub mod node_store;
pub mod validate;

pub use attachments::{
    sanitize_filename, AttachmentInfo, AttachmentStore, GcOutcome, LfsHook, StoreStats,
};
pub use error::{StorageError, StorageResult};
pub use loader::Loader;
pub use node_store::{CreateNodeRequest, NodeStore, UpdateNodeRequest};
pub use validate::validate_tree;
