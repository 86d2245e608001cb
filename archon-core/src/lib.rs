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

//! Archon Core
//!
//! Fundamental data structures and contracts for the Archon project
//! storage engine: node identity, canonical serialization, the on-disk
//! data model, the shared error taxonomy, and the search-index contract.

pub mod canonical;
pub mod error;
pub mod id;
pub mod index;
pub mod node;
pub mod project;
pub mod settings;
pub mod snapshot;

pub use canonical::to_canonical_json;
pub use error::{ArchonError, ErrorCode, Result, ValidationError};
pub use id::NodeId;
pub use index::{IndexHealth, IndexRecord, NodeIndex, SearchError, SearchHit};
pub use node::{
    names_collide, normalized_name, validate_name, validate_properties, AttachmentKind,
    AttachmentRef, Node, Property, PropertyType, PropertyValue, RESERVED_PROPERTY_PREFIX,
};
pub use project::{layout, Project, CURRENT_SCHEMA_VERSION};
pub use settings::{
    Settings, DEFAULT_AUTO_SNAPSHOT_THRESHOLD, DEFAULT_LFS_THRESHOLD_BYTES, DISABLE_INDEX_ENV,
};
pub use snapshot::{Author, SnapshotInfo, SnapshotRequest};
