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

//! Search-index contract.
//!
//! The index is a rebuildable cache over node storage, never the source
//! of truth. The trait is object-safe so backends can substitute without
//! callers noticing: the SQLite/FTS5 implementation in `archon-index`,
//! the linear-scan fallback for hosts without FTS5, and in-memory fakes
//! in tests.

use crate::id::NodeId;
use crate::node::Node;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Index-layer errors. Callers map these to `SEARCH_FAILURE` on the wire.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("index backend: {0}")]
    Backend(String),

    #[error("full-text search unavailable: {0}")]
    FtsUnavailable(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// Everything the index stores about one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub node: Node,
    pub parent_id: Option<NodeId>,
    /// 0 for the root, parent depth + 1 otherwise.
    pub depth: u32,
    /// Slash-joined ancestor names, root first, including this node.
    pub path: String,
}

/// One full-text search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub node_id: NodeId,
    /// Highlighted fragment of the matched text.
    pub snippet: String,
    /// Backend-specific relevance; higher is better.
    pub score: f64,
}

/// Result of an index health probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexHealth {
    pub healthy: bool,
    pub fts_available: bool,
    /// 0 in index-disabled mode.
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl IndexHealth {
    pub fn healthy(schema_version: u32) -> Self {
        Self {
            healthy: true,
            fts_available: true,
            schema_version,
            message: None,
        }
    }

    pub fn disabled() -> Self {
        Self {
            healthy: true,
            fts_available: false,
            schema_version: 0,
            message: Some("index disabled; search degrades to linear scan".to_string()),
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            fts_available: false,
            schema_version: 0,
            message: Some(message.into()),
        }
    }
}

/// Polymorphic search-index backend.
pub trait NodeIndex: Send + Sync {
    /// Upsert one node: metadata row, property rows, FTS rows.
    fn index_node(&self, record: &IndexRecord) -> Result<(), SearchError>;

    /// Cascade-remove one node from every table.
    fn remove_node(&self, id: &NodeId) -> Result<(), SearchError>;

    /// Refresh the denormalized child count.
    fn update_child_count(&self, id: &NodeId, count: u32) -> Result<(), SearchError>;

    /// Wipe and repopulate inside a single transaction.
    fn rebuild(&self, records: &[IndexRecord]) -> Result<(), SearchError>;

    /// Full-text query over names, property keys, and text values.
    fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError>;

    /// Nodes at an exact depth, ordered by ID.
    fn nodes_by_depth(&self, depth: u32, limit: usize) -> Result<Vec<NodeId>, SearchError>;

    /// Attach externally supplied searchable content to a node (plugin
    /// enrichment). Backends without a side table may ignore it.
    fn index_external(&self, _id: &NodeId, _source: &str, _content: &str) -> Result<(), SearchError> {
        Ok(())
    }

    fn health(&self) -> IndexHealth;
}
