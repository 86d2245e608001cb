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

//! Linear-scan fallback index.
//!
//! Active in index-disabled mode or when SQLite cannot be opened. Keeps
//! records in memory and answers search by substring scan; health
//! reports `schema_version = 0` so callers can tell the degraded mode
//! apart.

use archon_core::{
    IndexHealth, IndexRecord, NodeId, NodeIndex, PropertyValue, SearchError, SearchHit,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// In-memory substring-scan [`NodeIndex`].
#[derive(Default)]
pub struct ScanIndex {
    records: RwLock<BTreeMap<NodeId, IndexRecord>>,
}

impl ScanIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NodeIndex for ScanIndex {
    fn index_node(&self, record: &IndexRecord) -> Result<(), SearchError> {
        self.records.write().insert(record.node.id, record.clone());
        Ok(())
    }

    fn remove_node(&self, id: &NodeId) -> Result<(), SearchError> {
        self.records.write().remove(id);
        Ok(())
    }

    fn update_child_count(&self, _id: &NodeId, _count: u32) -> Result<(), SearchError> {
        // Child counts are derived from the stored record on read.
        Ok(())
    }

    fn rebuild(&self, records: &[IndexRecord]) -> Result<(), SearchError> {
        let mut map = self.records.write();
        map.clear();
        for record in records {
            map.insert(record.node.id, record.clone());
        }
        Ok(())
    }

    fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(SearchError::InvalidQuery("empty query".to_string()));
        }
        let records = self.records.read();
        let mut hits = Vec::new();
        for record in records.values() {
            let node = &record.node;
            let mut snippet = None;
            if node.name.to_lowercase().contains(&needle) {
                snippet = Some(node.name.clone());
            } else {
                for (key, property) in &node.properties {
                    let text = match &property.value {
                        PropertyValue::Text(text) => Some(text.as_str()),
                        PropertyValue::Attachment(att) => Some(att.filename.as_str()),
                        _ => None,
                    };
                    if key.to_lowercase().contains(&needle)
                        || text.map(|t| t.to_lowercase().contains(&needle)).unwrap_or(false)
                    {
                        snippet = Some(format!("{key}: {}", text.unwrap_or("")));
                        break;
                    }
                }
            }
            if let Some(snippet) = snippet {
                hits.push(SearchHit {
                    node_id: node.id,
                    snippet,
                    score: 0.0,
                });
                if hits.len() >= limit {
                    break;
                }
            }
        }
        Ok(hits)
    }

    fn nodes_by_depth(&self, depth: u32, limit: usize) -> Result<Vec<NodeId>, SearchError> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|record| record.depth == depth)
            .take(limit)
            .map(|record| record.node.id)
            .collect())
    }

    fn health(&self) -> IndexHealth {
        IndexHealth::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archon_core::{Node, Property};

    fn record(name: &str, depth: u32) -> IndexRecord {
        IndexRecord {
            node: Node::new(name),
            parent_id: None,
            depth,
            path: format!("Root/{name}"),
        }
    }

    #[test]
    fn test_search_scans_names_and_properties() {
        let index = ScanIndex::new();
        let mut rec = record("Compressor", 1);
        rec.node
            .properties
            .insert("vendor".to_string(), Property::text("Atlas Copco"));
        index.index_node(&rec).unwrap();

        assert_eq!(index.search("compr", 10).unwrap().len(), 1);
        assert_eq!(index.search("atlas", 10).unwrap().len(), 1);
        assert!(index.search("missing", 10).unwrap().is_empty());
    }

    #[test]
    fn test_health_reports_disabled() {
        let index = ScanIndex::new();
        let health = index.health();
        assert!(health.healthy);
        assert!(!health.fts_available);
        assert_eq!(health.schema_version, 0);
    }

    #[test]
    fn test_depth_filter_and_removal() {
        let index = ScanIndex::new();
        let a = record("a", 1);
        let b = record("b", 2);
        index.index_node(&a).unwrap();
        index.index_node(&b).unwrap();

        assert_eq!(index.nodes_by_depth(2, 10).unwrap(), vec![b.node.id]);
        index.remove_node(&b.node.id).unwrap();
        assert!(index.nodes_by_depth(2, 10).unwrap().is_empty());
    }
}
