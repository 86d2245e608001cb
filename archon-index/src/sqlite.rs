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

//! SQLite/FTS5 index backend.

use archon_core::{
    IndexHealth, IndexRecord, NodeId, NodeIndex, PropertyType, PropertyValue, SearchError,
    SearchHit,
};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

/// Version of the index database layout; bumped when tables change shape.
pub const INDEX_SCHEMA_VERSION: u32 = 1;

/// FTS5-backed [`NodeIndex`] implementation.
pub struct SqliteIndex {
    conn: Mutex<Connection>,
    fts: bool,
}

fn db_err(e: rusqlite::Error) -> SearchError {
    SearchError::Backend(e.to_string())
}

impl SqliteIndex {
    /// Open (creating on demand) the index database at `path`.
    pub fn open(path: &Path) -> Result<Self, SearchError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SearchError::Backend(format!("creating {parent:?}: {e}")))?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(db_err)?;
        Self::from_connection(conn)
    }

    /// In-memory index, for tests.
    pub fn open_memory() -> Result<Self, SearchError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch("PRAGMA foreign_keys=ON;").map_err(db_err)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, SearchError> {
        Self::create_tables(&conn).map_err(db_err)?;
        let fts = Self::ensure_fts(&conn);
        conn.execute(
            "INSERT INTO meta (key, value) VALUES ('schema_version', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![INDEX_SCHEMA_VERSION.to_string()],
        )
        .map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
            fts,
        })
    }

    fn create_tables(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                parent_id TEXT,
                depth INTEGER NOT NULL,
                child_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                path TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_nodes_depth ON nodes(depth);
            CREATE INDEX IF NOT EXISTS idx_nodes_parent ON nodes(parent_id);
            CREATE TABLE IF NOT EXISTS properties (
                node_id TEXT NOT NULL,
                key TEXT NOT NULL,
                type_hint TEXT,
                value_text TEXT,
                value_num REAL,
                value_bool INTEGER,
                value_date TEXT,
                PRIMARY KEY (node_id, key)
            );
            CREATE INDEX IF NOT EXISTS idx_properties_node_key ON properties(node_id, key);
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )
    }

    /// FTS5 ships in the bundled SQLite but may be missing from system
    /// builds; probe by creating the virtual table.
    fn ensure_fts(conn: &Connection) -> bool {
        let result = conn.execute_batch(
            "CREATE VIRTUAL TABLE IF NOT EXISTS fts_properties
             USING fts5(node_id UNINDEXED, name, key, value_text);",
        );
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "FTS5 unavailable; search will use LIKE scans");
                false
            }
        }
    }

    fn upsert_node_tx(conn: &Connection, record: &IndexRecord, fts: bool) -> rusqlite::Result<()> {
        let node = &record.node;
        let id = node.id.to_string();
        conn.execute(
            "INSERT INTO nodes (id, name, parent_id, depth, child_count, created_at, updated_at, path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                parent_id = excluded.parent_id,
                depth = excluded.depth,
                child_count = excluded.child_count,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                path = excluded.path",
            params![
                id,
                node.name,
                record.parent_id.map(|p| p.to_string()),
                record.depth,
                node.children.len() as u32,
                node.created_at.to_rfc3339(),
                node.updated_at.to_rfc3339(),
                record.path,
            ],
        )?;

        conn.execute("DELETE FROM properties WHERE node_id = ?1", params![id])?;
        if fts {
            conn.execute("DELETE FROM fts_properties WHERE node_id = ?1", params![id])?;
            // Base row so bare node names are searchable.
            conn.execute(
                "INSERT INTO fts_properties (node_id, name, key, value_text) VALUES (?1, ?2, '', '')",
                params![id, node.name],
            )?;
        }

        for (key, property) in &node.properties {
            let type_hint = property.type_hint.map(|t| match t {
                PropertyType::String => "string",
                PropertyType::Number => "number",
                PropertyType::Boolean => "boolean",
                PropertyType::Date => "date",
                PropertyType::Attachment => "attachment",
            });
            let (value_text, value_num, value_bool, value_date) = match &property.value {
                PropertyValue::Text(text) => {
                    let date = (property.type_hint == Some(PropertyType::Date))
                        .then(|| text.clone());
                    (Some(text.clone()), None, None, date)
                }
                PropertyValue::Number(number) => (None, number.as_f64(), None, None),
                PropertyValue::Boolean(flag) => (None, None, Some(*flag as i64), None),
                PropertyValue::Attachment(att) => (Some(att.filename.clone()), None, None, None),
                PropertyValue::Null => (None, None, None, None),
            };
            conn.execute(
                "INSERT INTO properties (node_id, key, type_hint, value_text, value_num, value_bool, value_date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![id, key, type_hint, value_text, value_num, value_bool, value_date],
            )?;
            if fts {
                if let Some(text) = match &property.value {
                    PropertyValue::Text(text) => Some(text.as_str()),
                    PropertyValue::Attachment(att) => Some(att.filename.as_str()),
                    _ => None,
                } {
                    conn.execute(
                        "INSERT INTO fts_properties (node_id, name, key, value_text) VALUES (?1, ?2, ?3, ?4)",
                        params![id, node.name, key, text],
                    )?;
                }
            }
        }
        Ok(())
    }

    fn remove_node_tx(conn: &Connection, id: &str, fts: bool) -> rusqlite::Result<()> {
        conn.execute("DELETE FROM nodes WHERE id = ?1", params![id])?;
        conn.execute("DELETE FROM properties WHERE node_id = ?1", params![id])?;
        if fts {
            conn.execute("DELETE FROM fts_properties WHERE node_id = ?1", params![id])?;
        }
        Ok(())
    }

    /// Quote each whitespace token so user input cannot inject FTS5
    /// query operators.
    fn fts_query(query: &str) -> String {
        query
            .split_whitespace()
            .map(|token| format!("\"{}\"", token.replace('"', "")))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl NodeIndex for SqliteIndex {
    fn index_node(&self, record: &IndexRecord) -> Result<(), SearchError> {
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction().map_err(db_err)?;
        Self::upsert_node_tx(&tx, record, self.fts).map_err(db_err)?;
        tx.commit().map_err(db_err)
    }

    fn remove_node(&self, id: &NodeId) -> Result<(), SearchError> {
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction().map_err(db_err)?;
        Self::remove_node_tx(&tx, &id.to_string(), self.fts).map_err(db_err)?;
        tx.commit().map_err(db_err)
    }

    fn update_child_count(&self, id: &NodeId, count: u32) -> Result<(), SearchError> {
        self.conn
            .lock()
            .execute(
                "UPDATE nodes SET child_count = ?1 WHERE id = ?2",
                params![count, id.to_string()],
            )
            .map(|_| ())
            .map_err(db_err)
    }

    fn rebuild(&self, records: &[IndexRecord]) -> Result<(), SearchError> {
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction().map_err(db_err)?;
        tx.execute_batch("DELETE FROM properties; DELETE FROM nodes;")
            .map_err(db_err)?;
        if self.fts {
            tx.execute_batch("DELETE FROM fts_properties;").map_err(db_err)?;
        }
        for record in records {
            Self::upsert_node_tx(&tx, record, self.fts).map_err(db_err)?;
        }
        tx.commit().map_err(db_err)?;
        debug!(count = records.len(), "index rebuilt");
        Ok(())
    }

    fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(SearchError::InvalidQuery("empty query".to_string()));
        }
        let conn = self.conn.lock();
        let mut hits = Vec::new();
        let mut seen: HashSet<NodeId> = HashSet::new();

        if self.fts {
            let mut stmt = conn
                .prepare(
                    "SELECT node_id, snippet(fts_properties, -1, '[', ']', '…', 8), bm25(fts_properties)
                     FROM fts_properties
                     WHERE fts_properties MATCH ?1
                     ORDER BY bm25(fts_properties)",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![Self::fts_query(trimmed)], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, f64>(2)?,
                    ))
                })
                .map_err(db_err)?;
            for row in rows {
                let (id, snippet, rank) = row.map_err(db_err)?;
                let Ok(node_id) = NodeId::parse(&id) else {
                    warn!(id, "non-UUID row in index");
                    continue;
                };
                if seen.insert(node_id) {
                    // bm25 ranks lower-is-better; flip so callers sort descending.
                    hits.push(SearchHit {
                        node_id,
                        snippet,
                        score: -rank,
                    });
                    if hits.len() >= limit {
                        break;
                    }
                }
            }
        } else {
            let pattern = format!("%{trimmed}%");
            let mut stmt = conn
                .prepare(
                    "SELECT DISTINCT n.id, n.name FROM nodes n
                     LEFT JOIN properties p ON p.node_id = n.id
                     WHERE n.name LIKE ?1 OR p.key LIKE ?1 OR p.value_text LIKE ?1
                     ORDER BY n.id LIMIT ?2",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![pattern, limit as i64], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(db_err)?;
            for row in rows {
                let (id, name) = row.map_err(db_err)?;
                if let Ok(node_id) = NodeId::parse(&id) {
                    hits.push(SearchHit {
                        node_id,
                        snippet: name,
                        score: 0.0,
                    });
                }
            }
        }
        Ok(hits)
    }

    fn index_external(&self, id: &NodeId, source: &str, content: &str) -> Result<(), SearchError> {
        if !self.fts {
            return Ok(());
        }
        let conn = self.conn.lock();
        let key = format!("_external:{source}");
        conn.execute(
            "DELETE FROM fts_properties WHERE node_id = ?1 AND key = ?2",
            params![id.to_string(), key],
        )
        .map_err(db_err)?;
        conn.execute(
            "INSERT INTO fts_properties (node_id, name, key, value_text) VALUES (?1, '', ?2, ?3)",
            params![id.to_string(), key, content],
        )
        .map(|_| ())
        .map_err(db_err)
    }

    fn nodes_by_depth(&self, depth: u32, limit: usize) -> Result<Vec<NodeId>, SearchError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT id FROM nodes WHERE depth = ?1 ORDER BY id LIMIT ?2")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![depth, limit as i64], |row| row.get::<_, String>(0))
            .map_err(db_err)?;
        let mut ids = Vec::new();
        for row in rows {
            let raw = row.map_err(db_err)?;
            if let Ok(id) = NodeId::parse(&raw) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    fn health(&self) -> IndexHealth {
        let conn = self.conn.lock();
        let tables: Result<i64, _> = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'table' AND name IN ('nodes', 'properties', 'meta')",
            [],
            |row| row.get(0),
        );
        match tables {
            Ok(3) => {}
            Ok(n) => return IndexHealth::unhealthy(format!("missing tables ({n}/3 present)")),
            Err(e) => return IndexHealth::unhealthy(e.to_string()),
        }
        let version: Result<String, _> = conn.query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        );
        let schema_version = match version.map(|v| v.parse::<u32>()) {
            Ok(Ok(v)) if v == INDEX_SCHEMA_VERSION => v,
            Ok(Ok(v)) => {
                return IndexHealth::unhealthy(format!(
                    "index schema {v} != expected {INDEX_SCHEMA_VERSION}"
                ))
            }
            _ => return IndexHealth::unhealthy("missing schema_version"),
        };
        if !self.fts {
            return IndexHealth {
                healthy: true,
                fts_available: false,
                schema_version,
                message: Some("FTS5 unavailable; LIKE fallback active".to_string()),
            };
        }
        IndexHealth::healthy(schema_version)
    }
}
