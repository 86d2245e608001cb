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

//! Archon Search Index
//!
//! SQLite-backed full-text index over node metadata and properties. The
//! index is a rebuildable cache: storage stays authoritative and a full
//! rebuild from the node files restores it bit-for-bit equivalent. When
//! FTS5 is unavailable (or the index is disabled) the [`ScanIndex`]
//! fallback degrades search to a linear scan and reports health with
//! `schema_version = 0`.

pub mod scan;
pub mod sqlite;

pub use scan::ScanIndex;
pub use sqlite::{SqliteIndex, INDEX_SCHEMA_VERSION};

use archon_core::{layout, NodeIndex, Settings};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Open the index backend for a project, honoring `index.disabled` and
/// the `ARCHON_DISABLE_INDEX` environment override. Falls back to the
/// linear scan when SQLite cannot be opened.
pub fn open_index(project_root: &Path, settings: &Settings) -> Arc<dyn NodeIndex> {
    if settings.index_disabled() {
        return Arc::new(ScanIndex::new());
    }
    match SqliteIndex::open(&project_root.join(layout::INDEX_DB_FILE)) {
        Ok(index) => Arc::new(index),
        Err(e) => {
            warn!(error = %e, "search index unavailable; degrading to linear scan");
            Arc::new(ScanIndex::new())
        }
    }
}
