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

//! Bridge from the attachment store to Git LFS.

use crate::backend::GitBackend;
use archon_storage::LfsHook;
use std::sync::Arc;

/// [`LfsHook`] that initializes LFS and tracks patterns on the project's
/// Git backend when large attachments land.
pub struct BackendLfsHook {
    backend: Arc<dyn GitBackend>,
}

impl BackendLfsHook {
    pub fn new(backend: Arc<dyn GitBackend>) -> Self {
        Self { backend }
    }
}

impl LfsHook for BackendLfsHook {
    fn ensure_tracking(&self, pattern: &str) -> Result<(), String> {
        if !self.backend.is_lfs_enabled().map_err(|e| e.to_string())? {
            self.backend.init_lfs().map_err(|e| e.to_string())?;
        }
        self.backend
            .track_lfs_pattern(pattern)
            .map_err(|e| e.to_string())
    }
}
