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

//! Migration error types.

use archon_core::{ArchonError, ErrorCode};
use std::path::PathBuf;
use thiserror::Error;

pub type MigrateResult<T> = Result<T, MigrateError>;

#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("no project at {0}")]
    ProjectNotFound(PathBuf),

    #[error("project schema {found} is newer than supported {supported}")]
    SchemaTooNew { found: u32, supported: u32 },

    #[error("no registered step migrates {from} -> {}", from + 1)]
    MissingStep { from: u32 },

    #[error("step {name:?} (to v{version}) failed at schema {partially_applied}: {message}")]
    StepFailed {
        version: u32,
        name: String,
        /// Schema version the project actually reached.
        partially_applied: u32,
        message: String,
    },

    #[error("migration finished at schema {found}, expected {expected}")]
    VerificationFailed { expected: u32, found: u32 },

    #[error("duplicate or non-monotonic step registration for v{0}")]
    BadRegistration(u32),

    #[error("unreadable project metadata: {0}")]
    BadProjectFile(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl MigrateError {
    pub fn code(&self) -> ErrorCode {
        match self {
            MigrateError::ProjectNotFound(_) => ErrorCode::ProjectNotFound,
            MigrateError::SchemaTooNew { .. } => ErrorCode::SchemaVersion,
            _ => ErrorCode::MigrationFailure,
        }
    }
}

impl From<MigrateError> for ArchonError {
    fn from(e: MigrateError) -> Self {
        let mut err = ArchonError::new(e.code(), e.to_string());
        if let MigrateError::StepFailed {
            partially_applied, ..
        } = &e
        {
            err = err.with_details(serde_json::json!({
                "partiallyApplied": partially_applied
            }));
        }
        err
    }
}
