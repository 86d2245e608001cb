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

//! Version-control error types.

use archon_core::{ArchonError, ErrorCode};
use thiserror::Error;

pub type VcsResult<T> = Result<T, VcsError>;

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("not a git repository: {0}")]
    NotARepository(String),

    #[error("snapshot already exists: {0}")]
    SnapshotExists(String),

    #[error("snapshot not found: {0}")]
    SnapshotNotFound(String),

    #[error("reference not found: {0}")]
    RefNotFound(String),

    #[error("repository has no commits yet")]
    EmptyRepository,

    #[error("git: {0}")]
    Git(#[from] git2::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),
}

impl VcsError {
    pub fn code(&self) -> ErrorCode {
        match self {
            VcsError::SnapshotExists(_) => ErrorCode::InvalidInput,
            VcsError::SnapshotNotFound(_) | VcsError::RefNotFound(_) => ErrorCode::NotFound,
            VcsError::NotARepository(_)
            | VcsError::EmptyRepository
            | VcsError::Git(_)
            | VcsError::Io(_)
            | VcsError::Serde(_) => ErrorCode::GitFailure,
        }
    }
}

impl From<VcsError> for ArchonError {
    fn from(e: VcsError) -> Self {
        ArchonError::new(e.code(), e.to_string())
    }
}
