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

//! Storage error types.

use archon_core::{ArchonError, ErrorCode, NodeId, ValidationError};
use std::path::PathBuf;
use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by the loader, attachment store, and node store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no project at {0}")]
    ProjectNotFound(PathBuf),

    #[error("project already exists at {0}")]
    ProjectExists(PathBuf),

    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("attachment not found: {0}")]
    AttachmentNotFound(String),

    #[error("invalid attachment hash: {0}")]
    InvalidHash(String),

    #[error("invalid UUID: {0}")]
    InvalidUuid(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("name must not be empty")]
    NameRequired,

    #[error("duplicate sibling name {name:?} under {parent}")]
    DuplicateName { name: String, parent: NodeId },

    #[error("invalid parent: {0}")]
    InvalidParent(String),

    #[error("circular reference: {0}")]
    CircularReference(String),

    #[error("{} validation errors", .0.len())]
    Validation(Vec<ValidationError>),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StorageError {
    /// The stable wire code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            StorageError::ProjectNotFound(_) => ErrorCode::ProjectNotFound,
            StorageError::ProjectExists(_) => ErrorCode::ProjectExists,
            StorageError::NodeNotFound(_) => ErrorCode::NodeNotFound,
            StorageError::AttachmentNotFound(_) => ErrorCode::NotFound,
            StorageError::InvalidHash(_) => ErrorCode::InvalidInput,
            StorageError::InvalidUuid(_) => ErrorCode::InvalidUuid,
            StorageError::InvalidInput(_) => ErrorCode::InvalidInput,
            StorageError::NameRequired => ErrorCode::NameRequired,
            StorageError::DuplicateName { .. } => ErrorCode::DuplicateName,
            StorageError::InvalidParent(_) => ErrorCode::InvalidParent,
            StorageError::CircularReference(_) => ErrorCode::CircularReference,
            StorageError::Validation(_) => ErrorCode::ValidationFailure,
            StorageError::Io(_) | StorageError::Serde(_) => ErrorCode::StorageFailure,
        }
    }
}

impl From<StorageError> for ArchonError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Validation(errors) => ArchonError::validation(errors),
            other => ArchonError::new(other.code(), other.to_string()),
        }
    }
}
