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

//! Shared error taxonomy.
//!
//! Every failure that crosses a service boundary is an [`ArchonError`]:
//! a stable wire code, a human-readable message, and optional structured
//! details. Leaf crates keep their own `thiserror` enums and convert at
//! the boundary, preserving the code.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable wire-visible error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Project lifecycle
    ProjectNotFound,
    ProjectExists,
    NoProject,

    // Validation
    InvalidPath,
    InvalidInput,
    InvalidUuid,
    NameRequired,
    DuplicateName,
    InvalidParent,
    CircularReference,

    // Missing entities
    NodeNotFound,
    NotFound,

    // Subsystems
    StorageFailure,
    SchemaVersion,
    MigrationFailure,
    GitFailure,
    SearchFailure,

    // Plugins
    Unauthorized,
    PluginResourceExceeded,

    // Aggregated field errors
    ValidationFailure,
}

impl ErrorCode {
    /// The exact wire string for this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ProjectNotFound => "PROJECT_NOT_FOUND",
            ErrorCode::ProjectExists => "PROJECT_EXISTS",
            ErrorCode::NoProject => "NO_PROJECT",
            ErrorCode::InvalidPath => "INVALID_PATH",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::InvalidUuid => "INVALID_UUID",
            ErrorCode::NameRequired => "NAME_REQUIRED",
            ErrorCode::DuplicateName => "DUPLICATE_NAME",
            ErrorCode::InvalidParent => "INVALID_PARENT",
            ErrorCode::CircularReference => "CIRCULAR_REFERENCE",
            ErrorCode::NodeNotFound => "NODE_NOT_FOUND",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::StorageFailure => "STORAGE_FAILURE",
            ErrorCode::SchemaVersion => "SCHEMA_VERSION",
            ErrorCode::MigrationFailure => "MIGRATION_FAILURE",
            ErrorCode::GitFailure => "GIT_FAILURE",
            ErrorCode::SearchFailure => "SEARCH_FAILURE",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::PluginResourceExceeded => "PLUGIN_RESOURCE_EXCEEDED",
            ErrorCode::ValidationFailure => "VALIDATION_FAILURE",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// The wire-visible error envelope.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{code}: {message}")]
pub struct ArchonError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ArchonError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Aggregate field-level errors into one `VALIDATION_FAILURE` envelope.
    pub fn validation(errors: Vec<ValidationError>) -> Self {
        let message = match errors.len() {
            1 => errors[0].to_string(),
            n => format!("{n} validation errors"),
        };
        Self {
            code: ErrorCode::ValidationFailure,
            message,
            details: serde_json::to_value(&errors).ok(),
        }
    }

    /// Wrap with context while preserving the wire code.
    pub fn context(mut self, context: impl fmt::Display) -> Self {
        self.message = format!("{context}: {}", self.message);
        self
    }
}

impl From<std::io::Error> for ArchonError {
    fn from(e: std::io::Error) -> Self {
        ArchonError::new(ErrorCode::StorageFailure, e.to_string())
    }
}

impl From<serde_json::Error> for ArchonError {
    fn from(e: serde_json::Error) -> Self {
        ArchonError::new(ErrorCode::StorageFailure, format!("serialization: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, ArchonError>;
