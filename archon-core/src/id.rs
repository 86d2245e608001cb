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

//! Node identity.
//!
//! Node IDs are UUID v7: time-ordered, so `nodes/` directory listings and
//! snapshot diffs over freshly created nodes stay roughly chronological.
//! Only the canonical lowercase hex-dashed form is accepted on input; the
//! same form is what lands in filenames and `children` arrays.

use crate::error::{ArchonError, ErrorCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier of a node within a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    /// Generate a fresh time-ordered (UUID v7) identifier.
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Parse the canonical hex-dashed form.
    ///
    /// Rejects everything `Uuid::parse_str` would otherwise tolerate
    /// (braces, urn prefixes, uppercase, missing dashes): node filenames
    /// must round-trip byte-for-byte.
    pub fn parse(input: &str) -> Result<Self, ArchonError> {
        if !Self::is_canonical(input) {
            return Err(ArchonError::new(
                ErrorCode::InvalidUuid,
                format!("not a canonical UUID: {input:?}"),
            ));
        }
        let uuid = Uuid::parse_str(input).map_err(|e| {
            ArchonError::new(ErrorCode::InvalidUuid, format!("invalid UUID {input:?}: {e}"))
        })?;
        Ok(Self(uuid))
    }

    /// Whether `input` is in the canonical lowercase hex-dashed form.
    pub fn is_valid(input: &str) -> bool {
        Self::parse(input).is_ok()
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    fn is_canonical(input: &str) -> bool {
        let bytes = input.as_bytes();
        if bytes.len() != 36 {
            return false;
        }
        for (i, b) in bytes.iter().enumerate() {
            match i {
                8 | 13 | 18 | 23 => {
                    if *b != b'-' {
                        return false;
                    }
                }
                _ => {
                    if !matches!(b, b'0'..=b'9' | b'a'..=b'f') {
                        return false;
                    }
                }
            }
        }
        true
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_hyphenated())
    }
}

impl FromStr for NodeId {
    type Err = ArchonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Uuid> for NodeId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}
