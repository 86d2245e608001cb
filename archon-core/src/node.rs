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

//! The node data model.
//!
//! A node is one record of the configuration tree, stored as
//! `nodes/<id>.json`. Content (name, description, properties) is
//! authoritative in the node's own file; structure is authoritative in the
//! parent's ordered `children` array.

use crate::error::ValidationError;
use crate::id::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Property keys starting with this prefix are reserved for the engine.
pub const RESERVED_PROPERTY_PREFIX: &str = "_";

/// One node of the configuration tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Immutable identity; also the filename under `nodes/`.
    pub id: NodeId,
    /// Display name; unique among siblings case-insensitively after trim.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Property>,
    /// Ordered child IDs. Order is meaningful and preserved.
    #[serde(default)]
    pub children: Vec<NodeId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: NodeId::generate(),
            name: name.into(),
            description: None,
            properties: BTreeMap::new(),
            children: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Bump the modification timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Hashes of every attachment-typed property on this node.
    pub fn attachment_hashes(&self) -> Vec<&str> {
        self.properties
            .values()
            .filter_map(|p| match &p.value {
                PropertyValue::Attachment(att) => Some(att.hash.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// A typed property on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_hint: Option<PropertyType>,
    pub value: PropertyValue,
}

impl Property {
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            type_hint: Some(PropertyType::String),
            value: PropertyValue::Text(value.into()),
        }
    }

    pub fn number(value: impl Into<serde_json::Number>) -> Self {
        Self {
            type_hint: Some(PropertyType::Number),
            value: PropertyValue::Number(value.into()),
        }
    }

    pub fn boolean(value: bool) -> Self {
        Self {
            type_hint: Some(PropertyType::Boolean),
            value: PropertyValue::Boolean(value),
        }
    }

    pub fn attachment(reference: AttachmentRef) -> Self {
        Self {
            type_hint: Some(PropertyType::Attachment),
            value: PropertyValue::Attachment(reference),
        }
    }

    pub fn is_attachment(&self) -> bool {
        self.type_hint == Some(PropertyType::Attachment)
            || matches!(self.value, PropertyValue::Attachment(_))
    }
}

/// Declared value type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Number,
    Boolean,
    Date,
    Attachment,
}

/// A property value: a JSON scalar or an attachment reference.
///
/// `Attachment` must stay first: untagged deserialization tries variants
/// in order and the attachment object is the only map shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Attachment(AttachmentRef),
    Text(String),
    Number(serde_json::Number),
    Boolean(bool),
    Null,
}

/// Reference to a content-addressed attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    /// 64-char lowercase SHA-256 hex of the content.
    pub hash: String,
    /// Sanitized original filename, for display only.
    pub filename: String,
    /// Content size in bytes.
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Attachment,
}

impl AttachmentRef {
    pub fn new(hash: impl Into<String>, filename: impl Into<String>, size: u64) -> Self {
        Self {
            kind: AttachmentKind::Attachment,
            hash: hash.into(),
            filename: filename.into(),
            size,
        }
    }

    /// Whether `hash` is a well-formed lowercase SHA-256 hex digest.
    pub fn is_valid_hash(hash: &str) -> bool {
        hash.len() == 64 && hash.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }
}

/// Name as compared for sibling uniqueness: trimmed of surrounding
/// whitespace.
pub fn normalized_name(name: &str) -> &str {
    name.trim()
}

/// Case-insensitive sibling-name collision check (after trimming).
pub fn names_collide(a: &str, b: &str) -> bool {
    normalized_name(a).to_lowercase() == normalized_name(b).to_lowercase()
}

/// Field-level validation of a node name.
pub fn validate_name(name: &str, errors: &mut Vec<ValidationError>) {
    if normalized_name(name).is_empty() {
        errors.push(ValidationError::new("name", "must not be empty"));
    }
}

/// Field-level validation of a property map.
pub fn validate_properties(
    properties: &BTreeMap<String, Property>,
    errors: &mut Vec<ValidationError>,
) {
    for (key, property) in properties {
        if key.starts_with(RESERVED_PROPERTY_PREFIX) {
            errors.push(ValidationError::new(
                format!("properties.{key}"),
                "keys starting with '_' are reserved",
            ));
        }
        if let PropertyValue::Attachment(att) = &property.value {
            if !AttachmentRef::is_valid_hash(&att.hash) {
                errors.push(ValidationError::new(
                    format!("properties.{key}.hash"),
                    "must be a 64-character lowercase SHA-256 hex digest",
                ));
            }
        }
    }
}
