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

//! Canonical JSON serialization.
//!
//! Everything that may end up in a Git commit goes through this writer:
//! object keys sorted at every nesting level, two-space indentation, LF
//! line endings, UTF-8 without BOM, exactly one trailing newline. Two
//! logically equal documents always serialize to identical bytes, which
//! keeps textual diffs quiet and makes three-way merges stable.

use crate::error::{ArchonError, ErrorCode, Result};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;

/// Serialize `value` into the canonical on-disk form.
///
/// Serialization is routed through [`serde_json::Value`], whose object
/// representation is ordered by key, so struct field order never leaks
/// into the output.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value)?;
    canonical_string(&value)
}

fn canonical_string(value: &Value) -> Result<String> {
    let mut buf = Vec::with_capacity(256);
    let formatter = PrettyFormatter::with_indent(b"  ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    buf.push(b'\n');
    String::from_utf8(buf)
        .map_err(|e| ArchonError::new(ErrorCode::StorageFailure, format!("non-UTF-8 output: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_keys_are_sorted_at_every_level() {
        let doc = json!({
            "zebra": 1,
            "alpha": { "nested_z": true, "nested_a": false },
            "mid": [ { "b": 1, "a": 2 } ]
        });
        let out = to_canonical_json(&doc).unwrap();
        let alpha = out.find("\"alpha\"").unwrap();
        let mid = out.find("\"mid\"").unwrap();
        let zebra = out.find("\"zebra\"").unwrap();
        assert!(alpha < mid && mid < zebra);
        assert!(out.find("\"nested_a\"").unwrap() < out.find("\"nested_z\"").unwrap());
        assert!(out.find("\"a\"").unwrap() < out.find("\"b\"").unwrap());
    }

    #[test]
    fn test_trailing_newline_and_indent() {
        let out = to_canonical_json(&json!({ "k": [1, 2] })).unwrap();
        assert!(out.ends_with("]\n}\n") || out.ends_with("}\n"));
        assert_eq!(out.matches('\n').count(), out.lines().count());
        assert!(out.contains("\n  \"k\""));
        assert!(!out.contains('\r'));
    }

    #[test]
    fn test_struct_field_order_does_not_leak() {
        #[derive(serde::Serialize)]
        struct Unsorted {
            zulu: u32,
            alpha: u32,
        }
        let out = to_canonical_json(&Unsorted { zulu: 1, alpha: 2 }).unwrap();
        assert!(out.find("alpha").unwrap() < out.find("zulu").unwrap());
    }

    fn arb_json(depth: u32) -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z0-9 _-]{0,12}".prop_map(Value::from),
        ];
        leaf.prop_recursive(depth, 64, 8, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::from),
                prop::collection::btree_map("[a-z_]{1,8}", inner, 0..6)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        // serialize(parse(serialize(x))) == serialize(x)
        #[test]
        fn prop_canonicalization_is_idempotent(value in arb_json(3)) {
            let once = to_canonical_json(&value).unwrap();
            let parsed: Value = serde_json::from_str(&once).unwrap();
            let twice = to_canonical_json(&parsed).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}
