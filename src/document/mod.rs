//! Ordered JSON documents
//!
//! A [`Document`] is the unit moved by both streams: one element of the
//! import array, or one result of an export query. Fields are kept as an
//! explicit ordered sequence so a field can be renamed in place without
//! disturbing the order of its neighbours.

use std::collections::HashSet;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

pub mod normalizer;

pub use normalizer::{KeyNormalizer, normalize_name};

/// Canonical name of the identity field.
pub const ID_FIELD: &str = "id";

/// An ordered mapping of field name to JSON value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    fields: Vec<(String, Value)>,
}

/// A field located by [`Document::find_ignore_case`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldRef<'a> {
    /// Position of the field in the document
    pub index: usize,
    /// Name exactly as it appears in the document
    pub name: &'a str,
    /// Field value
    pub value: &'a Value,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Build a document from a JSON value; `None` unless the value is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(map.into_iter().collect()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Append a field at the end.
    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.fields.push((name.into(), value));
    }

    /// Value of the first field named exactly `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// Find a field whose name equals `name` ignoring ASCII case.
    ///
    /// An exact match wins over a case-insensitive one even when it appears
    /// later in the document.
    pub fn find_ignore_case(&self, name: &str) -> Option<FieldRef<'_>> {
        let exact = self.fields.iter().position(|(key, _)| key == name);
        let index = exact.or_else(|| {
            self.fields
                .iter()
                .position(|(key, _)| key.eq_ignore_ascii_case(name))
        })?;
        let (key, value) = &self.fields[index];
        Some(FieldRef {
            index,
            name: key,
            value,
        })
    }

    /// Rename the field at `index`, keeping its position and value.
    ///
    /// Returns the previous name, or `None` when `index` is out of range.
    pub fn rename_at(&mut self, index: usize, name: impl Into<String>) -> Option<String> {
        let slot = self.fields.get_mut(index)?;
        Some(std::mem::replace(&mut slot.0, name.into()))
    }

    /// Name of the field at `index`.
    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(|(key, _)| key.as_str())
    }

    /// First field name that appears more than once, if any.
    ///
    /// Parsed documents never repeat a name, but renaming can produce one.
    pub fn duplicate_name(&self) -> Option<&str> {
        let mut seen = HashSet::with_capacity(self.fields.len());
        self.keys().find(|name| !seen.insert(*name))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn into_fields(self) -> Vec<(String, Value)> {
        self.fields
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DocumentVisitor;

        impl<'de> Visitor<'de> for DocumentVisitor {
            type Value = Document;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Document, A::Error> {
                let mut doc = Document::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    doc.push(key, value);
                }
                Ok(doc)
            }
        }

        deserializer.deserialize_map(DocumentVisitor)
    }
}

/// Render an identity value for diagnostics.
///
/// Strings are shown without quotes; anything else as compact JSON.
pub fn identity_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(text: &str) -> Document {
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn test_deserialize_preserves_field_order() {
        let doc = parse(r#"{"z":1,"a":2,"m":{"y":1,"b":2}}"#);
        assert_eq!(doc.keys().collect::<Vec<_>>(), vec!["z", "a", "m"]);
        assert_eq!(
            serde_json::to_string(&doc).unwrap(),
            r#"{"z":1,"a":2,"m":{"y":1,"b":2}}"#
        );
    }

    #[test]
    fn test_find_ignore_case_prefers_exact_match() {
        let doc = parse(r#"{"ID":"upper","id":"exact"}"#);
        let field = doc.find_ignore_case("id").unwrap();
        assert_eq!(field.index, 1);
        assert_eq!(field.value, &json!("exact"));

        let doc = parse(r#"{"name":"x","Id":"a"}"#);
        let field = doc.find_ignore_case("id").unwrap();
        assert_eq!((field.index, field.name), (1, "Id"));

        assert!(parse(r#"{"identity":"x"}"#).find_ignore_case("id").is_none());
    }

    #[test]
    fn test_rename_at_keeps_position() {
        let mut doc = parse(r#"{"a":1,"Id":"x","b":2}"#);
        assert_eq!(doc.rename_at(1, "id").as_deref(), Some("Id"));
        assert_eq!(doc.keys().collect::<Vec<_>>(), vec!["a", "id", "b"]);
        assert_eq!(doc.get("id"), Some(&json!("x")));
        assert!(doc.rename_at(7, "nope").is_none());
    }

    #[test]
    fn test_duplicate_name_after_rename() {
        let mut doc = Document::from_value(json!({"Id": "a", "id": "b", "n": 1})).unwrap();
        assert_eq!(doc.duplicate_name(), None);
        doc.rename_at(0, "id");
        assert_eq!(doc.duplicate_name(), Some("id"));
    }

    #[test]
    fn test_from_value_rejects_non_objects() {
        assert!(Document::from_value(json!([1, 2])).is_none());
        assert!(Document::from_value(json!("text")).is_none());
        assert_eq!(Document::from_value(json!({"a": 1})).unwrap().len(), 1);
    }

    #[test]
    fn test_identity_text() {
        assert_eq!(identity_text(&json!("abc")), "abc");
        assert_eq!(identity_text(&json!(42)), "42");
    }
}
