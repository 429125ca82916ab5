//! Coerce-or-default deserializers for loosely typed catalog payloads.
//!
//! Catalog records are decoded field by field; a field with an unexpected
//! shape degrades to its default instead of failing the whole response.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::warn;

/// Any shape: decode as `T` or fall back to `T::default()`.
pub(crate) fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

/// A list of records where undecodable items are dropped with a warning.
pub(crate) fn items<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let Value::Array(values) = Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(values
        .into_iter()
        .filter_map(|v| match T::deserialize(v) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(error = %e, "skipping malformed catalog record");
                None
            }
        })
        .collect())
}

/// String, number, or list → the first scalar as a string.
pub(crate) fn first_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(scalar_string(Value::deserialize(deserializer)?))
}

/// Trimmed string; blank becomes `None`.
pub(crate) fn trimmed_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(scalar_string(Value::deserialize(deserializer)?)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}

/// A list of strings, or a single string as a one-element list.
/// Non-string members are skipped.
pub(crate) fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(values) => values
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s),
                _ => None,
            })
            .collect(),
        Value::String(s) if !s.is_empty() => vec![s],
        _ => Vec::new(),
    })
}

/// Integer, or a numeric string.
pub(crate) fn integer<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// A bare string or an Open Library text object (`{"type": ..., "value": ...}`).
pub(crate) fn text_value<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Object(map) => map.get("value").and_then(Value::as_str).map(str::to_string),
        _ => None,
    })
}

fn scalar_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(values) => values.into_iter().find_map(scalar_string),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Default, Deserialize)]
    struct Record {
        #[serde(default, deserialize_with = "first_string")]
        name: Option<String>,
        #[serde(default, deserialize_with = "string_list")]
        tags: Vec<String>,
        #[serde(default, deserialize_with = "integer")]
        year: Option<i64>,
        #[serde(default, deserialize_with = "text_value")]
        bio: Option<String>,
        #[serde(default, deserialize_with = "trimmed_string")]
        title: Option<String>,
    }

    #[test]
    fn coerces_lists_and_scalars() {
        let record: Record = serde_json::from_value(serde_json::json!({
            "name": ["Mary Shelley", "M. W. Shelley"],
            "tags": "gothic",
            "year": "1818",
            "bio": {"type": "/type/text", "value": "English novelist."},
            "title": "  Frankenstein  ",
        }))
        .expect("decode");

        assert_eq!(record.name.as_deref(), Some("Mary Shelley"));
        assert_eq!(record.tags, vec!["gothic"]);
        assert_eq!(record.year, Some(1818));
        assert_eq!(record.bio.as_deref(), Some("English novelist."));
        assert_eq!(record.title.as_deref(), Some("Frankenstein"));
    }

    #[test]
    fn wrong_shapes_degrade_to_defaults() {
        let record: Record = serde_json::from_value(serde_json::json!({
            "name": {"nested": true},
            "tags": 42,
            "year": [1],
            "bio": 7,
            "title": "   ",
        }))
        .expect("decode");

        assert!(record.name.is_none());
        assert!(record.tags.is_empty());
        assert!(record.year.is_none());
        assert!(record.bio.is_none());
        assert!(record.title.is_none());
    }

    #[test]
    fn null_fields_are_absent() {
        let record: Record =
            serde_json::from_value(serde_json::json!({"name": null, "tags": null})).expect("decode");
        assert!(record.name.is_none());
        assert!(record.tags.is_empty());
    }
}
