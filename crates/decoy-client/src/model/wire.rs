//! The wire-structure contract shared by every node of the configuration
//! model, plus extraction helpers for hand-written decoders.
//!
//! The wire format is the nested JSON tree exchanged with the agent's admin
//! API, held as `serde_json::Value`. Several families are tag-less on the
//! wire (the concrete variant is inferred from which keys are present), so
//! decoding is hand-written per family rather than derived.

use serde_json::{Map, Value};

use crate::error::FormatError;

/// Bidirectional conversion between a domain node and its wire structure.
///
/// Round-trip law: `to_structure(from_structure(s)?)` reproduces a
/// well-formed `s`, and `from_structure(to_structure(n))` reproduces `n`
/// field-for-field, modulo normalization of absent optionals to their
/// declared defaults.
pub trait WireFormat: Sized {
    /// Serialize this node into its wire structure.
    fn to_structure(&self) -> Value;

    /// Reconstruct a node from a wire structure, rejecting malformed or
    /// ambiguous input with a [`FormatError`].
    fn from_structure(structure: &Value) -> Result<Self, FormatError>;
}

pub(crate) fn as_object<'a>(
    structure: &'a Value,
    what: &str,
) -> Result<&'a Map<String, Value>, FormatError> {
    structure
        .as_object()
        .ok_or_else(|| FormatError::unexpected(what, "an object"))
}

pub(crate) fn required_str(obj: &Map<String, Value>, key: &str) -> Result<String, FormatError> {
    match obj.get(key) {
        Some(value) => value
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| FormatError::unexpected(key, "a string")),
        None => Err(FormatError::missing(key)),
    }
}

pub(crate) fn optional_str(
    obj: &Map<String, Value>,
    key: &str,
) -> Result<Option<String>, FormatError> {
    match obj.get(key) {
        Some(value) => value
            .as_str()
            .map(str::to_owned)
            .map(Some)
            .ok_or_else(|| FormatError::unexpected(key, "a string")),
        None => Ok(None),
    }
}

pub(crate) fn optional_u64(
    obj: &Map<String, Value>,
    key: &str,
) -> Result<Option<u64>, FormatError> {
    match obj.get(key) {
        Some(value) => value
            .as_u64()
            .map(Some)
            .ok_or_else(|| FormatError::unexpected(key, "an unsigned integer")),
        None => Ok(None),
    }
}

pub(crate) fn optional_bool(
    obj: &Map<String, Value>,
    key: &str,
) -> Result<Option<bool>, FormatError> {
    match obj.get(key) {
        Some(value) => value
            .as_bool()
            .map(Some)
            .ok_or_else(|| FormatError::unexpected(key, "a boolean")),
        None => Ok(None),
    }
}

pub(crate) fn optional_object<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, FormatError> {
    match obj.get(key) {
        Some(value) => value
            .as_object()
            .map(Some)
            .ok_or_else(|| FormatError::unexpected(key, "an object")),
        None => Ok(None),
    }
}

/// Decode a `{key: value}` object whose values must all be strings, as used
/// for header maps.
pub(crate) fn optional_string_map(
    obj: &Map<String, Value>,
    key: &str,
) -> Result<Option<std::collections::HashMap<String, String>>, FormatError> {
    let Some(inner) = optional_object(obj, key)? else {
        return Ok(None);
    };
    let mut map = std::collections::HashMap::with_capacity(inner.len());
    for (name, value) in inner {
        let value = value
            .as_str()
            .ok_or_else(|| FormatError::unexpected(format!("{key}.{name}"), "a string"))?;
        map.insert(name.clone(), value.to_owned());
    }
    Ok(Some(map))
}
