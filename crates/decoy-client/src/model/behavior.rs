//! Response behaviors: latency, repeat counts, decorating scripts, shell
//! transforms, and the value-copy / datasource-lookup helpers.
//!
//! Behaviors ride next to a response in a sibling `_behaviors` map. Multiple
//! copy/lookup behaviors apply in declaration order, so both are kept as
//! ordered lists.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

use crate::error::FormatError;
use crate::model::wire::{
    as_object, optional_object, optional_str, optional_string_map, optional_u64, required_str,
    WireFormat,
};

/// How a copy/lookup behavior selects values out of the request. The
/// `method` key is an explicit discriminator — the one family on the wire
/// with a true tag — and it determines which optional fields are legal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Using {
    Regex {
        selector: String,
        ignore_case: bool,
        multiline: bool,
    },
    Xpath {
        selector: String,
        ns: Option<HashMap<String, String>>,
    },
    Jsonpath {
        selector: String,
    },
}

impl Using {
    pub fn regex(selector: impl Into<String>) -> Self {
        Using::Regex {
            selector: selector.into(),
            ignore_case: false,
            multiline: false,
        }
    }

    pub fn xpath(selector: impl Into<String>) -> Self {
        Using::Xpath {
            selector: selector.into(),
            ns: None,
        }
    }

    pub fn jsonpath(selector: impl Into<String>) -> Self {
        Using::Jsonpath {
            selector: selector.into(),
        }
    }
}

impl WireFormat for Using {
    fn to_structure(&self) -> Value {
        match self {
            Using::Regex {
                selector,
                ignore_case,
                multiline,
            } => json!({
                "method": "regex",
                "selector": selector,
                "options": { "ignoreCase": ignore_case, "multiline": multiline },
            }),
            Using::Xpath { selector, ns } => {
                let mut structure = Map::new();
                structure.insert("method".into(), json!("xpath"));
                structure.insert("selector".into(), json!(selector));
                if let Some(ns) = ns {
                    structure.insert("ns".into(), json!(ns));
                }
                Value::Object(structure)
            }
            Using::Jsonpath { selector } => json!({
                "method": "jsonpath",
                "selector": selector,
            }),
        }
    }

    fn from_structure(structure: &Value) -> Result<Self, FormatError> {
        let obj = as_object(structure, "using")?;
        let method = required_str(obj, "method")?;
        let selector = required_str(obj, "selector")?;
        match method.as_str() {
            "regex" => {
                let options = optional_object(obj, "options")?;
                let flag = |name: &str| -> Result<bool, FormatError> {
                    match options {
                        Some(options) => {
                            Ok(crate::model::wire::optional_bool(options, name)?.unwrap_or(false))
                        }
                        None => Ok(false),
                    }
                };
                Ok(Using::Regex {
                    selector,
                    ignore_case: flag("ignoreCase")?,
                    multiline: flag("multiline")?,
                })
            }
            "xpath" => Ok(Using::Xpath {
                selector,
                ns: optional_string_map(obj, "ns")?,
            }),
            "jsonpath" => Ok(Using::Jsonpath { selector }),
            other => Err(FormatError::UnknownVariant {
                kind: "using method",
                value: other.to_owned(),
            }),
        }
    }
}

/// The request field a copy/lookup behavior reads: a plain field name
/// (`path`, `body`), or a `{field: key}` pair for keyed fields such as
/// `query` and `headers`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestField {
    Named(String),
    Keyed { field: String, key: String },
}

impl RequestField {
    pub fn named(field: impl Into<String>) -> Self {
        RequestField::Named(field.into())
    }

    pub fn keyed(field: impl Into<String>, key: impl Into<String>) -> Self {
        RequestField::Keyed {
            field: field.into(),
            key: key.into(),
        }
    }
}

impl WireFormat for RequestField {
    fn to_structure(&self) -> Value {
        match self {
            RequestField::Named(field) => Value::String(field.clone()),
            RequestField::Keyed { field, key } => {
                let mut obj = Map::new();
                obj.insert(field.clone(), Value::String(key.clone()));
                Value::Object(obj)
            }
        }
    }

    fn from_structure(structure: &Value) -> Result<Self, FormatError> {
        match structure {
            Value::String(field) => Ok(RequestField::Named(field.clone())),
            Value::Object(obj) => {
                let mut entries = obj.iter();
                match (entries.next(), entries.next()) {
                    (Some((field, key)), None) => {
                        let key = key
                            .as_str()
                            .ok_or_else(|| FormatError::unexpected(format!("from.{field}"), "a string"))?;
                        Ok(RequestField::keyed(field, key))
                    }
                    _ => Err(FormatError::unexpected(
                        "from",
                        "a string or a single-entry object",
                    )),
                }
            }
            _ => Err(FormatError::unexpected(
                "from",
                "a string or a single-entry object",
            )),
        }
    }
}

/// Copies a selected request value over a token in the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Copy {
    pub from: RequestField,
    pub into: String,
    pub using: Using,
}

impl Copy {
    pub fn new(from: RequestField, into: impl Into<String>, using: Using) -> Self {
        Copy {
            from,
            into: into.into(),
            using,
        }
    }
}

impl WireFormat for Copy {
    fn to_structure(&self) -> Value {
        json!({
            "from": self.from.to_structure(),
            "into": self.into,
            "using": self.using.to_structure(),
        })
    }

    fn from_structure(structure: &Value) -> Result<Self, FormatError> {
        let obj = as_object(structure, "copy")?;
        Ok(Copy {
            from: RequestField::from_structure(
                obj.get("from").ok_or_else(|| FormatError::missing("from"))?,
            )?,
            into: required_str(obj, "into")?,
            using: Using::from_structure(
                obj.get("using")
                    .ok_or_else(|| FormatError::missing("using"))?,
            )?,
        })
    }
}

/// Selects the lookup key out of the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    pub from: RequestField,
    pub using: Using,
    pub index: u64,
}

impl Key {
    pub fn new(from: RequestField, using: Using) -> Self {
        Key {
            from,
            using,
            index: 0,
        }
    }
}

impl WireFormat for Key {
    fn to_structure(&self) -> Value {
        json!({
            "from": self.from.to_structure(),
            "using": self.using.to_structure(),
            "index": self.index,
        })
    }

    fn from_structure(structure: &Value) -> Result<Self, FormatError> {
        let obj = as_object(structure, "key")?;
        Ok(Key {
            from: RequestField::from_structure(
                obj.get("from").ok_or_else(|| FormatError::missing("from"))?,
            )?,
            using: Using::from_structure(
                obj.get("using")
                    .ok_or_else(|| FormatError::missing("using"))?,
            )?,
            index: optional_u64(obj, "index")?.unwrap_or(0),
        })
    }
}

/// Replaces a token in the response with a row looked up from a CSV
/// datasource, keyed by a value selected from the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    pub key: Key,
    pub datasource_path: String,
    pub datasource_key_column: String,
    pub into: String,
}

impl Lookup {
    pub fn new(
        key: Key,
        datasource_path: impl Into<String>,
        datasource_key_column: impl Into<String>,
        into: impl Into<String>,
    ) -> Self {
        Lookup {
            key,
            datasource_path: datasource_path.into(),
            datasource_key_column: datasource_key_column.into(),
            into: into.into(),
        }
    }
}

impl WireFormat for Lookup {
    fn to_structure(&self) -> Value {
        json!({
            "key": self.key.to_structure(),
            "fromDataSource": {
                "csv": { "path": self.datasource_path, "keyColumn": self.datasource_key_column },
            },
            "into": self.into,
        })
    }

    fn from_structure(structure: &Value) -> Result<Self, FormatError> {
        let obj = as_object(structure, "lookup")?;
        let key = Key::from_structure(obj.get("key").ok_or_else(|| FormatError::missing("key"))?)?;
        let datasource = optional_object(obj, "fromDataSource")?
            .ok_or_else(|| FormatError::missing("fromDataSource"))?;
        let csv = optional_object(datasource, "csv")?
            .ok_or_else(|| FormatError::missing("fromDataSource.csv"))?;
        Ok(Lookup {
            key,
            datasource_path: required_str(csv, "path")?,
            datasource_key_column: required_str(csv, "keyColumn")?,
            into: required_str(obj, "into")?,
        })
    }
}

/// The auxiliary behavior collection attached to an HTTP response,
/// serialized as the response's sibling `_behaviors` map.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Behaviors {
    /// Added latency, in ms.
    pub wait: Option<u64>,
    /// Repeat this response this many times before moving to the next one.
    pub repeat: Option<u64>,
    /// Post-processing script applied to the response.
    pub decorate: Option<String>,
    /// Shell command the response is piped through.
    pub shell_transform: Option<String>,
    pub copy: Vec<Copy>,
    pub lookup: Vec<Lookup>,
}

impl Behaviors {
    pub fn is_empty(&self) -> bool {
        self.wait.is_none()
            && self.repeat.is_none()
            && self.decorate.is_none()
            && self.shell_transform.is_none()
            && self.copy.is_empty()
            && self.lookup.is_empty()
    }
}

impl WireFormat for Behaviors {
    fn to_structure(&self) -> Value {
        let mut structure = Map::new();
        if let Some(wait) = self.wait {
            structure.insert("wait".into(), json!(wait));
        }
        if let Some(repeat) = self.repeat {
            structure.insert("repeat".into(), json!(repeat));
        }
        if let Some(decorate) = &self.decorate {
            structure.insert("decorate".into(), json!(decorate));
        }
        if let Some(shell_transform) = &self.shell_transform {
            structure.insert("shellTransform".into(), json!(shell_transform));
        }
        if !self.copy.is_empty() {
            structure.insert(
                "copy".into(),
                Value::Array(self.copy.iter().map(Copy::to_structure).collect()),
            );
        }
        if !self.lookup.is_empty() {
            structure.insert(
                "lookup".into(),
                Value::Array(self.lookup.iter().map(Lookup::to_structure).collect()),
            );
        }
        Value::Object(structure)
    }

    fn from_structure(structure: &Value) -> Result<Self, FormatError> {
        let obj = as_object(structure, "_behaviors")?;
        let mut behaviors = Behaviors {
            wait: optional_u64(obj, "wait")?,
            repeat: optional_u64(obj, "repeat")?,
            decorate: optional_str(obj, "decorate")?,
            shell_transform: optional_str(obj, "shellTransform")?,
            ..Behaviors::default()
        };
        if let Some(copies) = obj.get("copy") {
            let copies = copies
                .as_array()
                .ok_or_else(|| FormatError::unexpected("copy", "an array"))?;
            behaviors.copy = copies
                .iter()
                .map(Copy::from_structure)
                .collect::<Result<_, _>>()?;
        }
        if let Some(lookups) = obj.get("lookup") {
            let lookups = lookups
                .as_array()
                .ok_or_else(|| FormatError::unexpected("lookup", "an array"))?;
            behaviors.lookup = lookups
                .iter()
                .map(Lookup::from_structure)
                .collect::<Result<_, _>>()?;
        }
        Ok(behaviors)
    }
}
