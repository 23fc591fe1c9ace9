//! Predicates: boolean tests over a request's fields, composable with
//! AND/OR/NOT.
//!
//! On the wire a predicate is tag-less. The concrete variant is inferred
//! from which keys are present, in a fixed precedence order: `and`, `or`,
//! `not`, `inject`, `contains` wrapping a `data` key (TCP), and finally a
//! field predicate identified by exactly one comparison-operator key.

use serde_json::{json, Map, Value};

use crate::error::FormatError;
use crate::model::wire::{
    as_object, optional_bool, optional_object, optional_str, required_str, WireFormat,
};

/// HTTP methods a field predicate can match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    pub fn parse(value: &str) -> Result<Self, FormatError> {
        match value {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            "PATCH" => Ok(HttpMethod::Patch),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            other => Err(FormatError::UnknownVariant {
                kind: "HTTP method",
                value: other.to_owned(),
            }),
        }
    }
}

/// The comparison operators a field predicate can be keyed by. Exactly one
/// of these keys identifies a field predicate on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Equals,
    DeepEquals,
    Contains,
    StartsWith,
    EndsWith,
    Matches,
    Exists,
}

impl ComparisonOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOperator::Equals => "equals",
            ComparisonOperator::DeepEquals => "deepEquals",
            ComparisonOperator::Contains => "contains",
            ComparisonOperator::StartsWith => "startsWith",
            ComparisonOperator::EndsWith => "endsWith",
            ComparisonOperator::Matches => "matches",
            ComparisonOperator::Exists => "exists",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "equals" => Some(ComparisonOperator::Equals),
            "deepEquals" => Some(ComparisonOperator::DeepEquals),
            "contains" => Some(ComparisonOperator::Contains),
            "startsWith" => Some(ComparisonOperator::StartsWith),
            "endsWith" => Some(ComparisonOperator::EndsWith),
            "matches" => Some(ComparisonOperator::Matches),
            "exists" => Some(ComparisonOperator::Exists),
            _ => None,
        }
    }
}

/// A test over one or more request fields, keyed by a single comparison
/// operator.
///
/// `query` and `headers` values are kept as raw JSON so that `exists`
/// predicates (boolean values) and structured values survive round trips.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPredicate {
    pub path: Option<String>,
    pub method: Option<HttpMethod>,
    pub query: Option<Map<String, Value>>,
    pub body: Option<Value>,
    pub headers: Option<Map<String, Value>>,
    pub xpath: Option<String>,
    pub jsonpath: Option<String>,
    pub operator: ComparisonOperator,
    pub case_sensitive: bool,
}

impl Default for FieldPredicate {
    fn default() -> Self {
        FieldPredicate {
            path: None,
            method: None,
            query: None,
            body: None,
            headers: None,
            xpath: None,
            jsonpath: None,
            operator: ComparisonOperator::Equals,
            case_sensitive: true,
        }
    }
}

impl FieldPredicate {
    /// An equality predicate on a path.
    pub fn path(path: impl Into<String>) -> Self {
        FieldPredicate {
            path: Some(path.into()),
            ..FieldPredicate::default()
        }
    }

    fn fields_to_structure(&self) -> Value {
        let mut fields = Map::new();
        if let Some(path) = &self.path {
            fields.insert("path".into(), Value::String(path.clone()));
        }
        if let Some(query) = &self.query {
            fields.insert("query".into(), Value::Object(query.clone()));
        }
        if let Some(body) = &self.body {
            fields.insert("body".into(), body.clone());
        }
        if let Some(headers) = &self.headers {
            fields.insert("headers".into(), Value::Object(headers.clone()));
        }
        if let Some(method) = &self.method {
            fields.insert("method".into(), Value::String(method.as_str().to_owned()));
        }
        Value::Object(fields)
    }

    fn fields_from_structure(&mut self, inner: &Map<String, Value>) -> Result<(), FormatError> {
        self.path = optional_str(inner, "path")?;
        self.query = optional_object(inner, "query")?.cloned();
        self.body = inner.get("body").cloned();
        self.headers = optional_object(inner, "headers")?.cloned();
        if let Some(method) = optional_str(inner, "method")? {
            self.method = Some(HttpMethod::parse(&method)?);
        }
        Ok(())
    }
}

impl WireFormat for FieldPredicate {
    fn to_structure(&self) -> Value {
        let mut structure = Map::new();
        structure.insert(self.operator.as_str().into(), self.fields_to_structure());
        structure.insert("caseSensitive".into(), Value::Bool(self.case_sensitive));
        if let Some(xpath) = &self.xpath {
            structure.insert("xpath".into(), json!({ "selector": xpath }));
        }
        if let Some(jsonpath) = &self.jsonpath {
            structure.insert("jsonpath".into(), json!({ "selector": jsonpath }));
        }
        Value::Object(structure)
    }

    fn from_structure(structure: &Value) -> Result<Self, FormatError> {
        let obj = as_object(structure, "predicate")?;
        let mut found: Vec<String> = obj
            .keys()
            .filter(|key| ComparisonOperator::from_key(key.as_str()).is_some())
            .cloned()
            .collect();
        if found.len() != 1 {
            return Err(FormatError::PredicateOperator(found));
        }
        let key = found.remove(0);
        let operator = match ComparisonOperator::from_key(&key) {
            Some(operator) => operator,
            None => return Err(FormatError::PredicateOperator(vec![key])),
        };

        let mut predicate = FieldPredicate {
            operator,
            case_sensitive: optional_bool(obj, "caseSensitive")?.unwrap_or(true),
            ..FieldPredicate::default()
        };
        let inner = as_object(&obj[key.as_str()], &key)?;
        predicate.fields_from_structure(inner)?;
        if let Some(xpath) = optional_object(obj, "xpath")? {
            predicate.xpath = Some(required_str(xpath, "selector")?);
        }
        if let Some(jsonpath) = optional_object(obj, "jsonpath")? {
            predicate.jsonpath = Some(required_str(jsonpath, "selector")?);
        }
        Ok(predicate)
    }
}

/// A predicate over raw TCP request data, carried inside a `contains` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpPredicate {
    pub data: String,
}

impl TcpPredicate {
    pub fn new(data: impl Into<String>) -> Self {
        TcpPredicate { data: data.into() }
    }
}

/// A predicate evaluated by a script injected into the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectPredicate {
    pub inject: String,
}

impl InjectPredicate {
    pub fn new(script: impl Into<String>) -> Self {
        InjectPredicate {
            inject: script.into(),
        }
    }
}

/// A boolean test over a request, matched by the agent before a stub's
/// responses apply.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Field(FieldPredicate),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
    Tcp(TcpPredicate),
    Inject(InjectPredicate),
}

impl Predicate {
    /// Both predicates must match. Pure: operands are moved into a new
    /// composite node.
    pub fn and(self, other: Predicate) -> Predicate {
        Predicate::And(Box::new(self), Box::new(other))
    }

    /// Either predicate may match.
    pub fn or(self, other: Predicate) -> Predicate {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    /// The predicate must not match.
    pub fn negate(self) -> Predicate {
        Predicate::Not(Box::new(self))
    }
}

impl From<FieldPredicate> for Predicate {
    fn from(predicate: FieldPredicate) -> Self {
        Predicate::Field(predicate)
    }
}

impl From<TcpPredicate> for Predicate {
    fn from(predicate: TcpPredicate) -> Self {
        Predicate::Tcp(predicate)
    }
}

impl From<InjectPredicate> for Predicate {
    fn from(predicate: InjectPredicate) -> Self {
        Predicate::Inject(predicate)
    }
}

fn composite_operands(key: &str, value: &Value) -> Result<(Predicate, Predicate), FormatError> {
    let operands = value
        .as_array()
        .ok_or_else(|| FormatError::unexpected(key, "an array"))?;
    match operands.as_slice() {
        [left, right] => Ok((
            Predicate::from_structure(left)?,
            Predicate::from_structure(right)?,
        )),
        _ => Err(FormatError::unexpected(key, "an array of two predicates")),
    }
}

impl WireFormat for Predicate {
    fn to_structure(&self) -> Value {
        match self {
            Predicate::Field(predicate) => predicate.to_structure(),
            Predicate::And(left, right) => {
                json!({ "and": [left.to_structure(), right.to_structure()] })
            }
            Predicate::Or(left, right) => {
                json!({ "or": [left.to_structure(), right.to_structure()] })
            }
            Predicate::Not(inner) => json!({ "not": inner.to_structure() }),
            Predicate::Tcp(tcp) => json!({ "contains": { "data": tcp.data } }),
            Predicate::Inject(inject) => json!({ "inject": inject.inject }),
        }
    }

    fn from_structure(structure: &Value) -> Result<Self, FormatError> {
        let obj = as_object(structure, "predicate")?;

        if let Some(value) = obj.get("and") {
            let (left, right) = composite_operands("and", value)?;
            return Ok(left.and(right));
        }
        if let Some(value) = obj.get("or") {
            let (left, right) = composite_operands("or", value)?;
            return Ok(left.or(right));
        }
        if let Some(value) = obj.get("not") {
            return Ok(Predicate::from_structure(value)?.negate());
        }
        if let Some(value) = obj.get("inject") {
            let script = value
                .as_str()
                .ok_or_else(|| FormatError::unexpected("inject", "a string"))?;
            return Ok(Predicate::Inject(InjectPredicate::new(script)));
        }
        // `contains` wrapping a `data` key is the TCP shape; any other
        // `contains` is an ordinary field predicate.
        if let Some(inner) = optional_object(obj, "contains")? {
            if inner.contains_key("data") {
                return Ok(Predicate::Tcp(TcpPredicate::new(required_str(
                    inner, "data",
                )?)));
            }
        }

        FieldPredicate::from_structure(structure).map(Predicate::Field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_eq;

    #[test]
    fn field_predicate_serializes_operator_keyed_fields() {
        let predicate = FieldPredicate {
            path: Some("/x".into()),
            method: Some(HttpMethod::Get),
            ..FieldPredicate::default()
        };

        assert_json_eq!(
            predicate.to_structure(),
            json!({"equals": {"path": "/x", "method": "GET"}, "caseSensitive": true})
        );
    }

    #[test]
    fn field_predicate_round_trips() {
        let predicate = FieldPredicate {
            path: Some("/orders".into()),
            method: Some(HttpMethod::Post),
            query: Some(
                json!({"page": "2"})
                    .as_object()
                    .expect("object literal")
                    .clone(),
            ),
            body: Some(json!({"name": "sausages"})),
            headers: Some(
                json!({"Content-Type": "application/json"})
                    .as_object()
                    .expect("object literal")
                    .clone(),
            ),
            operator: ComparisonOperator::DeepEquals,
            case_sensitive: false,
            ..FieldPredicate::default()
        };

        let rebuilt = FieldPredicate::from_structure(&predicate.to_structure())
            .expect("well-formed structure");
        assert_eq!(rebuilt, predicate);
    }

    #[test]
    fn selector_fields_round_trip() {
        let predicate = FieldPredicate {
            body: Some(json!("mb")),
            xpath: Some("//title".into()),
            operator: ComparisonOperator::Contains,
            ..FieldPredicate::default()
        };

        let structure = predicate.to_structure();
        assert_json_eq!(structure["xpath"], json!({"selector": "//title"}));
        assert_eq!(
            FieldPredicate::from_structure(&structure).expect("well-formed structure"),
            predicate
        );
    }

    #[test]
    fn two_operator_keys_are_rejected() {
        let structure = json!({
            "equals": {"path": "/x"},
            "deepEquals": {"path": "/x"}
        });

        let err = Predicate::from_structure(&structure).expect_err("ambiguous operator");
        assert_eq!(
            err,
            FormatError::PredicateOperator(vec!["deepEquals".into(), "equals".into()])
        );
    }

    #[test]
    fn zero_operator_keys_are_rejected() {
        let err =
            Predicate::from_structure(&json!({"caseSensitive": true})).expect_err("no operator");
        assert_eq!(err, FormatError::PredicateOperator(vec![]));
    }

    #[test]
    fn and_combinator_produces_expected_shape() {
        let a = Predicate::from(FieldPredicate::path("/a"));
        let b = Predicate::from(FieldPredicate::path("/b"));
        let combined = a.clone().and(b.clone());

        assert_json_eq!(
            combined.to_structure(),
            json!({"and": [a.to_structure(), b.to_structure()]})
        );

        let rebuilt =
            Predicate::from_structure(&combined.to_structure()).expect("well-formed structure");
        assert_eq!(rebuilt, combined);
    }

    #[test]
    fn or_and_not_round_trip() {
        let predicate = Predicate::from(FieldPredicate::path("/a"))
            .or(Predicate::from(FieldPredicate::path("/b")))
            .negate();

        let structure = predicate.to_structure();
        assert!(structure.get("not").is_some());
        assert_eq!(
            Predicate::from_structure(&structure).expect("well-formed structure"),
            predicate
        );
    }

    #[test]
    fn contains_with_data_key_is_a_tcp_predicate() {
        let structure = json!({"contains": {"data": "abc123"}});
        let predicate = Predicate::from_structure(&structure).expect("well-formed structure");
        assert_eq!(predicate, Predicate::Tcp(TcpPredicate::new("abc123")));
        assert_json_eq!(predicate.to_structure(), structure);
    }

    #[test]
    fn contains_without_data_key_is_a_field_predicate() {
        let structure = json!({"contains": {"body": "abc"}, "caseSensitive": true});
        match Predicate::from_structure(&structure).expect("well-formed structure") {
            Predicate::Field(field) => {
                assert_eq!(field.operator, ComparisonOperator::Contains);
                assert_eq!(field.body, Some(json!("abc")));
            }
            other => panic!("expected field predicate, got {other:?}"),
        }
    }

    #[test]
    fn inject_predicate_round_trips() {
        let structure = json!({"inject": "function (request) { return true; }"});
        let predicate = Predicate::from_structure(&structure).expect("well-formed structure");
        assert_eq!(
            predicate,
            Predicate::Inject(InjectPredicate::new(
                "function (request) { return true; }"
            ))
        );
        assert_json_eq!(predicate.to_structure(), structure);
    }

    #[test]
    fn unknown_method_is_rejected() {
        let structure = json!({"equals": {"method": "TEAPOT"}});
        let err = Predicate::from_structure(&structure).expect_err("bad method");
        assert!(matches!(err, FormatError::UnknownVariant { .. }));
    }
}
