//! Responses: what the agent does when a stub matches.
//!
//! Tag-less on the wire, dispatched by key presence in a fixed precedence
//! order: `proxy`, `inject`, `fault`, then `is` — which is a TCP response
//! when it wraps a `data` key and an HTTP response otherwise (with or
//! without a sibling `_behaviors` map). Anything else is unrecognized.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

use crate::error::FormatError;
use crate::model::behavior::Behaviors;
use crate::model::wire::{
    as_object, optional_bool, optional_object, optional_str, optional_string_map, optional_u64,
    required_str, WireFormat,
};

/// Body transfer mode for an HTTP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Text,
    Binary,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Text => "text",
            Mode::Binary => "binary",
        }
    }

    fn parse(value: &str) -> Result<Self, FormatError> {
        match value {
            "text" => Ok(Mode::Text),
            "binary" => Ok(Mode::Binary),
            other => Err(FormatError::UnknownVariant {
                kind: "response mode",
                value: other.to_owned(),
            }),
        }
    }
}

/// A static HTTP response (`is` on the wire) plus its attached behaviors.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// Body text or a JSON tree.
    pub body: Option<Value>,
    pub status_code: u16,
    pub headers: Option<HashMap<String, String>>,
    pub mode: Mode,
    pub behaviors: Behaviors,
}

impl Default for HttpResponse {
    fn default() -> Self {
        HttpResponse {
            body: None,
            status_code: 200,
            headers: None,
            mode: Mode::Text,
            behaviors: Behaviors::default(),
        }
    }
}

impl HttpResponse {
    /// An empty 200 response.
    pub fn ok() -> Self {
        HttpResponse {
            status_code: 200,
            ..HttpResponse::default()
        }
    }

    pub fn with_body(body: impl Into<Value>) -> Self {
        HttpResponse {
            body: Some(body.into()),
            ..HttpResponse::ok()
        }
    }

    /// The `is` fields without their wrapper, as used both inside a stub
    /// response and for an imposter-level default response.
    pub(crate) fn fields_to_structure(&self) -> Value {
        let mut fields = Map::new();
        fields.insert("statusCode".into(), json!(self.status_code));
        fields.insert("_mode".into(), json!(self.mode.as_str()));
        if let Some(body) = &self.body {
            fields.insert("body".into(), body.clone());
        }
        if let Some(headers) = &self.headers {
            fields.insert("headers".into(), json!(headers));
        }
        Value::Object(fields)
    }

    pub(crate) fn fields_from_structure(inner: &Map<String, Value>) -> Result<Self, FormatError> {
        let status = optional_u64(inner, "statusCode")?.unwrap_or(200);
        let status_code = u16::try_from(status)
            .map_err(|_| FormatError::unexpected("statusCode", "a valid HTTP status code"))?;
        let mode = match optional_str(inner, "_mode")? {
            Some(mode) => Mode::parse(&mode)?,
            None => Mode::Text,
        };
        Ok(HttpResponse {
            body: inner.get("body").cloned(),
            status_code,
            headers: optional_string_map(inner, "headers")?,
            mode,
            behaviors: Behaviors::default(),
        })
    }
}

impl WireFormat for HttpResponse {
    fn to_structure(&self) -> Value {
        let mut structure = Map::new();
        structure.insert("is".into(), self.fields_to_structure());
        if !self.behaviors.is_empty() {
            structure.insert("_behaviors".into(), self.behaviors.to_structure());
        }
        Value::Object(structure)
    }

    fn from_structure(structure: &Value) -> Result<Self, FormatError> {
        let obj = as_object(structure, "response")?;
        let inner = optional_object(obj, "is")?.ok_or_else(|| FormatError::missing("is"))?;
        let mut response = HttpResponse::fields_from_structure(inner)?;
        if let Some(behaviors) = obj.get("_behaviors") {
            response.behaviors = Behaviors::from_structure(behaviors)?;
        }
        Ok(response)
    }
}

/// A raw-data response for TCP imposters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpResponse {
    pub data: String,
}

impl TcpResponse {
    pub fn new(data: impl Into<String>) -> Self {
        TcpResponse { data: data.into() }
    }
}

/// Replay mode for recorded proxy traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxyMode {
    /// Record the first response per generated predicate set, replay after.
    #[default]
    ProxyOnce,
    /// Always forward, recording every exchange.
    ProxyAlways,
    /// Forward without recording.
    ProxyTransparent,
}

impl ProxyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyMode::ProxyOnce => "proxyOnce",
            ProxyMode::ProxyAlways => "proxyAlways",
            ProxyMode::ProxyTransparent => "proxyTransparent",
        }
    }

    fn parse(value: &str) -> Result<Self, FormatError> {
        match value {
            "proxyOnce" => Ok(ProxyMode::ProxyOnce),
            "proxyAlways" => Ok(ProxyMode::ProxyAlways),
            "proxyTransparent" => Ok(ProxyMode::ProxyTransparent),
            other => Err(FormatError::UnknownVariant {
                kind: "proxy mode",
                value: other.to_owned(),
            }),
        }
    }
}

/// Tells the agent which request fields to turn into predicates when it
/// saves a recorded proxy response as a stub.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PredicateGenerator {
    /// Request fields to match on, e.g. `{"method": true, "path": true}`.
    pub matches: Map<String, Value>,
    pub case_sensitive: Option<bool>,
}

impl WireFormat for PredicateGenerator {
    fn to_structure(&self) -> Value {
        let mut structure = Map::new();
        structure.insert("matches".into(), Value::Object(self.matches.clone()));
        if let Some(case_sensitive) = self.case_sensitive {
            structure.insert("caseSensitive".into(), Value::Bool(case_sensitive));
        }
        Value::Object(structure)
    }

    fn from_structure(structure: &Value) -> Result<Self, FormatError> {
        let obj = as_object(structure, "predicateGenerator")?;
        Ok(PredicateGenerator {
            matches: optional_object(obj, "matches")?
                .ok_or_else(|| FormatError::missing("matches"))?
                .clone(),
            case_sensitive: optional_bool(obj, "caseSensitive")?,
        })
    }
}

/// Forwards matching requests to an upstream target, optionally recording
/// the exchanges for later static replay.
#[derive(Debug, Clone, PartialEq)]
pub struct Proxy {
    pub to: String,
    pub mode: ProxyMode,
    /// Added latency, in ms, carried in the sibling behaviors map.
    pub wait: Option<u64>,
    pub inject_headers: Option<HashMap<String, String>>,
    pub predicate_generators: Vec<PredicateGenerator>,
    /// Decorating script, carried in the sibling behaviors map.
    pub decorate: Option<String>,
}

impl Proxy {
    pub fn new(to: impl Into<String>) -> Self {
        Proxy {
            to: to.into(),
            mode: ProxyMode::default(),
            wait: None,
            inject_headers: None,
            predicate_generators: Vec::new(),
            decorate: None,
        }
    }
}

impl WireFormat for Proxy {
    fn to_structure(&self) -> Value {
        let mut inner = Map::new();
        inner.insert("to".into(), json!(self.to));
        inner.insert("mode".into(), json!(self.mode.as_str()));
        if let Some(inject_headers) = &self.inject_headers {
            inner.insert("injectHeaders".into(), json!(inject_headers));
        }
        if !self.predicate_generators.is_empty() {
            inner.insert(
                "predicateGenerators".into(),
                Value::Array(
                    self.predicate_generators
                        .iter()
                        .map(PredicateGenerator::to_structure)
                        .collect(),
                ),
            );
        }

        let mut structure = Map::new();
        structure.insert("proxy".into(), Value::Object(inner));
        let mut behaviors = Map::new();
        if let Some(wait) = self.wait {
            behaviors.insert("wait".into(), json!(wait));
        }
        if let Some(decorate) = &self.decorate {
            behaviors.insert("decorate".into(), json!(decorate));
        }
        if !behaviors.is_empty() {
            structure.insert("_behaviors".into(), Value::Object(behaviors));
        }
        Value::Object(structure)
    }

    fn from_structure(structure: &Value) -> Result<Self, FormatError> {
        let obj = as_object(structure, "response")?;
        let inner = optional_object(obj, "proxy")?.ok_or_else(|| FormatError::missing("proxy"))?;
        let mut proxy = Proxy::new(required_str(inner, "to")?);
        if let Some(mode) = optional_str(inner, "mode")? {
            proxy.mode = ProxyMode::parse(&mode)?;
        }
        proxy.inject_headers = optional_string_map(inner, "injectHeaders")?;
        if let Some(generators) = inner.get("predicateGenerators") {
            let generators = generators
                .as_array()
                .ok_or_else(|| FormatError::unexpected("predicateGenerators", "an array"))?;
            proxy.predicate_generators = generators
                .iter()
                .map(PredicateGenerator::from_structure)
                .collect::<Result<_, _>>()?;
        }
        if let Some(behaviors) = optional_object(obj, "_behaviors")? {
            proxy.wait = optional_u64(behaviors, "wait")?;
            proxy.decorate = optional_str(behaviors, "decorate")?;
        }
        Ok(proxy)
    }
}

/// A response generated by a script injected into the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectResponse {
    pub inject: String,
}

impl InjectResponse {
    pub fn new(script: impl Into<String>) -> Self {
        InjectResponse {
            inject: script.into(),
        }
    }
}

/// A simulated transport fault instead of a well-formed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    ConnectionResetByPeer,
    RandomDataThenClose,
}

impl Fault {
    pub fn as_str(&self) -> &'static str {
        match self {
            Fault::ConnectionResetByPeer => "CONNECTION_RESET_BY_PEER",
            Fault::RandomDataThenClose => "RANDOM_DATA_THEN_CLOSE",
        }
    }

    fn parse(value: &str) -> Result<Self, FormatError> {
        match value {
            "CONNECTION_RESET_BY_PEER" => Ok(Fault::ConnectionResetByPeer),
            "RANDOM_DATA_THEN_CLOSE" => Ok(Fault::RandomDataThenClose),
            other => Err(FormatError::UnknownVariant {
                kind: "fault",
                value: other.to_owned(),
            }),
        }
    }
}

/// What the agent returns when a stub matches.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Http(HttpResponse),
    Tcp(TcpResponse),
    Proxy(Proxy),
    Inject(InjectResponse),
    Fault(Fault),
}

impl From<HttpResponse> for Response {
    fn from(response: HttpResponse) -> Self {
        Response::Http(response)
    }
}

impl From<TcpResponse> for Response {
    fn from(response: TcpResponse) -> Self {
        Response::Tcp(response)
    }
}

impl From<Proxy> for Response {
    fn from(proxy: Proxy) -> Self {
        Response::Proxy(proxy)
    }
}

impl From<InjectResponse> for Response {
    fn from(response: InjectResponse) -> Self {
        Response::Inject(response)
    }
}

impl From<Fault> for Response {
    fn from(fault: Fault) -> Self {
        Response::Fault(fault)
    }
}

impl WireFormat for Response {
    fn to_structure(&self) -> Value {
        match self {
            Response::Http(response) => response.to_structure(),
            Response::Tcp(response) => json!({ "is": { "data": response.data } }),
            Response::Proxy(proxy) => proxy.to_structure(),
            Response::Inject(response) => json!({ "inject": response.inject }),
            Response::Fault(fault) => json!({ "fault": fault.as_str() }),
        }
    }

    fn from_structure(structure: &Value) -> Result<Self, FormatError> {
        let obj = as_object(structure, "response")?;

        if obj.contains_key("proxy") {
            return Proxy::from_structure(structure).map(Response::Proxy);
        }
        if let Some(inject) = obj.get("inject") {
            let script = inject
                .as_str()
                .ok_or_else(|| FormatError::unexpected("inject", "a string"))?;
            return Ok(Response::Inject(InjectResponse::new(script)));
        }
        if let Some(fault) = obj.get("fault") {
            let kind = fault
                .as_str()
                .ok_or_else(|| FormatError::unexpected("fault", "a string"))?;
            return Ok(Response::Fault(Fault::parse(kind)?));
        }
        if let Some(inner) = optional_object(obj, "is")? {
            if inner.contains_key("data") {
                return Ok(Response::Tcp(TcpResponse::new(required_str(
                    inner, "data",
                )?)));
            }
            return HttpResponse::from_structure(structure).map(Response::Http);
        }

        Err(FormatError::UnrecognizedResponse(
            obj.keys().cloned().collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::behavior::{Copy, RequestField, Using};
    use assert_json_diff::assert_json_eq;

    #[test]
    fn empty_response_is_a_bare_200() {
        assert_json_eq!(
            HttpResponse::default().to_structure(),
            json!({"is": {"statusCode": 200, "_mode": "text"}})
        );
    }

    #[test]
    fn http_response_round_trips_with_behaviors() {
        let response = HttpResponse {
            body: Some(json!("sausages")),
            status_code: 201,
            headers: Some(HashMap::from([(
                "Content-Type".to_owned(),
                "text/plain".to_owned(),
            )])),
            mode: Mode::Text,
            behaviors: Behaviors {
                wait: Some(250),
                repeat: Some(2),
                copy: vec![Copy::new(
                    RequestField::named("path"),
                    "${path}",
                    Using::regex(".*"),
                )],
                ..Behaviors::default()
            },
        };

        let structure = response.to_structure();
        assert_eq!(structure["is"]["statusCode"], json!(201));
        assert_eq!(structure["_behaviors"]["wait"], json!(250));
        assert_eq!(
            HttpResponse::from_structure(&structure).expect("well-formed structure"),
            response
        );
    }

    #[test]
    fn missing_status_code_defaults_to_200() {
        let response = Response::from_structure(&json!({"is": {"body": "hello"}}))
            .expect("well-formed structure");
        assert_eq!(
            response,
            Response::Http(HttpResponse::with_body("hello"))
        );
    }

    #[test]
    fn is_with_data_key_is_a_tcp_response() {
        let structure = json!({"is": {"data": "raw-bytes"}});
        let response = Response::from_structure(&structure).expect("well-formed structure");
        assert_eq!(response, Response::Tcp(TcpResponse::new("raw-bytes")));
        assert_json_eq!(response.to_structure(), structure);
    }

    #[test]
    fn proxy_round_trips_every_field() {
        let proxy = Proxy {
            to: "https://upstream.example.com".into(),
            mode: ProxyMode::ProxyAlways,
            wait: Some(100),
            inject_headers: Some(HashMap::from([(
                "X-Forwarded-By".to_owned(),
                "decoy".to_owned(),
            )])),
            predicate_generators: vec![PredicateGenerator {
                matches: json!({"method": true, "path": true})
                    .as_object()
                    .expect("object literal")
                    .clone(),
                case_sensitive: Some(false),
            }],
            decorate: Some("function (config) {}".into()),
        };

        let structure = proxy.to_structure();
        assert_eq!(structure["proxy"]["mode"], json!("proxyAlways"));
        assert_eq!(structure["_behaviors"]["wait"], json!(100));
        match Response::from_structure(&structure).expect("well-formed structure") {
            Response::Proxy(rebuilt) => assert_eq!(rebuilt, proxy),
            other => panic!("expected proxy, got {other:?}"),
        }
    }

    #[test]
    fn fault_round_trips() {
        let structure = json!({"fault": "CONNECTION_RESET_BY_PEER"});
        let response = Response::from_structure(&structure).expect("well-formed structure");
        assert_eq!(response, Response::Fault(Fault::ConnectionResetByPeer));
        assert_json_eq!(response.to_structure(), structure);
    }

    #[test]
    fn unknown_fault_kind_is_rejected() {
        let err = Response::from_structure(&json!({"fault": "EXPLODE"})).expect_err("bad fault");
        assert!(matches!(err, FormatError::UnknownVariant { .. }));
    }

    #[test]
    fn unrecognized_shape_reports_its_keys() {
        let err =
            Response::from_structure(&json!({"reply": {}})).expect_err("unrecognized response");
        assert_eq!(err, FormatError::UnrecognizedResponse(vec!["reply".into()]));
    }

    #[test]
    fn json_body_survives_round_trip() {
        let response = HttpResponse::with_body(json!({"items": [1, 2, 3]}));
        let rebuilt = HttpResponse::from_structure(&response.to_structure())
            .expect("well-formed structure");
        assert_eq!(rebuilt.body, Some(json!({"items": [1, 2, 3]})));
    }
}
