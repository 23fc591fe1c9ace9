//! Recorded traffic read back from the agent, for asserting on what a test
//! actually sent.
//!
//! These records are reconstruction-only: the agent produces them, the
//! client never writes them. Their shapes are fully keyed, so they map
//! straight onto serde derives rather than hand-written decoders.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::FormatError;

/// An HTTP request the agent recorded against an imposter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequest {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub query: Map<String, Value>,
    #[serde(default)]
    pub headers: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// A mailbox in a recorded email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub address: String,
    #[serde(default)]
    pub name: String,
}

/// An email the agent's SMTP imposter received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentEmail {
    #[serde(default)]
    pub envelope_from: String,
    #[serde(default)]
    pub envelope_to: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    #[serde(default)]
    pub to: Vec<Address>,
    #[serde(default)]
    pub cc: Vec<Address>,
    #[serde(default)]
    pub bcc: Vec<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// One recorded interaction: an HTTP request, or a sent email when the
/// structure carries the email-specific `envelopeFrom` field.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedRequest {
    Http(HttpRequest),
    Email(SentEmail),
}

impl RecordedRequest {
    pub fn from_structure(structure: &Value) -> Result<Self, FormatError> {
        if structure.get("envelopeFrom").is_some() {
            serde_json::from_value(structure.clone())
                .map(RecordedRequest::Email)
                .map_err(|err| FormatError::Malformed(err.to_string()))
        } else {
            serde_json::from_value(structure.clone())
                .map(RecordedRequest::Http)
                .map_err(|err| FormatError::Malformed(err.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn http_record_maps_fields_one_to_one() {
        let structure = json!({
            "requestFrom": "127.0.0.1:51284",
            "method": "POST",
            "path": "/orders",
            "query": {"page": "2"},
            "headers": {"Host": "localhost:4545", "Content-Length": 16},
            "body": "{\"name\": \"mb\"}",
            "timestamp": "2024-03-01T12:00:00.000Z",
        });

        match RecordedRequest::from_structure(&structure).expect("well-formed record") {
            RecordedRequest::Http(request) => {
                assert_eq!(request.method, "POST");
                assert_eq!(request.path, "/orders");
                assert_eq!(request.query["page"], json!("2"));
                assert_eq!(request.headers["Host"], json!("localhost:4545"));
                assert_eq!(request.body, Some(json!("{\"name\": \"mb\"}")));
                assert_eq!(request.request_from.as_deref(), Some("127.0.0.1:51284"));
            }
            other => panic!("expected http record, got {other:?}"),
        }
    }

    #[test]
    fn envelope_from_marks_an_email_record() {
        let structure = json!({
            "requestFrom": "127.0.0.1:51290",
            "envelopeFrom": "sender@example.com",
            "envelopeTo": ["reader@example.com"],
            "from": {"address": "sender@example.com", "name": "Sender"},
            "to": [{"address": "reader@example.com", "name": "Reader"}],
            "cc": [],
            "bcc": [],
            "subject": "order shipped",
            "text": "it is on its way",
        });

        match RecordedRequest::from_structure(&structure).expect("well-formed record") {
            RecordedRequest::Email(email) => {
                assert_eq!(email.envelope_from, "sender@example.com");
                assert_eq!(email.to[0].address, "reader@example.com");
                assert_eq!(email.to[0].name, "Reader");
                assert_eq!(email.subject.as_deref(), Some("order shipped"));
                assert_eq!(email.text.as_deref(), Some("it is on its way"));
            }
            other => panic!("expected email record, got {other:?}"),
        }
    }

    #[test]
    fn minimal_http_record_reconstructs() {
        let record = RecordedRequest::from_structure(&json!({"method": "GET", "path": "/"}))
            .expect("well-formed record");
        assert_eq!(
            record,
            RecordedRequest::Http(HttpRequest {
                method: "GET".into(),
                path: "/".into(),
                query: Map::new(),
                headers: Map::new(),
                body: None,
                request_from: None,
                timestamp: None,
            })
        );
    }
}
