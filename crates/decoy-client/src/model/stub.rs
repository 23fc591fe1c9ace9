//! Stubs: ordered predicate-matched response rules within an imposter.

use serde_json::{json, Value};

use crate::error::FormatError;
use crate::model::predicate::{FieldPredicate, HttpMethod, Predicate};
use crate::model::response::{HttpResponse, Response};
use crate::model::wire::{as_object, WireFormat};

/// An ordered rule: predicates that trigger it, and the responses returned
/// (in order, cycled per each response's repeat behavior) when it matches.
///
/// A stub always carries at least one predicate and one response: empty
/// lists fall back to a match-all predicate and an empty 200 response.
#[derive(Debug, Clone, PartialEq)]
pub struct Stub {
    pub predicates: Vec<Predicate>,
    pub responses: Vec<Response>,
}

impl Stub {
    pub fn new(predicates: Vec<Predicate>, responses: Vec<Response>) -> Self {
        Stub {
            predicates: if predicates.is_empty() {
                vec![Stub::match_all()]
            } else {
                predicates
            },
            responses: if responses.is_empty() {
                vec![Response::Http(HttpResponse::ok())]
            } else {
                responses
            },
        }
    }

    /// A single-predicate, single-response stub.
    pub fn matching(predicate: Predicate, response: Response) -> Self {
        Stub::new(vec![predicate], vec![response])
    }

    fn match_all() -> Predicate {
        Predicate::Field(FieldPredicate {
            path: Some("/".into()),
            method: Some(HttpMethod::Get),
            ..FieldPredicate::default()
        })
    }
}

impl Default for Stub {
    fn default() -> Self {
        Stub::new(Vec::new(), Vec::new())
    }
}

impl WireFormat for Stub {
    fn to_structure(&self) -> Value {
        json!({
            "predicates": self.predicates.iter().map(Predicate::to_structure).collect::<Vec<_>>(),
            "responses": self.responses.iter().map(Response::to_structure).collect::<Vec<_>>(),
        })
    }

    fn from_structure(structure: &Value) -> Result<Self, FormatError> {
        let obj = as_object(structure, "stub")?;
        let mut predicates = Vec::new();
        if let Some(values) = obj.get("predicates") {
            let values = values
                .as_array()
                .ok_or_else(|| FormatError::unexpected("predicates", "an array"))?;
            predicates = values
                .iter()
                .map(Predicate::from_structure)
                .collect::<Result<_, _>>()?;
        }
        let mut responses = Vec::new();
        if let Some(values) = obj.get("responses") {
            let values = values
                .as_array()
                .ok_or_else(|| FormatError::unexpected("responses", "an array"))?;
            responses = values
                .iter()
                .map(Response::from_structure)
                .collect::<Result<_, _>>()?;
        }
        Ok(Stub::new(predicates, responses))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::predicate::ComparisonOperator;
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    #[test]
    fn default_stub_round_trips_to_match_all_and_empty_200() {
        let rebuilt = Stub::from_structure(&Stub::default().to_structure())
            .expect("well-formed structure");

        let [predicate] = rebuilt.predicates.as_slice() else {
            panic!("expected exactly one predicate");
        };
        match predicate {
            Predicate::Field(field) => {
                assert_eq!(field.path.as_deref(), Some("/"));
                assert_eq!(field.method, Some(HttpMethod::Get));
                assert_eq!(field.operator, ComparisonOperator::Equals);
            }
            other => panic!("expected field predicate, got {other:?}"),
        }

        let [response] = rebuilt.responses.as_slice() else {
            panic!("expected exactly one response");
        };
        match response {
            Response::Http(http) => {
                assert_eq!(http.status_code, 200);
                assert_eq!(http.body, None);
            }
            other => panic!("expected http response, got {other:?}"),
        }

        assert_eq!(rebuilt, Stub::default());
    }

    #[test]
    fn empty_wire_arrays_fall_back_to_defaults() {
        let stub = Stub::from_structure(&json!({"predicates": [], "responses": []}))
            .expect("well-formed structure");
        assert_eq!(stub, Stub::default());
    }

    #[test]
    fn predicate_and_response_order_is_preserved() {
        let stub = Stub::new(
            vec![
                Predicate::Field(FieldPredicate::path("/first")),
                Predicate::Field(FieldPredicate::path("/second")),
            ],
            vec![
                Response::Http(HttpResponse::with_body("one")),
                Response::Http(HttpResponse::with_body("two")),
            ],
        );

        let structure = stub.to_structure();
        assert_json_eq!(
            structure["responses"][0]["is"]["body"],
            json!("one")
        );
        assert_json_eq!(
            structure["responses"][1]["is"]["body"],
            json!("two")
        );
        assert_eq!(
            Stub::from_structure(&structure).expect("well-formed structure"),
            stub
        );
    }
}
