//! The configuration model: a tree of domain objects describing imposters,
//! stubs, predicates, responses, and behaviors, with bidirectional
//! wire-structure serialization.

pub mod behavior;
pub mod imposter;
pub mod predicate;
pub mod request;
pub mod response;
pub mod stub;
pub mod wire;

pub use behavior::{Behaviors, Copy, Key, Lookup, RequestField, Using};
pub use imposter::{smtp_imposter, Attachment, Imposter, Protocol};
pub use predicate::{
    ComparisonOperator, FieldPredicate, HttpMethod, InjectPredicate, Predicate, TcpPredicate,
};
pub use request::{Address, HttpRequest, RecordedRequest, SentEmail};
pub use response::{
    Fault, HttpResponse, InjectResponse, Mode, PredicateGenerator, Proxy, ProxyMode, Response,
    TcpResponse,
};
pub use stub::Stub;
pub use wire::WireFormat;
