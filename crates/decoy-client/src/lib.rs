//! Client library for driving Mountebank-compatible mock servers.
//!
//! Decoy models imposters — virtual endpoints composed of ordered stubs,
//! each an ordered set of predicates and responses — installs them into a
//! running agent, and reads back the traffic the agent recorded. It also
//! supervises the agent's own process when a test owns it: spawn, readiness
//! polling, port-conflict prevention, and teardown.
//!
//! # Example
//!
//! ```no_run
//! use decoy_client::{
//!     FieldPredicate, HttpResponse, Imposter, MockServer, Predicate, Response, ServerOptions,
//!     Stub,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let server = MockServer::start(&ServerOptions::default())?;
//!
//! let imposter = Imposter::single(Stub::matching(
//!     Predicate::Field(FieldPredicate::path("/test")),
//!     Response::Http(HttpResponse::with_body("sausages")),
//! ));
//!
//! let scope = server.controller().scoped(vec![imposter])?;
//! let _url = scope.get(0).and_then(Imposter::url).expect("attached");
//! // ... exercise `_url`, then assert on recorded traffic ...
//! let _requests = server.controller().get_actual_requests(scope.get(0).expect("attached"))?;
//! drop(scope); // imposters torn down here, even on panic
//! server.close();
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod error;
pub mod model;
pub mod supervisor;

pub use controller::{MockServerController, ScopedImposters};
pub use error::{DetachError, FormatError, RemoteError, ServerError};
pub use model::{
    smtp_imposter, Address, Attachment, Behaviors, ComparisonOperator, Copy, Fault,
    FieldPredicate, HttpMethod, HttpRequest, HttpResponse, Imposter, InjectPredicate,
    InjectResponse, Key, Lookup, Mode, Predicate, PredicateGenerator, Protocol, Proxy, ProxyMode,
    RecordedRequest, RequestField, Response, SentEmail, Stub, TcpPredicate, TcpResponse, Using,
    WireFormat,
};
pub use supervisor::{MockServer, ProcessSupervisor, ServerOptions};
