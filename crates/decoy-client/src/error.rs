//! Error types for the configuration model, the controller, and the
//! process supervisor.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while reconstructing domain objects from wire structures.
///
/// Construction-time format errors fail fast; a malformed structure is never
/// silently coerced to a default.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// A field predicate must carry exactly one comparison-operator key.
    #[error("predicate must define exactly one operator key, found [{}]", .0.join(", "))]
    PredicateOperator(Vec<String>),

    /// None of the known response keys (`is`, `proxy`, `inject`, `fault`)
    /// were present.
    #[error("unrecognized response structure with keys [{}]", .0.join(", "))]
    UnrecognizedResponse(Vec<String>),

    #[error("missing field `{0}`")]
    MissingField(String),

    #[error("field `{field}` is not {expected}")]
    UnexpectedType {
        field: String,
        expected: &'static str,
    },

    #[error("unknown {kind} `{value}`")]
    UnknownVariant { kind: &'static str, value: String },

    /// Catch-all for structures serde could not map onto a record type.
    #[error("malformed wire structure: {0}")]
    Malformed(String),
}

impl FormatError {
    pub(crate) fn missing(field: impl Into<String>) -> Self {
        FormatError::MissingField(field.into())
    }

    pub(crate) fn unexpected(field: impl Into<String>, expected: &'static str) -> Self {
        FormatError::UnexpectedType {
            field: field.into(),
            expected,
        }
    }
}

/// Errors from configuration calls against the remote agent.
///
/// Remote-call failures are surfaced to the caller as-is; the controller
/// never retries.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The agent answered with a failure status. Code and message come from
    /// the agent's `{"errors": [...]}` body when present.
    #[error("mock server returned error: {message} (code: {code})")]
    Server { code: String, message: String },

    #[error(transparent)]
    Format(#[from] FormatError),

    /// The operation needs a live imposter but the local one was never
    /// attached (or has been detached).
    #[error("imposter is not attached to a running mock server")]
    NotAttached,
}

/// Aggregate failure from best-effort teardown: every tracked deletion is
/// attempted, and every failure is reported.
#[derive(Debug)]
pub struct DetachError {
    pub failures: Vec<(u16, RemoteError)>,
}

impl fmt::Display for DetachError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to detach {} imposter(s):", self.failures.len())?;
        for (port, err) in &self.failures {
            write!(f, " [port {port}: {err}]")?;
        }
        Ok(())
    }
}

impl std::error::Error for DetachError {}

/// Errors from owning the agent's operating-system process.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A supervisor in this process already owns the port. Raised before any
    /// spawn attempt; a same-process guarantee only.
    #[error("a mock server is already running on port {0} in this process")]
    PortInUse(u16),

    /// Readiness polling exceeded its deadline.
    #[error("mock server on port {port} failed to become ready within {timeout:?}")]
    StartupTimeout { port: u16, timeout: Duration },

    /// The executable was missing or not runnable. The OS-level spawn error
    /// is preserved as the source.
    #[error("failed to launch mock server executable `{executable}`")]
    Launch {
        executable: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Remote(#[from] RemoteError),
}
