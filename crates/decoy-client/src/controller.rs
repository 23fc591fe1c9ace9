//! The mock-server controller: synchronizes local imposter state against
//! the remote agent across create/read/update/delete operations.
//!
//! Every call is a blocking round trip against the agent's admin API.
//! Failures propagate immediately; nothing is retried.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{DetachError, FormatError, RemoteError};
use crate::model::{Imposter, RecordedRequest, Stub, WireFormat};

const CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Error body the agent returns on failed configuration calls.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Client for a running agent's admin API, tracking which imposters this
/// controller has attached.
///
/// Imposters move Unattached → Attached → Unattached: [`attach`] submits the
/// descriptor and records the resolved host/port, [`detach`] removes the
/// remote counterpart and leaves the descriptor reusable.
///
/// [`attach`]: MockServerController::attach
/// [`detach`]: MockServerController::detach
#[derive(Debug)]
pub struct MockServerController {
    client: reqwest::blocking::Client,
    scheme: String,
    host: String,
    port: u16,
    imposters_path: String,
    running: Mutex<Vec<u16>>,
}

impl MockServerController {
    /// Controller for an agent on localhost.
    pub fn new(port: u16) -> Self {
        Self::with_host("http", "localhost", port)
    }

    pub fn with_host(scheme: &str, host: &str, port: u16) -> Self {
        MockServerController {
            client: reqwest::blocking::Client::builder()
                .timeout(CALL_TIMEOUT)
                .build()
                .expect("Failed to create HTTP client"),
            scheme: scheme.to_owned(),
            host: host.to_owned(),
            port,
            imposters_path: "imposters".to_owned(),
            running: Mutex::new(Vec::new()),
        }
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    fn imposters_url(&self) -> String {
        format!("{}/{}", self.base_url(), self.imposters_path)
    }

    fn imposter_url(&self, port: u16) -> String {
        format!("{}/{}", self.imposters_url(), port)
    }

    /// Ports of the imposters this controller currently tracks as running.
    pub fn running_ports(&self) -> Vec<u16> {
        self.running.lock().clone()
    }

    /// Submit an imposter to the agent's creation endpoint. The agent
    /// allocates a port when the descriptor did not request one; the
    /// resolved host/port is recorded on the imposter.
    pub fn attach(&self, imposter: &mut Imposter) -> Result<(), RemoteError> {
        let response = self
            .client
            .post(self.imposters_url())
            .json(&imposter.to_structure())
            .send()?;
        let body = self.check_json(response)?;
        let port = body
            .get("port")
            .and_then(Value::as_u64)
            .and_then(|port| u16::try_from(port).ok())
            .ok_or_else(|| FormatError::missing("port"))?;
        imposter.attach(self.host.clone(), port);
        self.running.lock().push(port);
        debug!(port, "attached imposter");
        Ok(())
    }

    pub fn attach_all(&self, imposters: &mut [Imposter]) -> Result<(), RemoteError> {
        for imposter in imposters {
            self.attach(imposter)?;
        }
        Ok(())
    }

    /// Delete one imposter's remote counterpart. The imposter is removed
    /// from the tracked set regardless of the call outcome, and the local
    /// descriptor stays valid and reusable.
    pub fn detach(&self, imposter: &mut Imposter) -> Result<(), RemoteError> {
        let Some(attachment) = imposter.attachment() else {
            return Ok(());
        };
        let port = attachment.port;
        self.running.lock().retain(|tracked| *tracked != port);
        imposter.clear_attachment();
        self.delete_imposter(port)
    }

    /// Best-effort teardown of every tracked imposter: every deletion is
    /// attempted even after one fails, and the failures are aggregated.
    pub fn detach_all(&self) -> Result<(), DetachError> {
        let ports: Vec<u16> = std::mem::take(&mut *self.running.lock());
        let mut failures = Vec::new();
        for port in ports {
            if let Err(err) = self.delete_imposter(port) {
                warn!(port, error = %err, "failed to delete imposter");
                failures.push((port, err));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(DetachError { failures })
        }
    }

    /// Attach the given imposters and return a guard that detaches every
    /// tracked imposter when it goes out of scope, on every exit path. If
    /// one attach fails, imposters already created are torn down before the
    /// error is returned.
    pub fn scoped(&self, imposters: Vec<Imposter>) -> Result<ScopedImposters<'_>, RemoteError> {
        let mut scope = ScopedImposters {
            controller: self,
            imposters: Vec::with_capacity(imposters.len()),
        };
        for mut imposter in imposters {
            self.attach(&mut imposter)?;
            scope.imposters.push(imposter);
        }
        Ok(scope)
    }

    /// Insert a stub into a live imposter's stub list. Without an index the
    /// stub is appended. The local stub list is re-read from the agent
    /// afterwards so subsequent serialization reflects remote state.
    pub fn add_stub(
        &self,
        imposter: &mut Imposter,
        stub: &Stub,
        index: Option<usize>,
    ) -> Result<(), RemoteError> {
        let port = Self::attached_port(imposter)?;
        let mut payload = json!({ "stub": stub.to_structure() });
        if let Some(index) = index {
            payload["index"] = json!(index);
        }
        let response = self
            .client
            .post(format!("{}/stubs", self.imposter_url(port)))
            .json(&payload)
            .send()?;
        self.check_status(response)?;
        self.sync_stubs(imposter, port)
    }

    /// Replace the stub at an index on a live imposter.
    pub fn update_stub(
        &self,
        imposter: &mut Imposter,
        index: usize,
        stub: &Stub,
    ) -> Result<(), RemoteError> {
        let port = Self::attached_port(imposter)?;
        let response = self
            .client
            .put(format!("{}/stubs/{}", self.imposter_url(port), index))
            .json(&stub.to_structure())
            .send()?;
        self.check_status(response)?;
        self.sync_stubs(imposter, port)
    }

    /// Remove the stub at an index from a live imposter.
    pub fn delete_stub(&self, imposter: &mut Imposter, index: usize) -> Result<(), RemoteError> {
        let port = Self::attached_port(imposter)?;
        let response = self
            .client
            .delete(format!("{}/stubs/{}", self.imposter_url(port), index))
            .send()?;
        self.check_status(response)?;
        self.sync_stubs(imposter, port)
    }

    /// Read back every imposter the agent currently knows — including ones
    /// this controller did not create — reconstructed as full domain
    /// objects.
    pub fn query_all(&self) -> Result<Vec<Imposter>, RemoteError> {
        let response = self.client.get(self.imposters_url()).send()?;
        let body = self.check_json(response)?;
        let summaries = body
            .get("imposters")
            .and_then(Value::as_array)
            .ok_or_else(|| FormatError::missing("imposters"))?;

        let mut imposters = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let port = summary
                .get("port")
                .and_then(Value::as_u64)
                .and_then(|port| u16::try_from(port).ok())
                .ok_or_else(|| FormatError::missing("port"))?;
            let structure = self.fetch_imposter_structure(port)?;
            imposters.push(Imposter::from_structure(&structure)?);
        }
        Ok(imposters)
    }

    /// Read back every imposter as a replayable snapshot: recorded proxy
    /// traffic is returned as static stubs and proxy-only responses are
    /// discarded by the agent.
    pub fn replayable_snapshot(&self) -> Result<Vec<Imposter>, RemoteError> {
        let response = self
            .client
            .get(format!(
                "{}?replayable=true&removeProxies=true",
                self.imposters_url()
            ))
            .send()?;
        let body = self.check_json(response)?;
        let structures = body
            .get("imposters")
            .and_then(Value::as_array)
            .ok_or_else(|| FormatError::missing("imposters"))?;
        structures
            .iter()
            .map(|structure| Imposter::from_structure(structure).map_err(RemoteError::from))
            .collect()
    }

    /// The ordered request records the agent has captured for a live
    /// imposter. Requires the imposter to record requests.
    pub fn get_actual_requests(
        &self,
        imposter: &Imposter,
    ) -> Result<Vec<RecordedRequest>, RemoteError> {
        let port = Self::attached_port(imposter)?;
        self.requests_for(port)
    }

    /// Request records for every imposter this controller tracks, by port.
    pub fn get_all_actual_requests(
        &self,
    ) -> Result<HashMap<u16, Vec<RecordedRequest>>, RemoteError> {
        let mut by_port = HashMap::new();
        for port in self.running_ports() {
            by_port.insert(port, self.requests_for(port)?);
        }
        Ok(by_port)
    }

    fn requests_for(&self, port: u16) -> Result<Vec<RecordedRequest>, RemoteError> {
        let structure = self.fetch_imposter_structure(port)?;
        let records = match structure.get("requests").and_then(Value::as_array) {
            Some(records) => records,
            None => return Ok(Vec::new()),
        };
        records
            .iter()
            .map(|record| RecordedRequest::from_structure(record).map_err(RemoteError::from))
            .collect()
    }

    fn sync_stubs(&self, imposter: &mut Imposter, port: u16) -> Result<(), RemoteError> {
        let structure = self.fetch_imposter_structure(port)?;
        let refreshed = Imposter::from_structure(&structure)?;
        imposter.stubs = refreshed.stubs;
        Ok(())
    }

    fn fetch_imposter_structure(&self, port: u16) -> Result<Value, RemoteError> {
        let response = self.client.get(self.imposter_url(port)).send()?;
        self.check_json(response)
    }

    fn delete_imposter(&self, port: u16) -> Result<(), RemoteError> {
        let response = self.client.delete(self.imposter_url(port)).send()?;
        self.check_status(response)?;
        debug!(port, "detached imposter");
        Ok(())
    }

    fn attached_port(imposter: &Imposter) -> Result<u16, RemoteError> {
        imposter
            .attachment()
            .map(|attachment| attachment.port)
            .ok_or(RemoteError::NotAttached)
    }

    fn check_json(&self, response: reqwest::blocking::Response) -> Result<Value, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json()?);
        }
        let body = response.text().unwrap_or_default();
        Err(error_from_body(status, &body))
    }

    fn check_status(&self, response: reqwest::blocking::Response) -> Result<(), RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().unwrap_or_default();
        Err(error_from_body(status, &body))
    }
}

fn error_from_body(status: StatusCode, body: &str) -> RemoteError {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(detail) = parsed.errors.first() {
            return RemoteError::Server {
                code: detail.code.clone(),
                message: detail.message.clone(),
            };
        }
    }
    RemoteError::Server {
        code: status.as_str().to_owned(),
        message: format!("request failed with status {status}"),
    }
}

/// Scoped acquisition of a set of imposters: attached on entry, every
/// tracked imposter torn down when the guard drops — including when the
/// enclosed logic panics or errors out early.
///
/// Teardown from `Drop` cannot propagate failures, so they are logged at
/// warn level; call [`detach`](ScopedImposters::detach) instead when the
/// aggregate error matters.
pub struct ScopedImposters<'a> {
    controller: &'a MockServerController,
    imposters: Vec<Imposter>,
}

impl ScopedImposters<'_> {
    pub fn imposters(&self) -> &[Imposter] {
        &self.imposters
    }

    pub fn get(&self, index: usize) -> Option<&Imposter> {
        self.imposters.get(index)
    }

    /// Detach now and surface the aggregate teardown error, returning the
    /// detached, reusable descriptors on success.
    pub fn detach(mut self) -> Result<Vec<Imposter>, DetachError> {
        let result = self.controller.detach_all();
        let mut imposters = std::mem::take(&mut self.imposters);
        for imposter in &mut imposters {
            imposter.clear_attachment();
        }
        // The later Drop re-runs detach_all against an already-drained
        // tracked set, which is a no-op.
        result.map(|()| imposters)
    }
}

impl Drop for ScopedImposters<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.controller.detach_all() {
            warn!(error = %err, "failed to detach imposters during scope teardown");
        }
    }
}
