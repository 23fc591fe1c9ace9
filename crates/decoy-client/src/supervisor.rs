//! Process supervision for a locally-spawned agent: launch, readiness
//! polling, port-conflict prevention, and termination.
//!
//! A process-wide registry records which ports are owned by a supervisor in
//! this process, so parallel test runners sharing the process cannot spawn
//! two agents on one port. The guarantee is same-process only.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Child, Command};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::controller::MockServerController;
use crate::error::ServerError;

/// Ports currently owned by a supervisor within this process.
static OWNED_PORTS: Lazy<Mutex<HashSet<u16>>> = Lazy::new(|| Mutex::new(HashSet::new()));

const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);
const READY_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Launch configuration for the agent executable.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub executable: PathBuf,
    pub port: u16,
    /// How long to wait for the agent to answer on its base endpoint.
    pub startup_timeout: Duration,
    /// Start in debug mode, which records all requests. Needs to be on for
    /// request assertions to work.
    pub debug: bool,
    /// Allow script injection. When on, `local_only` should be on too.
    pub allow_injection: bool,
    /// Accept requests from localhost only.
    pub local_only: bool,
    /// Persist all operations to disk, in this directory.
    pub data_dir: Option<PathBuf>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        ServerOptions {
            executable: default_executable(),
            port: 2525,
            startup_timeout: Duration::from_secs(5),
            debug: true,
            allow_injection: true,
            local_only: true,
            data_dir: Some(PathBuf::from(".mbdb")),
        }
    }
}

fn default_executable() -> PathBuf {
    let name = if cfg!(windows) { "mb.cmd" } else { "mb" };
    ["node_modules", ".bin", name].iter().collect()
}

impl ServerOptions {
    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = executable.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(data_dir.into());
        self
    }

    fn command_line(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> =
            vec!["start".into(), "--port".into(), self.port.to_string().into()];
        if self.debug {
            args.push("--debug".into());
        }
        if self.allow_injection {
            args.push("--allowInjection".into());
        }
        if self.local_only {
            args.push("--localOnly".into());
        }
        if let Some(data_dir) = &self.data_dir {
            args.push("--datadir".into());
            args.push(data_dir.clone().into_os_string());
        }
        args
    }
}

/// Owns the agent's operating-system process and its port registration.
///
/// The "check port free → mark owned → spawn" sequence runs as one guarded
/// critical section, so two supervisors constructed concurrently cannot both
/// observe the port as free. Termination (explicit [`close`] or `Drop`)
/// signals the child, waits for it to exit, and releases the port.
///
/// [`close`]: ProcessSupervisor::close
#[derive(Debug)]
pub struct ProcessSupervisor {
    process: Child,
    port: u16,
    base_url: String,
    terminated: bool,
}

impl ProcessSupervisor {
    /// Spawn the agent and block until it answers on its base endpoint.
    ///
    /// Fails with [`ServerError::PortInUse`] before any spawn attempt when a
    /// supervisor in this process already owns the port, and with
    /// [`ServerError::StartupTimeout`] — after terminating the child and
    /// releasing the port — when readiness polling exceeds its deadline.
    pub fn start(options: &ServerOptions) -> Result<Self, ServerError> {
        let port = options.port;
        let process = {
            let mut owned = OWNED_PORTS.lock();
            if owned.contains(&port) {
                return Err(ServerError::PortInUse(port));
            }
            let process = Command::new(&options.executable)
                .args(options.command_line())
                .spawn()
                .map_err(|source| ServerError::Launch {
                    executable: options.executable.display().to_string(),
                    source,
                })?;
            owned.insert(port);
            process
        };

        let mut supervisor = ProcessSupervisor {
            process,
            port,
            base_url: format!("http://localhost:{port}"),
            terminated: false,
        };
        info!(
            pid = supervisor.process.id(),
            port, "spawned mock server process"
        );

        if let Err(err) = supervisor.await_ready(options.startup_timeout) {
            supervisor.terminate();
            return Err(err);
        }
        Ok(supervisor)
    }

    /// Agent startup time is not deterministic, so poll the base endpoint at
    /// a short fixed interval until it responds or the deadline passes.
    fn await_ready(&self, timeout: Duration) -> Result<(), ServerError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(READY_PROBE_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");
        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(response) = client.get(&self.base_url).send() {
                if response.status().is_success() {
                    debug!(url = %self.base_url, "mock server ready");
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(ServerError::StartupTimeout {
                    port: self.port,
                    timeout,
                });
            }
            std::thread::sleep(READY_POLL_INTERVAL);
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn pid(&self) -> u32 {
        self.process.id()
    }

    /// Terminate the agent and release its port.
    pub fn close(mut self) {
        self.terminate();
    }

    fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;

        #[cfg(unix)]
        {
            // SIGTERM so the agent can flush its persistence directory.
            unsafe {
                libc::kill(self.process.id() as libc::pid_t, libc::SIGTERM);
            }
        }
        #[cfg(not(unix))]
        {
            if let Err(err) = self.process.kill() {
                warn!(pid = self.process.id(), error = %err, "failed to kill mock server process");
            }
        }

        match self.process.wait() {
            Ok(status) => info!(
                pid = self.process.id(),
                port = self.port,
                %status,
                "terminated mock server process"
            ),
            Err(err) => warn!(
                pid = self.process.id(),
                port = self.port,
                error = %err,
                "failed to wait for mock server process"
            ),
        }
        OWNED_PORTS.lock().remove(&self.port);
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// A locally-spawned agent plus a controller pointed at it: the usual entry
/// point for tests that own their mock server.
#[derive(Debug)]
pub struct MockServer {
    supervisor: ProcessSupervisor,
    controller: MockServerController,
}

impl MockServer {
    pub fn start(options: &ServerOptions) -> Result<Self, ServerError> {
        let supervisor = ProcessSupervisor::start(options)?;
        let controller = MockServerController::new(options.port);
        Ok(MockServer {
            supervisor,
            controller,
        })
    }

    pub fn controller(&self) -> &MockServerController {
        &self.controller
    }

    pub fn port(&self) -> u16 {
        self.supervisor.port()
    }

    pub fn base_url(&self) -> &str {
        self.supervisor.base_url()
    }

    /// Terminate the agent. Imposters still tracked by the controller die
    /// with the process.
    pub fn close(self) {
        self.supervisor.close();
    }
}
