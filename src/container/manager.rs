//! Container lifecycle management.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::container::error::{ContainerError, Result};
use crate::container::request::ContainerRequest;
use crate::container::wait::{self, Check, ProbeOutcome, ReadinessProbe, WaitFor};
use crate::runtime::{ContainerRuntime, CreateSpec, DockerRuntime, Platform};

/// Lines of container output attached to launch errors.
const LOG_TAIL_LINES: usize = 50;

/// Time a container gets to exit on `stop()` before it is killed.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Why a container ended up in [`ReadinessState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    /// Readiness check never passed within the startup timeout.
    Timeout,
    /// The process exited while being probed.
    Crash,
    /// The runtime refused an operation (pull, create, copy, start).
    Runtime,
}

/// State of a managed container.
///
/// Moves forward only: `NotStarted -> Starting -> Probing -> Ready`, with
/// `Failed` reachable from `Starting` and `Probing`, and `Stopped` after
/// teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessState {
    /// Not started yet.
    NotStarted,
    /// Pulling, creating, copying files, starting.
    Starting,
    /// Running, waiting for the readiness check.
    Probing,
    /// Running and ready.
    Ready,
    /// Failed to start; the container has been removed.
    Failed(FailureCause),
    /// Torn down.
    Stopped,
}

impl std::fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not started"),
            Self::Starting => write!(f, "starting"),
            Self::Probing => write!(f, "probing"),
            Self::Ready => write!(f, "ready"),
            Self::Failed(FailureCause::Timeout) => write!(f, "failed (startup timeout)"),
            Self::Failed(FailureCause::Crash) => write!(f, "failed (exited)"),
            Self::Failed(FailureCause::Runtime) => write!(f, "failed (runtime error)"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

impl FailureCause {
    fn of(error: &ContainerError) -> Self {
        match error {
            ContainerError::StartupTimeout { .. } => Self::Timeout,
            ContainerError::ContainerExited { .. } => Self::Crash,
            _ => Self::Runtime,
        }
    }
}

/// Identity of a launched container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    id: String,
    name: String,
    host: String,
    ports: BTreeMap<u16, u16>,
}

impl ContainerHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Host at which published ports are reachable.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Host port published for a container port.
    pub fn mapped_port(&self, internal: u16) -> Option<u16> {
        self.ports.get(&internal).copied()
    }

    /// All published ports: container port -> host port.
    pub fn ports(&self) -> &BTreeMap<u16, u16> {
        &self.ports
    }
}

/// Owns one container from launch to removal.
///
/// [`start`](Self::start) blocks until the container is ready or has failed;
/// a failed start never leaves a container behind. Dropping a `Container`
/// that still holds a running container removes it.
pub struct Container {
    request: ContainerRequest,
    runtime: Option<Arc<dyn ContainerRuntime>>,
    handle: Option<ContainerHandle>,
    state: ReadinessState,
    /// Reusable HTTP client for readiness checks.
    http_client: reqwest::Client,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("image", &self.request.image().to_string())
            .field("state", &self.state)
            .field("handle", &self.handle)
            .finish()
    }
}

impl Container {
    /// Validate `request` and wrap it; Docker is connected on `start()`.
    pub fn new(request: ContainerRequest) -> Result<Self> {
        request.validate()?;
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Ok(Self {
            request,
            runtime: None,
            handle: None,
            state: ReadinessState::NotStarted,
            http_client,
        })
    }

    /// Like [`new`](Self::new), with an explicit runtime.
    pub fn with_runtime(
        request: ContainerRequest,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Result<Self> {
        let mut container = Self::new(request)?;
        container.runtime = Some(runtime);
        Ok(container)
    }

    pub fn state(&self) -> ReadinessState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ReadinessState::Ready
    }

    /// The frozen startup configuration.
    pub fn request(&self) -> &ContainerRequest {
        &self.request
    }

    /// Runtime id, while a container exists.
    pub fn id(&self) -> Option<&str> {
        self.handle.as_ref().map(ContainerHandle::id)
    }

    /// Launch the container and wait until it is ready.
    ///
    /// Runtime failures return immediately; a readiness timeout returns once
    /// the configured startup timeout has elapsed. Either way the container
    /// is removed before the error is returned.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != ReadinessState::NotStarted {
            return Err(ContainerError::IllegalState {
                operation: "start",
                state: self.state,
            });
        }
        self.state = ReadinessState::Starting;

        let runtime = match self.runtime().await {
            Ok(runtime) => runtime,
            Err(e) => {
                self.state = ReadinessState::Failed(FailureCause::Runtime);
                return Err(e);
            }
        };

        let result = self.launch(&runtime).await;
        if let Err(e) = &result {
            self.state = ReadinessState::Failed(FailureCause::of(e));
            self.discard(&runtime).await;
        }
        result
    }

    /// Runtime to use, connecting to Docker on first use.
    async fn runtime(&mut self) -> Result<Arc<dyn ContainerRuntime>> {
        if let Some(runtime) = &self.runtime {
            return Ok(runtime.clone());
        }

        let docker = DockerRuntime::connect().await.map_err(|e| match e {
            ContainerError::DockerNotAvailable { reason } => ContainerError::DockerNotAvailable {
                reason: format!("{reason}. {}", Platform::current().start_hint()),
            },
            other => other,
        })?;
        tracing::debug!("Connected to Docker: {:?}", docker);

        let runtime: Arc<dyn ContainerRuntime> = Arc::new(docker);
        self.runtime = Some(runtime.clone());
        Ok(runtime)
    }

    async fn launch(&mut self, runtime: &Arc<dyn ContainerRuntime>) -> Result<()> {
        let launched = Instant::now();
        runtime.ensure_image(self.request.image()).await?;

        let suffix = Uuid::new_v4().simple().to_string();
        let name = format!("{}-{}", self.request.name_prefix(), &suffix[..12]);
        let spec = CreateSpec::from_request(&name, &self.request);
        let id = runtime.create(&spec).await?;
        self.handle = Some(ContainerHandle {
            id: id.clone(),
            name: name.clone(),
            host: runtime.host(),
            ports: BTreeMap::new(),
        });

        for copy in self.request.copies() {
            runtime.copy_file(&id, copy).await?;
        }

        runtime.start(&id).await?;
        tracing::info!("Started container {} from {}", name, self.request.image());

        self.state = ReadinessState::Probing;
        let timeout = self.request.startup_timeout();
        let mut probe = ReadinessProbe::new(timeout, self.request.poll_interval());
        let context = ProbeContext {
            runtime: runtime.clone(),
            id: id.clone(),
            host: runtime.host(),
            wait_for: self.request.wait_for().clone(),
            http_client: self.http_client.clone(),
        };
        tracing::debug!(
            "Probing {} every {:?} for up to {:?}",
            name,
            probe.interval(),
            timeout
        );

        match probe.run(|| context.clone().check()).await {
            ProbeOutcome::Succeeded { attempts, elapsed } => {
                let inspection = runtime.inspect(&id).await?;
                if let Some(handle) = self.handle.as_mut() {
                    handle.ports = inspection.ports;
                }
                self.state = ReadinessState::Ready;
                tracing::info!(
                    "Container {} ready after {} checks ({:?} probing, {:?} total)",
                    name,
                    attempts,
                    elapsed,
                    launched.elapsed()
                );
                Ok(())
            }
            ProbeOutcome::TimedOut {
                elapsed,
                last_reason,
                ..
            } => Err(ContainerError::StartupTimeout {
                name,
                timeout,
                elapsed,
                reason: last_reason,
                log_tail: log_tail(runtime.as_ref(), &id).await,
            }),
            ProbeOutcome::Aborted {
                elapsed, reason, ..
            } => {
                tracing::debug!("Readiness check aborted for {}: {}", name, reason);
                let exit_code = runtime
                    .inspect(&id)
                    .await
                    .ok()
                    .and_then(|inspection| inspection.exit_code);
                Err(ContainerError::ContainerExited {
                    name,
                    exit_code,
                    elapsed,
                    log_tail: log_tail(runtime.as_ref(), &id).await,
                })
            }
        }
    }

    /// Remove the container left behind by a failed start.
    async fn discard(&mut self, runtime: &Arc<dyn ContainerRuntime>) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        if self.request.keep_on_shutdown() {
            tracing::info!(
                "Keeping failed container for inspection (keep_on_shutdown=true): {}",
                handle.name
            );
            return;
        }

        match runtime.remove(&handle.id).await {
            Ok(()) => tracing::debug!("Removed failed container {}", handle.name),
            Err(e) => tracing::warn!("Failed to remove container {}: {}", handle.name, e),
        }
    }

    /// Stop and remove the container.
    ///
    /// Idempotent: once nothing is held this is a no-op. Teardown errors are
    /// returned, and the container stays held so a later call or the drop
    /// guard can retry.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            if !matches!(self.state, ReadinessState::Failed(_)) {
                self.state = ReadinessState::Stopped;
            }
            return Ok(());
        };

        let Some(runtime) = self.runtime.clone() else {
            self.state = ReadinessState::Stopped;
            return Ok(());
        };

        if self.request.keep_on_shutdown() {
            tracing::info!(
                "Keeping container running (keep_on_shutdown=true): {}",
                handle.name
            );
            self.state = ReadinessState::Stopped;
            return Ok(());
        }

        tracing::info!("Stopping container: {}", handle.name);

        if let Err(e) = runtime.stop(&handle.id, STOP_GRACE).await {
            tracing::debug!("Graceful stop of {} failed, forcing removal: {}", handle.name, e);
        }

        // The process is gone either way. Keep the handle so a later stop or
        // drop retries the removal.
        if let Err(e) = runtime.remove(&handle.id).await {
            self.state = ReadinessState::Stopped;
            self.handle = Some(handle);
            return Err(e);
        }

        self.state = ReadinessState::Stopped;
        tracing::info!("Removed container: {}", handle.name);
        Ok(())
    }

    fn ready_handle(&self, operation: &'static str) -> Result<&ContainerHandle> {
        match (&self.state, &self.handle) {
            (ReadinessState::Ready, Some(handle)) => Ok(handle),
            _ => Err(ContainerError::IllegalState {
                operation,
                state: self.state,
            }),
        }
    }

    /// Container identity and port table. Only valid while ready.
    pub fn handle(&self) -> Result<&ContainerHandle> {
        self.ready_handle("access the container handle")
    }

    /// Host at which published ports are reachable. Only valid while ready.
    pub fn host(&self) -> Result<&str> {
        Ok(self.ready_handle("read the host")?.host())
    }

    /// Host port published for `internal`. Only valid while ready.
    pub fn mapped_port(&self, internal: u16) -> Result<u16> {
        self.ready_handle("read a mapped port")?
            .mapped_port(internal)
            .ok_or_else(|| ContainerError::Config {
                reason: format!("port {internal} is not exposed"),
            })
    }

    /// `http://{host}:{mapped port}{path}`. Only valid while ready.
    pub fn mapped_url(&self, internal: u16, path: &str) -> Result<String> {
        let port = self.mapped_port(internal)?;
        let host = self.host()?;
        Ok(format!(
            "http://{}:{}/{}",
            host,
            port,
            path.trim_start_matches('/')
        ))
    }

    /// Container output; `tail` limits it to the last N lines.
    pub async fn logs(&self, tail: Option<usize>) -> Result<String> {
        match (&self.runtime, &self.handle) {
            (Some(runtime), Some(handle)) => runtime.logs(&handle.id, tail).await,
            _ => Err(ContainerError::IllegalState {
                operation: "read logs",
                state: self.state,
            }),
        }
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        if self.request.keep_on_shutdown() {
            tracing::info!(
                "Keeping container running (keep_on_shutdown=true): {}",
                handle.name
            );
            return;
        }

        let Some(runtime) = self.runtime.as_ref() else {
            return;
        };

        // The caller's tokio runtime may be single-threaded or shutting down,
        // so removal runs on its own thread with its own connection.
        let runtime = match runtime.detached() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::warn!("Container {} may remain running: {}", handle.name, e);
                return;
            }
        };

        let id = handle.id.clone();
        let reaper = std::thread::Builder::new()
            .name("container-reaper".to_string())
            .spawn(move || -> std::result::Result<(), String> {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| e.to_string())?;
                rt.block_on(runtime.remove(&id)).map_err(|e| e.to_string())
            });

        let outcome = match reaper {
            Ok(thread) => thread
                .join()
                .unwrap_or_else(|_| Err("cleanup thread panicked".to_string())),
            Err(e) => Err(e.to_string()),
        };

        match outcome {
            Ok(()) => tracing::debug!("Removed container {} on drop", handle.name),
            Err(e) => tracing::warn!("Failed to remove container {} on drop: {}", handle.name, e),
        }
    }
}

/// Everything one readiness check needs, cheap to clone per attempt.
#[derive(Clone)]
struct ProbeContext {
    runtime: Arc<dyn ContainerRuntime>,
    id: String,
    host: String,
    wait_for: WaitFor,
    http_client: reqwest::Client,
}

impl ProbeContext {
    async fn check(self) -> Check {
        let inspection = match self.runtime.inspect(&self.id).await {
            Ok(inspection) => inspection,
            Err(e) => return Check::Pending(e.to_string()),
        };

        if !inspection.running {
            return Check::Fatal(match inspection.exit_code {
                Some(code) => format!("container exited with code {code}"),
                None => "container is not running".to_string(),
            });
        }

        let address = |port: &u16| {
            inspection
                .ports
                .get(port)
                .map(|host_port| format!("{}:{}", self.host, host_port))
        };

        match &self.wait_for {
            WaitFor::Nothing => Check::Ready,
            WaitFor::Http { port, path, status } => match address(port) {
                Some(addr) => {
                    let url = format!("http://{}/{}", addr, path.trim_start_matches('/'));
                    wait::http_check(&self.http_client, &url, *status).await
                }
                None => Check::Pending(format!("port {port} not published yet")),
            },
            WaitFor::Tcp { port } => match address(port) {
                Some(addr) => wait::tcp_check(&addr).await,
                None => Check::Pending(format!("port {port} not published yet")),
            },
            WaitFor::LogMessage { pattern, times } => {
                match self.runtime.logs(&self.id, None).await {
                    Ok(output) => wait::log_check(pattern, *times, &output),
                    Err(e) => Check::Pending(e.to_string()),
                }
            }
        }
    }
}

async fn log_tail(runtime: &dyn ContainerRuntime, id: &str) -> String {
    runtime
        .logs(id, Some(LOG_TAIL_LINES))
        .await
        .unwrap_or_else(|e| format!("<container output unavailable: {e}>"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RuntimeCall, StubFailure, StubRuntime};

    fn request() -> ContainerRequest {
        ContainerRequest::new("example/app:1.0")
            .with_exposed_port(8080)
            .with_name_prefix("app")
            .with_startup_timeout(Duration::from_secs(5))
            .with_poll_interval(Duration::from_millis(20))
    }

    fn container(request: ContainerRequest, stub: &StubRuntime) -> Container {
        Container::with_runtime(request, Arc::new(stub.clone())).unwrap()
    }

    /// A local port with nothing listening on it.
    async fn closed_port() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_start_reaches_ready_and_snapshots_ports() {
        let stub = StubRuntime::new().with_port(8080, 49200);
        let mut container = container(request(), &stub);
        assert_eq!(container.state(), ReadinessState::NotStarted);

        container.start().await.unwrap();

        assert_eq!(container.state(), ReadinessState::Ready);
        assert_eq!(container.mapped_port(8080).unwrap(), 49200);
        assert_eq!(container.host().unwrap(), "127.0.0.1");
        assert_eq!(
            container.mapped_url(8080, "/auth/").unwrap(),
            "http://127.0.0.1:49200/auth/"
        );
        assert!(container.handle().unwrap().name().starts_with("app-"));

        let calls = stub.calls();
        assert!(matches!(calls[0], RuntimeCall::EnsureImage(ref image) if image == "example/app:1.0"));
        assert!(matches!(calls[1], RuntimeCall::Create(_)));
        assert!(matches!(calls[2], RuntimeCall::Start(_)));
    }

    #[tokio::test]
    async fn test_accessors_require_ready() {
        let stub = StubRuntime::new().with_port(8080, 49201);
        let mut container = container(request(), &stub);

        let err = container.mapped_port(8080).unwrap_err();
        assert!(matches!(
            err,
            ContainerError::IllegalState {
                state: ReadinessState::NotStarted,
                ..
            }
        ));
        assert!(container.host().is_err());
        assert!(container.logs(None).await.is_err());

        container.start().await.unwrap();
        assert!(matches!(
            container.mapped_port(9999),
            Err(ContainerError::Config { .. })
        ));

        container.stop().await.unwrap();
        assert!(matches!(
            container.mapped_url(8080, "/"),
            Err(ContainerError::IllegalState {
                state: ReadinessState::Stopped,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        let stub = StubRuntime::new();
        let mut container = container(request(), &stub);
        container.start().await.unwrap();

        let err = container.start().await.unwrap_err();
        assert!(matches!(
            err,
            ContainerError::IllegalState {
                operation: "start",
                ..
            }
        ));
        assert_eq!(stub.created().len(), 1);
    }

    #[tokio::test]
    async fn test_files_copied_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("realm.json");
        std::fs::write(&file, r#"{"realm":"test"}"#).unwrap();

        let stub = StubRuntime::new();
        let mut container = container(
            request().with_copy_file(&file, "/opt/import/realm.json"),
            &stub,
        );
        container.start().await.unwrap();

        let calls = stub.calls();
        let copy_at = calls
            .iter()
            .position(|c| matches!(c, RuntimeCall::CopyFile { .. }))
            .unwrap();
        let start_at = calls
            .iter()
            .position(|c| matches!(c, RuntimeCall::Start(_)))
            .unwrap();
        assert!(copy_at < start_at);

        let copied = stub.copied();
        assert_eq!(copied.len(), 1);
        assert_eq!(copied[0].0.target, "/opt/import/realm.json");
        assert_eq!(copied[0].1, br#"{"realm":"test"}"#.to_vec());
    }

    #[tokio::test]
    async fn test_pull_failure_fails_fast_without_container() {
        let stub = StubRuntime::new().failing_at(StubFailure::Pull);
        let mut container = container(request(), &stub);

        let started = Instant::now();
        let err = container.start().await.unwrap_err();

        assert!(matches!(err, ContainerError::ImagePullFailed { .. }));
        assert!(err.is_launch_failure());
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(
            container.state(),
            ReadinessState::Failed(FailureCause::Runtime)
        );
        assert!(stub.created().is_empty());
    }

    #[tokio::test]
    async fn test_start_failure_removes_container() {
        let stub = StubRuntime::new().failing_at(StubFailure::Start);
        let mut container = container(request(), &stub);

        let err = container.start().await.unwrap_err();
        assert!(matches!(err, ContainerError::ContainerStartFailed { .. }));
        assert!(stub.live_containers().is_empty());
        assert!(container.id().is_none());
    }

    #[tokio::test]
    async fn test_crash_during_probe_is_reported_without_waiting() {
        let stub = StubRuntime::new()
            .exiting_with(3)
            .with_logs("Starting\nERROR bad config\n");
        let mut container = container(
            request().with_wait_for(WaitFor::http(8080, "/health")),
            &stub,
        );

        let started = Instant::now();
        let err = container.start().await.unwrap_err();

        match &err {
            ContainerError::ContainerExited {
                exit_code,
                log_tail,
                ..
            } => {
                assert_eq!(*exit_code, Some(3));
                assert!(log_tail.contains("ERROR bad config"));
            }
            other => panic!("expected exit error, got {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(container.state(), ReadinessState::Failed(FailureCause::Crash));
        assert!(stub.live_containers().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_reports_elapsed_and_log_tail() {
        let port = closed_port().await;
        let stub = StubRuntime::new()
            .with_port(8080, port)
            .with_logs("still booting\n");
        let timeout = Duration::from_millis(600);
        let mut container = container(
            request()
                .with_wait_for(WaitFor::tcp(8080))
                .with_startup_timeout(timeout),
            &stub,
        );

        let started = Instant::now();
        let err = container.start().await.unwrap_err();
        let observed = started.elapsed();

        let elapsed = err.elapsed().unwrap();
        assert!(elapsed >= timeout);
        assert!(observed >= timeout);
        assert!(observed < timeout * 5, "took {observed:?}");
        assert!(err.log_tail().unwrap().contains("still booting"));
        assert_eq!(
            container.state(),
            ReadinessState::Failed(FailureCause::Timeout)
        );
        assert!(stub.live_containers().is_empty());
    }

    #[tokio::test]
    async fn test_tcp_wait_succeeds_against_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let stub = StubRuntime::new().with_port(8080, port);

        let mut container = container(request().with_wait_for(WaitFor::tcp(8080)), &stub);
        container.start().await.unwrap();
        assert!(container.is_ready());
    }

    #[tokio::test]
    async fn test_log_wait() {
        let stub = StubRuntime::new().with_logs("boot\nKeycloak 26.0.7 started in 4.2s\n");
        let mut container = container(
            request().with_wait_for(WaitFor::log_message(r"Keycloak .* started").unwrap()),
            &stub,
        );
        container.start().await.unwrap();
        assert!(container.is_ready());
        assert!(container.logs(Some(1)).await.unwrap().contains("started"));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let stub = StubRuntime::new();
        let mut container = container(request(), &stub);
        container.start().await.unwrap();

        container.stop().await.unwrap();
        container.stop().await.unwrap();

        let removals = stub
            .calls()
            .iter()
            .filter(|c| matches!(c, RuntimeCall::Remove(_)))
            .count();
        assert_eq!(removals, 1);
        assert_eq!(container.state(), ReadinessState::Stopped);
    }

    #[tokio::test]
    async fn test_failed_teardown_is_surfaced_and_retried_on_drop() {
        let stub = StubRuntime::new();
        let mut container = container(request(), &stub);
        container.start().await.unwrap();

        stub.set_failure(Some(StubFailure::Remove));
        let err = container.stop().await.unwrap_err();
        assert!(matches!(err, ContainerError::TeardownFailed { .. }));
        assert!(container.id().is_some());
        assert!(!container.is_ready());
        assert_eq!(container.state(), ReadinessState::Stopped);
        assert!(matches!(
            container.mapped_url(8080, "/"),
            Err(ContainerError::IllegalState {
                state: ReadinessState::Stopped,
                ..
            })
        ));

        stub.set_failure(None);
        drop(container);
        assert!(stub.live_containers().is_empty());
    }

    #[tokio::test]
    async fn test_drop_removes_running_container() {
        let stub = StubRuntime::new();
        {
            let mut container = container(request(), &stub);
            container.start().await.unwrap();
            assert_eq!(stub.live_containers().len(), 1);
        }
        assert!(stub.live_containers().is_empty());
    }

    #[tokio::test]
    async fn test_keep_on_shutdown_leaves_container() {
        let stub = StubRuntime::new();
        let mut container = container(request().with_keep_on_shutdown(true), &stub);
        container.start().await.unwrap();
        container.stop().await.unwrap();
        drop(container);

        assert_eq!(stub.live_containers().len(), 1);
    }

    #[test]
    fn test_stop_before_start_prevents_start() {
        let stub = StubRuntime::new();
        let mut container = container(request(), &stub);

        tokio_test::block_on(container.stop()).unwrap();
        assert_eq!(container.state(), ReadinessState::Stopped);
        assert!(tokio_test::block_on(container.start()).is_err());
        assert!(stub.calls().is_empty());
    }

    #[test]
    fn test_invalid_request_rejected_at_construction() {
        let err = Container::new(request().with_startup_timeout(Duration::ZERO)).unwrap_err();
        assert_eq!(err.kind(), crate::container::ErrorKind::Configuration);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ReadinessState::NotStarted.to_string(), "not started");
        assert_eq!(
            ReadinessState::Failed(FailureCause::Timeout).to_string(),
            "failed (startup timeout)"
        );
    }
}
