//! Test doubles for exercising container lifecycles without Docker.
//!
//! Provides:
//! - [`StubRuntime`]: An in-memory [`ContainerRuntime`] with configurable
//!   port mappings, output, exit codes and failure injection
//! - [`RuntimeCall`]: The call log a stub records, for ordering assertions
//! - [`init_tracing`]: Test-friendly log output, filtered by `RUST_LOG`
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use keycloak_container::container::{Container, ContainerRequest};
//! use keycloak_container::testing::StubRuntime;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let stub = StubRuntime::new().with_port(8080, 49152);
//!     let request = ContainerRequest::new("example/app:1").with_exposed_port(8080);
//!     let mut container = Container::with_runtime(request, Arc::new(stub.clone())).unwrap();
//!     container.start().await.unwrap();
//!     assert_eq!(container.mapped_port(8080).unwrap(), 49152);
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tracing_subscriber::EnvFilter;

use crate::container::error::{ContainerError, Result};
use crate::container::request::{FileCopy, ImageRef};
use crate::runtime::{ContainerRuntime, CreateSpec, Inspection};

/// Install a test subscriber once per process. Later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Runtime operation the stub should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubFailure {
    Pull,
    Create,
    Copy,
    Start,
    Remove,
}

/// One call received by a [`StubRuntime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    EnsureImage(String),
    Create(String),
    CopyFile { id: String, target: String },
    Start(String),
    Stop(String),
    Remove(String),
}

#[derive(Debug, Default)]
struct StubContainer {
    name: String,
    running: bool,
    started: bool,
    removed: bool,
}

#[derive(Debug, Default)]
struct StubState {
    ports: BTreeMap<u16, u16>,
    logs: String,
    failure: Option<StubFailure>,
    exit_code: Option<i64>,
    calls: Vec<RuntimeCall>,
    created: Vec<CreateSpec>,
    copied: Vec<(FileCopy, Vec<u8>)>,
    containers: BTreeMap<String, StubContainer>,
    next_id: u32,
}

/// An in-memory container runtime.
///
/// Clones share state, so a test keeps one clone for assertions and hands
/// another to the controller. Containers report `127.0.0.1` as their host
/// and publish the ports registered with [`with_port`](Self::with_port).
#[derive(Debug, Clone, Default)]
pub struct StubRuntime {
    state: Arc<Mutex<StubState>>,
}

impl StubRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish container port `internal` on host port `host`.
    pub fn with_port(self, internal: u16, host: u16) -> Self {
        self.lock().ports.insert(internal, host);
        self
    }

    /// Output every container reports from `logs`.
    pub fn with_logs(self, logs: impl Into<String>) -> Self {
        self.lock().logs = logs.into();
        self
    }

    /// Fail the given operation.
    pub fn failing_at(self, failure: StubFailure) -> Self {
        self.set_failure(Some(failure));
        self
    }

    /// Containers exit with `code` as soon as they start.
    pub fn exiting_with(self, code: i64) -> Self {
        self.lock().exit_code = Some(code);
        self
    }

    /// Change failure injection after the stub is in use.
    pub fn set_failure(&self, failure: Option<StubFailure>) {
        self.lock().failure = failure;
    }

    /// Every call received, in order.
    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.lock().calls.clone()
    }

    /// Specs of every created container.
    pub fn created(&self) -> Vec<CreateSpec> {
        self.lock().created.clone()
    }

    /// Copied files and the bytes read from the host at copy time.
    pub fn copied(&self) -> Vec<(FileCopy, Vec<u8>)> {
        self.lock().copied.clone()
    }

    /// Names of containers that were created and not removed.
    pub fn live_containers(&self) -> Vec<String> {
        self.lock()
            .containers
            .values()
            .filter(|c| !c.removed)
            .map(|c| c.name.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn fails_at(state: &StubState, failure: StubFailure) -> bool {
        state.failure == Some(failure)
    }
}

#[async_trait]
impl ContainerRuntime for StubRuntime {
    fn host(&self) -> String {
        "127.0.0.1".to_string()
    }

    async fn ensure_image(&self, image: &ImageRef) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::EnsureImage(image.to_string()));
        if Self::fails_at(&state, StubFailure::Pull) {
            return Err(ContainerError::ImagePullFailed {
                image: image.to_string(),
                reason: "stub pull failure".to_string(),
            });
        }
        Ok(())
    }

    async fn create(&self, spec: &CreateSpec) -> Result<String> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::Create(spec.name.clone()));
        if Self::fails_at(&state, StubFailure::Create) {
            return Err(ContainerError::ContainerCreationFailed {
                name: spec.name.clone(),
                reason: "stub create failure".to_string(),
            });
        }

        state.next_id += 1;
        let id = format!("stub-{}", state.next_id);
        state.created.push(spec.clone());
        state.containers.insert(
            id.clone(),
            StubContainer {
                name: spec.name.clone(),
                ..StubContainer::default()
            },
        );
        Ok(id)
    }

    async fn copy_file(&self, id: &str, copy: &FileCopy) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::CopyFile {
            id: id.to_string(),
            target: copy.target.clone(),
        });
        if Self::fails_at(&state, StubFailure::Copy) {
            return Err(ContainerError::CopyFailed {
                name: id.to_string(),
                file: copy.source.clone(),
                reason: "stub copy failure".to_string(),
            });
        }

        let bytes = std::fs::read(&copy.source)?;
        state.copied.push((copy.clone(), bytes));
        Ok(())
    }

    async fn start(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::Start(id.to_string()));
        if Self::fails_at(&state, StubFailure::Start) {
            return Err(ContainerError::ContainerStartFailed {
                name: id.to_string(),
                reason: "stub start failure".to_string(),
            });
        }

        let exits = state.exit_code.is_some();
        let container = state
            .containers
            .get_mut(id)
            .ok_or_else(|| unknown_container(id))?;
        container.started = true;
        container.running = !exits;
        Ok(())
    }

    async fn inspect(&self, id: &str) -> Result<Inspection> {
        let state = self.lock();
        let container = state
            .containers
            .get(id)
            .filter(|c| !c.removed)
            .ok_or_else(|| unknown_container(id))?;

        Ok(Inspection {
            running: container.running,
            exit_code: if container.started && !container.running {
                Some(state.exit_code.unwrap_or(0))
            } else {
                None
            },
            ports: if container.started {
                state.ports.clone()
            } else {
                BTreeMap::new()
            },
        })
    }

    async fn logs(&self, id: &str, tail: Option<usize>) -> Result<String> {
        let state = self.lock();
        if !state.containers.contains_key(id) {
            return Err(unknown_container(id));
        }

        let output = match tail {
            Some(n) => {
                let lines: Vec<&str> = state.logs.lines().collect();
                let start = lines.len().saturating_sub(n);
                lines[start..].join("\n")
            }
            None => state.logs.clone(),
        };
        Ok(output)
    }

    async fn stop(&self, id: &str, _grace: Duration) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::Stop(id.to_string()));
        if let Some(container) = state.containers.get_mut(id) {
            container.running = false;
        }
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::Remove(id.to_string()));
        if Self::fails_at(&state, StubFailure::Remove) {
            return Err(ContainerError::TeardownFailed {
                name: id.to_string(),
                reason: "stub remove failure".to_string(),
            });
        }

        if let Some(container) = state.containers.get_mut(id) {
            container.running = false;
            container.removed = true;
        }
        Ok(())
    }

    fn detached(&self) -> Result<Arc<dyn ContainerRuntime>> {
        Ok(Arc::new(self.clone()))
    }
}

fn unknown_container(id: &str) -> ContainerError {
    ContainerError::Runtime {
        reason: format!("no such container: {id}"),
    }
}
