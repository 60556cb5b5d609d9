//! Container runtime boundary.
//!
//! The lifecycle controller only talks to containers through
//! [`ContainerRuntime`]. [`DockerRuntime`] is the real implementation;
//! [`crate::testing::StubRuntime`] stands in for it in tests.

pub mod detect;
pub mod docker;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::container::error::Result;
use crate::container::request::{ContainerRequest, FileCopy, ImageRef};

pub use detect::{DockerDetection, DockerStatus, Platform, check_docker};
pub use docker::{DockerRuntime, connect_docker};

/// Label put on every container created by this crate.
pub const MANAGED_LABEL: &str = "io.keycloak-container.managed";

/// Parameters for creating (not starting) a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSpec {
    pub name: String,
    pub image: ImageRef,
    pub env: Vec<(String, String)>,
    pub cmd: Option<Vec<String>>,
    pub exposed_ports: Vec<u16>,
    pub labels: Vec<(String, String)>,
}

impl CreateSpec {
    pub fn from_request(name: impl Into<String>, request: &ContainerRequest) -> Self {
        let mut labels: Vec<(String, String)> = request
            .labels()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        labels.push((MANAGED_LABEL.to_string(), "true".to_string()));

        Self {
            name: name.into(),
            image: request.image().clone(),
            env: request
                .env()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            cmd: request.cmd().map(<[String]>::to_vec),
            exposed_ports: request.exposed_ports().iter().copied().collect(),
            labels,
        }
    }
}

/// Runtime view of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inspection {
    /// Whether the main process is running.
    pub running: bool,
    /// Exit code once the process has stopped.
    pub exit_code: Option<i64>,
    /// Published ports: container port -> host port.
    pub ports: BTreeMap<u16, u16>,
}

/// Operations the lifecycle controller needs from a container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Host name at which published ports are reachable.
    fn host(&self) -> String;

    /// Make sure `image` is available locally, pulling it if needed.
    async fn ensure_image(&self, image: &ImageRef) -> Result<()>;

    /// Create a container and return its id. The process is not started.
    async fn create(&self, spec: &CreateSpec) -> Result<String>;

    /// Copy a host file into a created container.
    async fn copy_file(&self, id: &str, copy: &FileCopy) -> Result<()>;

    /// Start a created container.
    async fn start(&self, id: &str) -> Result<()>;

    async fn inspect(&self, id: &str) -> Result<Inspection>;

    /// Container output; `tail` limits it to the last N lines.
    async fn logs(&self, id: &str, tail: Option<usize>) -> Result<String>;

    /// Stop the container, killing it after `grace`.
    async fn stop(&self, id: &str, grace: Duration) -> Result<()>;

    /// Force-remove the container and its anonymous volumes. Removing an
    /// unknown container succeeds.
    async fn remove(&self, id: &str) -> Result<()>;

    /// A handle usable from another thread and tokio runtime, with no
    /// connections shared with `self`. Used for cleanup on drop.
    fn detached(&self) -> Result<Arc<dyn ContainerRuntime>>;
}
