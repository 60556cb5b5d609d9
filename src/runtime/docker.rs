//! Docker implementation of [`ContainerRuntime`] on top of bollard.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, LogsOptions, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptions, UploadToContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, PortMap};
use bytes::Bytes;
use futures::StreamExt;

use crate::container::error::{ContainerError, Result};
use crate::container::request::{FileCopy, ImageRef};
use crate::runtime::{ContainerRuntime, CreateSpec, Inspection};

/// Seconds bollard waits on a socket request.
const SOCKET_TIMEOUT_SECS: u64 = 120;

/// Connect to the Docker daemon.
///
/// Tries bollard's defaults first (`DOCKER_HOST` or the platform socket),
/// then the per-user sockets of Docker Desktop and rootless Docker.
pub async fn connect_docker() -> Result<Docker> {
    connect_any().await.map(|(docker, _)| docker)
}

/// Like [`connect_docker`], also reporting which fallback socket was used.
async fn connect_any() -> Result<(Docker, Option<String>)> {
    let mut last_error = "no Docker socket found".to_string();

    match Docker::connect_with_local_defaults() {
        Ok(docker) => match docker.ping().await {
            Ok(_) => return Ok((docker, None)),
            Err(e) => last_error = e.to_string(),
        },
        Err(e) => last_error = e.to_string(),
    }

    for socket in fallback_sockets() {
        if !std::path::Path::new(&socket).exists() {
            continue;
        }
        match Docker::connect_with_socket(&socket, SOCKET_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
        {
            Ok(docker) => match docker.ping().await {
                Ok(_) => {
                    tracing::debug!("Connected to Docker via {}", socket);
                    return Ok((docker, Some(socket)));
                }
                Err(e) => last_error = format!("{socket}: {e}"),
            },
            Err(e) => last_error = format!("{socket}: {e}"),
        }
    }

    Err(ContainerError::DockerNotAvailable { reason: last_error })
}

/// Per-user socket locations not covered by bollard's defaults.
fn fallback_sockets() -> Vec<String> {
    let mut sockets = Vec::new();
    if cfg!(unix) {
        if let Some(home) = std::env::var_os("HOME") {
            let home = std::path::PathBuf::from(home);
            sockets.push(home.join(".docker/run/docker.sock"));
            sockets.push(home.join(".colima/default/docker.sock"));
        }
        if let Some(runtime_dir) = std::env::var_os("XDG_RUNTIME_DIR") {
            sockets.push(std::path::PathBuf::from(runtime_dir).join("docker.sock"));
        }
    }
    sockets
        .into_iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect()
}

/// Host at which published ports are reachable, derived from `DOCKER_HOST`.
fn docker_host_name(docker_host: Option<&str>) -> String {
    docker_host
        .and_then(|raw| url::Url::parse(raw).ok())
        .filter(|url| matches!(url.scheme(), "tcp" | "http" | "https"))
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| "localhost".to_string())
}

/// Container runtime backed by a Docker daemon.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
    socket: Option<String>,
    host: String,
}

impl std::fmt::Debug for DockerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerRuntime")
            .field("socket", &self.socket)
            .field("host", &self.host)
            .finish()
    }
}

impl DockerRuntime {
    /// Connect to the local Docker daemon.
    pub async fn connect() -> Result<Self> {
        let (docker, socket) = connect_any().await?;
        Ok(Self {
            docker,
            socket,
            host: docker_host_name(std::env::var("DOCKER_HOST").ok().as_deref()),
        })
    }

    /// Open a second client to the same daemon without pinging it.
    fn reconnect(&self) -> Result<Docker> {
        let docker = match &self.socket {
            Some(socket) => {
                Docker::connect_with_socket(socket, SOCKET_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
            }
            None => Docker::connect_with_local_defaults(),
        };
        docker.map_err(|e| ContainerError::DockerNotAvailable {
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn host(&self) -> String {
        self.host.clone()
    }

    async fn ensure_image(&self, image: &ImageRef) -> Result<()> {
        let reference = image.to_string();
        if self.docker.inspect_image(&reference).await.is_ok() {
            tracing::debug!("Image '{}' exists locally", reference);
            return Ok(());
        }

        tracing::info!("Pulling image: {}", reference);

        let options = CreateImageOptions {
            from_image: image.repository().to_string(),
            tag: image.pull_tag().to_string(),
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        tracing::trace!("Pull status: {}", status);
                    }
                }
                Err(e) => {
                    return Err(ContainerError::ImagePullFailed {
                        image: reference,
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!("Pulled image: {}", reference);
        Ok(())
    }

    async fn create(&self, spec: &CreateSpec) -> Result<String> {
        let env: Vec<String> = spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect();

        // bollard expects HashMap<String, HashMap<(), ()>>
        let exposed_ports: HashMap<String, HashMap<(), ()>> = spec
            .exposed_ports
            .iter()
            .map(|port| (format!("{port}/tcp"), HashMap::new()))
            .collect();

        let labels: HashMap<String, String> = spec.labels.iter().cloned().collect();

        let host_config = HostConfig {
            // Every exposed port gets a random free host port.
            publish_all_ports: Some(true),
            auto_remove: Some(false),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.to_string()),
            env: if env.is_empty() { None } else { Some(env) },
            cmd: spec.cmd.clone(),
            exposed_ports: Some(exposed_ports),
            labels: Some(labels),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| ContainerError::ContainerCreationFailed {
                name: spec.name.clone(),
                reason: e.to_string(),
            })?;

        for warning in &response.warnings {
            tracing::warn!("Docker warning for {}: {}", spec.name, warning);
        }

        Ok(response.id)
    }

    async fn copy_file(&self, id: &str, copy: &FileCopy) -> Result<()> {
        let copy_failed = |reason: String| ContainerError::CopyFailed {
            name: id.to_string(),
            file: copy.source.clone(),
            reason,
        };

        let data = tokio::fs::read(&copy.source)
            .await
            .map_err(|e| copy_failed(e.to_string()))?;
        let archive =
            single_file_archive(&copy.target, &data, copy.mode).map_err(|e| copy_failed(e.to_string()))?;

        self.docker
            .upload_to_container(
                id,
                Some(UploadToContainerOptions {
                    path: "/".to_string(),
                    ..Default::default()
                }),
                Bytes::from(archive),
            )
            .await
            .map_err(|e| copy_failed(e.to_string()))?;

        tracing::debug!("Copied {} to {}:{}", copy.source.display(), id, copy.target);
        Ok(())
    }

    async fn start(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| ContainerError::ContainerStartFailed {
                name: id.to_string(),
                reason: e.to_string(),
            })
    }

    async fn inspect(&self, id: &str) -> Result<Inspection> {
        let info = self
            .docker
            .inspect_container(id, None)
            .await
            .map_err(|e| ContainerError::Runtime {
                reason: format!("inspect {id}: {e}"),
            })?;

        let (running, exit_code) = info
            .state
            .map(|s| (s.running == Some(true), s.exit_code))
            .unwrap_or((false, None));

        let ports = info
            .network_settings
            .and_then(|n| n.ports)
            .map(|ports| published_ports(&ports))
            .unwrap_or_default();

        Ok(Inspection {
            running,
            exit_code: if running { None } else { exit_code },
            ports,
        })
    }

    async fn logs(&self, id: &str, tail: Option<usize>) -> Result<String> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: tail.map_or_else(|| "all".to_string(), |n| n.to_string()),
            ..Default::default()
        };

        let mut stream = self.docker.logs(id, Some(options));
        let mut output = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ContainerError::Runtime {
                reason: format!("logs {id}: {e}"),
            })?;
            output.push_str(&chunk.to_string());
        }
        Ok(output)
    }

    async fn stop(&self, id: &str, grace: Duration) -> Result<()> {
        match self
            .docker
            .stop_container(
                id,
                Some(StopContainerOptions {
                    t: grace.as_secs() as i64,
                }),
            )
            .await
        {
            Ok(()) => Ok(()),
            // 304: already stopped
            Err(BollardError::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(e) => Err(ContainerError::TeardownFailed {
                name: id.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn remove(&self, id: &str) -> Result<()> {
        match self
            .docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(()),
            Err(e) => Err(ContainerError::TeardownFailed {
                name: id.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn detached(&self) -> Result<Arc<dyn ContainerRuntime>> {
        Ok(Arc::new(Self {
            docker: self.reconnect()?,
            socket: self.socket.clone(),
            host: self.host.clone(),
        }))
    }
}

/// Container port -> host port, from Docker's `"8080/tcp"` keyed map.
fn published_ports(ports: &PortMap) -> std::collections::BTreeMap<u16, u16> {
    ports
        .iter()
        .filter_map(|(key, bindings)| {
            let (port, proto) = key.split_once('/').unwrap_or((key.as_str(), "tcp"));
            if proto != "tcp" {
                return None;
            }
            let container_port = port.parse::<u16>().ok()?;
            let host_port = bindings
                .as_ref()?
                .iter()
                .find_map(|b| b.host_port.as_deref()?.parse::<u16>().ok())?;
            Some((container_port, host_port))
        })
        .collect()
}

/// Tar archive holding one file at `target` (relative to `/`). Missing
/// parent directories are created by the daemon on extraction.
fn single_file_archive(target: &str, data: &[u8], mode: u32) -> std::io::Result<Vec<u8>> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(mode);
    header.set_cksum();

    let mut builder = tar::Builder::new(Vec::new());
    builder.append_data(&mut header, target.trim_start_matches('/'), data)?;
    builder.into_inner()
}
