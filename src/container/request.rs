//! Image references and the startup configuration of a container.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

use crate::container::error::{ContainerError, Result};
use crate::container::wait::{DEFAULT_POLL_INTERVAL, WaitFor};

/// Default time allowed for a container to become ready.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

/// Image repository and tag, optionally pinned to a content digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef {
    repository: String,
    tag: String,
    digest: Option<String>,
}

impl ImageRef {
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
            digest: None,
        }
    }

    /// Parse `repository[:tag][@digest]`. A colon inside the registry host
    /// (`localhost:5000/kc`) is not taken as a tag separator, and the digest
    /// (`sha256:...`) is kept whole.
    pub fn parse(reference: &str) -> Self {
        let (name, digest) = match reference.split_once('@') {
            Some((name, digest)) if !name.is_empty() && !digest.is_empty() => {
                (name, Some(digest.to_string()))
            }
            _ => (reference, None),
        };

        let mut image = match name.rsplit_once(':') {
            Some((repo, tag)) if !tag.contains('/') && !repo.is_empty() => Self::new(repo, tag),
            _ => Self::new(name, "latest"),
        };
        image.digest = digest;
        image
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Content digest such as `sha256:3f2a...`, if the reference is pinned.
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// What to ask the registry for: the digest when pinned, else the tag.
    pub fn pull_tag(&self) -> &str {
        self.digest.as_deref().unwrap_or(&self.tag)
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.digest {
            Some(digest) => write!(f, "{}@{}", self.repository, digest),
            None => write!(f, "{}:{}", self.repository, self.tag),
        }
    }
}

impl From<&str> for ImageRef {
    fn from(reference: &str) -> Self {
        Self::parse(reference)
    }
}

/// A host file copied into the container before its process starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCopy {
    /// File on the host.
    pub source: PathBuf,
    /// Absolute destination path inside the container.
    pub target: String,
    /// Unix permission bits for the copied file.
    pub mode: u32,
}

impl FileCopy {
    pub fn new(source: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            mode: 0o644,
        }
    }
}

/// Everything needed to launch one container.
///
/// Built with chained `with_*` calls. Once handed to
/// [`Container::new`](crate::container::Container::new) the request is owned
/// by the controller and can no longer change.
#[derive(Debug, Clone)]
pub struct ContainerRequest {
    image: ImageRef,
    env: BTreeMap<String, String>,
    copies: Vec<FileCopy>,
    exposed_ports: BTreeSet<u16>,
    cmd: Option<Vec<String>>,
    labels: BTreeMap<String, String>,
    wait_for: WaitFor,
    startup_timeout: Duration,
    poll_interval: Duration,
    name_prefix: String,
    keep_on_shutdown: bool,
}

impl ContainerRequest {
    pub fn new(image: impl Into<ImageRef>) -> Self {
        Self {
            image: image.into(),
            env: BTreeMap::new(),
            copies: Vec::new(),
            exposed_ports: BTreeSet::new(),
            cmd: None,
            labels: BTreeMap::new(),
            wait_for: WaitFor::Nothing,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            name_prefix: "container".to_string(),
            keep_on_shutdown: false,
        }
    }

    /// Set an environment variable (last write wins).
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Copy a host file to an absolute path in the container before start.
    pub fn with_copy_file(mut self, source: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        self.copies.push(FileCopy::new(source, target));
        self
    }

    /// Expose a container port; the runtime picks a free host port for it.
    pub fn with_exposed_port(mut self, port: u16) -> Self {
        self.exposed_ports.insert(port);
        self
    }

    /// Override the image command.
    pub fn with_cmd<I, S>(mut self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cmd = Some(cmd.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_wait_for(mut self, wait_for: WaitFor) -> Self {
        self.wait_for = wait_for;
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Prefix for generated container names (`{prefix}-{random}`).
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// Leave the container running on stop/drop (for debugging).
    pub fn with_keep_on_shutdown(mut self, keep: bool) -> Self {
        self.keep_on_shutdown = keep;
        self
    }

    pub fn image(&self) -> &ImageRef {
        &self.image
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn copies(&self) -> &[FileCopy] {
        &self.copies
    }

    pub fn exposed_ports(&self) -> &BTreeSet<u16> {
        &self.exposed_ports
    }

    pub fn cmd(&self) -> Option<&[String]> {
        self.cmd.as_deref()
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn wait_for(&self) -> &WaitFor {
        &self.wait_for
    }

    pub fn startup_timeout(&self) -> Duration {
        self.startup_timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn name_prefix(&self) -> &str {
        &self.name_prefix
    }

    pub fn keep_on_shutdown(&self) -> bool {
        self.keep_on_shutdown
    }

    /// Check the request before anything is launched.
    pub fn validate(&self) -> Result<()> {
        if self.image.repository().trim().is_empty() {
            return Err(config_error("image repository must not be empty"));
        }
        if self.startup_timeout.is_zero() {
            return Err(config_error("startup timeout must be positive"));
        }
        if self.poll_interval.is_zero() {
            return Err(config_error("poll interval must be positive"));
        }

        for copy in &self.copies {
            if !copy.source.exists() {
                return Err(ContainerError::ResourceNotFound {
                    path: copy.source.clone(),
                });
            }
            if !copy.source.is_file() {
                return Err(config_error(format!(
                    "'{}' is not a regular file",
                    copy.source.display()
                )));
            }
            if !copy.target.starts_with('/') || copy.target.ends_with('/') {
                return Err(config_error(format!(
                    "copy target '{}' must be an absolute file path",
                    copy.target
                )));
            }
        }

        if let Some(port) = self.wait_for.port()
            && !self.exposed_ports.contains(&port)
        {
            return Err(config_error(format!(
                "readiness check uses port {port}, which is not exposed"
            )));
        }

        Ok(())
    }
}

fn config_error(reason: impl Into<String>) -> ContainerError {
    ContainerError::Config {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_image_ref_parsing() {
        let image = ImageRef::parse("quay.io/keycloak/keycloak:26.0");
        assert_eq!(image.repository(), "quay.io/keycloak/keycloak");
        assert_eq!(image.tag(), "26.0");

        let image = ImageRef::parse("localhost:5000/keycloak");
        assert_eq!(image.repository(), "localhost:5000/keycloak");
        assert_eq!(image.tag(), "latest");

        let image = ImageRef::parse("localhost:5000/keycloak:nightly");
        assert_eq!(image.repository(), "localhost:5000/keycloak");
        assert_eq!(image.tag(), "nightly");

        assert_eq!(ImageRef::from("redis").to_string(), "redis:latest");
    }

    #[test]
    fn test_image_ref_keeps_digest_whole() {
        let digest = "sha256:0d3f3b2a9c6e4f1b8a7d5c2e9f0a1b3c4d5e6f708192a3b4c5d6e7f8091a2b3c";

        let image = ImageRef::parse(&format!("quay.io/keycloak/keycloak@{digest}"));
        assert_eq!(image.repository(), "quay.io/keycloak/keycloak");
        assert_eq!(image.digest(), Some(digest));
        assert_eq!(image.pull_tag(), digest);
        assert_eq!(
            image.to_string(),
            format!("quay.io/keycloak/keycloak@{digest}")
        );

        let image = ImageRef::parse(&format!("localhost:5000/keycloak:26.0@{digest}"));
        assert_eq!(image.repository(), "localhost:5000/keycloak");
        assert_eq!(image.tag(), "26.0");
        assert_eq!(image.pull_tag(), digest);

        let image = ImageRef::parse("quay.io/keycloak/keycloak:26.0");
        assert_eq!(image.digest(), None);
        assert_eq!(image.pull_tag(), "26.0");
    }

    #[test]
    fn test_builder_accumulates() {
        let request = ContainerRequest::new("redis:7")
            .with_env("A", "1")
            .with_env("A", "2")
            .with_exposed_port(6379)
            .with_cmd(["redis-server", "--appendonly", "yes"])
            .with_label("suite", "unit")
            .with_wait_for(WaitFor::tcp(6379))
            .with_name_prefix("redis");

        assert_eq!(request.env().get("A").map(String::as_str), Some("2"));
        assert_eq!(request.cmd().unwrap().len(), 3);
        assert!(request.exposed_ports().contains(&6379));
        assert_eq!(request.name_prefix(), "redis");
        assert_eq!(request.startup_timeout(), DEFAULT_STARTUP_TIMEOUT);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let request = ContainerRequest::new("redis:7").with_startup_timeout(Duration::ZERO);
        assert!(matches!(
            request.validate(),
            Err(ContainerError::Config { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_missing_copy_source() {
        let request = ContainerRequest::new("redis:7")
            .with_copy_file("/definitely/not/here.json", "/data/here.json");
        assert!(matches!(
            request.validate(),
            Err(ContainerError::ResourceNotFound { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_relative_copy_target() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let request = ContainerRequest::new("redis:7").with_copy_file(file.path(), "data/x.json");
        assert!(matches!(
            request.validate(),
            Err(ContainerError::Config { .. })
        ));

        let request = ContainerRequest::new("redis:7").with_copy_file(file.path(), "/data/x.json");
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_wait_port_exposed() {
        let request = ContainerRequest::new("nginx:1").with_wait_for(WaitFor::http(80, "/"));
        let err = request.validate().unwrap_err();
        assert!(err.to_string().contains("port 80"));
    }
}
