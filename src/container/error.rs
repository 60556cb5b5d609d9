//! Error types for container lifecycle management.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::container::manager::ReadinessState;
use crate::error::ConfigError;

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, ContainerError>;

/// Broad classification of a [`ContainerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad builder input or settings. Surfaced before anything is launched.
    Configuration,
    /// The container could not be brought to the ready state.
    Launch,
    /// An operation was used in the wrong lifecycle state.
    IllegalState,
    /// The runtime failed outside of launch (inspect, logs, teardown).
    Runtime,
    /// Talking to the running server failed.
    Http,
}

/// Errors that can occur while configuring, launching or using a container.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Invalid configuration.
    #[error("Container configuration error: {reason}")]
    Config {
        /// Reason for error.
        reason: String,
    },

    /// A file referenced by the configuration does not exist.
    #[error("Resource not found: {}", .path.display())]
    ResourceNotFound {
        /// Resolved path that was looked up.
        path: PathBuf,
    },

    /// Settings could not be resolved from the environment.
    #[error(transparent)]
    Settings(#[from] ConfigError),

    /// Docker is not available.
    #[error("Docker not available: {reason}")]
    DockerNotAvailable {
        /// Reason why Docker is unavailable.
        reason: String,
    },

    /// Failed to pull the image.
    #[error("Failed to pull image '{image}': {reason}")]
    ImagePullFailed {
        /// Image reference.
        image: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to create the container.
    #[error("Failed to create container '{name}': {reason}")]
    ContainerCreationFailed {
        /// Container name.
        name: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to copy a file into the container before start.
    #[error("Failed to copy '{}' into container '{name}': {reason}", .file.display())]
    CopyFailed {
        /// Container name.
        name: String,
        /// Host file being copied.
        file: PathBuf,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to start the container.
    #[error("Failed to start container '{name}': {reason}")]
    ContainerStartFailed {
        /// Container name.
        name: String,
        /// Reason for failure.
        reason: String,
    },

    /// Readiness check did not pass within the startup timeout.
    #[error(
        "Container '{name}' not ready within {timeout:?} (gave up after {elapsed:?}): {reason}{}",
        tail_suffix(.log_tail)
    )]
    StartupTimeout {
        /// Container name.
        name: String,
        /// Configured startup timeout.
        timeout: Duration,
        /// Time spent probing before giving up.
        elapsed: Duration,
        /// Last readiness failure observed.
        reason: String,
        /// Last lines of container output.
        log_tail: String,
    },

    /// The container process exited while it was being probed.
    #[error(
        "Container '{name}' exited during startup after {elapsed:?} (exit code {exit_code:?}){}",
        tail_suffix(.log_tail)
    )]
    ContainerExited {
        /// Container name.
        name: String,
        /// Exit code reported by the runtime.
        exit_code: Option<i64>,
        /// Time spent probing before the exit was seen.
        elapsed: Duration,
        /// Last lines of container output.
        log_tail: String,
    },

    /// Operation used in the wrong lifecycle state.
    #[error("Cannot {operation} while container is {state}")]
    IllegalState {
        /// What the caller tried to do.
        operation: &'static str,
        /// State the container was in.
        state: ReadinessState,
    },

    /// Generic runtime failure (inspect, logs).
    #[error("Container runtime error: {reason}")]
    Runtime {
        /// Reason for failure.
        reason: String,
    },

    /// Failed to stop or remove the container.
    #[error("Failed to remove container '{name}': {reason}")]
    TeardownFailed {
        /// Container name or id.
        name: String,
        /// Reason for failure.
        reason: String,
    },

    /// HTTP transport error while talking to the server.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The admin API answered with an unexpected status.
    #[error("Admin API request to {url} failed with status {status}: {body}")]
    Admin {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnosis.
        body: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContainerError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } | Self::ResourceNotFound { .. } | Self::Settings(_) => {
                ErrorKind::Configuration
            }
            Self::DockerNotAvailable { .. }
            | Self::ImagePullFailed { .. }
            | Self::ContainerCreationFailed { .. }
            | Self::CopyFailed { .. }
            | Self::ContainerStartFailed { .. }
            | Self::StartupTimeout { .. }
            | Self::ContainerExited { .. } => ErrorKind::Launch,
            Self::IllegalState { .. } => ErrorKind::IllegalState,
            Self::Runtime { .. } | Self::TeardownFailed { .. } | Self::Io(_) => ErrorKind::Runtime,
            Self::Http(_) | Self::Admin { .. } => ErrorKind::Http,
        }
    }

    /// Whether this error means `start()` failed to produce a ready container.
    pub fn is_launch_failure(&self) -> bool {
        self.kind() == ErrorKind::Launch
    }

    /// Container output captured when launch failed, if any.
    pub fn log_tail(&self) -> Option<&str> {
        match self {
            Self::StartupTimeout { log_tail, .. } | Self::ContainerExited { log_tail, .. } => {
                Some(log_tail)
            }
            _ => None,
        }
    }

    /// Time spent probing before launch failed, if known.
    pub fn elapsed(&self) -> Option<Duration> {
        match self {
            Self::StartupTimeout { elapsed, .. } | Self::ContainerExited { elapsed, .. } => {
                Some(*elapsed)
            }
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ContainerError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

fn tail_suffix(log_tail: &str) -> String {
    if log_tail.trim().is_empty() {
        String::new()
    } else {
        format!("\n--- container output ---\n{}", log_tail.trim_end())
    }
}
