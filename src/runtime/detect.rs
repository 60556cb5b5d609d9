//! Docker availability detection with platform-specific guidance.
//!
//! Test suites use [`check_docker`] to skip Docker-backed tests cleanly on
//! machines without a daemon, and the controller appends the platform hint
//! to `DockerNotAvailable` errors.
//!
//! Detection is "binary on PATH" plus "daemon answers a ping" through
//! [`connect_docker`](crate::runtime::connect_docker), which also covers the
//! Docker Desktop and rootless socket locations. On Windows the named pipe is
//! tried first and `docker version` is used as a fallback probe.

/// Docker daemon availability status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DockerStatus {
    /// Docker binary found on PATH and daemon responding to ping.
    Available,
    /// `docker` binary not found on PATH.
    NotInstalled,
    /// Binary found but daemon not responding.
    NotRunning,
}

impl DockerStatus {
    /// Returns true if Docker is available and ready.
    pub fn is_ok(&self) -> bool {
        matches!(self, DockerStatus::Available)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DockerStatus::Available => "available",
            DockerStatus::NotInstalled => "not installed",
            DockerStatus::NotRunning => "not running",
        }
    }
}

impl std::fmt::Display for DockerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host platform for install guidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOS,
    Linux,
    Windows,
}

impl Platform {
    /// Detect the current platform.
    pub fn current() -> Self {
        match std::env::consts::OS {
            "macos" => Platform::MacOS,
            "windows" => Platform::Windows,
            _ => Platform::Linux,
        }
    }

    /// Installation instructions for Docker on this platform.
    pub fn install_hint(&self) -> &'static str {
        match self {
            Platform::MacOS => {
                "Install Docker Desktop: https://docs.docker.com/desktop/install/mac-install/"
            }
            Platform::Linux => "Install Docker Engine: https://docs.docker.com/engine/install/",
            Platform::Windows => {
                "Install Docker Desktop: https://docs.docker.com/desktop/install/windows-install/"
            }
        }
    }

    /// Instructions to start the Docker daemon on this platform.
    pub fn start_hint(&self) -> &'static str {
        match self {
            Platform::MacOS => "Start Docker Desktop from Applications, or run: open -a Docker",
            Platform::Linux => "Start the Docker daemon: sudo systemctl start docker",
            Platform::Windows => "Start Docker Desktop from the Start menu",
        }
    }
}

/// Result of a Docker detection check.
#[derive(Debug, Clone, Copy)]
pub struct DockerDetection {
    pub status: DockerStatus,
    pub platform: Platform,
}

impl DockerDetection {
    /// What the user should do next, if anything.
    pub fn hint(&self) -> Option<&'static str> {
        match self.status {
            DockerStatus::Available => None,
            DockerStatus::NotInstalled => Some(self.platform.install_hint()),
            DockerStatus::NotRunning => Some(self.platform.start_hint()),
        }
    }
}

/// Check whether Docker is installed and running.
pub async fn check_docker() -> DockerDetection {
    let platform = Platform::current();

    if !docker_binary_exists() {
        // A remote daemon (DOCKER_HOST) works without a local CLI.
        let status = if crate::runtime::connect_docker().await.is_ok() {
            DockerStatus::Available
        } else {
            DockerStatus::NotInstalled
        };
        return DockerDetection { status, platform };
    }

    if crate::runtime::connect_docker().await.is_ok() {
        return DockerDetection {
            status: DockerStatus::Available,
            platform,
        };
    }

    #[cfg(windows)]
    if docker_cli_daemon_reachable() {
        return DockerDetection {
            status: DockerStatus::Available,
            platform,
        };
    }

    DockerDetection {
        status: DockerStatus::NotRunning,
        platform,
    }
}

/// Check if the `docker` binary exists on PATH.
fn docker_binary_exists() -> bool {
    let finder = if cfg!(windows) { "where" } else { "which" };
    std::process::Command::new(finder)
        .arg("docker")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}

#[cfg(windows)]
fn docker_cli_daemon_reachable() -> bool {
    // `docker version` only prints server fields when the daemon answers.
    std::process::Command::new("docker")
        .args(["version", "--format", "{{.Server.Version}}"])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hints_not_empty() {
        for platform in [Platform::MacOS, Platform::Linux, Platform::Windows] {
            assert!(!platform.install_hint().is_empty());
            assert!(!platform.start_hint().is_empty());
        }
    }

    #[test]
    fn test_detection_hint_follows_status() {
        let platform = Platform::Linux;
        let ok = DockerDetection {
            status: DockerStatus::Available,
            platform,
        };
        assert_eq!(ok.hint(), None);

        let missing = DockerDetection {
            status: DockerStatus::NotInstalled,
            platform,
        };
        assert_eq!(missing.hint(), Some(platform.install_hint()));

        let stopped = DockerDetection {
            status: DockerStatus::NotRunning,
            platform,
        };
        assert_eq!(stopped.hint(), Some(platform.start_hint()));
    }

    #[test]
    fn test_docker_status_display() {
        assert_eq!(DockerStatus::Available.to_string(), "available");
        assert_eq!(DockerStatus::NotInstalled.to_string(), "not installed");
        assert_eq!(DockerStatus::NotRunning.to_string(), "not running");
        assert!(DockerStatus::Available.is_ok());
        assert!(!DockerStatus::NotRunning.is_ok());
    }

    #[tokio::test]
    async fn test_check_docker_returns_valid_status() {
        let result = check_docker().await;
        match result.status {
            DockerStatus::Available | DockerStatus::NotInstalled | DockerStatus::NotRunning => {}
        }
    }
}
