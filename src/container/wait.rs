//! Readiness conditions and the polling loop that waits for them.

use std::future::Future;
use std::time::Duration;

use regex::Regex;
use tokio::time::Instant;

use crate::container::error::{ContainerError, Result};

/// Default interval between readiness checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Upper bound for a single readiness check, so one hung request cannot
/// push the observed failure time far past the deadline.
const MAX_ATTEMPT_DURATION: Duration = Duration::from_secs(5);

/// Condition a freshly started container must meet to count as ready.
#[derive(Debug, Clone, Default)]
pub enum WaitFor {
    /// No check (ready as soon as the process is started).
    #[default]
    Nothing,
    /// HTTP GET against a container port.
    Http {
        /// Port inside the container.
        port: u16,
        /// Request path (e.g. "/health/ready").
        path: String,
        /// Expected status; any 2xx when `None`.
        status: Option<u16>,
    },
    /// TCP connect against a container port.
    Tcp {
        /// Port inside the container.
        port: u16,
    },
    /// Pattern that must appear in the container output.
    LogMessage {
        /// Compiled pattern, matched line-agnostic over the whole output.
        pattern: Regex,
        /// Number of matches required.
        times: usize,
    },
}

impl WaitFor {
    /// Wait for any 2xx response from `GET {path}` on `port`.
    pub fn http(port: u16, path: impl Into<String>) -> Self {
        Self::Http {
            port,
            path: path.into(),
            status: None,
        }
    }

    /// Wait until `port` accepts TCP connections.
    pub fn tcp(port: u16) -> Self {
        Self::Tcp { port }
    }

    /// Wait until `pattern` shows up once in the container output.
    pub fn log_message(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| ContainerError::Config {
            reason: format!("invalid log pattern '{pattern}': {e}"),
        })?;
        Ok(Self::LogMessage { pattern, times: 1 })
    }

    /// Require an exact HTTP status (HTTP waits only).
    pub fn with_status(mut self, expected: u16) -> Self {
        if let Self::Http { status, .. } = &mut self {
            *status = Some(expected);
        }
        self
    }

    /// Require `n` log matches (log waits only).
    pub fn with_times(mut self, n: usize) -> Self {
        if let Self::LogMessage { times, .. } = &mut self {
            *times = n.max(1);
        }
        self
    }

    /// Container port this condition talks to, if any.
    pub fn port(&self) -> Option<u16> {
        match self {
            Self::Http { port, .. } | Self::Tcp { port } => Some(*port),
            Self::Nothing | Self::LogMessage { .. } => None,
        }
    }
}

/// Result of a single readiness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    /// Condition met.
    Ready,
    /// Not yet; keep polling.
    Pending(String),
    /// Will never become ready (e.g. the process exited).
    Fatal(String),
}

/// Lifecycle of a [`ReadinessProbe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Idle,
    Polling,
    Succeeded,
    TimedOut,
    Aborted,
}

/// How a probe run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Succeeded {
        attempts: u32,
        elapsed: Duration,
    },
    TimedOut {
        attempts: u32,
        elapsed: Duration,
        last_reason: String,
    },
    Aborted {
        attempts: u32,
        elapsed: Duration,
        reason: String,
    },
}

impl ProbeOutcome {
    /// Time between the first check and the outcome.
    pub fn elapsed(&self) -> Duration {
        match self {
            Self::Succeeded { elapsed, .. }
            | Self::TimedOut { elapsed, .. }
            | Self::Aborted { elapsed, .. } => *elapsed,
        }
    }

    /// Number of checks that ran.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Succeeded { attempts, .. }
            | Self::TimedOut { attempts, .. }
            | Self::Aborted { attempts, .. } => *attempts,
        }
    }
}

/// Polls a readiness check at a fixed interval until it passes or the
/// deadline expires.
///
/// The deadline is measured from the start of [`run`](Self::run). When the
/// probe times out, the reported elapsed time is at least the timeout and
/// exceeds it by no more than one bounded check.
#[derive(Debug)]
pub struct ReadinessProbe {
    timeout: Duration,
    interval: Duration,
    state: ProbeState,
}

impl ReadinessProbe {
    /// Create a probe. The interval is clamped to a tenth of the timeout so
    /// that several attempts always fit in the window.
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        let ceiling = (timeout / 10).max(Duration::from_millis(1));
        Self {
            timeout,
            interval: interval.clamp(Duration::from_millis(1), ceiling),
            state: ProbeState::Idle,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Effective interval after clamping.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> ProbeState {
        self.state
    }

    /// Run `check` until it reports ready, fatal, or the deadline passes.
    ///
    /// A probe runs once; calling this again after it left `Idle` reports
    /// `Aborted` without invoking `check`.
    pub async fn run<F, Fut>(&mut self, mut check: F) -> ProbeOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Check>,
    {
        if self.state != ProbeState::Idle {
            return ProbeOutcome::Aborted {
                attempts: 0,
                elapsed: Duration::ZERO,
                reason: "probe already ran".to_string(),
            };
        }

        self.state = ProbeState::Polling;
        let start = Instant::now();
        let mut attempts = 0u32;
        let mut last_reason = "no readiness check completed".to_string();

        loop {
            let remaining = self.timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                break;
            }

            attempts += 1;
            match tokio::time::timeout(remaining.min(MAX_ATTEMPT_DURATION), check()).await {
                Ok(Check::Ready) => {
                    self.state = ProbeState::Succeeded;
                    return ProbeOutcome::Succeeded {
                        attempts,
                        elapsed: start.elapsed(),
                    };
                }
                Ok(Check::Pending(reason)) => {
                    tracing::trace!(attempt = attempts, %reason, "Not ready yet");
                    last_reason = reason;
                }
                Ok(Check::Fatal(reason)) => {
                    self.state = ProbeState::Aborted;
                    return ProbeOutcome::Aborted {
                        attempts,
                        elapsed: start.elapsed(),
                        reason,
                    };
                }
                Err(_) => {
                    last_reason = "readiness check did not answer in time".to_string();
                }
            }

            let remaining = self.timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(self.interval.min(remaining)).await;
        }

        self.state = ProbeState::TimedOut;
        ProbeOutcome::TimedOut {
            attempts,
            elapsed: start.elapsed(),
            last_reason,
        }
    }
}

/// HTTP readiness check. Connection errors are expected during startup.
pub(crate) async fn http_check(client: &reqwest::Client, url: &str, status: Option<u16>) -> Check {
    match client.get(url).send().await {
        Ok(resp) => {
            let code = resp.status();
            let ok = match status {
                Some(expected) => code.as_u16() == expected,
                None => code.is_success(),
            };
            if ok {
                Check::Ready
            } else {
                Check::Pending(format!("GET {url} returned {code}"))
            }
        }
        Err(e) => Check::Pending(format!("GET {url} failed: {e}")),
    }
}

/// TCP readiness check.
pub(crate) async fn tcp_check(addr: &str) -> Check {
    use tokio::net::TcpStream;

    match tokio::time::timeout(Duration::from_secs(2), TcpStream::connect(addr)).await {
        Ok(Ok(_)) => Check::Ready,
        Ok(Err(e)) => Check::Pending(format!("connect to {addr} failed: {e}")),
        Err(_) => Check::Pending(format!("connect to {addr} timed out")),
    }
}

/// Log readiness check over the container output captured so far.
pub(crate) fn log_check(pattern: &Regex, times: usize, output: &str) -> Check {
    let seen = pattern.find_iter(output).count();
    if seen >= times {
        Check::Ready
    } else {
        Check::Pending(format!(
            "pattern '{}' seen {seen}/{times} times",
            pattern.as_str()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_interval_clamped_to_tenth_of_timeout() {
        let probe = ReadinessProbe::new(Duration::from_secs(5), Duration::from_secs(2));
        assert_eq!(probe.interval(), Duration::from_millis(500));

        let probe = ReadinessProbe::new(Duration::from_secs(90), DEFAULT_POLL_INTERVAL);
        assert_eq!(probe.interval(), DEFAULT_POLL_INTERVAL);
        assert_eq!(probe.state(), ProbeState::Idle);
    }

    #[tokio::test]
    async fn test_succeeds_after_pending_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut probe = ReadinessProbe::new(Duration::from_secs(5), Duration::from_millis(10));

        let counter = calls.clone();
        let outcome = probe
            .run(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 3 {
                        Check::Pending("booting".to_string())
                    } else {
                        Check::Ready
                    }
                }
            })
            .await;

        assert!(matches!(outcome, ProbeOutcome::Succeeded { attempts: 4, .. }));
        assert_eq!(probe.state(), ProbeState::Succeeded);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_times_out_within_margin() {
        let timeout = Duration::from_millis(400);
        let mut probe = ReadinessProbe::new(timeout, Duration::from_millis(20));

        let started = std::time::Instant::now();
        let outcome = probe
            .run(|| async { Check::Pending("connection refused".to_string()) })
            .await;
        let observed = started.elapsed();

        match outcome {
            ProbeOutcome::TimedOut {
                attempts,
                elapsed,
                last_reason,
            } => {
                assert!(elapsed >= timeout);
                assert!(attempts >= 5, "expected several attempts, got {attempts}");
                assert_eq!(last_reason, "connection refused");
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(observed >= timeout);
        assert!(observed < timeout * 3, "probe overran: {observed:?}");
        assert_eq!(probe.state(), ProbeState::TimedOut);
    }

    #[tokio::test]
    async fn test_slow_check_is_cut_at_deadline() {
        let timeout = Duration::from_millis(200);
        let mut probe = ReadinessProbe::new(timeout, Duration::from_millis(10));

        let started = std::time::Instant::now();
        let outcome = probe
            .run(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Check::Ready
            })
            .await;

        assert!(matches!(outcome, ProbeOutcome::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_fatal_aborts_immediately() {
        let mut probe = ReadinessProbe::new(Duration::from_secs(30), Duration::from_millis(10));
        let outcome = probe
            .run(|| async { Check::Fatal("exited with code 1".to_string()) })
            .await;

        assert_eq!(outcome.attempts(), 1);
        assert!(outcome.elapsed() < Duration::from_secs(1));
        assert_eq!(probe.state(), ProbeState::Aborted);

        // One-shot: a second run does not call the check again.
        let again = probe.run(|| async { Check::Ready }).await;
        assert!(matches!(again, ProbeOutcome::Aborted { attempts: 0, .. }));
    }

    #[test]
    fn test_log_check_counts_matches() {
        let wait = WaitFor::log_message(r"Listening on: http://\S+").unwrap().with_times(2);
        let WaitFor::LogMessage { pattern, times } = wait else {
            panic!("expected log wait");
        };

        let output = "INFO starting\nINFO Listening on: http://0.0.0.0:8080\n";
        assert!(matches!(log_check(&pattern, times, output), Check::Pending(_)));

        let output = format!("{output}INFO Listening on: http://0.0.0.0:9000\n");
        assert_eq!(log_check(&pattern, times, &output), Check::Ready);
    }

    #[test]
    fn test_invalid_log_pattern_is_config_error() {
        let err = WaitFor::log_message("([unclosed").unwrap_err();
        assert!(matches!(err, ContainerError::Config { .. }));
    }

    #[test]
    fn test_builders_only_touch_matching_variant() {
        let wait = WaitFor::tcp(5432).with_status(204);
        assert!(matches!(wait, WaitFor::Tcp { port: 5432 }));
        assert_eq!(wait.port(), Some(5432));

        let wait = WaitFor::http(8080, "/health").with_status(204);
        assert!(matches!(wait, WaitFor::Http { status: Some(204), .. }));
        assert_eq!(WaitFor::Nothing.port(), None);
    }

    #[tokio::test]
    async fn test_tcp_check_against_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        assert_eq!(tcp_check(&addr).await, Check::Ready);

        drop(listener);
        assert!(matches!(tcp_check(&addr).await, Check::Pending(_)));
    }
}
