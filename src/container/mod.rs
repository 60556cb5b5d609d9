//! Generic lifecycle management for throwaway Docker containers.
//!
//! A [`ContainerRequest`] describes what to run: image, environment, files
//! to copy in, exposed ports and a readiness condition. A [`Container`] owns
//! one launch of that request:
//! - `start()` blocks until the readiness condition passes or fails
//! - Accessors (host, mapped ports) are only valid while ready
//! - `stop()` and `Drop` remove the container
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                               Container                                   │
//! │                                                                           │
//! │   start()                                                                 │
//! │      │                                                                    │
//! │      ▼                                                                    │
//! │   ┌──────────────┐     ┌──────────────┐     ┌──────────────────────────┐  │
//! │   │ Ensure Image │────▶│ Create       │────▶│ Copy Files, then Start   │  │
//! │   │ (pull)       │     │ (publish)    │     │                          │  │
//! │   └──────────────┘     └──────────────┘     └──────────────────────────┘  │
//! │                                                         │                 │
//! │                                                         ▼                 │
//! │   ┌──────────────┐     ┌──────────────┐     ┌──────────────────────────┐  │
//! │   │ Ready        │◀────│ Probe        │◀────│ Inspect (still running?) │  │
//! │   │ (snapshot)   │     │ HTTP/TCP/log │     │                          │  │
//! │   └──────────────┘     └──────────────┘     └──────────────────────────┘  │
//! │                               │                                           │
//! │                               ▼ timeout / exit / runtime error            │
//! │                        ┌──────────────┐                                   │
//! │                        │ Remove, then │                                   │
//! │                        │ return error │                                   │
//! │                        └──────────────┘                                   │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use keycloak_container::container::{Container, ContainerRequest, WaitFor};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let request = ContainerRequest::new("nginx:1.27")
//!     .with_exposed_port(80)
//!     .with_wait_for(WaitFor::http(80, "/"))
//!     .with_startup_timeout(Duration::from_secs(30));
//!
//! let mut container = Container::new(request)?;
//! container.start().await?;
//! println!("nginx at {}", container.mapped_url(80, "/")?);
//!
//! container.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod manager;
pub mod request;
pub mod wait;

pub use error::{ContainerError, ErrorKind, Result};
pub use manager::{Container, ContainerHandle, FailureCause, ReadinessState};
pub use request::{ContainerRequest, DEFAULT_STARTUP_TIMEOUT, FileCopy, ImageRef};
pub use wait::{Check, DEFAULT_POLL_INTERVAL, ProbeOutcome, ProbeState, ReadinessProbe, WaitFor};
