//! Throwaway Keycloak containers for integration tests.
//!
//! Built on a small Docker lifecycle controller:
//! - [`container`]: generic request, readiness polling and lifecycle
//! - [`runtime`]: the container runtime boundary and its Docker implementation
//! - [`keycloak`]: Keycloak-specific builder, facade and admin client
//! - [`config`]: environment-driven defaults
//! - [`testing`]: in-memory runtime for tests without Docker

pub mod config;
pub mod container;
pub mod error;
pub mod keycloak;
pub mod runtime;
pub mod testing;

pub use container::{Container, ContainerError, ContainerRequest, ReadinessState, WaitFor};
pub use keycloak::{KeycloakBuilder, KeycloakContainer};
