//! Environment-driven defaults for Keycloak containers.
//!
//! | Variable | Default |
//! |---|---|
//! | `KEYCLOAK_IMAGE` | `quay.io/keycloak/keycloak` |
//! | `KEYCLOAK_VERSION` | `26.0` |
//! | `KEYCLOAK_ADMIN_USERNAME` | `admin` |
//! | `KEYCLOAK_ADMIN_PASSWORD` | `admin` |
//! | `KEYCLOAK_STARTUP_TIMEOUT_SECS` | `90` |
//! | `KEYCLOAK_RESOURCE_DIR` | `$CARGO_MANIFEST_DIR`, else `.` |
//! | `TESTCONTAINERS_KEEP` | `false` |

mod helpers;
mod keycloak;

pub use keycloak::{
    DEFAULT_ADMIN, DEFAULT_IMAGE, DEFAULT_STARTUP_TIMEOUT_SECS, DEFAULT_VERSION, KeycloakSettings,
};
