//! Throwaway Keycloak servers for integration tests.
//!
//! [`KeycloakBuilder`] turns Keycloak options (admin credentials, context
//! path, realm files) into a [`ContainerRequest`](crate::container::ContainerRequest)
//! for the generic [`Container`](crate::container::Container):
//!
//! | Option | Container effect |
//! |--------|------------------|
//! | admin user/password | `KC_BOOTSTRAP_ADMIN_*` and `KEYCLOAK_ADMIN*` env |
//! | context path `/auth/` | `--http-relative-path=/auth` |
//! | realm files | copied to `/opt/keycloak/data/import/`, `--import-realm` |
//! | readiness | `GET {context}realms/master` returns 200 on port 8080 |
//!
//! # Example
//!
//! ```rust,no_run
//! use keycloak_container::keycloak::{AdminApi, KeycloakBuilder};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut keycloak = KeycloakBuilder::from_env()?
//!     .with_realm_import_file("/test-realm.json")
//!     .build()?;
//! keycloak.start().await?;
//!
//! let admin = keycloak.admin_client()?;
//! let realm = admin.realm("test").await?;
//! assert_eq!(realm.realm, "test");
//! println!("Keycloak {} at {}", keycloak.version().await?, keycloak.mapped_url()?);
//!
//! keycloak.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod admin;
pub mod builder;
pub mod container;

pub use admin::{AdminApi, KeycloakAdminClient, RealmRepresentation, ServerInfo, SystemInfo};
pub use builder::{HTTP_PORT, IMPORT_DIR, KeycloakBuilder};
pub use container::KeycloakContainer;
