//! mcplane - multi-cloud infrastructure control plane
//!
//! Accepts create/register/control requests for cloud resources scoped under
//! a namespace, forwards them to a cloud-abstraction driver, and keeps
//! canonical records in a hierarchical key store.

pub mod config;
pub mod control;
pub mod driver;
pub mod error;
pub mod plane;
pub mod resource;
pub mod store;
pub mod tracker;

pub use error::{Error, Result};
pub use plane::ControlPlane;

/// Version injected at compile time via MCPLANE_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("MCPLANE_VERSION") {
    Some(v) => v,
    None => "dev",
};
