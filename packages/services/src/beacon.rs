//! The consensus-layer (Beacon API) capability surface.

pub mod port;
pub mod types;

/// Display name used in logs, metrics and the all-failed error.
pub const CLIENT_TYPE_NAME: &str = "Beacon Node";
