//! The execution-layer (JSON-RPC) capability surface.

pub mod port;

/// Display name used in logs, metrics and the all-failed error.
pub const CLIENT_TYPE_NAME: &str = "Execution Client";
