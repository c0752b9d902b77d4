pub mod beacon;
pub mod client_manager;
pub mod disconnect;
pub mod execution;
pub mod gas_oracle;
mod health_reporter;
pub mod query_manager;
pub mod request;
mod sync_monitor;
pub mod transaction_manager;

pub use client_manager::{
    ClientManager, ClientRole, ReadinessReport, ReportsReadiness, port::Clock,
};
pub use health_reporter::{HealthReport, HealthReporter};
pub use query_manager::QueryManager;
pub use sync_monitor::SyncMonitor;
pub use transaction_manager::TransactionManager;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Disconnected: {0}")]
    Disconnected(String),
    #[error("Timeout: {0}")]
    Timeout(String),
    #[error("request cancelled")]
    Cancelled,
    #[error("{0}")]
    Reverted(String),
    #[error("all {client_type}s failed")]
    AllClientsFailed { client_type: String },
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Prefixes the message while keeping the variant, so callers can still
    /// tell a revert from an unreachable endpoint.
    pub fn with_context(self, context: impl std::fmt::Display) -> Self {
        match self {
            Self::Disconnected(msg) => Self::Disconnected(format!("{context}: {msg}")),
            Self::Timeout(msg) => Self::Timeout(format!("{context}: {msg}")),
            Self::Reverted(msg) => Self::Reverted(format!("{context}: {msg}")),
            Self::Other(msg) => Self::Other(format!("{context}: {msg}")),
            Self::Cancelled | Self::AllClientsFailed { .. } => self,
        }
    }

    /// True for failures caused by reaching no endpoint at all, as opposed to an
    /// endpoint answering with an error.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            Self::Disconnected(_)
                | Self::AllClientsFailed { .. }
                | Self::Timeout(_)
                | Self::Cancelled
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[async_trait::async_trait]
pub trait Runner: Send + Sync {
    async fn run(&mut self) -> Result<()>;
}
