//! Per-request deadlines and cancellation.
//!
//! A caller installs a [`RequestScope`] around any work that ends up calling an
//! upstream client. Bindings wrap every outbound request in [`guarded`], which
//! honours the scope's deadline when one is set and otherwise applies the
//! binding's timeout tier for that method.

use std::{future::Future, time::Duration};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

pub const DEFAULT_FAST_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_SLOW_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub fast: Duration,
    pub slow: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            fast: DEFAULT_FAST_TIMEOUT,
            slow: DEFAULT_SLOW_TIMEOUT,
        }
    }
}

tokio::task_local! {
    static SCOPE: RequestScope;
}

#[derive(Debug, Clone, Default)]
pub struct RequestScope {
    deadline: Option<Instant>,
    cancel: Option<CancellationToken>,
}

impl RequestScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Runs `fut` with this scope installed. Scopes do not nest: the innermost one wins.
    pub async fn run<F: Future>(self, fut: F) -> F::Output {
        SCOPE.scope(self, fut).await
    }

    pub fn current() -> Option<Self> {
        SCOPE.try_with(Clone::clone).ok()
    }
}

pub async fn guarded<F, T>(default_timeout: Duration, method: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let scope = RequestScope::current().unwrap_or_default();
    let deadline = scope
        .deadline
        .unwrap_or_else(|| Instant::now() + default_timeout);

    let cancelled = async {
        match &scope.cancel {
            Some(token) => token.cancelled().await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        _ = cancelled => Err(Error::Cancelled),
        outcome = tokio::time::timeout_at(deadline, fut) => match outcome {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!("{method} exceeded its deadline"))),
        },
    }
}
