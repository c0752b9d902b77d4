//! Primary/fallback failover for any upstream client.
//!
//! [`ClientManager`] owns a primary client, an optional fallback and the
//! readiness of each. Every call is expressed as a closure over a client handle
//! and handed to [`ClientManager::dispatch`], which picks an endpoint, runs the
//! closure and reacts to disconnects. Recovery is lazy: a role that went down is
//! offered real traffic again once the reconnect delay has passed.

mod metrics;
pub mod port;
mod readiness;

use std::{fmt, future::Future, sync::Arc, time::Duration};

use ::metrics::{HealthCheck, RegistersMetrics, prometheus::core::Collector};
use serde::Serialize;
use tracing::{debug, info, warn};

use self::{metrics::Metrics, port::Clock};
pub use self::readiness::ReadinessState;
use crate::{Error, Result, disconnect::is_disconnected};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientRole {
    Primary,
    Fallback,
}

impl ClientRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for ClientRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadinessReport {
    pub client_type: String,
    pub primary_ready: bool,
    pub fallback_enabled: bool,
    pub fallback_ready: bool,
}

impl ReadinessReport {
    /// At least one endpoint is believed reachable.
    pub fn usable(&self) -> bool {
        self.primary_ready || (self.fallback_enabled && self.fallback_ready)
    }
}

pub trait ReportsReadiness: Send + Sync {
    fn readiness(&self) -> ReadinessReport;
}

pub struct ClientManager<C, Clk> {
    primary: Arc<C>,
    fallback: Option<Arc<C>>,
    primary_state: Arc<ReadinessState>,
    fallback_state: Arc<ReadinessState>,
    reconnect_delay: Duration,
    client_type_name: Arc<str>,
    clock: Clk,
    metrics: Metrics,
}

impl<C, Clk: Clone> Clone for ClientManager<C, Clk> {
    fn clone(&self) -> Self {
        Self {
            primary: Arc::clone(&self.primary),
            fallback: self.fallback.clone(),
            primary_state: Arc::clone(&self.primary_state),
            fallback_state: Arc::clone(&self.fallback_state),
            reconnect_delay: self.reconnect_delay,
            client_type_name: Arc::clone(&self.client_type_name),
            clock: self.clock.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<C, Clk> ClientManager<C, Clk> {
    pub fn new(
        client_type_name: impl Into<String>,
        primary: C,
        fallback: Option<C>,
        reconnect_delay: Duration,
        clock: Clk,
    ) -> Self {
        let client_type_name: String = client_type_name.into();
        let metrics = Metrics::new(&client_type_name);

        metrics.set_ready(ClientRole::Primary, true);
        if fallback.is_some() {
            metrics.set_ready(ClientRole::Fallback, true);
        }

        Self {
            primary: Arc::new(primary),
            fallback: fallback.map(Arc::new),
            primary_state: Arc::new(ReadinessState::new()),
            fallback_state: Arc::new(ReadinessState::new()),
            reconnect_delay,
            client_type_name: client_type_name.into(),
            clock,
            metrics,
        }
    }

    pub fn primary_client(&self) -> &Arc<C> {
        &self.primary
    }

    pub fn fallback_client(&self) -> Option<&Arc<C>> {
        self.fallback.as_ref()
    }

    pub fn is_primary_ready(&self) -> bool {
        self.primary_state.is_ready()
    }

    pub fn is_fallback_ready(&self) -> bool {
        self.is_fallback_enabled() && self.fallback_state.is_ready()
    }

    pub fn is_fallback_enabled(&self) -> bool {
        self.fallback.is_some()
    }

    pub fn client_type_name(&self) -> &str {
        &self.client_type_name
    }

    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    fn state(&self, role: ClientRole) -> &ReadinessState {
        match role {
            ClientRole::Primary => &self.primary_state,
            ClientRole::Fallback => &self.fallback_state,
        }
    }

    fn mark_recovered(&self, role: ClientRole) {
        if self.state(role).mark_ready() {
            info!("{} {role} client is ready again", self.client_type_name);
        }
        self.metrics.set_ready(role, true);
    }
}

impl<C, Clk> ClientManager<C, Clk>
where
    C: Send + Sync,
    Clk: Clock + Send + Sync,
{
    /// Offers every role whose reconnect delay has passed another chance. This
    /// does not probe the endpoint; the next dispatched call does.
    pub fn recheck_fail_times(&self) {
        self.recheck(ClientRole::Primary);
        if self.is_fallback_enabled() {
            self.recheck(ClientRole::Fallback);
        }
    }

    fn recheck(&self, role: ClientRole) {
        if self
            .state(role)
            .recheck(self.clock.now(), self.reconnect_delay)
        {
            info!(
                "{} {role} client reconnect delay elapsed, marking it ready for the next call",
                self.client_type_name
            );
            self.metrics.set_ready(role, true);
        }
    }

    fn mark_disconnected(&self, role: ClientRole, error: &Error) {
        self.state(role).mark_not_ready(self.clock.now());
        self.metrics.record_disconnect(role);

        match role {
            ClientRole::Primary => warn!(
                "Primary {} disconnected ({error}), using fallback",
                self.client_type_name
            ),
            ClientRole::Fallback => warn!(
                "Fallback {} disconnected ({error})",
                self.client_type_name
            ),
        }
    }

    /// Runs `operation` against whichever endpoint is currently believed healthy.
    ///
    /// Without a fallback the primary result is returned untouched. With one, a
    /// disconnect on the primary marks it down and re-enters once, which lands on
    /// the fallback (or on a forced primary attempt when the fallback is down
    /// too). A disconnect on the fallback ends the call with
    /// [`Error::AllClientsFailed`]. Any other error is returned as is.
    ///
    /// Calls with no value or several values use `T = ()` or a tuple.
    pub async fn dispatch<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn(Arc<C>) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let Some(fallback) = &self.fallback else {
            return operation(Arc::clone(&self.primary)).await;
        };

        let mut primary_disconnected = false;
        loop {
            if !primary_disconnected {
                self.recheck(ClientRole::Primary);
            }
            self.recheck(ClientRole::Fallback);

            if !primary_disconnected && self.primary_state.is_ready() {
                debug!("Dispatching to primary {}", self.client_type_name);
                match operation(Arc::clone(&self.primary)).await {
                    Err(error) if is_disconnected(&error) => {
                        self.mark_disconnected(ClientRole::Primary, &error);
                        primary_disconnected = true;
                        continue;
                    }
                    result => return result,
                }
            }

            if self.fallback_state.is_ready() {
                debug!("Dispatching to fallback {}", self.client_type_name);
                return match operation(Arc::clone(fallback)).await {
                    Err(error) if is_disconnected(&error) => {
                        self.mark_disconnected(ClientRole::Fallback, &error);
                        Err(Error::AllClientsFailed {
                            client_type: self.client_type_name.to_string(),
                        })
                    }
                    result => result,
                };
            }

            warn!(
                "No {}s are ready, forcing use of primary",
                self.client_type_name
            );
            let result = operation(Arc::clone(&self.primary)).await;
            // Any answer that is not a disconnect proves the primary reachable.
            if !matches!(&result, Err(error) if is_disconnected(error)) {
                self.mark_recovered(ClientRole::Primary);
            }

            return result;
        }
    }
}

impl<C, Clk> ReportsReadiness for ClientManager<C, Clk>
where
    C: Send + Sync,
    Clk: Send + Sync,
{
    fn readiness(&self) -> ReadinessReport {
        ReadinessReport {
            client_type: self.client_type_name.to_string(),
            primary_ready: self.is_primary_ready(),
            fallback_enabled: self.is_fallback_enabled(),
            fallback_ready: self.is_fallback_ready(),
        }
    }
}

impl<C, Clk> HealthCheck for ClientManager<C, Clk>
where
    C: Send + Sync,
    Clk: Send + Sync,
{
    fn healthy(&self) -> bool {
        self.readiness().usable()
    }
}

impl<C, Clk> RegistersMetrics for ClientManager<C, Clk> {
    fn metrics(&self) -> Vec<Box<dyn Collector>> {
        self.metrics.metrics()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use ::metrics::prometheus::Registry;
    use chrono::{DateTime, Utc};
    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Debug, Clone, Copy)]
    enum Outcome {
        Value(u64),
        Disconnect,
        AppError,
    }

    struct FakeClient {
        outcome: Mutex<Outcome>,
        calls: AtomicUsize,
    }

    impl FakeClient {
        fn new(outcome: Outcome) -> Self {
            Self {
                outcome: Mutex::new(outcome),
                calls: AtomicUsize::new(0),
            }
        }

        fn set(&self, outcome: Outcome) {
            *self.outcome.lock().unwrap() = outcome;
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        async fn fetch(&self) -> Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;

            let outcome = *self.outcome.lock().unwrap();
            match outcome {
                Outcome::Value(value) => Ok(value),
                Outcome::Disconnect => Err(Error::Disconnected("connection refused".into())),
                Outcome::AppError => Err(Error::Other("execution reverted".into())),
            }
        }
    }

    #[derive(Clone)]
    struct FakeClock(Arc<Mutex<DateTime<Utc>>>);

    impl FakeClock {
        fn new() -> Self {
            Self(Arc::new(Mutex::new(DateTime::<Utc>::UNIX_EPOCH)))
        }

        fn advance(&self, by: Duration) {
            let mut now = self.0.lock().unwrap();
            *now += chrono::Duration::from_std(by).unwrap();
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    const DELAY: Duration = Duration::from_secs(60);

    fn single(primary: Outcome) -> ClientManager<FakeClient, FakeClock> {
        ClientManager::new(
            "Execution Client",
            FakeClient::new(primary),
            None,
            DELAY,
            FakeClock::new(),
        )
    }

    fn pair(
        primary: Outcome,
        fallback: Outcome,
        reconnect_delay: Duration,
    ) -> (ClientManager<FakeClient, FakeClock>, FakeClock) {
        let clock = FakeClock::new();
        let manager = ClientManager::new(
            "Execution Client",
            FakeClient::new(primary),
            Some(FakeClient::new(fallback)),
            reconnect_delay,
            clock.clone(),
        );

        (manager, clock)
    }

    async fn fetch(manager: &ClientManager<FakeClient, FakeClock>) -> Result<u64> {
        manager
            .dispatch(|client| async move { client.fetch().await })
            .await
    }

    fn primary_calls(manager: &ClientManager<FakeClient, FakeClock>) -> usize {
        manager.primary_client().calls()
    }

    fn fallback_calls(manager: &ClientManager<FakeClient, FakeClock>) -> usize {
        manager.fallback_client().unwrap().calls()
    }

    #[tokio::test]
    async fn without_fallback_returns_primary_result_untouched() {
        // given
        let manager = single(Outcome::Value(7));

        // when
        let result = fetch(&manager).await;

        // then
        assert_eq!(result, Ok(7));
        assert!(manager.is_primary_ready());
        assert!(!manager.is_fallback_enabled());
        assert!(!manager.is_fallback_ready());
    }

    #[tokio::test]
    async fn without_fallback_a_disconnect_is_returned_verbatim() {
        // given
        let manager = single(Outcome::Disconnect);

        // when
        let result = fetch(&manager).await;

        // then
        assert_eq!(
            result,
            Err(Error::Disconnected("connection refused".into()))
        );
        assert_eq!(primary_calls(&manager), 1);
        assert!(manager.is_primary_ready());
    }

    #[tokio::test]
    async fn primary_disconnect_fails_over_to_fallback() {
        // given
        let (manager, _) = pair(Outcome::Disconnect, Outcome::Value(11), DELAY);

        // when
        let result = fetch(&manager).await;

        // then
        assert_eq!(result, Ok(11));
        assert!(!manager.is_primary_ready());
        assert!(manager.is_fallback_ready());
        assert_eq!(primary_calls(&manager), 1);
        assert_eq!(fallback_calls(&manager), 1);
    }

    #[tokio::test]
    async fn application_error_on_primary_never_reaches_fallback() {
        // given
        let (manager, _) = pair(Outcome::AppError, Outcome::Value(11), DELAY);

        // when
        let result = fetch(&manager).await;

        // then
        assert_eq!(result, Err(Error::Other("execution reverted".into())));
        assert!(manager.is_primary_ready());
        assert_eq!(fallback_calls(&manager), 0);
    }

    #[tokio::test]
    async fn cancellation_on_primary_is_not_a_disconnect() {
        let (manager, _) = pair(Outcome::Value(1), Outcome::Value(2), DELAY);

        let result: Result<u64> = manager
            .dispatch(|_| async { Err(Error::Cancelled) })
            .await;

        assert_eq!(result, Err(Error::Cancelled));
        assert!(manager.is_primary_ready());
        assert_eq!(fallback_calls(&manager), 0);
    }

    #[tokio::test]
    async fn both_disconnected_reports_all_clients_failed() {
        // given
        let (manager, _) = pair(Outcome::Disconnect, Outcome::Disconnect, DELAY);

        // when
        let result = fetch(&manager).await;

        // then
        assert_eq!(
            result,
            Err(Error::AllClientsFailed {
                client_type: "Execution Client".into()
            })
        );
        assert_eq!(
            result.unwrap_err().to_string(),
            "all Execution Clients failed"
        );
        assert!(!manager.is_primary_ready());
        assert!(!manager.is_fallback_ready());
    }

    #[tokio::test]
    async fn application_error_on_fallback_is_returned_verbatim() {
        let (manager, _) = pair(Outcome::Disconnect, Outcome::AppError, DELAY);

        let result = fetch(&manager).await;

        assert_eq!(result, Err(Error::Other("execution reverted".into())));
        assert!(manager.is_fallback_ready());
    }

    #[tokio::test]
    async fn primary_is_not_reprobed_before_the_reconnect_delay() {
        // given
        let (manager, clock) = pair(Outcome::Disconnect, Outcome::Value(11), DELAY);
        fetch(&manager).await.unwrap();
        manager.primary_client().set(Outcome::Value(7));

        // when
        clock.advance(DELAY - Duration::from_millis(1));
        let result = fetch(&manager).await;

        // then
        assert_eq!(result, Ok(11));
        assert_eq!(primary_calls(&manager), 1);
        assert!(!manager.is_primary_ready());
    }

    #[tokio::test]
    async fn primary_gets_exactly_one_probe_after_the_reconnect_delay() {
        // given
        let (manager, clock) = pair(Outcome::Disconnect, Outcome::Value(11), DELAY);
        fetch(&manager).await.unwrap();
        manager.primary_client().set(Outcome::Value(7));

        // when
        clock.advance(DELAY);
        let result = fetch(&manager).await;

        // then
        assert_eq!(result, Ok(7));
        assert_eq!(primary_calls(&manager), 2);
        assert!(manager.is_primary_ready());
    }

    #[tokio::test]
    async fn fallback_is_offered_again_after_the_reconnect_delay_while_primary_stays_down() {
        // given
        let (manager, clock) = pair(Outcome::Disconnect, Outcome::Disconnect, DELAY);
        assert_eq!(
            fetch(&manager).await,
            Err(Error::AllClientsFailed {
                client_type: "Execution Client".into()
            })
        );
        manager.fallback_client().unwrap().set(Outcome::Value(11));

        // when
        clock.advance(DELAY - Duration::from_millis(1));
        let before_delay = fetch(&manager).await;
        clock.advance(Duration::from_millis(1));
        let after_delay = fetch(&manager).await;

        // then
        assert_eq!(
            before_delay,
            Err(Error::Disconnected("connection refused".into()))
        );
        assert_eq!(after_delay, Ok(11));
        assert_eq!(fallback_calls(&manager), 2);
        assert!(manager.is_fallback_ready());
        assert!(!manager.is_primary_ready());
    }

    #[tokio::test]
    async fn failed_probe_marks_primary_down_with_a_fresh_timestamp() {
        // given
        let (manager, clock) = pair(Outcome::Disconnect, Outcome::Value(11), DELAY);
        fetch(&manager).await.unwrap();

        // when
        clock.advance(DELAY);
        let probe = fetch(&manager).await;
        clock.advance(Duration::from_secs(30));
        let after_half_delay = fetch(&manager).await;

        // then
        assert_eq!(probe, Ok(11));
        assert_eq!(after_half_delay, Ok(11));
        assert_eq!(primary_calls(&manager), 2);
        assert_eq!(
            manager.primary_state.last_failure_time(),
            Some(DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::seconds(60))
        );
    }

    #[tokio::test]
    async fn neither_ready_forces_primary_and_success_marks_it_ready() {
        // given
        let (manager, _) = pair(Outcome::Disconnect, Outcome::Disconnect, DELAY);
        let _ = fetch(&manager).await;
        manager.primary_client().set(Outcome::Value(3));

        // when
        let result = fetch(&manager).await;

        // then
        assert_eq!(result, Ok(3));
        assert!(manager.is_primary_ready());
        assert!(!manager.is_fallback_ready());
        assert_eq!(fallback_calls(&manager), 1);
    }

    #[tokio::test]
    async fn forced_primary_application_error_still_marks_it_ready() {
        // given
        let (manager, _) = pair(Outcome::Disconnect, Outcome::Disconnect, DELAY);
        let _ = fetch(&manager).await;
        manager.primary_client().set(Outcome::AppError);

        // when
        let result = fetch(&manager).await;

        // then
        assert_eq!(result, Err(Error::Other("execution reverted".into())));
        assert!(manager.is_primary_ready());
        assert!(!manager.is_fallback_ready());
    }

    #[tokio::test]
    async fn forced_primary_failure_is_returned_raw() {
        // given
        let (manager, _) = pair(Outcome::Disconnect, Outcome::Disconnect, DELAY);
        let _ = fetch(&manager).await;

        // when
        let result = fetch(&manager).await;

        // then
        assert_eq!(
            result,
            Err(Error::Disconnected("connection refused".into()))
        );
        assert_eq!(primary_calls(&manager), 2);
        assert_eq!(fallback_calls(&manager), 1);
        assert!(!manager.is_primary_ready());
    }

    #[tokio::test]
    async fn zero_reconnect_delay_reenters_at_most_once() {
        // given
        let (manager, _) = pair(Outcome::Disconnect, Outcome::Value(11), Duration::ZERO);

        // when
        let result = fetch(&manager).await;

        // then
        assert_eq!(result, Ok(11));
        assert_eq!(primary_calls(&manager), 1);
        assert_eq!(fallback_calls(&manager), 1);
    }

    #[tokio::test]
    async fn every_arity_shares_the_failover_path() {
        // given
        let (manager, _) = pair(Outcome::Disconnect, Outcome::Value(5), DELAY);

        // when
        let nothing: Result<()> = manager
            .dispatch(|client| async move { client.fetch().await.map(|_| ()) })
            .await;
        let pair_result: Result<(u64, bool)> = manager
            .dispatch(|client| async move {
                let value = client.fetch().await?;
                Ok((value, value % 2 == 1))
            })
            .await;

        // then
        assert_eq!(nothing, Ok(()));
        assert_eq!(pair_result, Ok((5, true)));
        assert_eq!(primary_calls(&manager), 1);
        assert_eq!(fallback_calls(&manager), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_dispatches_all_succeed_via_fallback() {
        // given
        let (manager, _) = pair(Outcome::Disconnect, Outcome::Value(9), DELAY);

        // when
        let handles: Vec<_> = (0..64)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { fetch(&manager).await })
            })
            .collect();

        // then
        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(9));
        }
        assert!(!manager.is_primary_ready());
        assert!(manager.is_fallback_ready());
    }

    #[tokio::test]
    async fn readiness_report_and_health_follow_state() {
        // given
        let (manager, _) = pair(Outcome::Disconnect, Outcome::Disconnect, DELAY);
        assert!(manager.healthy());

        // when
        let _ = fetch(&manager).await;

        // then
        assert_eq!(
            manager.readiness(),
            ReadinessReport {
                client_type: "Execution Client".into(),
                primary_ready: false,
                fallback_enabled: true,
                fallback_ready: false,
            }
        );
        assert!(!manager.healthy());
    }

    #[tokio::test]
    async fn disconnects_are_counted_per_role() {
        // given
        let (manager, _) = pair(Outcome::Disconnect, Outcome::Value(1), DELAY);
        let registry = Registry::new();
        manager.register_metrics(&registry).unwrap();

        // when
        fetch(&manager).await.unwrap();

        // then
        let families = registry.gather();
        let disconnects = families
            .iter()
            .find(|family| family.get_name() == "upstream_disconnects_total")
            .unwrap();
        let primary = disconnects
            .get_metric()
            .iter()
            .find(|metric| {
                metric
                    .get_label()
                    .iter()
                    .any(|label| label.get_name() == "role" && label.get_value() == "primary")
            })
            .unwrap();
        assert_eq!(primary.get_counter().get_value(), 1.0);
    }
}
