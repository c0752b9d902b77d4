use ::metrics::{
    RegistersMetrics,
    prometheus::{IntCounterVec, IntGaugeVec, Opts, core::Collector},
};

use super::ClientRole;

#[derive(Clone)]
pub struct Metrics {
    pub upstream_disconnects: IntCounterVec,
    pub upstream_client_ready: IntGaugeVec,
}

impl RegistersMetrics for Metrics {
    fn metrics(&self) -> Vec<Box<dyn Collector>> {
        vec![
            Box::new(self.upstream_disconnects.clone()),
            Box::new(self.upstream_client_ready.clone()),
        ]
    }
}

impl Metrics {
    pub fn new(client_type: &str) -> Self {
        let upstream_disconnects = IntCounterVec::new(
            Opts::new(
                "upstream_disconnects_total",
                "Number of calls that found an upstream client disconnected.",
            )
            .const_label("client_type", client_type),
            &["role"],
        )
        .expect("upstream_disconnects_total metric to be correctly configured");

        let upstream_client_ready = IntGaugeVec::new(
            Opts::new(
                "upstream_client_ready",
                "Whether an upstream client is currently believed reachable (1) or not (0).",
            )
            .const_label("client_type", client_type),
            &["role"],
        )
        .expect("upstream_client_ready metric to be correctly configured");

        Self {
            upstream_disconnects,
            upstream_client_ready,
        }
    }

    pub fn record_disconnect(&self, role: ClientRole) {
        self.upstream_disconnects
            .with_label_values(&[role.as_str()])
            .inc();
        self.set_ready(role, false);
    }

    pub fn set_ready(&self, role: ClientRole, ready: bool) {
        self.upstream_client_ready
            .with_label_values(&[role.as_str()])
            .set(i64::from(ready));
    }
}
