use metrics::HealthCheck;
use serde::Serialize;

use crate::client_manager::{ReadinessReport, ReportsReadiness};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    execution: ReadinessReport,
    beacon: ReadinessReport,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.execution.usable() && self.beacon.usable()
    }
}

pub struct HealthReporter {
    execution: Box<dyn ReportsReadiness>,
    beacon: Box<dyn ReportsReadiness>,
}

impl HealthReporter {
    #[must_use]
    pub fn new(execution: Box<dyn ReportsReadiness>, beacon: Box<dyn ReportsReadiness>) -> Self {
        Self { execution, beacon }
    }

    #[must_use]
    pub fn generate_report(&self) -> HealthReport {
        HealthReport {
            execution: self.execution.readiness(),
            beacon: self.beacon.readiness(),
        }
    }
}

impl HealthCheck for HealthReporter {
    fn healthy(&self) -> bool {
        self.generate_report().is_healthy()
    }
}
