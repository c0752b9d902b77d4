use std::sync::Arc;

pub use prometheus;
pub use prometheus::{Registry, core::Collector};

pub type HealthChecker = Box<dyn HealthCheck>;

/// Answers whether a component can currently serve requests.
pub trait HealthCheck: Send + Sync {
    fn healthy(&self) -> bool;
}

impl<T: HealthCheck + ?Sized> HealthCheck for Arc<T> {
    fn healthy(&self) -> bool {
        (**self).healthy()
    }
}

pub trait RegistersMetrics {
    /// Registers every collector with `registry`, stopping at the first one the registry rejects
    /// (e.g. a name clash between two components).
    fn register_metrics(&self, registry: &Registry) -> prometheus::Result<()> {
        self.metrics()
            .into_iter()
            .try_for_each(|metric| registry.register(metric))
    }

    fn metrics(&self) -> Vec<Box<dyn Collector>>;
}

#[cfg(test)]
mod tests {
    use prometheus::{IntCounter, Opts};

    use super::*;

    struct TwoCounters {
        first: IntCounter,
        second: IntCounter,
    }

    impl RegistersMetrics for TwoCounters {
        fn metrics(&self) -> Vec<Box<dyn Collector>> {
            vec![Box::new(self.first.clone()), Box::new(self.second.clone())]
        }
    }

    fn counter(name: &str) -> IntCounter {
        IntCounter::with_opts(Opts::new(name, "test counter")).unwrap()
    }

    #[test]
    fn registers_all_collectors() {
        // given
        let registry = Registry::new();
        let component = TwoCounters {
            first: counter("first_total"),
            second: counter("second_total"),
        };

        // when
        component.register_metrics(&registry).unwrap();

        // then
        assert_eq!(registry.gather().len(), 2);
    }

    #[test]
    fn name_clash_is_reported_instead_of_panicking() {
        // given
        let registry = Registry::new();
        let component = TwoCounters {
            first: counter("same_total"),
            second: counter("same_total"),
        };

        // when
        let result = component.register_metrics(&registry);

        // then
        assert!(result.is_err());
    }
}
