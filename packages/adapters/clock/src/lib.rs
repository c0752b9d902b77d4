use chrono::{DateTime, Utc};

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl services::Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(any(test, feature = "test-helpers"))]
mod test_helpers {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicI64, Ordering},
        },
        time::Duration,
    };

    use chrono::{DateTime, Utc};

    /// Shared, manually advanced clock. Clones observe the same time.
    #[derive(Debug, Default, Clone)]
    pub struct TestClock {
        epoch_millis: Arc<AtomicI64>,
    }

    impl TestClock {
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                epoch_millis: Arc::new(AtomicI64::new(time.timestamp_millis())),
            }
        }

        pub fn now(&self) -> DateTime<Utc> {
            DateTime::<Utc>::from_timestamp_millis(self.epoch_millis.load(Ordering::Relaxed))
                .expect("DateTime<Utc> to be in range")
        }

        pub fn advance_time(&self, adv: Duration) {
            let new_time = self.now() + adv;
            self.set_time(new_time);
        }

        pub fn set_time(&self, new_time: DateTime<Utc>) {
            self.epoch_millis
                .store(new_time.timestamp_millis(), Ordering::Relaxed)
        }
    }

    impl services::Clock for TestClock {
        fn now(&self) -> DateTime<Utc> {
            self.now()
        }
    }
}

#[cfg(any(test, feature = "test-helpers"))]
pub use test_helpers::TestClock;
