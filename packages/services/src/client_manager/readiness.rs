use std::{
    sync::atomic::{AtomicBool, AtomicI64, Ordering},
    time::Duration,
};

use chrono::{DateTime, Utc};

const NO_FAILURE: i64 = i64::MIN;

/// Health flag and last failure time of one endpoint role.
///
/// Both fields are independent atomics. A reader may briefly observe a fresh
/// failure time next to a stale flag; the next recheck settles it.
#[derive(Debug)]
pub struct ReadinessState {
    ready: AtomicBool,
    last_failure_millis: AtomicI64,
}

impl Default for ReadinessState {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessState {
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(true),
            last_failure_millis: AtomicI64::new(NO_FAILURE),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn last_failure_time(&self) -> Option<DateTime<Utc>> {
        match self.last_failure_millis.load(Ordering::Acquire) {
            NO_FAILURE => None,
            millis => DateTime::from_timestamp_millis(millis),
        }
    }

    pub fn mark_not_ready(&self, failed_at: DateTime<Utc>) {
        self.last_failure_millis
            .store(failed_at.timestamp_millis(), Ordering::Release);
        self.ready.store(false, Ordering::Release);
    }

    /// Returns `true` if this call flipped the role from not-ready to ready.
    pub fn mark_ready(&self) -> bool {
        !self.ready.swap(true, Ordering::AcqRel)
    }

    /// Optimistically flips a not-ready role back to ready once `reconnect_delay`
    /// has passed since its last failure. Only one concurrent caller wins the flip.
    pub fn recheck(&self, now: DateTime<Utc>, reconnect_delay: Duration) -> bool {
        if self.is_ready() {
            return false;
        }

        let delay_elapsed = match self.last_failure_time() {
            Some(failed_at) => now
                .signed_duration_since(failed_at)
                .to_std()
                .is_ok_and(|elapsed| elapsed >= reconnect_delay),
            None => true,
        };

        delay_elapsed
            && self
                .ready
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }
}
