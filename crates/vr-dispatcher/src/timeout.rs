//! Timeout policy for remote operations.

use std::time::Duration;

/// Default per-operation script timeout.
pub const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Default per-answer extension for aggregated batches.
pub const DEFAULT_AGGREGATION_EACH_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Aggregated batches never get less than this.
pub const MIN_AGGREGATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Keystore and certificate setup run key generation on the router.
pub const DEFAULT_KEYSTORE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub script: Duration,
    pub aggregation_each: Duration,
    pub aggregation_floor: Duration,
    pub keystore: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            script: DEFAULT_SCRIPT_TIMEOUT,
            aggregation_each: DEFAULT_AGGREGATION_EACH_TIMEOUT,
            aggregation_floor: MIN_AGGREGATION_TIMEOUT,
            keystore: DEFAULT_KEYSTORE_TIMEOUT,
        }
    }
}

impl TimeoutPolicy {
    /// Timeout for an aggregated batch expecting `answers` answers in total.
    ///
    /// `each + each * answers`, never below the floor.
    pub fn aggregation_timeout(&self, answers: usize) -> Duration {
        let each = self.aggregation_each.as_secs();
        let secs = each.saturating_add(each.saturating_mul(answers as u64));
        Duration::from_secs(secs).max(self.aggregation_floor)
    }
}
