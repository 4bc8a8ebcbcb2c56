use pkg_constants::election::{
    DEFAULT_LEASE_DURATION, DEFAULT_LOCK_OBJECT_NAME, DEFAULT_RENEW_DEADLINE,
    DEFAULT_RESOURCE_LOCK, DEFAULT_RETRY_PERIOD, WATCHDOG_THRESHOLD,
};
use pkg_types::duration::format_duration;
use std::time::Duration;

use crate::error::ElectionError;

/// Election timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElectionPolicy {
    /// How long a non-leader waits after the last observed renewal before taking over.
    pub lease_duration: Duration,
    /// How long the leader keeps retrying a renewal before stepping down.
    pub renew_deadline: Duration,
    /// Pause between acquire / renew attempts.
    pub retry_period: Duration,
    /// Slack past `lease_duration` the liveness watchdog tolerates.
    pub watchdog_threshold: Duration,
}

impl Default for ElectionPolicy {
    fn default() -> Self {
        Self {
            lease_duration: DEFAULT_LEASE_DURATION,
            renew_deadline: DEFAULT_RENEW_DEADLINE,
            retry_period: DEFAULT_RETRY_PERIOD,
            watchdog_threshold: WATCHDOG_THRESHOLD,
        }
    }
}

impl ElectionPolicy {
    /// Require `0 < retry_period < renew_deadline < lease_duration`.
    pub fn validate(&self) -> Result<(), ElectionError> {
        if self.retry_period.is_zero() {
            return Err(ElectionError::InvalidPolicy(
                "retry period must be greater than zero".to_string(),
            ));
        }
        if self.renew_deadline <= self.retry_period {
            return Err(ElectionError::InvalidPolicy(format!(
                "renew deadline ({}) must be greater than retry period ({})",
                format_duration(self.renew_deadline),
                format_duration(self.retry_period)
            )));
        }
        if self.lease_duration <= self.renew_deadline {
            return Err(ElectionError::InvalidPolicy(format!(
                "lease duration ({}) must be greater than renew deadline ({})",
                format_duration(self.lease_duration),
                format_duration(self.renew_deadline)
            )));
        }
        Ok(())
    }
}

/// User-facing leader election settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderElectionOptions {
    /// Run an election before doing any work.
    pub leader_elect: bool,
    pub lease_duration: Duration,
    pub renew_deadline: Duration,
    pub retry_period: Duration,
    /// Lock backend kind: `configmaps`, `endpoints` or `leases`.
    pub resource_lock: String,
    /// Namespace of the lock object; discovered in-cluster when empty.
    pub lock_object_namespace: String,
    /// Deprecated: the lock name is always derived from the syncer name.
    pub lock_object_name: String,
}

impl Default for LeaderElectionOptions {
    fn default() -> Self {
        Self {
            leader_elect: true,
            lease_duration: DEFAULT_LEASE_DURATION,
            renew_deadline: DEFAULT_RENEW_DEADLINE,
            retry_period: DEFAULT_RETRY_PERIOD,
            resource_lock: DEFAULT_RESOURCE_LOCK.to_string(),
            lock_object_namespace: String::new(),
            lock_object_name: DEFAULT_LOCK_OBJECT_NAME.to_string(),
        }
    }
}

impl LeaderElectionOptions {
    pub fn policy(&self) -> ElectionPolicy {
        ElectionPolicy {
            lease_duration: self.lease_duration,
            renew_deadline: self.renew_deadline,
            retry_period: self.retry_period,
            watchdog_threshold: WATCHDOG_THRESHOLD,
        }
    }
}
