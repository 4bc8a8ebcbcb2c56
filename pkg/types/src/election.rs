use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The state a resource lock stores about the current leader.
///
/// Serialized with Kubernetes field names so that configmap / endpoints locks
/// can keep it in the `control-plane.alpha.kubernetes.io/leader` annotation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderElectionRecord {
    /// Identity of the current holder. Empty when the lock was released.
    #[serde(default)]
    pub holder_identity: String,
    /// How long the holder's claim is valid after `renew_time`.
    #[serde(default)]
    pub lease_duration_seconds: i64,
    /// When the current holder first acquired the lock.
    #[serde(default)]
    pub acquire_time: Option<DateTime<Utc>>,
    /// When the holder last renewed.
    #[serde(default)]
    pub renew_time: Option<DateTime<Utc>>,
    /// How many times the lock changed hands.
    #[serde(default)]
    pub leader_transitions: i64,
}

impl LeaderElectionRecord {
    /// True when `identity` holds the lock according to this record.
    pub fn is_held_by(&self, identity: &str) -> bool {
        !self.holder_identity.is_empty() && self.holder_identity == identity
    }

    /// Check if the holder's claim ran out, measured from its own renew time.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.renew_time {
            Some(renewed) => now > renewed + chrono::Duration::seconds(self.lease_duration_seconds),
            None => true,
        }
    }
}
