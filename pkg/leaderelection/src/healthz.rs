use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use crate::error::ElectionError;
use crate::leader::LeaderElector;

/// Liveness check for the election loop.
///
/// A process can stay up while its election loop is wedged. The adaptor lets
/// an external probe notice: it fails once the elector has gone longer than
/// `lease_duration + threshold` without renewing (or without reaching the
/// lock backend at all).
pub struct HealthzAdaptor {
    threshold: Duration,
    elector: OnceLock<Weak<LeaderElector>>,
}

impl HealthzAdaptor {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            elector: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        "leaderElection"
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Attach the elector to watch. Only the first call has an effect.
    pub(crate) fn set_elector(&self, elector: &Arc<LeaderElector>) {
        let _ = self.elector.set(Arc::downgrade(elector));
    }

    /// Healthy until an attached elector reports it stopped making progress.
    pub fn check(&self) -> Result<(), ElectionError> {
        match self.elector.get().and_then(Weak::upgrade) {
            Some(elector) => elector.check(self.threshold),
            None => Ok(()),
        }
    }
}
