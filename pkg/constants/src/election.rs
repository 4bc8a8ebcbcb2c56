//! Leader election constants.

use std::time::Duration;

/// How long non-leaders wait after observing a renewal before taking over.
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(15);

/// How long the acting leader keeps retrying a renewal before stepping down.
pub const DEFAULT_RENEW_DEADLINE: Duration = Duration::from_secs(10);

/// Interval between acquire / renew attempts.
pub const DEFAULT_RETRY_PERIOD: Duration = Duration::from_secs(2);

/// Extra time past the lease duration tolerated by the liveness watchdog.
pub const WATCHDOG_THRESHOLD: Duration = Duration::from_secs(20);

/// Lock object name suffix. Full name = `<syncer-name>-LOCK_NAME_SUFFIX`.
pub const LOCK_NAME_SUFFIX: &str = "syncer-leaderelection-lock";

/// Lock object name used before the syncer name is known.
pub const DEFAULT_LOCK_OBJECT_NAME: &str = "syncer-leaderelection-lock";

/// Default syncer name.
pub const DEFAULT_SYNCER_NAME: &str = "vc";

/// Annotation that carries the election record on configmap / endpoints locks.
pub const LEADER_ANNOTATION_KEY: &str = "control-plane.alpha.kubernetes.io/leader";

/// Resource lock kind names accepted by `--leader-elect-resource-lock`.
pub const CONFIGMAPS_RESOURCE_LOCK: &str = "configmaps";
pub const ENDPOINTS_RESOURCE_LOCK: &str = "endpoints";
pub const LEASES_RESOURCE_LOCK: &str = "leases";

/// Default resource lock kind.
pub const DEFAULT_RESOURCE_LOCK: &str = CONFIGMAPS_RESOURCE_LOCK;

/// Capacity of the in-memory event ring buffer.
pub const EVENT_LOG_CAPACITY: usize = 256;
