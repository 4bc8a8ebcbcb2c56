//! API client constants.

use std::time::Duration;

/// User agent sent by every syncer client.
pub const RESOURCE_SYNCER_USER_AGENT: &str = "resource-syncer";

/// Suffix appended to the user agent of the leader election client.
pub const LEADER_ELECTION_USER_AGENT_SUFFIX: &str = "-leader-election";

/// Request timeout used when neither the flag nor the kubeconfig sets one.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client-side queries per second when unset.
pub const DEFAULT_CLIENT_QPS: f32 = 10000.0;

/// Client-side burst when unset.
pub const DEFAULT_CLIENT_BURST: i32 = 20000;

/// Default content type for API requests.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Environment variable holding the in-cluster API server host.
pub const SERVICE_HOST_ENV: &str = "KUBERNETES_SERVICE_HOST";

/// Environment variable holding the in-cluster API server port.
pub const SERVICE_PORT_ENV: &str = "KUBERNETES_SERVICE_PORT";
