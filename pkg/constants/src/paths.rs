//! Filesystem path constants.

// ─── Syncer ───────────────────────────────────────────────────────────────

/// Default config file path for the syncer.
pub const DEFAULT_SYNCER_CONFIG: &str = "/etc/vc-syncer/config.yaml";

// ─── In-cluster service account ───────────────────────────────────────────

/// Namespace of the pod, only present when running in-cluster.
pub const SERVICE_ACCOUNT_NAMESPACE_FILE: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Bearer token of the pod's service account.
pub const SERVICE_ACCOUNT_TOKEN_FILE: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// CA bundle of the in-cluster API server.
pub const SERVICE_ACCOUNT_CA_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";
