//! Syncer component defaults.

/// Port the vn-agent listens on.
pub const DEFAULT_VN_AGENT_PORT: i32 = 10550;

/// `<namespace>/<name>` of the vn-agent service, used by `VNodeProviderService`.
pub const DEFAULT_VN_AGENT_NAMESPACED_NAME: &str = "vc-manager/vn-agent";

/// Label selector of the vn-agent pods.
pub const DEFAULT_VN_AGENT_LABEL_SELECTOR: &str = "app=vn-agent";

/// Label/annotation domains kept opaque to tenants by default.
pub const DEFAULT_OPAQUE_META_DOMAINS: &[&str] = &["kubernetes.io", "k8s.io"];

/// Metrics server port.
pub const DEFAULT_SERVER_PORT: &str = "80";
