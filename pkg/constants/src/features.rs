//! Feature gate names known to the syncer.

/// Allow one syncer to serve a pool of super clusters.
pub const SUPER_CLUSTER_POOLING: &str = "SuperClusterPooling";

/// Sync services into the super cluster network.
pub const SUPER_CLUSTER_SERVICE_NETWORK: &str = "SuperClusterServiceNetwork";

/// Resolve vn-agent through a service instead of the pod IP.
pub const VNODE_PROVIDER_SERVICE: &str = "VNodeProviderService";

/// Every known gate with its default value.
pub const DEFAULT_FEATURE_GATES: &[(&str, bool)] = &[
    (SUPER_CLUSTER_POOLING, false),
    (SUPER_CLUSTER_SERVICE_NETWORK, false),
    (VNODE_PROVIDER_SERVICE, false),
];
