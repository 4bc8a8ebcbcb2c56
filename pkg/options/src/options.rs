use pkg_client::kube::KubeClient;
use pkg_client::{
    ConfigLoader, DefaultLoader, EndpointSpec, ObjectApi, Topology, TopologySpec,
    resolve_topology,
};
use pkg_constants::client::DEFAULT_CONTENT_TYPE;
use pkg_constants::election::{DEFAULT_SYNCER_NAME, EVENT_LOG_CAPACITY};
use pkg_constants::features::DEFAULT_FEATURE_GATES;
use pkg_constants::paths::SERVICE_ACCOUNT_NAMESPACE_FILE;
use pkg_constants::syncer::{
    DEFAULT_OPAQUE_META_DOMAINS, DEFAULT_SERVER_PORT, DEFAULT_VN_AGENT_LABEL_SELECTOR,
    DEFAULT_VN_AGENT_NAMESPACED_NAME, DEFAULT_VN_AGENT_PORT,
};
use pkg_featuregate::FeatureGate;
use pkg_leaderelection::{
    EventBroadcaster, HostnameIdentity, IdentityGenerator, LeaderElectionConfig,
    LeaderElectionOptions, leader_election_client, make_leader_election_config,
};
use pkg_types::validate::validate_name;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::error::OptionsError;

/// How to reach one API server.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConnection {
    /// Kubeconfig path; empty means none.
    pub kubeconfig: String,
    pub accept_content_types: String,
    /// Zero picks the syncer default.
    pub qps: f32,
    /// Zero picks the syncer default.
    pub burst: i32,
}

impl Default for ClientConnection {
    fn default() -> Self {
        Self {
            kubeconfig: String::new(),
            accept_content_types: DEFAULT_CONTENT_TYPE.to_string(),
            qps: 0.0,
            burst: 0,
        }
    }
}

impl ClientConnection {
    fn endpoint(&self, address: &str, timeout: &str) -> EndpointSpec {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        EndpointSpec {
            kubeconfig: non_empty(&self.kubeconfig).map(PathBuf::from),
            address_override: non_empty(address),
            timeout: non_empty(timeout),
            content_type: self.accept_content_types.clone(),
            qps: self.qps,
            burst: self.burst,
        }
    }
}

/// Settings handed through to the syncer's reconcilers.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentConfig {
    pub leader_election: LeaderElectionOptions,
    /// Super cluster connection.
    pub client_connection: ClientConnection,
    /// Request timeout for both clusters as Go-style duration text; empty keeps the loaded value.
    pub timeout: String,
    pub disable_service_account_token: bool,
    pub disable_pod_service_links: bool,
    pub default_opaque_meta_domains: Vec<String>,
    pub extra_syncing_resources: Vec<String>,
    pub extra_node_labels: Vec<String>,
    pub opaque_taint_keys: Vec<String>,
    pub vn_agent_port: i32,
    pub vn_agent_namespaced_name: String,
    pub vn_agent_label_selector: String,
    pub feature_gates: BTreeMap<String, bool>,
}

impl Default for ComponentConfig {
    fn default() -> Self {
        Self {
            leader_election: LeaderElectionOptions::default(),
            client_connection: ClientConnection::default(),
            timeout: String::new(),
            disable_service_account_token: true,
            disable_pod_service_links: false,
            default_opaque_meta_domains: DEFAULT_OPAQUE_META_DOMAINS
                .iter()
                .map(|d| d.to_string())
                .collect(),
            extra_syncing_resources: Vec::new(),
            extra_node_labels: Vec::new(),
            opaque_taint_keys: Vec::new(),
            vn_agent_port: DEFAULT_VN_AGENT_PORT,
            vn_agent_namespaced_name: DEFAULT_VN_AGENT_NAMESPACED_NAME.to_string(),
            vn_agent_label_selector: DEFAULT_VN_AGENT_LABEL_SELECTOR.to_string(),
            feature_gates: DEFAULT_FEATURE_GATES
                .iter()
                .map(|(name, default)| (name.to_string(), *default))
                .collect(),
        }
    }
}

/// Everything the operator can set, before anything is resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncerOptions {
    pub component_config: ComponentConfig,
    /// Meta cluster address; overrides the meta kubeconfig server.
    pub meta_cluster_address: String,
    pub meta_cluster_client_connection: ClientConnection,
    pub deploy_on_meta_cluster: bool,
    /// Super cluster address; overrides the super kubeconfig server.
    pub super_cluster_address: String,
    pub syncer_name: String,
    pub address: String,
    pub port: String,
    pub cert_file: String,
    pub key_file: String,
}

impl Default for SyncerOptions {
    fn default() -> Self {
        Self {
            component_config: ComponentConfig::default(),
            meta_cluster_address: String::new(),
            meta_cluster_client_connection: ClientConnection::default(),
            deploy_on_meta_cluster: false,
            super_cluster_address: String::new(),
            syncer_name: DEFAULT_SYNCER_NAME.to_string(),
            address: String::new(),
            port: DEFAULT_SERVER_PORT.to_string(),
            cert_file: String::new(),
            key_file: String::new(),
        }
    }
}

/// The resolved, ready-to-run syncer configuration.
pub struct SyncerConfig {
    pub component_config: ComponentConfig,
    pub topology: Topology,
    /// Client for lock traffic, bounded by the renew deadline.
    pub leader_election_client: Arc<KubeClient>,
    /// `None` when leader election is disabled.
    pub leader_election: Option<LeaderElectionConfig>,
    pub feature_gates: Arc<FeatureGate>,
    pub recorder: Arc<EventBroadcaster>,
    pub leader_election_recorder: Arc<EventBroadcaster>,
    pub address: String,
    pub port: String,
    pub cert_file: String,
    pub key_file: String,
}

impl SyncerOptions {
    pub fn topology_spec(&self) -> TopologySpec {
        let timeout = &self.component_config.timeout;
        TopologySpec {
            super_cluster: self
                .component_config
                .client_connection
                .endpoint(&self.super_cluster_address, timeout),
            meta_cluster: self
                .meta_cluster_client_connection
                .endpoint(&self.meta_cluster_address, timeout),
            deploy_on_meta: self.deploy_on_meta_cluster,
        }
    }

    /// Resolve against the real environment.
    pub fn config(&self) -> Result<SyncerConfig, OptionsError> {
        self.config_with(
            &DefaultLoader::from_env(),
            &HostnameIdentity,
            Path::new(SERVICE_ACCOUNT_NAMESPACE_FILE),
        )
    }

    /// Resolve endpoints, build the coordination client, set up leader
    /// election when enabled, and freeze the feature gates. No network traffic.
    pub fn config_with(
        &self,
        loader: &dyn ConfigLoader,
        identity: &dyn IdentityGenerator,
        namespace_file: &Path,
    ) -> Result<SyncerConfig, OptionsError> {
        validate_name(&self.syncer_name)
            .map_err(|e| OptionsError::InvalidSyncerName(e.to_string()))?;

        let topology = resolve_topology(loader, &self.topology_spec())?;
        let election = &self.component_config.leader_election;
        let leader_election_client = Arc::new(leader_election_client(
            &topology.leader_election,
            election.renew_deadline,
        )?);

        let recorder = Arc::new(EventBroadcaster::new(EVENT_LOG_CAPACITY));
        let leader_election_recorder = Arc::new(EventBroadcaster::new(EVENT_LOG_CAPACITY));

        let leader_election = if election.leader_elect {
            let api: Arc<dyn ObjectApi> = leader_election_client.clone();
            Some(make_leader_election_config(
                election,
                api,
                leader_election_recorder.clone(),
                &self.syncer_name,
                identity,
                namespace_file,
            )?)
        } else {
            info!("Leader election disabled");
            None
        };

        let feature_gates = Arc::new(FeatureGate::new(&self.component_config.feature_gates)?);

        Ok(SyncerConfig {
            component_config: self.component_config.clone(),
            topology,
            leader_election_client,
            leader_election,
            feature_gates,
            recorder,
            leader_election_recorder,
            address: self.address.clone(),
            port: self.port.clone(),
            cert_file: self.cert_file.clone(),
            key_file: self.key_file.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_client::ClientError;
    use pkg_constants::features::SUPER_CLUSTER_POOLING;
    use pkg_featuregate::FeatureGateError;
    use pkg_leaderelection::{ElectionError, FixedIdentity};
    use std::io::Write;
    use std::time::Duration;

    fn kubeconfig(server: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
current-context: c
clusters:
- name: c
  cluster: {{server: "{server}"}}
contexts:
- name: c
  context: {{cluster: c, user: u}}
users:
- name: u
  user: {{token: t}}
"#
        )
        .unwrap();
        file
    }

    fn namespace_file(ns: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{ns}\n").unwrap();
        file
    }

    fn outside_cluster() -> DefaultLoader {
        DefaultLoader::new(None, None, "/nonexistent/token", "/nonexistent/ca.crt")
    }

    fn identity() -> FixedIdentity {
        FixedIdentity("syncer-0_abc".to_string())
    }

    #[test]
    fn defaults_match_the_syncer() {
        let o = SyncerOptions::default();
        let c = &o.component_config;
        assert!(c.leader_election.leader_elect);
        assert_eq!(c.leader_election.lease_duration, Duration::from_secs(15));
        assert_eq!(c.leader_election.resource_lock, "configmaps");
        assert!(c.disable_service_account_token);
        assert_eq!(c.default_opaque_meta_domains, vec!["kubernetes.io", "k8s.io"]);
        assert_eq!(c.vn_agent_port, 10550);
        assert_eq!(c.vn_agent_namespaced_name, "vc-manager/vn-agent");
        assert_eq!(c.vn_agent_label_selector, "app=vn-agent");
        assert_eq!(c.feature_gates.len(), 3);
        assert!(c.feature_gates.values().all(|v| !v));
        assert_eq!(o.syncer_name, "vc");
        assert_eq!(o.port, "80");
    }

    #[test]
    fn super_only_assembles_everything() {
        let super_kc = kubeconfig("https://super:6443");
        let ns = namespace_file("vc-manager");
        let mut o = SyncerOptions::default();
        o.component_config.client_connection.kubeconfig =
            super_kc.path().display().to_string();
        o.component_config
            .feature_gates
            .insert(SUPER_CLUSTER_POOLING.to_string(), true);

        let cfg = o.config_with(&outside_cluster(), &identity(), ns.path()).unwrap();
        assert_eq!(cfg.topology.super_cluster.host, "https://super:6443");
        assert!(Arc::ptr_eq(&cfg.topology.super_cluster, &cfg.topology.meta_cluster));
        assert_eq!(cfg.topology.super_cluster.timeout, Duration::from_secs(30));
        assert_eq!(cfg.leader_election_client.timeout(), Duration::from_secs(10));
        assert_eq!(cfg.leader_election_client.host(), "https://super:6443");

        let election = cfg.leader_election.unwrap();
        assert_eq!(
            election.lock.describe(),
            "configmaps/vc-manager/vc-syncer-leaderelection-lock"
        );
        assert_eq!(election.lock.identity(), "syncer-0_abc");
        assert!(cfg.feature_gates.enabled(SUPER_CLUSTER_POOLING));
        assert_eq!(cfg.port, "80");
    }

    #[test]
    fn deployed_on_meta_coordinates_through_meta() {
        let token = namespace_file("meta-token");
        let ns = namespace_file("vc-manager");
        let loader = DefaultLoader::new(
            Some("10.0.0.1".to_string()),
            Some("443".to_string()),
            token.path(),
            "/nonexistent/ca.crt",
        );
        let mut o = SyncerOptions {
            super_cluster_address: "https://super:6443".to_string(),
            deploy_on_meta_cluster: true,
            ..Default::default()
        };
        o.component_config.timeout = "45s".to_string();

        let cfg = o.config_with(&loader, &identity(), ns.path()).unwrap();
        assert_eq!(cfg.topology.super_cluster.host, "https://super:6443");
        assert_eq!(cfg.topology.meta_cluster.host, "https://10.0.0.1:443");
        assert!(Arc::ptr_eq(&cfg.topology.leader_election, &cfg.topology.meta_cluster));
        assert_eq!(cfg.topology.meta_cluster.timeout, Duration::from_secs(45));
        assert_eq!(cfg.leader_election_client.host(), "https://10.0.0.1:443");
    }

    #[test]
    fn disabled_election_needs_no_namespace() {
        let mut o = SyncerOptions {
            super_cluster_address: "https://super:6443".to_string(),
            ..Default::default()
        };
        o.component_config.leader_election.leader_elect = false;
        let cfg = o
            .config_with(&outside_cluster(), &identity(), Path::new("/nonexistent/ns"))
            .unwrap();
        assert!(cfg.leader_election.is_none());
    }

    #[test]
    fn failures_propagate() {
        // Nothing given, not in a cluster.
        let err = SyncerOptions::default()
            .config_with(&outside_cluster(), &identity(), Path::new("/x"))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            OptionsError::Client(ClientError::NoInClusterEnvironment(_))
        ));

        let mut o = SyncerOptions {
            super_cluster_address: "https://super:6443".to_string(),
            ..Default::default()
        };
        o.component_config.timeout = "10 parsecs".to_string();
        let err = o
            .config_with(&outside_cluster(), &identity(), Path::new("/x"))
            .err()
            .unwrap();
        assert!(matches!(err, OptionsError::Client(ClientError::InvalidDuration(_))));

        o.component_config.timeout.clear();
        let err = o
            .config_with(&outside_cluster(), &identity(), Path::new("/nonexistent/ns"))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            OptionsError::Election(ElectionError::NamespaceUndiscoverable(_))
        ));

        o.component_config.leader_election.leader_elect = false;
        o.component_config
            .feature_gates
            .insert("MadeUpGate".to_string(), true);
        let err = o
            .config_with(&outside_cluster(), &identity(), Path::new("/x"))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            OptionsError::FeatureGate(FeatureGateError::UnknownFeatureGate(_))
        ));
    }

    #[test]
    fn syncer_name_must_be_a_label() {
        let o = SyncerOptions {
            syncer_name: "Tenant_A".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            o.config_with(&outside_cluster(), &identity(), Path::new("/x")),
            Err(OptionsError::InvalidSyncerName(_))
        ));
    }
}
