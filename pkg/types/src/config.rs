use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Syncer configuration file (YAML).
///
/// Every field is optional; CLI flags win over the file and the file wins
/// over built-in defaults.
///
/// Example `config.yaml`:
/// ```yaml
/// super-master-kubeconfig: /etc/vc-syncer/super.kubeconfig
/// super-master-timeout: 45s
/// meta-cluster-kubeconfig: /etc/vc-syncer/meta.kubeconfig
/// deployment-on-meta: true
/// syncer-name: vc
/// feature-gates:
///   SuperClusterPooling: true
/// leader-election:
///   leader-elect: true
///   lease-duration: 15s
///   renew-deadline: 10s
///   retry-period: 2s
///   resource-lock: leases
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncerConfigFile {
    #[serde(default, alias = "super-master")]
    pub super_master: Option<String>,
    #[serde(default, alias = "super-master-kubeconfig")]
    pub super_master_kubeconfig: Option<String>,
    #[serde(default, alias = "super-master-timeout")]
    pub super_master_timeout: Option<String>,
    #[serde(default, alias = "meta-cluster-address")]
    pub meta_cluster_address: Option<String>,
    #[serde(default, alias = "meta-cluster-kubeconfig")]
    pub meta_cluster_kubeconfig: Option<String>,
    #[serde(default, alias = "deployment-on-meta")]
    pub deployment_on_meta: Option<bool>,
    #[serde(default, alias = "syncer-name")]
    pub syncer_name: Option<String>,
    #[serde(default)]
    pub qps: Option<f32>,
    #[serde(default)]
    pub burst: Option<i32>,
    #[serde(default, alias = "content-type")]
    pub content_type: Option<String>,
    #[serde(default, alias = "feature-gates")]
    pub feature_gates: BTreeMap<String, bool>,
    #[serde(default, alias = "leader-election")]
    pub leader_election: LeaderElectionConfigFile,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default, alias = "cert-file")]
    pub cert_file: Option<String>,
    #[serde(default, alias = "key-file")]
    pub key_file: Option<String>,
}

/// Leader election section of the config file. Durations use Go syntax (`15s`, `1m30s`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaderElectionConfigFile {
    #[serde(default, alias = "leader-elect")]
    pub leader_elect: Option<bool>,
    #[serde(default, alias = "lease-duration")]
    pub lease_duration: Option<String>,
    #[serde(default, alias = "renew-deadline")]
    pub renew_deadline: Option<String>,
    #[serde(default, alias = "retry-period")]
    pub retry_period: Option<String>,
    #[serde(default, alias = "resource-lock")]
    pub resource_lock: Option<String>,
    #[serde(default, alias = "lock-object-namespace")]
    pub lock_object_namespace: Option<String>,
}

/// Load a YAML config file, returning the default if the file doesn't exist.
pub fn load_config_file<T: serde::de::DeserializeOwned + Default>(path: &str) -> anyhow::Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(T::default());
        }
        Err(e) => return Err(e.into()),
    };
    let config: T = serde_yaml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("invalid config file {}: {}", path, e))?;
    Ok(config)
}
