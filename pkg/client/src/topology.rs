//! Which physical endpoint backs each logical cluster.

use std::sync::Arc;
use tracing::info;

use crate::error::ClientError;
use crate::rest::{ConfigLoader, EndpointSpec, RestConfig, get_client_config};

/// Inputs for both clusters plus where this process runs.
#[derive(Debug, Clone, Default)]
pub struct TopologySpec {
    pub super_cluster: EndpointSpec,
    pub meta_cluster: EndpointSpec,
    /// The syncer runs next to the meta cluster rather than the super cluster.
    pub deploy_on_meta: bool,
}

/// Resolved endpoints. `meta_cluster` may be the very same `Arc` as
/// `super_cluster`; `leader_election` is always one of the two.
#[derive(Debug, Clone)]
pub struct Topology {
    pub super_cluster: Arc<RestConfig>,
    pub meta_cluster: Arc<RestConfig>,
    pub leader_election: Arc<RestConfig>,
}

/// Pick the endpoint for coordination traffic: the cluster we are deployed on,
/// so lock renewals never cross the link between the two clusters.
pub fn leader_election_endpoint<'a>(
    deploy_on_meta: bool,
    super_cluster: &'a Arc<RestConfig>,
    meta_cluster: &'a Arc<RestConfig>,
) -> &'a Arc<RestConfig> {
    if deploy_on_meta {
        meta_cluster
    } else {
        super_cluster
    }
}

pub fn resolve_topology(
    loader: &dyn ConfigLoader,
    spec: &TopologySpec,
) -> Result<Topology, ClientError> {
    let super_cluster = Arc::new(get_client_config(
        loader,
        &spec.super_cluster,
        !spec.deploy_on_meta,
    )?);

    let meta_cluster = if spec.deploy_on_meta || spec.meta_cluster.is_explicit() {
        Arc::new(get_client_config(
            loader,
            &spec.meta_cluster,
            spec.deploy_on_meta,
        )?)
    } else {
        Arc::clone(&super_cluster)
    };

    let leader_election = Arc::clone(leader_election_endpoint(
        spec.deploy_on_meta,
        &super_cluster,
        &meta_cluster,
    ));

    info!(
        super_cluster = %super_cluster.host,
        meta_cluster = %meta_cluster.host,
        leader_election = %leader_election.host,
        deploy_on_meta = spec.deploy_on_meta,
        "Resolved cluster topology"
    );

    Ok(Topology {
        super_cluster,
        meta_cluster,
        leader_election,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::tests::StubLoader;
    use std::time::Duration;

    fn loader() -> StubLoader {
        StubLoader {
            in_cluster: Some(RestConfig {
                host: "https://in-cluster:443".to_string(),
                ..Default::default()
            }),
            kubeconfig_timeout: Duration::ZERO,
        }
    }

    fn at(address: &str) -> EndpointSpec {
        EndpointSpec {
            address_override: Some(address.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn meta_aliases_super_by_default() {
        let spec = TopologySpec {
            super_cluster: at("https://super"),
            ..Default::default()
        };
        let topo = resolve_topology(&loader(), &spec).unwrap();
        assert!(Arc::ptr_eq(&topo.super_cluster, &topo.meta_cluster));
        assert!(Arc::ptr_eq(&topo.leader_election, &topo.super_cluster));
    }

    #[test]
    fn explicit_meta_is_resolved_separately() {
        let spec = TopologySpec {
            super_cluster: at("https://super"),
            meta_cluster: at("https://meta"),
            deploy_on_meta: false,
        };
        let topo = resolve_topology(&loader(), &spec).unwrap();
        assert!(!Arc::ptr_eq(&topo.super_cluster, &topo.meta_cluster));
        assert_eq!(topo.meta_cluster.host, "https://meta");
        assert_eq!(topo.leader_election.host, "https://super");
    }

    #[test]
    fn deploy_on_meta_uses_in_cluster_meta_for_election() {
        let spec = TopologySpec {
            super_cluster: at("https://super"),
            meta_cluster: EndpointSpec::default(),
            deploy_on_meta: true,
        };
        let topo = resolve_topology(&loader(), &spec).unwrap();
        assert_eq!(topo.meta_cluster.host, "https://in-cluster:443");
        assert!(Arc::ptr_eq(&topo.leader_election, &topo.meta_cluster));
    }

    #[test]
    fn super_uses_in_cluster_unless_deployed_on_meta() {
        let topo = resolve_topology(&loader(), &TopologySpec::default()).unwrap();
        assert_eq!(topo.super_cluster.host, "https://in-cluster:443");

        // On meta, the super cluster must come from explicit inputs.
        let spec = TopologySpec {
            deploy_on_meta: true,
            ..Default::default()
        };
        let topo = resolve_topology(&loader(), &spec).unwrap();
        assert_ne!(topo.super_cluster.host, "https://in-cluster:443");
        assert_eq!(topo.meta_cluster.host, "https://in-cluster:443");
    }

    #[test]
    fn endpoint_rule_is_a_pure_function() {
        let a = Arc::new(RestConfig::default());
        let b = Arc::new(RestConfig::default());
        assert!(Arc::ptr_eq(leader_election_endpoint(false, &a, &b), &a));
        assert!(Arc::ptr_eq(leader_election_endpoint(true, &a, &b), &b));
    }

    #[test]
    fn failures_propagate() {
        let spec = TopologySpec {
            super_cluster: at("https://super"),
            meta_cluster: EndpointSpec {
                timeout: Some("bogus".to_string()),
                ..at("https://meta")
            },
            deploy_on_meta: false,
        };
        assert!(matches!(
            resolve_topology(&loader(), &spec),
            Err(ClientError::InvalidDuration(_))
        ));
    }
}
