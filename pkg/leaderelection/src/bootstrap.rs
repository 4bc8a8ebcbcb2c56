//! Turns user-facing election options into a ready-to-run configuration.

use pkg_client::kube::KubeClient;
use pkg_client::{ClientError, ObjectApi, RestConfig};
use pkg_constants::client::{LEADER_ELECTION_USER_AGENT_SUFFIX, RESOURCE_SYNCER_USER_AGENT};
use pkg_constants::election::LOCK_NAME_SUFFIX;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::{ElectionPolicy, LeaderElectionOptions};
use crate::error::ElectionError;
use crate::events::EventRecorder;
use crate::healthz::HealthzAdaptor;
use crate::identity::{IdentityGenerator, in_cluster_namespace};
use crate::resourcelock::{ResourceLock, new_resource_lock};

/// Everything [`crate::LeaderElector`] needs.
pub struct LeaderElectionConfig {
    pub lock: Arc<dyn ResourceLock>,
    pub policy: ElectionPolicy,
    pub watchdog: Arc<HealthzAdaptor>,
    /// Name of the election, used in logs and health output.
    pub name: String,
    /// Give up the lock on shutdown instead of letting it expire.
    pub release_on_cancel: bool,
}

/// Lock object name for a syncer. The `lock_object_name` option is ignored.
pub fn lock_name(syncer_name: &str) -> String {
    format!("{}-{}", syncer_name, LOCK_NAME_SUFFIX)
}

pub fn make_leader_election_config(
    options: &LeaderElectionOptions,
    api: Arc<dyn ObjectApi>,
    recorder: Arc<dyn EventRecorder>,
    syncer_name: &str,
    identity: &dyn IdentityGenerator,
    namespace_file: &Path,
) -> Result<LeaderElectionConfig, ElectionError> {
    let policy = options.policy();
    policy.validate()?;

    let id = identity.identity()?;
    let namespace = if options.lock_object_namespace.is_empty() {
        in_cluster_namespace(namespace_file)?
    } else {
        options.lock_object_namespace.clone()
    };
    let name = lock_name(syncer_name);

    let lock = new_resource_lock(
        &options.resource_lock,
        &namespace,
        &name,
        &id,
        api,
        Some(recorder),
    )?;

    info!(
        identity = %id,
        lock = %lock.describe(),
        "Leader election configured"
    );

    Ok(LeaderElectionConfig {
        lock,
        policy,
        watchdog: Arc::new(HealthzAdaptor::new(policy.watchdog_threshold)),
        name: RESOURCE_SYNCER_USER_AGENT.to_string(),
        release_on_cancel: true,
    })
}

/// Client for coordination traffic: a copy of `endpoint` whose requests
/// can't outlive one renew deadline.
pub fn leader_election_client(
    endpoint: &RestConfig,
    renew_deadline: Duration,
) -> Result<KubeClient, ClientError> {
    let agent = format!("{}{}", RESOURCE_SYNCER_USER_AGENT, LEADER_ELECTION_USER_AGENT_SUFFIX);
    KubeClient::new(&endpoint.with_timeout(renew_deadline).with_user_agent(&agent))
}
