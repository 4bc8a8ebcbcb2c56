use anyhow::Context;
use clap::{Parser, ValueEnum};
use pkg_constants::paths::DEFAULT_SYNCER_CONFIG;
use pkg_featuregate::{FeatureGate, parse_feature_gates};
use pkg_leaderelection::{ElectionState, HealthzAdaptor, LeaderElector};
use pkg_options::SyncerOptions;
use pkg_types::config::{SyncerConfigFile, load_config_file};
use pkg_types::duration::{format_duration, parse_duration};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn duration_arg(text: &str) -> Result<Duration, String> {
    parse_duration(text).map_err(|e| e.to_string())
}

fn feature_gates_arg(text: &str) -> Result<BTreeMap<String, bool>, String> {
    parse_feature_gates(text).map_err(|e| e.to_string())
}

fn feature_gates_help() -> String {
    format!(
        "A set of key=value pairs that describe feature gates. Options are: {}",
        FeatureGate::default().known_features().join(", ")
    )
}

#[derive(Parser, Debug)]
#[command(name = "vc-syncer", about = "Resource syncer between tenant clusters and the super cluster")]
struct Cli {
    /// Path to YAML config file
    #[arg(long, short, default_value = DEFAULT_SYNCER_CONFIG)]
    config: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Address of the super cluster API server (overrides the kubeconfig server)
    #[arg(long)]
    super_master: Option<String>,

    /// Kubeconfig of the super cluster
    #[arg(long)]
    super_master_kubeconfig: Option<String>,

    /// Request timeout for both clusters, e.g. 30s or 1m30s (overrides the kubeconfig)
    #[arg(long)]
    super_master_timeout: Option<String>,

    /// Address of the meta cluster API server (overrides the kubeconfig server)
    #[arg(long)]
    meta_cluster_address: Option<String>,

    /// Kubeconfig of the meta cluster. The super cluster is used when not set
    #[arg(long)]
    meta_cluster_kubeconfig: Option<String>,

    /// The syncer runs in the meta cluster
    #[arg(long, num_args = 0..=1, default_missing_value = "true", require_equals = true)]
    deployment_on_meta: Option<bool>,

    /// Syncer name, also names the leader election lock
    #[arg(long)]
    syncer_name: Option<String>,

    #[arg(long, help = feature_gates_help(), value_parser = feature_gates_arg)]
    feature_gates: Option<BTreeMap<String, bool>>,

    /// Don't auto-mount super cluster service account tokens into tenant pods
    #[arg(long, num_args = 0..=1, default_missing_value = "true", require_equals = true)]
    disable_service_account_token: Option<bool>,

    /// Turn off `enableServiceLinks` in synced pods
    #[arg(long, num_args = 0..=1, default_missing_value = "true", require_equals = true)]
    disable_service_links: Option<bool>,

    #[arg(long, value_delimiter = ',')]
    default_opaque_meta_domains: Option<Vec<String>>,

    /// Additional resources to sync (priorityclass, ingress, crd)
    #[arg(long, value_delimiter = ',')]
    extra_syncing_resources: Option<Vec<String>>,

    #[arg(long, value_delimiter = ',')]
    extra_node_labels: Option<Vec<String>>,

    #[arg(long, value_delimiter = ',')]
    opaque_taint_keys: Option<Vec<String>>,

    /// Port the vn-agent listens on
    #[arg(long)]
    vn_agent_port: Option<i32>,

    /// Namespace/name of the vn-agent, used by VNodeProviderService
    #[arg(long = "vn-agent-namespace-name")]
    vn_agent_namespaced_name: Option<String>,

    #[arg(long)]
    vn_agent_label_selector: Option<String>,

    /// Gain leadership before doing any work
    #[arg(long, num_args = 0..=1, default_missing_value = "true", require_equals = true)]
    leader_elect: Option<bool>,

    /// How long standbys wait after the last observed renewal before taking over
    #[arg(long, value_parser = duration_arg)]
    leader_elect_lease_duration: Option<Duration>,

    /// How long the leader keeps retrying a renewal before stepping down
    #[arg(long, value_parser = duration_arg)]
    leader_elect_renew_deadline: Option<Duration>,

    /// Wait between acquire and renew attempts
    #[arg(long, value_parser = duration_arg)]
    leader_elect_retry_period: Option<Duration>,

    /// Lock object kind: configmaps, endpoints or leases
    #[arg(long)]
    leader_elect_resource_lock: Option<String>,

    /// DEPRECATED: namespace of the lock object
    #[arg(long)]
    lock_object_namespace: Option<String>,

    /// DEPRECATED: ignored, the lock is named after --syncer-name
    #[arg(long)]
    lock_object_name: Option<String>,

    /// Metrics server address
    #[arg(long)]
    address: Option<String>,

    /// Metrics server port
    #[arg(long)]
    port: Option<String>,

    /// x509 certificate for the metrics server
    #[arg(long)]
    cert_file: Option<String>,

    /// Private key matching --cert-file
    #[arg(long)]
    key_file: Option<String>,
}

/// A CLI duration wins outright; the file value is only parsed when it is used.
fn merge_duration(
    field: &str,
    cli: Option<Duration>,
    file: Option<String>,
) -> anyhow::Result<Option<Duration>> {
    match (cli, file) {
        (Some(v), _) => Ok(Some(v)),
        (None, Some(t)) => parse_duration(&t)
            .map(Some)
            .with_context(|| format!("config file field {}", field)),
        (None, None) => Ok(None),
    }
}

/// Merge: CLI args > config file > defaults
fn build_options(cli: Cli, file: SyncerConfigFile) -> anyhow::Result<SyncerOptions> {
    let mut o = SyncerOptions::default();
    let le_file = file.leader_election;

    if let Some(v) = cli.super_master.or(file.super_master) {
        o.super_cluster_address = v;
    }
    if let Some(v) = cli.super_master_kubeconfig.or(file.super_master_kubeconfig) {
        o.component_config.client_connection.kubeconfig = v;
    }
    if let Some(v) = cli.super_master_timeout.or(file.super_master_timeout) {
        o.component_config.timeout = v;
    }
    if let Some(v) = cli.meta_cluster_address.or(file.meta_cluster_address) {
        o.meta_cluster_address = v;
    }
    if let Some(v) = cli.meta_cluster_kubeconfig.or(file.meta_cluster_kubeconfig) {
        o.meta_cluster_client_connection.kubeconfig = v;
    }
    if let Some(v) = cli.deployment_on_meta.or(file.deployment_on_meta) {
        o.deploy_on_meta_cluster = v;
    }
    if let Some(v) = cli.syncer_name.or(file.syncer_name) {
        o.syncer_name = v;
    }

    let conn = &mut o.component_config.client_connection;
    if let Some(v) = file.qps {
        conn.qps = v;
    }
    if let Some(v) = file.burst {
        conn.burst = v;
    }
    if let Some(v) = file.content_type {
        conn.accept_content_types = v;
    }
    o.meta_cluster_client_connection.qps = conn.qps;
    o.meta_cluster_client_connection.burst = conn.burst;
    o.meta_cluster_client_connection.accept_content_types = conn.accept_content_types.clone();

    let gates = &mut o.component_config.feature_gates;
    gates.extend(file.feature_gates);
    gates.extend(cli.feature_gates.unwrap_or_default());

    let c = &mut o.component_config;
    if let Some(v) = cli.disable_service_account_token {
        c.disable_service_account_token = v;
    }
    if let Some(v) = cli.disable_service_links {
        c.disable_pod_service_links = v;
    }
    if let Some(v) = cli.default_opaque_meta_domains {
        c.default_opaque_meta_domains = v;
    }
    if let Some(v) = cli.extra_syncing_resources {
        c.extra_syncing_resources = v;
    }
    if let Some(v) = cli.extra_node_labels {
        c.extra_node_labels = v;
    }
    if let Some(v) = cli.opaque_taint_keys {
        c.opaque_taint_keys = v;
    }
    if let Some(v) = cli.vn_agent_port {
        c.vn_agent_port = v;
    }
    if let Some(v) = cli.vn_agent_namespaced_name {
        c.vn_agent_namespaced_name = v;
    }
    if let Some(v) = cli.vn_agent_label_selector {
        c.vn_agent_label_selector = v;
    }

    let le = &mut c.leader_election;
    if let Some(v) = cli.leader_elect.or(le_file.leader_elect) {
        le.leader_elect = v;
    }
    if let Some(v) = merge_duration(
        "lease-duration",
        cli.leader_elect_lease_duration,
        le_file.lease_duration,
    )? {
        le.lease_duration = v;
    }
    if let Some(v) = merge_duration(
        "renew-deadline",
        cli.leader_elect_renew_deadline,
        le_file.renew_deadline,
    )? {
        le.renew_deadline = v;
    }
    if let Some(v) = merge_duration(
        "retry-period",
        cli.leader_elect_retry_period,
        le_file.retry_period,
    )? {
        le.retry_period = v;
    }
    if let Some(v) = cli.leader_elect_resource_lock.or(le_file.resource_lock) {
        le.resource_lock = v;
    }
    if let Some(v) = cli.lock_object_namespace.or(le_file.lock_object_namespace) {
        le.lock_object_namespace = v;
    }
    if let Some(v) = cli.lock_object_name {
        warn!("--lock-object-name is deprecated and ignored, the lock is named after --syncer-name");
        le.lock_object_name = v;
    }

    if let Some(v) = cli.address.or(file.address) {
        o.address = v;
    }
    if let Some(v) = cli.port.or(file.port) {
        o.port = v;
    }
    if let Some(v) = cli.cert_file.or(file.cert_file) {
        o.cert_file = v;
    }
    if let Some(v) = cli.key_file.or(file.key_file) {
        o.key_file = v;
    }
    Ok(o)
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn shutdown_signal() -> anyhow::Result<()> {
    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res?,
        _ = term.recv() => {}
    }
    Ok(())
}

/// Log watchdog failures until shutdown.
async fn watch_health(watchdog: Arc<HealthzAdaptor>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut healthy = true;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = shutdown.changed() => return,
        }
        match watchdog.check() {
            Ok(()) if !healthy => {
                info!(check = watchdog.name(), "Healthy again");
                healthy = true;
            }
            Ok(()) => {}
            Err(e) => {
                warn!(check = watchdog.name(), error = %e, "Health check failing");
                healthy = false;
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    // Load config file (returns defaults if file not found)
    let file_cfg: SyncerConfigFile = load_config_file(&cli.config)?;
    info!("Config file: {}", cli.config);

    let options = build_options(cli, file_cfg)?;
    let config = options.config()?;

    let le = &config.component_config.leader_election;
    info!("Starting vc-syncer");
    info!("  Syncer:          {}", options.syncer_name);
    info!("  Super cluster:   {}", config.topology.super_cluster.host);
    info!("  Meta cluster:    {}", config.topology.meta_cluster.host);
    info!("  Election via:    {}", config.topology.leader_election.host);
    info!("  Lease/renew/retry: {}/{}/{}",
        format_duration(le.lease_duration),
        format_duration(le.renew_deadline),
        format_duration(le.retry_period)
    );
    info!("  Feature gates:   {:?}", config.feature_gates.values());

    let Some(election) = config.leader_election else {
        info!("Leader election disabled, running as the only replica");
        shutdown_signal().await?;
        info!("Shutting down vc-syncer");
        return Ok(());
    };

    let watchdog = Arc::clone(&election.watchdog);
    let period = election.policy.retry_period;
    let elector = LeaderElector::new(election)?;
    let (stop_tx, stop_rx) = watch::channel(false);
    let mut state = elector.subscribe();
    let health = tokio::spawn(watch_health(watchdog, period, stop_rx.clone()));
    let run = tokio::spawn(Arc::clone(&elector).run(stop_rx));

    let states = tokio::spawn(async move {
        while state.changed().await.is_ok() {
            match *state.borrow_and_update() {
                ElectionState::Leader => info!("Leading: syncer is active"),
                ElectionState::NotLeader => info!("Standing by"),
                ElectionState::Stopped => break,
            }
        }
    });

    shutdown_signal().await?;
    info!("Shutting down vc-syncer");
    stop_tx.send_replace(true);

    run.await?;
    health.await?;
    states.await?;
    Ok(())
}
