use pkg_constants::client::{
    DEFAULT_CLIENT_BURST, DEFAULT_CLIENT_QPS, DEFAULT_REQUEST_TIMEOUT, SERVICE_HOST_ENV,
    SERVICE_PORT_ENV,
};
use pkg_constants::paths::{SERVICE_ACCOUNT_CA_FILE, SERVICE_ACCOUNT_TOKEN_FILE};
use pkg_types::duration::parse_duration;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::ClientError;
use crate::kubeconfig::Kubeconfig;

/// TLS settings passed through to the HTTP client.
#[derive(Clone, Default, PartialEq)]
pub struct TlsConfig {
    pub insecure: bool,
    pub server_name: Option<String>,
    pub ca_file: Option<PathBuf>,
    pub ca_data: Option<Vec<u8>>,
    pub cert_file: Option<PathBuf>,
    pub cert_data: Option<Vec<u8>>,
    pub key_file: Option<PathBuf>,
    pub key_data: Option<Vec<u8>>,
}

impl fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConfig")
            .field("insecure", &self.insecure)
            .field("server_name", &self.server_name)
            .field("ca_file", &self.ca_file)
            .field("ca_data", &self.ca_data.as_ref().map(|d| d.len()))
            .field("cert_file", &self.cert_file)
            .field("key_file", &self.key_file)
            .field("key_data", &self.key_data.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A fully resolved API server endpoint.
///
/// Built once per resolution and shared behind an `Arc`; callers that need a
/// variant (a different timeout or user agent) clone it.
#[derive(Clone, Default, PartialEq)]
pub struct RestConfig {
    /// Base URL, e.g. `https://10.96.0.1:443`.
    pub host: String,
    pub bearer_token: Option<String>,
    pub bearer_token_file: Option<PathBuf>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls: TlsConfig,
    pub user_agent: Option<String>,
    pub content_type: String,
    /// Per-request timeout. Zero means "not set" until defaulting runs.
    pub timeout: Duration,
    pub qps: f32,
    pub burst: i32,
}

impl fmt::Debug for RestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestConfig")
            .field("host", &self.host)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .field("bearer_token_file", &self.bearer_token_file)
            .field("username", &self.username)
            .field("tls", &self.tls)
            .field("user_agent", &self.user_agent)
            .field("content_type", &self.content_type)
            .field("timeout", &self.timeout)
            .field("qps", &self.qps)
            .field("burst", &self.burst)
            .finish()
    }
}

impl RestConfig {
    /// Copy of this config with `agent` as user agent.
    pub fn with_user_agent(&self, agent: &str) -> RestConfig {
        RestConfig {
            user_agent: Some(agent.to_string()),
            ..self.clone()
        }
    }

    /// Copy of this config with a different request timeout.
    pub fn with_timeout(&self, timeout: Duration) -> RestConfig {
        RestConfig {
            timeout,
            ..self.clone()
        }
    }
}

/// What the operator told us about one cluster.
#[derive(Debug, Clone, Default)]
pub struct EndpointSpec {
    pub kubeconfig: Option<PathBuf>,
    /// Server address; beats whatever the kubeconfig says.
    pub address_override: Option<String>,
    /// Go-style duration text, e.g. `30s`.
    pub timeout: Option<String>,
    pub content_type: String,
    pub qps: f32,
    pub burst: i32,
}

impl EndpointSpec {
    fn kubeconfig_path(&self) -> Option<&Path> {
        self.kubeconfig
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    fn address(&self) -> Option<&str> {
        non_empty(self.address_override.as_deref())
    }

    /// True when a kubeconfig or an address was given explicitly.
    pub fn is_explicit(&self) -> bool {
        self.kubeconfig_path().is_some() || self.address().is_some()
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}

/// Source of credentials and endpoints.
pub trait ConfigLoader {
    /// Ambient configuration available only inside a cluster.
    fn in_cluster(&self) -> Result<RestConfig, ClientError>;

    /// Load `kubeconfig` (if any) and replace its server with `server_override` (if any).
    fn from_kubeconfig(
        &self,
        kubeconfig: Option<&Path>,
        server_override: Option<&str>,
    ) -> Result<RestConfig, ClientError>;
}

/// Loader backed by the process environment and the local filesystem.
#[derive(Debug, Clone)]
pub struct DefaultLoader {
    service_host: Option<String>,
    service_port: Option<String>,
    token_file: PathBuf,
    ca_file: PathBuf,
}

impl DefaultLoader {
    /// Snapshot the service environment variables and use the standard service account paths.
    pub fn from_env() -> Self {
        Self {
            service_host: std::env::var(SERVICE_HOST_ENV).ok(),
            service_port: std::env::var(SERVICE_PORT_ENV).ok(),
            token_file: PathBuf::from(SERVICE_ACCOUNT_TOKEN_FILE),
            ca_file: PathBuf::from(SERVICE_ACCOUNT_CA_FILE),
        }
    }

    pub fn new(
        service_host: Option<String>,
        service_port: Option<String>,
        token_file: impl Into<PathBuf>,
        ca_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            service_host,
            service_port,
            token_file: token_file.into(),
            ca_file: ca_file.into(),
        }
    }
}

impl ConfigLoader for DefaultLoader {
    fn in_cluster(&self) -> Result<RestConfig, ClientError> {
        let (host, port) = match (
            non_empty(self.service_host.as_deref()),
            non_empty(self.service_port.as_deref()),
        ) {
            (Some(h), Some(p)) => (h, p),
            _ => {
                return Err(ClientError::NoInClusterEnvironment(format!(
                    "{} and {} must be defined",
                    SERVICE_HOST_ENV, SERVICE_PORT_ENV
                )));
            }
        };

        let token = std::fs::read_to_string(&self.token_file).map_err(|e| {
            ClientError::NoInClusterEnvironment(format!(
                "cannot read service account token {}: {}",
                self.token_file.display(),
                e
            ))
        })?;

        let mut tls = TlsConfig::default();
        match std::fs::read(&self.ca_file) {
            Ok(ca) => {
                tls.ca_file = Some(self.ca_file.clone());
                tls.ca_data = Some(ca);
            }
            Err(e) => warn!(
                "Expected to load root CA config from {}, but got err: {}",
                self.ca_file.display(),
                e
            ),
        }

        // IPv6 hosts need brackets in a URL.
        let host = if host.contains(':') {
            format!("https://[{}]:{}", host, port)
        } else {
            format!("https://{}:{}", host, port)
        };

        Ok(RestConfig {
            host,
            bearer_token: Some(token.trim().to_string()),
            bearer_token_file: Some(self.token_file.clone()),
            tls,
            ..Default::default()
        })
    }

    fn from_kubeconfig(
        &self,
        kubeconfig: Option<&Path>,
        server_override: Option<&str>,
    ) -> Result<RestConfig, ClientError> {
        let mut config = match kubeconfig {
            Some(path) => Kubeconfig::load(path)?.rest_config(path, server_override)?,
            None => RestConfig::default(),
        };

        if let Some(server) = server_override {
            config.host = server.to_string();
        }
        if config.host.is_empty() {
            let path = kubeconfig
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            return Err(ClientError::config_load(
                path,
                "invalid configuration: no configuration has been provided",
            ));
        }
        Ok(config)
    }
}

/// Resolve one cluster endpoint.
///
/// In-cluster config is used only when nothing explicit was given and
/// `in_cluster` allows it. Otherwise the kubeconfig is loaded and the address
/// override applied on top. Timeout, QPS and burst are defaulted last.
pub fn get_client_config(
    loader: &dyn ConfigLoader,
    spec: &EndpointSpec,
    in_cluster: bool,
) -> Result<RestConfig, ClientError> {
    let mut config = if !spec.is_explicit() && in_cluster {
        info!(
            "Neither kubeconfig file nor control plane URL was specified. Falling back to in-cluster config."
        );
        loader.in_cluster()?
    } else {
        loader.from_kubeconfig(spec.kubeconfig_path(), spec.address())?
    };

    match non_empty(spec.timeout.as_deref()) {
        None => {
            if config.timeout.is_zero() {
                config.timeout = DEFAULT_REQUEST_TIMEOUT;
            }
        }
        Some(text) => config.timeout = parse_duration(text.trim())?,
    }

    config.content_type = spec.content_type.clone();
    // Anything that isn't a usable rate means "unset".
    config.qps = if spec.qps.is_finite() && spec.qps > 0.0 {
        spec.qps
    } else {
        DEFAULT_CLIENT_QPS
    };
    config.burst = if spec.burst > 0 {
        spec.burst
    } else {
        DEFAULT_CLIENT_BURST
    };

    Ok(config)
}
