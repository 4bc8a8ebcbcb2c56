//! Minimal kubeconfig model: clusters, users, contexts and the current context.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::ClientError;
use crate::rest::{RestConfig, TlsConfig};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Kubeconfig {
    #[serde(default)]
    pub clusters: Vec<NamedCluster>,
    #[serde(default)]
    pub contexts: Vec<NamedContext>,
    #[serde(default)]
    pub users: Vec<NamedAuthInfo>,
    #[serde(default)]
    pub current_context: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    #[serde(default)]
    pub cluster: Cluster,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Cluster {
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub certificate_authority: Option<String>,
    #[serde(default)]
    pub certificate_authority_data: Option<String>,
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
    #[serde(default)]
    pub tls_server_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedContext {
    pub name: String,
    #[serde(default)]
    pub context: Context,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Context {
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedAuthInfo {
    pub name: String,
    #[serde(default)]
    pub user: AuthInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AuthInfo {
    #[serde(default)]
    pub client_certificate: Option<String>,
    #[serde(default)]
    pub client_certificate_data: Option<String>,
    #[serde(default)]
    pub client_key: Option<String>,
    #[serde(default)]
    pub client_key_data: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, rename = "tokenFile")]
    pub token_file: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Kubeconfig {
    /// Read and parse a kubeconfig file. An empty file is an empty config.
    pub fn load(path: &Path) -> Result<Self, ClientError> {
        let display = path.display().to_string();
        let content =
            std::fs::read_to_string(path).map_err(|e| ClientError::config_load(&display, e))?;
        Self::parse(&content).map_err(|reason| ClientError::config_load(&display, reason))
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| e.to_string())
    }

    /// Build the endpoint selected by `current-context`.
    ///
    /// Relative file references are resolved against the kubeconfig's
    /// directory. `server_override` lets a cluster entry omit its server.
    pub fn rest_config(
        &self,
        path: &Path,
        server_override: Option<&str>,
    ) -> Result<RestConfig, ClientError> {
        let display = path.display().to_string();
        let err = |reason: String| ClientError::config_load(&display, reason);
        let base = path.parent().unwrap_or_else(|| Path::new("."));

        let context = if self.current_context.is_empty() {
            Context::default()
        } else {
            self.contexts
                .iter()
                .find(|c| c.name == self.current_context)
                .map(|c| c.context.clone())
                .ok_or_else(|| err(format!("context {:?} does not exist", self.current_context)))?
        };

        let cluster = if context.cluster.is_empty() {
            Cluster::default()
        } else {
            self.clusters
                .iter()
                .find(|c| c.name == context.cluster)
                .map(|c| c.cluster.clone())
                .ok_or_else(|| err(format!("cluster {:?} does not exist", context.cluster)))?
        };

        let user = if context.user.is_empty() {
            AuthInfo::default()
        } else {
            self.users
                .iter()
                .find(|u| u.name == context.user)
                .map(|u| u.user.clone())
                .ok_or_else(|| err(format!("user {:?} was not found for context", context.user)))?
        };

        if cluster.server.is_empty() && server_override.is_none() && !self.current_context.is_empty() {
            return Err(err(format!(
                "no server found for cluster {:?}",
                context.cluster
            )));
        }

        let decode = |field: &str, data: &Option<String>| -> Result<Option<Vec<u8>>, ClientError> {
            data.as_deref()
                .map(|d| {
                    STANDARD
                        .decode(d.trim())
                        .map_err(|e| err(format!("invalid {}: {}", field, e)))
                })
                .transpose()
        };

        let tls = TlsConfig {
            insecure: cluster.insecure_skip_tls_verify,
            server_name: cluster.tls_server_name.clone(),
            ca_file: cluster.certificate_authority.as_deref().map(|p| resolve(base, p)),
            ca_data: decode("certificate-authority-data", &cluster.certificate_authority_data)?,
            cert_file: user.client_certificate.as_deref().map(|p| resolve(base, p)),
            cert_data: decode("client-certificate-data", &user.client_certificate_data)?,
            key_file: user.client_key.as_deref().map(|p| resolve(base, p)),
            key_data: decode("client-key-data", &user.client_key_data)?,
        };

        Ok(RestConfig {
            host: cluster.server,
            bearer_token: user.token,
            bearer_token_file: user.token_file.as_deref().map(|p| resolve(base, p)),
            username: user.username,
            password: user.password,
            tls,
            ..Default::default()
        })
    }
}

fn resolve(base: &Path, file: &str) -> PathBuf {
    let file = Path::new(file);
    if file.is_absolute() {
        file.to_path_buf()
    } else {
        base.join(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::tests::{KUBECONFIG, write_kubeconfig};

    #[test]
    fn resolves_current_context() {
        let file = write_kubeconfig(KUBECONFIG);
        let kc = Kubeconfig::load(file.path()).unwrap();
        let cfg = kc.rest_config(file.path(), None).unwrap();
        assert_eq!(cfg.host, "https://super.example.com:6443");
        assert_eq!(cfg.bearer_token.as_deref(), Some("abc123"));
        assert!(cfg.tls.insecure);
    }

    #[test]
    fn decodes_inline_certificates_and_resolves_relative_paths() {
        let yaml = r#"
current-context: meta
clusters:
- name: meta
  cluster:
    server: https://meta:6443
    certificate-authority-data: Q0EtUEVN
contexts:
- name: meta
  context: {cluster: meta, user: sa}
users:
- name: sa
  user:
    client-certificate: certs/client.crt
    client-key: /abs/client.key
    tokenFile: token
"#;
        let kc = Kubeconfig::parse(yaml).unwrap();
        let cfg = kc.rest_config(Path::new("/etc/vc/kubeconfig"), None).unwrap();
        assert_eq!(cfg.tls.ca_data.as_deref(), Some(b"CA-PEM".as_slice()));
        assert_eq!(
            cfg.tls.cert_file.as_deref(),
            Some(Path::new("/etc/vc/certs/client.crt"))
        );
        assert_eq!(cfg.tls.key_file.as_deref(), Some(Path::new("/abs/client.key")));
        assert_eq!(cfg.bearer_token_file.as_deref(), Some(Path::new("/etc/vc/token")));
    }

    #[test]
    fn dangling_references_are_rejected() {
        let kc = Kubeconfig::parse("current-context: missing\n").unwrap();
        assert!(kc.rest_config(Path::new("/k"), None).is_err());

        let kc = Kubeconfig::parse(
            "current-context: a\ncontexts:\n- name: a\n  context: {cluster: gone, user: u}\n",
        )
        .unwrap();
        let err = kc.rest_config(Path::new("/k"), None).unwrap_err();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn bad_base64_is_rejected() {
        let yaml = r#"
current-context: a
clusters:
- name: a
  cluster: {server: "https://a", certificate-authority-data: "%%%"}
contexts:
- name: a
  context: {cluster: a}
"#;
        let kc = Kubeconfig::parse(yaml).unwrap();
        assert!(matches!(
            kc.rest_config(Path::new("/k"), None),
            Err(ClientError::ConfigLoad { .. })
        ));
    }

    #[test]
    fn empty_file_parses_to_empty_config() {
        let kc = Kubeconfig::parse("  \n").unwrap();
        assert!(kc.clusters.is_empty());
        assert!(kc.rest_config(Path::new("/k"), None).unwrap().host.is_empty());
    }

    #[test]
    fn malformed_yaml_is_rejected() {
        let file = write_kubeconfig("clusters: {not: [a list");
        assert!(matches!(
            Kubeconfig::load(file.path()),
            Err(ClientError::ConfigLoad { .. })
        ));
    }
}
