//! HTTP implementation of [`ObjectApi`] on top of `reqwest`.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::object::{ObjectApi, ObjectRef};
use crate::ratelimit::RateLimiter;
use crate::rest::RestConfig;

enum Auth {
    None,
    Bearer(String),
    Basic(String, Option<String>),
}

/// A small JSON client for one API server.
pub struct KubeClient {
    http: reqwest::Client,
    base: String,
    auth: Auth,
    limiter: RateLimiter,
    timeout: Duration,
}

fn read_material(
    data: &Option<Vec<u8>>,
    file: &Option<PathBuf>,
) -> Result<Option<Vec<u8>>, ClientError> {
    if let Some(data) = data {
        return Ok(Some(data.clone()));
    }
    match file {
        Some(path) => std::fs::read(path).map(Some).map_err(|e| {
            ClientError::Transport(format!("cannot read {}: {}", path.display(), e))
        }),
        None => Ok(None),
    }
}

impl KubeClient {
    /// Build a client from a resolved endpoint. Reads certificate and token
    /// files but does not connect.
    pub fn new(config: &RestConfig) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder();
        if !config.timeout.is_zero() {
            builder = builder.timeout(config.timeout);
        }
        if let Some(agent) = &config.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        if config.tls.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(name) = &config.tls.server_name {
            warn!(
                host = %config.host,
                server_name = %name,
                "tls-server-name is not supported; the server certificate must match the host"
            );
        }
        if let Some(ca) = read_material(&config.tls.ca_data, &config.tls.ca_file)? {
            for cert in reqwest::Certificate::from_pem_bundle(&ca)? {
                builder = builder.add_root_certificate(cert);
            }
        }
        let cert = read_material(&config.tls.cert_data, &config.tls.cert_file)?;
        let key = read_material(&config.tls.key_data, &config.tls.key_file)?;
        if let (Some(mut pem), Some(key)) = (cert, key) {
            pem.push(b'\n');
            pem.extend_from_slice(&key);
            builder = builder.identity(reqwest::Identity::from_pem(&pem)?);
        }

        let auth = if let Some(token) = &config.bearer_token {
            Auth::Bearer(token.clone())
        } else if let Some(file) = &config.bearer_token_file {
            let token = std::fs::read_to_string(file).map_err(|e| {
                ClientError::Transport(format!("cannot read token {}: {}", file.display(), e))
            })?;
            Auth::Bearer(token.trim().to_string())
        } else if let Some(user) = &config.username {
            Auth::Basic(user.clone(), config.password.clone())
        } else {
            Auth::None
        };

        Ok(Self {
            http: builder.build()?,
            base: config.host.trim_end_matches('/').to_string(),
            auth,
            limiter: RateLimiter::new(config.qps, config.burst),
            timeout: config.timeout,
        })
    }

    pub fn host(&self) -> &str {
        &self.base
    }

    /// Per-request timeout this client enforces.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<(StatusCode, Value), ClientError> {
        self.limiter.acquire().await;
        let url = format!("{}{}", self.base, path);
        debug!(%method, %url, "API request");

        let mut req = self
            .http
            .request(method, &url)
            .header(reqwest::header::ACCEPT, "application/json");
        req = match &self.auth {
            Auth::None => req,
            Auth::Bearer(token) => req.bearer_auth(token),
            Auth::Basic(user, password) => req.basic_auth(user, password.as_ref()),
        };
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(|e| self.map_err(e))?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| self.map_err(e))?;
        let value = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        Ok((status, value))
    }

    fn map_err(&self, e: reqwest::Error) -> ClientError {
        if e.is_timeout() {
            ClientError::Timeout(self.timeout)
        } else {
            e.into()
        }
    }
}

fn api_error(status: StatusCode, body: &Value) -> ClientError {
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());
    ClientError::Api {
        code: status.as_u16(),
        message,
    }
}

#[async_trait]
impl ObjectApi for KubeClient {
    async fn get(&self, object: &ObjectRef) -> Result<Option<Value>, ClientError> {
        let (status, body) = self.request(Method::GET, &object.item_path(), None).await?;
        match status {
            s if s.is_success() => Ok(Some(body)),
            StatusCode::NOT_FOUND => Ok(None),
            s => Err(api_error(s, &body)),
        }
    }

    async fn create(&self, object: &ObjectRef, body: &Value) -> Result<Value, ClientError> {
        let (status, resp) = self
            .request(Method::POST, &object.collection_path(), Some(body))
            .await?;
        match status {
            s if s.is_success() => Ok(resp),
            StatusCode::CONFLICT => Err(ClientError::Conflict(object.to_string())),
            s => Err(api_error(s, &resp)),
        }
    }

    async fn replace(&self, object: &ObjectRef, body: &Value) -> Result<Value, ClientError> {
        let (status, resp) = self
            .request(Method::PUT, &object.item_path(), Some(body))
            .await?;
        match status {
            s if s.is_success() => Ok(resp),
            StatusCode::CONFLICT => Err(ClientError::Conflict(object.to_string())),
            StatusCode::NOT_FOUND => Err(ClientError::NotFound(object.to_string())),
            s => Err(api_error(s, &resp)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve exactly one canned HTTP response and hand back the request line.
    async fn one_shot_server(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = sock.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            sock.write_all(response.as_bytes()).await.unwrap();
            request
        });
        (addr, handle)
    }

    fn config(host: String) -> RestConfig {
        RestConfig {
            host,
            bearer_token: Some("tok".to_string()),
            user_agent: Some("resource-syncer-leader-election".to_string()),
            timeout: Duration::from_secs(5),
            qps: 10.0,
            burst: 10,
            ..Default::default()
        }
    }

    fn lease() -> ObjectRef {
        ObjectRef::new("/apis/coordination.k8s.io/v1", "leases", "ns", "lock")
    }

    #[test]
    fn keeps_configured_timeout() {
        let client = KubeClient::new(&config("https://a/".to_string())).unwrap();
        assert_eq!(client.timeout(), Duration::from_secs(5));
        assert_eq!(client.host(), "https://a");
    }

    #[tokio::test]
    async fn not_found_is_none() {
        let (addr, server) = one_shot_server("404 Not Found", r#"{"message":"nope"}"#).await;
        let client = KubeClient::new(&config(addr)).unwrap();
        assert!(client.get(&lease()).await.unwrap().is_none());

        let request = server.await.unwrap();
        assert!(request.starts_with(
            "GET /apis/coordination.k8s.io/v1/namespaces/ns/leases/lock HTTP/1.1"
        ));
        assert!(request.to_lowercase().contains("authorization: bearer tok"));
        assert!(request.contains("resource-syncer-leader-election"));
    }

    #[tokio::test]
    async fn server_name_does_not_change_the_target() {
        let (addr, server) = one_shot_server("404 Not Found", "").await;
        let mut cfg = config(addr);
        cfg.tls.server_name = Some("kubernetes.default.svc".to_string());
        let client = KubeClient::new(&cfg).unwrap();
        assert!(client.get(&lease()).await.unwrap().is_none());

        let request = server.await.unwrap();
        assert!(!request.contains("kubernetes.default.svc"));
    }

    #[tokio::test]
    async fn conflict_maps_to_conflict() {
        let (addr, _server) = one_shot_server("409 Conflict", r#"{"message":"stale"}"#).await;
        let client = KubeClient::new(&config(addr)).unwrap();
        let err = client.replace(&lease(), &json!({})).await.unwrap_err();
        assert!(matches!(err, ClientError::Conflict(_)));
    }

    #[tokio::test]
    async fn other_statuses_carry_the_message() {
        let (addr, _server) = one_shot_server("403 Forbidden", r#"{"message":"forbidden"}"#).await;
        let client = KubeClient::new(&config(addr)).unwrap();
        match client.create(&lease(), &json!({})).await.unwrap_err() {
            ClientError::Api { code, message } => {
                assert_eq!(code, 403);
                assert_eq!(message, "forbidden");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
