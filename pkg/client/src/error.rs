use pkg_types::duration::DurationError;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while resolving endpoints or talking to an API server.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The kubeconfig is missing, malformed or references something that isn't there.
    #[error("failed to load kubeconfig {path:?}: {reason}")]
    ConfigLoad { path: String, reason: String },

    /// In-cluster configuration was requested outside a cluster.
    #[error("unable to load in-cluster configuration: {0}")]
    NoInClusterEnvironment(String),

    /// The timeout text is not a valid duration.
    #[error("invalid request timeout: {0}")]
    InvalidDuration(#[from] DurationError),

    /// The object changed (or already exists) on the server.
    #[error("conflict on {0}")]
    Conflict(String),

    /// The object does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// Any other non-success status from the API server.
    #[error("api error {code}: {message}")]
    Api { code: u16, message: String },

    /// The request did not complete in time.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection, TLS or decoding failure.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ClientError {
    pub(crate) fn config_load(path: impl Into<String>, reason: impl ToString) -> Self {
        ClientError::ConfigLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Transport(e.to_string())
    }
}
