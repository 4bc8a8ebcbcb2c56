use pkg_client::ClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ElectionError {
    #[error("unable to get hostname: {0}")]
    HostnameUnavailable(String),

    #[error("unable to find leader election namespace: {0}")]
    NamespaceUndiscoverable(String),

    #[error("couldn't create resource lock: {0}")]
    LockConstruction(String),

    #[error("invalid leader election policy: {0}")]
    InvalidPolicy(String),

    #[error("malformed leader election record on {lock}: {reason}")]
    MalformedRecord { lock: String, reason: String },

    #[error("lock {0} not initialized, call get or create first")]
    LockNotInitialized(String),

    #[error("leader election unhealthy: {0}")]
    Unhealthy(String),

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl ElectionError {
    /// True when the backend rejected a write because someone else got there first.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ElectionError::Client(ClientError::Conflict(_)))
    }
}
