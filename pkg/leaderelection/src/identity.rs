//! Who we are in the election, and which namespace the lock lives in.

use std::path::Path;
use uuid::Uuid;

use crate::error::ElectionError;

/// Produces the holder identity written into the lock.
pub trait IdentityGenerator: Send + Sync {
    fn identity(&self) -> Result<String, ElectionError>;
}

/// `<hostname>_<uuid>`: the uuid keeps two processes on one host apart.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostnameIdentity;

impl IdentityGenerator for HostnameIdentity {
    fn identity(&self) -> Result<String, ElectionError> {
        let hostname = nix::unistd::gethostname()
            .map_err(|e| ElectionError::HostnameUnavailable(e.to_string()))?
            .into_string()
            .map_err(|raw| {
                ElectionError::HostnameUnavailable(format!("hostname {:?} is not UTF-8", raw))
            })?;
        if hostname.is_empty() {
            return Err(ElectionError::HostnameUnavailable(
                "hostname is empty".to_string(),
            ));
        }
        Ok(format!("{}_{}", hostname, Uuid::new_v4()))
    }
}

/// Always returns the same identity.
#[derive(Debug, Clone)]
pub struct FixedIdentity(pub String);

impl IdentityGenerator for FixedIdentity {
    fn identity(&self) -> Result<String, ElectionError> {
        Ok(self.0.clone())
    }
}

/// Read the namespace the pod runs in. Only works in-cluster; there is no fallback.
pub fn in_cluster_namespace(path: &Path) -> Result<String, ElectionError> {
    let namespace = match std::fs::read_to_string(path) {
        Ok(ns) => ns,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ElectionError::NamespaceUndiscoverable(
                "not running in-cluster, please specify the lock object namespace".to_string(),
            ));
        }
        Err(e) => {
            return Err(ElectionError::NamespaceUndiscoverable(format!(
                "error reading namespace file {}: {}",
                path.display(),
                e
            )));
        }
    };
    let namespace = namespace.trim();
    if namespace.is_empty() {
        return Err(ElectionError::NamespaceUndiscoverable(format!(
            "namespace file {} is empty",
            path.display()
        )));
    }
    Ok(namespace.to_string())
}
