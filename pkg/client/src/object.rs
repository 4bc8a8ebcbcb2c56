use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

use crate::error::ClientError;

/// Location of a namespaced API object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    /// API group prefix, e.g. `/api/v1` or `/apis/coordination.k8s.io/v1`.
    pub api_prefix: &'static str,
    /// Plural resource name, e.g. `configmaps`.
    pub resource: &'static str,
    pub namespace: String,
    pub name: String,
}

impl ObjectRef {
    pub fn new(
        api_prefix: &'static str,
        resource: &'static str,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_prefix,
            resource,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Path of the resource collection the object lives in.
    pub fn collection_path(&self) -> String {
        format!(
            "{}/namespaces/{}/{}",
            self.api_prefix, self.namespace, self.resource
        )
    }

    /// Path of the object itself.
    pub fn item_path(&self) -> String {
        format!("{}/{}", self.collection_path(), self.name)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.resource, self.namespace, self.name)
    }
}

/// Raw JSON access to API objects with optimistic concurrency.
///
/// `replace` must fail with [`ClientError::Conflict`] when the body's
/// `metadata.resourceVersion` no longer matches the stored object, and
/// `create` must fail the same way when the object already exists. Lock
/// correctness rests entirely on these two guarantees.
#[async_trait]
pub trait ObjectApi: Send + Sync {
    /// Fetch an object, `None` if it does not exist.
    async fn get(&self, object: &ObjectRef) -> Result<Option<Value>, ClientError>;

    /// Create an object and return the stored version.
    async fn create(&self, object: &ObjectRef, body: &Value) -> Result<Value, ClientError>;

    /// Compare-and-swap update; returns the stored version.
    async fn replace(&self, object: &ObjectRef, body: &Value) -> Result<Value, ClientError>;
}

/// `metadata.resourceVersion` of an object, if any.
pub fn resource_version(object: &Value) -> Option<&str> {
    object
        .get("metadata")
        .and_then(|m| m.get("resourceVersion"))
        .and_then(Value::as_str)
}
