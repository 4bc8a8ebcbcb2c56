//! In-process stand-in for the API server's object storage.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::error::ClientError;
use crate::object::{ObjectApi, ObjectRef, resource_version};

/// Keeps objects in a map and enforces resourceVersion compare-and-swap
/// exactly like the API server does. Used by tests and local runs.
#[derive(Default)]
pub struct MemoryObjectApi {
    objects: Mutex<HashMap<String, Value>>,
    version: AtomicU64,
    unavailable: AtomicBool,
    latency: Mutex<Duration>,
}

impl MemoryObjectApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every request fail with a transport error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every request by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap_or_else(|e| e.into_inner()) = latency;
    }

    /// Current stored copy of an object.
    pub fn snapshot(&self, object: &ObjectRef) -> Option<Value> {
        self.lock().get(&object.item_path()).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn simulate_network(&self) -> Result<(), ClientError> {
        let latency = *self.latency.lock().unwrap_or_else(|e| e.into_inner());
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("connection refused".to_string()));
        }
        Ok(())
    }

    fn stamp(&self, object: &ObjectRef, body: &Value) -> Value {
        let rv = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let mut stored = body.clone();
        if !stored.get("metadata").is_some_and(Value::is_object) {
            stored["metadata"] = json!({});
        }
        stored["metadata"]["name"] = json!(object.name);
        stored["metadata"]["namespace"] = json!(object.namespace);
        stored["metadata"]["resourceVersion"] = json!(rv.to_string());
        stored
    }
}

#[async_trait]
impl ObjectApi for MemoryObjectApi {
    async fn get(&self, object: &ObjectRef) -> Result<Option<Value>, ClientError> {
        self.simulate_network().await?;
        Ok(self.lock().get(&object.item_path()).cloned())
    }

    async fn create(&self, object: &ObjectRef, body: &Value) -> Result<Value, ClientError> {
        self.simulate_network().await?;
        let mut objects = self.lock();
        let key = object.item_path();
        if objects.contains_key(&key) {
            return Err(ClientError::Conflict(format!("{} already exists", object)));
        }
        let stored = self.stamp(object, body);
        objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn replace(&self, object: &ObjectRef, body: &Value) -> Result<Value, ClientError> {
        self.simulate_network().await?;
        let mut objects = self.lock();
        let key = object.item_path();
        let current = objects
            .get(&key)
            .ok_or_else(|| ClientError::NotFound(object.to_string()))?;
        if let Some(expected) = resource_version(body) {
            if Some(expected) != resource_version(current) {
                return Err(ClientError::Conflict(format!(
                    "{} was modified (resourceVersion {} is stale)",
                    object, expected
                )));
            }
        }
        let stored = self.stamp(object, body);
        objects.insert(key, stored.clone());
        Ok(stored)
    }
}
