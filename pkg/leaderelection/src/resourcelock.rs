//! Resource locks: where the election record is stored.
//!
//! `configmaps` and `endpoints` locks keep the record as JSON in the
//! `control-plane.alpha.kubernetes.io/leader` annotation; `leases` locks use
//! the fields of a `coordination.k8s.io/v1` Lease.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use pkg_client::object::ObjectRef;
use pkg_client::ObjectApi;
use pkg_constants::election::{
    CONFIGMAPS_RESOURCE_LOCK, ENDPOINTS_RESOURCE_LOCK, LEADER_ANNOTATION_KEY,
    LEASES_RESOURCE_LOCK,
};
use pkg_types::election::LeaderElectionRecord;
use pkg_types::validate::{validate_name, validate_object_name};
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::error::ElectionError;
use crate::events::EventRecorder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKind {
    ConfigMaps,
    Endpoints,
    Leases,
}

impl LockKind {
    fn api_prefix(self) -> &'static str {
        match self {
            LockKind::ConfigMaps | LockKind::Endpoints => "/api/v1",
            LockKind::Leases => "/apis/coordination.k8s.io/v1",
        }
    }

    fn api_version(self) -> &'static str {
        match self {
            LockKind::ConfigMaps | LockKind::Endpoints => "v1",
            LockKind::Leases => "coordination.k8s.io/v1",
        }
    }

    fn kind(self) -> &'static str {
        match self {
            LockKind::ConfigMaps => "ConfigMap",
            LockKind::Endpoints => "Endpoints",
            LockKind::Leases => "Lease",
        }
    }

    /// Plural resource name, also the `--leader-elect-resource-lock` value.
    pub fn resource(self) -> &'static str {
        match self {
            LockKind::ConfigMaps => CONFIGMAPS_RESOURCE_LOCK,
            LockKind::Endpoints => ENDPOINTS_RESOURCE_LOCK,
            LockKind::Leases => LEASES_RESOURCE_LOCK,
        }
    }
}

impl FromStr for LockKind {
    type Err = ElectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            CONFIGMAPS_RESOURCE_LOCK => Ok(LockKind::ConfigMaps),
            ENDPOINTS_RESOURCE_LOCK => Ok(LockKind::Endpoints),
            LEASES_RESOURCE_LOCK => Ok(LockKind::Leases),
            other => Err(ElectionError::LockConstruction(format!(
                "invalid lock-type {:?}, supported: {}, {}, {}",
                other, CONFIGMAPS_RESOURCE_LOCK, ENDPOINTS_RESOURCE_LOCK, LEASES_RESOURCE_LOCK
            ))),
        }
    }
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource())
    }
}

/// Which object to lock and who we are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockDescriptor {
    pub kind: LockKind,
    pub namespace: String,
    pub name: String,
    pub identity: String,
}

/// Storage for a [`LeaderElectionRecord`] with compare-and-swap updates.
#[async_trait]
pub trait ResourceLock: Send + Sync {
    /// Current record, `None` if the lock object does not exist.
    async fn get(&self) -> Result<Option<LeaderElectionRecord>, ElectionError>;

    /// Create the lock object holding `record`.
    async fn create(&self, record: &LeaderElectionRecord) -> Result<(), ElectionError>;

    /// Replace the record; fails with a conflict if the object changed since the last get/create/update.
    async fn update(&self, record: &LeaderElectionRecord) -> Result<(), ElectionError>;

    /// Report an election event against the lock.
    fn record_event(&self, message: &str);

    fn identity(&self) -> &str;

    /// `<resource>/<namespace>/<name>`.
    fn describe(&self) -> String;
}

/// A lock stored in an API object reached through [`ObjectApi`].
pub struct ObjectLock {
    descriptor: LockDescriptor,
    object: ObjectRef,
    api: Arc<dyn ObjectApi>,
    recorder: Option<Arc<dyn EventRecorder>>,
    last: Mutex<Option<Value>>,
}

/// Build a lock for the backend named `kind`. Rejects unknown kinds and invalid names.
pub fn new_resource_lock(
    kind: &str,
    namespace: &str,
    name: &str,
    identity: &str,
    api: Arc<dyn ObjectApi>,
    recorder: Option<Arc<dyn EventRecorder>>,
) -> Result<Arc<dyn ResourceLock>, ElectionError> {
    let kind: LockKind = kind.parse()?;
    validate_name(namespace)
        .map_err(|e| ElectionError::LockConstruction(format!("namespace: {}", e)))?;
    validate_object_name(name)
        .map_err(|e| ElectionError::LockConstruction(format!("name: {}", e)))?;
    if identity.is_empty() {
        return Err(ElectionError::LockConstruction(
            "lock identity is empty".to_string(),
        ));
    }

    let descriptor = LockDescriptor {
        kind,
        namespace: namespace.to_string(),
        name: name.to_string(),
        identity: identity.to_string(),
    };
    Ok(Arc::new(ObjectLock::new(descriptor, api, recorder)))
}

fn micro_time(t: &Option<DateTime<Utc>>) -> Value {
    match t {
        Some(t) => json!(t.to_rfc3339_opts(SecondsFormat::Micros, true)),
        None => Value::Null,
    }
}

fn parse_time(v: Option<&Value>) -> Option<DateTime<Utc>> {
    v.and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

impl ObjectLock {
    pub fn new(
        descriptor: LockDescriptor,
        api: Arc<dyn ObjectApi>,
        recorder: Option<Arc<dyn EventRecorder>>,
    ) -> Self {
        let object = ObjectRef::new(
            descriptor.kind.api_prefix(),
            descriptor.kind.resource(),
            descriptor.namespace.clone(),
            descriptor.name.clone(),
        );
        Self {
            descriptor,
            object,
            api,
            recorder,
            last: Mutex::new(None),
        }
    }

    fn remember(&self, object: Option<Value>) {
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = object;
    }

    fn last(&self) -> Option<Value> {
        self.last.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn malformed(&self, reason: impl ToString) -> ElectionError {
        ElectionError::MalformedRecord {
            lock: self.describe(),
            reason: reason.to_string(),
        }
    }

    fn decode(&self, object: &Value) -> Result<LeaderElectionRecord, ElectionError> {
        match self.descriptor.kind {
            LockKind::ConfigMaps | LockKind::Endpoints => {
                let annotation = object
                    .get("metadata")
                    .and_then(|m| m.get("annotations"))
                    .and_then(|a| a.get(LEADER_ANNOTATION_KEY))
                    .and_then(Value::as_str);
                match annotation {
                    Some(raw) => serde_json::from_str(raw).map_err(|e| self.malformed(e)),
                    None => Ok(LeaderElectionRecord::default()),
                }
            }
            LockKind::Leases => {
                let spec = object.get("spec").cloned().unwrap_or(Value::Null);
                Ok(LeaderElectionRecord {
                    holder_identity: spec
                        .get("holderIdentity")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    lease_duration_seconds: spec
                        .get("leaseDurationSeconds")
                        .and_then(Value::as_i64)
                        .unwrap_or_default(),
                    acquire_time: parse_time(spec.get("acquireTime")),
                    renew_time: parse_time(spec.get("renewTime")),
                    leader_transitions: spec
                        .get("leaseTransitions")
                        .and_then(Value::as_i64)
                        .unwrap_or_default(),
                })
            }
        }
    }

    /// Write `record` into `object` in the shape this lock kind uses.
    fn encode(&self, object: &mut Value, record: &LeaderElectionRecord) -> Result<(), ElectionError> {
        match self.descriptor.kind {
            LockKind::ConfigMaps | LockKind::Endpoints => {
                let raw = serde_json::to_string(record).map_err(|e| self.malformed(e))?;
                if !object["metadata"]["annotations"].is_object() {
                    object["metadata"]["annotations"] = json!({});
                }
                object["metadata"]["annotations"][LEADER_ANNOTATION_KEY] = json!(raw);
            }
            LockKind::Leases => {
                let holder = if record.holder_identity.is_empty() {
                    Value::Null
                } else {
                    json!(record.holder_identity)
                };
                object["spec"] = json!({
                    "holderIdentity": holder,
                    "leaseDurationSeconds": record.lease_duration_seconds,
                    "acquireTime": micro_time(&record.acquire_time),
                    "renewTime": micro_time(&record.renew_time),
                    "leaseTransitions": record.leader_transitions,
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceLock for ObjectLock {
    async fn get(&self) -> Result<Option<LeaderElectionRecord>, ElectionError> {
        match self.api.get(&self.object).await? {
            Some(object) => {
                let record = self.decode(&object)?;
                self.remember(Some(object));
                Ok(Some(record))
            }
            None => {
                self.remember(None);
                Ok(None)
            }
        }
    }

    async fn create(&self, record: &LeaderElectionRecord) -> Result<(), ElectionError> {
        let mut object = json!({
            "apiVersion": self.descriptor.kind.api_version(),
            "kind": self.descriptor.kind.kind(),
            "metadata": {
                "name": self.descriptor.name,
                "namespace": self.descriptor.namespace,
            },
        });
        self.encode(&mut object, record)?;
        let stored = self.api.create(&self.object, &object).await?;
        self.remember(Some(stored));
        Ok(())
    }

    async fn update(&self, record: &LeaderElectionRecord) -> Result<(), ElectionError> {
        let mut object = self
            .last()
            .ok_or_else(|| ElectionError::LockNotInitialized(self.describe()))?;
        self.encode(&mut object, record)?;
        let stored = self.api.replace(&self.object, &object).await?;
        self.remember(Some(stored));
        Ok(())
    }

    fn record_event(&self, message: &str) {
        if let Some(recorder) = &self.recorder {
            recorder.record(
                &self.describe(),
                &format!("{} {}", self.descriptor.identity, message),
            );
        }
    }

    fn identity(&self) -> &str {
        &self.descriptor.identity
    }

    fn describe(&self) -> String {
        self.object.to_string()
    }
}
