//! In-memory stand-ins for the cluster, used by unit and scenario tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use tokio::time::Duration;

use crate::api::v1alpha1::{ManagementIngress, ManagementIngressStatus};
use crate::util::{
    clock::Clock,
    discovery::{ApiServerAddress, ClusterDiscovery},
    errors::StdError,
    store::{object_key, CreateOutcome, Object, ObjectStore},
};

type Key = (String, String, String);

/// Calls made against one kind.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counters {
    pub create_attempts: usize,
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
    pub status_writes: usize,
}

#[derive(Default)]
struct Inner {
    objects: BTreeMap<Key, Value>,
    counters: BTreeMap<String, Counters>,
    version: u64,
    /// Keys whose create reports a conflict although nothing is stored.
    vanished: BTreeSet<Key>,
}

impl Inner {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }

    fn count(&mut self, kind: &str) -> &mut Counters {
        self.counters.entry(kind.to_string()).or_default()
    }
}

/// `ObjectStore` keeping objects as JSON, the way the API server would hand them back.
#[derive(Default)]
pub struct FakeStore {
    inner: Mutex<Inner>,
}

fn key_of<K: Object>(namespace: &str, name: &str) -> Key {
    (K::kind(&()).to_string(), namespace.to_string(), name.to_string())
}

fn labels_match(value: &Value, selector: &str) -> bool {
    selector.split(',').filter(|s| !s.is_empty()).all(|term| {
        let (k, v) = term.split_once('=').unwrap_or((term, ""));
        value
            .pointer("/metadata/labels")
            .and_then(|labels| labels.get(k))
            .and_then(Value::as_str)
            == Some(v)
    })
}

impl FakeStore {
    /// Seeds an object without counting it as a create.
    pub fn insert<K: Object>(&self, obj: K) {
        let (namespace, name) = object_key(&obj).unwrap();
        let mut value = serde_json::to_value(&obj).unwrap();
        let mut inner = self.inner.lock().unwrap();
        value["metadata"]["resourceVersion"] = json!(inner.next_version());
        value["metadata"]["uid"] = json!(format!("uid-{name}"));
        inner.objects.insert(key_of::<K>(&namespace, &name), value);
    }

    /// Makes create report the name as taken while get keeps returning nothing,
    /// as when the object is deleted between the two calls.
    pub fn vanish_after_conflict<K: Object>(&self, namespace: &str, name: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.vanished.insert(key_of::<K>(namespace, name));
    }

    pub fn fetch<K: Object>(&self, namespace: &str, name: &str) -> Option<K> {
        let inner = self.inner.lock().unwrap();
        inner
            .objects
            .get(&key_of::<K>(namespace, name))
            .map(|v| serde_json::from_value(v.clone()).unwrap())
    }

    pub fn counters(&self, kind: &str) -> Counters {
        self.inner.lock().unwrap().counters.get(kind).copied().unwrap_or_default()
    }

    /// Updates across every kind.
    pub fn total_updates(&self) -> usize {
        self.inner.lock().unwrap().counters.values().map(|c| c.updates).sum()
    }

    pub fn total_creates(&self) -> usize {
        self.inner.lock().unwrap().counters.values().map(|c| c.creates).sum()
    }

    pub fn kind_count(&self, kind: &str) -> usize {
        self.inner.lock().unwrap().objects.keys().filter(|(k, _, _)| k == kind).count()
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn get<K: Object>(&self, namespace: &str, name: &str) -> Result<Option<K>, StdError> {
        let inner = self.inner.lock().unwrap();
        inner
            .objects
            .get(&key_of::<K>(namespace, name))
            .map(|v| serde_json::from_value(v.clone()).map_err(StdError::from))
            .transpose()
    }

    async fn list<K: Object>(&self, namespace: &str, labels: &str) -> Result<Vec<K>, StdError> {
        let kind = K::kind(&()).to_string();
        let inner = self.inner.lock().unwrap();
        inner
            .objects
            .iter()
            .filter(|((k, ns, _), v)| *k == kind && ns == namespace && labels_match(v, labels))
            .map(|(_, v)| serde_json::from_value(v.clone()).map_err(StdError::from))
            .collect()
    }

    async fn create<K: Object>(&self, obj: &K) -> Result<CreateOutcome, StdError> {
        let (namespace, name) = object_key(obj)?;
        let kind = K::kind(&()).to_string();
        let key = key_of::<K>(&namespace, &name);
        let mut inner = self.inner.lock().unwrap();
        inner.count(&kind).create_attempts += 1;
        if inner.objects.contains_key(&key) || inner.vanished.contains(&key) {
            return Ok(CreateOutcome::AlreadyExists);
        }

        let mut value = serde_json::to_value(obj)?;
        value["metadata"]["resourceVersion"] = json!(inner.next_version());
        value["metadata"]["uid"] = json!(format!("uid-{name}"));
        if kind == "Service" && value.pointer("/spec/clusterIP").is_none() {
            value["spec"]["clusterIP"] = json!("10.0.0.10");
        }
        inner.objects.insert(key, value);
        inner.count(&kind).creates += 1;
        Ok(CreateOutcome::New)
    }

    async fn update<K: Object>(&self, obj: &K) -> Result<K, StdError> {
        let (namespace, name) = object_key(obj)?;
        let kind = K::kind(&()).to_string();
        let key = key_of::<K>(&namespace, &name);
        let mut inner = self.inner.lock().unwrap();

        let stored_version = inner
            .objects
            .get(&key)
            .and_then(|v| v.pointer("/metadata/resourceVersion").cloned())
            .ok_or_else(|| StdError::NotFound {
                kind: kind.clone(),
                name: name.clone(),
            })?;
        if obj.meta().resource_version.as_deref() != stored_version.as_str() {
            return Err(StdError::InvalidArgument(format!("{kind} '{name}' was modified, stale resourceVersion")));
        }

        let mut value = serde_json::to_value(obj)?;
        value["metadata"]["resourceVersion"] = json!(inner.next_version());
        inner.objects.insert(key, value.clone());
        inner.count(&kind).updates += 1;
        Ok(serde_json::from_value(value)?)
    }

    async fn delete<K: Object>(&self, namespace: &str, name: &str) -> Result<(), StdError> {
        let kind = K::kind(&()).to_string();
        let mut inner = self.inner.lock().unwrap();
        if inner.objects.remove(&key_of::<K>(namespace, name)).is_some() {
            inner.count(&kind).deletes += 1;
        }
        Ok(())
    }

    async fn update_status(
        &self,
        ingress: &ManagementIngress,
        status: &ManagementIngressStatus,
    ) -> Result<(), StdError> {
        let (namespace, name) = object_key(ingress)?;
        let key = key_of::<ManagementIngress>(&namespace, &name);
        let status = serde_json::to_value(status)?;
        let mut inner = self.inner.lock().unwrap();
        let version = inner.next_version();
        let stored = inner.objects.get_mut(&key).ok_or_else(|| StdError::NotFound {
            kind: "ManagementIngress".to_string(),
            name: name.clone(),
        })?;
        stored["status"] = status;
        stored["metadata"]["resourceVersion"] = json!(version);
        inner.count("ManagementIngress").status_writes += 1;
        Ok(())
    }
}

/// Discovery answers; `None` makes the lookup fail.
pub struct FakeDiscovery {
    pub base_domain: Option<String>,
    pub cluster_domain: Option<String>,
    pub api_server: Option<ApiServerAddress>,
}

impl Default for FakeDiscovery {
    fn default() -> Self {
        Self {
            base_domain: Some("apps.example.com".to_string()),
            cluster_domain: Some("cluster.local".to_string()),
            api_server: Some(ApiServerAddress {
                host: "api.example.com".to_string(),
                port: "6443".to_string(),
            }),
        }
    }
}

fn answer<T: Clone>(value: &Option<T>, what: &str) -> Result<T, StdError> {
    value.clone().ok_or_else(|| StdError::Discovery(format!("{what} not found")))
}

#[async_trait]
impl ClusterDiscovery for FakeDiscovery {
    async fn route_base_domain(&self) -> Result<String, StdError> {
        answer(&self.base_domain, "route base domain")
    }

    async fn cluster_domain(&self) -> Result<String, StdError> {
        answer(&self.cluster_domain, "cluster domain")
    }

    async fn console_api_server(&self) -> Result<ApiServerAddress, StdError> {
        answer(&self.api_server, "console api server")
    }
}

/// Clock whose `sleep` advances virtual time instead of waiting.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()),
        }
    }
}

impl ManualClock {
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(duration).unwrap();
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
