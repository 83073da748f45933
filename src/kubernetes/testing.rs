// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! In-memory cluster used by unit tests.

use async_trait::async_trait;
use kube::config::Kubeconfig;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::backend::{BackendFactory, ClusterBackend, DeleteOptions, ListOptions, RawList};
use super::discovery::{ClusterVersion, ResourceSchema};
use crate::error::{Error, Result};
use crate::query::path::lookup;

type ObjectKey = (String, String, String);

/// Fake cluster keyed by (plural, namespace, name)
pub struct FakeBackend {
    objects: Mutex<BTreeMap<ObjectKey, Value>>,
    version: Option<ClusterVersion>,
    discovered: Vec<ResourceSchema>,
    failing_lists: Mutex<Vec<String>>,
    pub version_calls: AtomicUsize,
    pub discover_calls: AtomicUsize,
    pub deletes: Mutex<Vec<(String, String)>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            version: Some(ClusterVersion::new(1, 27)),
            discovered: vec![],
            failing_lists: Mutex::new(vec![]),
            version_calls: AtomicUsize::new(0),
            discover_calls: AtomicUsize::new(0),
            deletes: Mutex::new(vec![]),
        }
    }

    /// `None` makes the version endpoint fail
    pub fn with_version(mut self, version: Option<ClusterVersion>) -> Self {
        self.version = version;
        self
    }

    pub fn with_discovered(mut self, schema: ResourceSchema) -> Self {
        self.discovered.push(schema);
        self
    }

    /// Store an object as the server would (without apiVersion/kind)
    pub fn insert(&self, plural: &str, object: Value) {
        let ns = object["metadata"]["namespace"].as_str().unwrap_or("").to_string();
        let name = object["metadata"]["name"].as_str().unwrap_or("").to_string();
        let mut stripped = object;
        if let Value::Object(ref mut map) = stripped {
            map.remove("apiVersion");
            map.remove("kind");
        }
        self.objects
            .lock()
            .unwrap()
            .insert((plural.to_string(), ns, name), stripped);
    }

    pub fn remove(&self, plural: &str, namespace: &str, name: &str) {
        self.objects.lock().unwrap().remove(&(
            plural.to_string(),
            namespace.to_string(),
            name.to_string(),
        ));
    }

    /// Make every list of `plural` fail with a 500
    pub fn fail_lists_of(&self, plural: &str) {
        self.failing_lists.lock().unwrap().push(plural.to_string());
    }

    pub fn count(&self, plural: &str) -> usize {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(p, _, _)| p == plural)
            .count()
    }

    fn not_found(schema: &ResourceSchema, name: &str) -> Error {
        Error::provider(
            404,
            "NotFound",
            format!("{} \"{}\" not found", schema.plural, name),
        )
    }
}

/// `key=value` selectors joined by commas
fn selector_matches(record: &Value, selector: &str, labels: bool) -> bool {
    selector.split(',').filter(|s| !s.is_empty()).all(|term| {
        let Some((key, value)) = term.split_once('=') else {
            return false;
        };
        let actual = if labels {
            record["metadata"]["labels"][key].as_str().map(String::from)
        } else {
            lookup(record, key).and_then(|v| v.as_str().map(String::from))
        };
        actual.as_deref() == Some(value)
    })
}

#[async_trait]
impl ClusterBackend for FakeBackend {
    async fn server_version(&self) -> Result<ClusterVersion> {
        self.version_calls.fetch_add(1, Ordering::SeqCst);
        self.version
            .ok_or_else(|| Error::provider(503, "ServiceUnavailable", "version endpoint down"))
    }

    async fn discover(&self, name: &str, kind_guess: &str) -> Result<Option<ResourceSchema>> {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .discovered
            .iter()
            .find(|s| s.plural == name || s.kind.eq_ignore_ascii_case(kind_guess))
            .cloned())
    }

    async fn get(
        &self,
        schema: &ResourceSchema,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Value> {
        let key = (
            schema.plural.clone(),
            namespace.unwrap_or("").to_string(),
            name.to_string(),
        );
        self.objects
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| Self::not_found(schema, name))
    }

    async fn list(&self, schema: &ResourceSchema, options: &ListOptions) -> Result<RawList> {
        if self.failing_lists.lock().unwrap().contains(&schema.plural) {
            return Err(Error::provider(500, "InternalError", "list failed"));
        }

        let matching: Vec<Value> = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((plural, ns, _), _)| {
                plural == &schema.plural
                    && (options.all_namespaces
                        || !schema.takes_namespace()
                        || (schema.scope_inferred && options.namespace.is_none())
                        || options.namespace.as_deref() == Some(ns.as_str()))
            })
            .map(|(_, v)| v.clone())
            .filter(|v| {
                options
                    .label_selector
                    .as_deref()
                    .is_none_or(|s| selector_matches(v, s, true))
                    && options
                        .field_selector
                        .as_deref()
                        .is_none_or(|s| selector_matches(v, s, false))
            })
            .collect();

        // Continue tokens are plain offsets
        let offset: usize = options
            .continue_token
            .as_deref()
            .and_then(|t| t.parse().ok())
            .unwrap_or(0);
        let limit = options.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        let total = matching.len();
        let items: Vec<Value> = matching.into_iter().skip(offset).take(limit).collect();
        let next = offset + items.len();

        Ok(RawList {
            items,
            continue_token: (next < total).then(|| next.to_string()),
            remaining_item_count: (next < total).then(|| (total - next) as i64),
        })
    }

    async fn create(
        &self,
        schema: &ResourceSchema,
        namespace: Option<&str>,
        body: Value,
    ) -> Result<Value> {
        let name = body["metadata"]["name"].as_str().unwrap_or("").to_string();
        let key = (
            schema.plural.clone(),
            namespace.unwrap_or("").to_string(),
            name.clone(),
        );
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) {
            return Err(Error::provider(
                409,
                "AlreadyExists",
                format!("{} \"{}\" already exists", schema.plural, name),
            ));
        }
        let mut stored = body;
        if let Some(ns) = namespace {
            stored["metadata"]["namespace"] = json!(ns);
        }
        objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn replace(
        &self,
        schema: &ResourceSchema,
        namespace: Option<&str>,
        name: &str,
        body: Value,
    ) -> Result<Value> {
        let key = (
            schema.plural.clone(),
            namespace.unwrap_or("").to_string(),
            name.to_string(),
        );
        let mut objects = self.objects.lock().unwrap();
        if !objects.contains_key(&key) {
            return Err(Self::not_found(schema, name));
        }
        objects.insert(key, body.clone());
        Ok(body)
    }

    async fn delete(
        &self,
        schema: &ResourceSchema,
        namespace: Option<&str>,
        name: &str,
        options: &DeleteOptions,
    ) -> Result<()> {
        let key = (
            schema.plural.clone(),
            namespace.unwrap_or("").to_string(),
            name.to_string(),
        );
        let mut objects = self.objects.lock().unwrap();
        if !objects.contains_key(&key) {
            return Err(Self::not_found(schema, name));
        }
        if !options.dry_run {
            objects.remove(&key);
            self.deletes
                .lock()
                .unwrap()
                .push((schema.plural.clone(), name.to_string()));
        }
        Ok(())
    }
}

/// Which credential source a factory call came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactoryCall {
    Kubeconfig { context: Option<String> },
    InCluster,
}

/// Factory handing out a shared `FakeBackend`, with switchable tiers
pub struct FakeFactory {
    pub backend: Arc<FakeBackend>,
    pub kubeconfig_fails: bool,
    pub in_cluster_fails: bool,
    pub calls: Mutex<Vec<FactoryCall>>,
}

impl FakeFactory {
    pub fn new(backend: Arc<FakeBackend>) -> Self {
        Self {
            backend,
            kubeconfig_fails: false,
            in_cluster_fails: true,
            calls: Mutex::new(vec![]),
        }
    }

    pub fn calls(&self) -> Vec<FactoryCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackendFactory for FakeFactory {
    async fn from_kubeconfig(
        &self,
        _kubeconfig: Kubeconfig,
        context: Option<String>,
    ) -> anyhow::Result<Arc<dyn ClusterBackend>> {
        self.calls
            .lock()
            .unwrap()
            .push(FactoryCall::Kubeconfig { context });
        if self.kubeconfig_fails {
            anyhow::bail!("kubeconfig rejected");
        }
        Ok(self.backend.clone())
    }

    async fn in_cluster(&self) -> anyhow::Result<Arc<dyn ClusterBackend>> {
        self.calls.lock().unwrap().push(FactoryCall::InCluster);
        if self.in_cluster_fails {
            anyhow::bail!("not running in a cluster");
        }
        Ok(self.backend.clone())
    }
}

/// Minimal kubeconfig with an admin and a viewer context
pub const SAMPLE_KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
current-context: viewer
clusters:
- name: prod
  cluster:
    server: https://127.0.0.1:6443
users:
- name: kubernetes-admin
  user:
    token: admin-token
- name: viewer
  user:
    token: viewer-token
contexts:
- name: viewer
  context:
    cluster: prod
    user: viewer
- name: prod-admin
  context:
    cluster: prod
    user: kubernetes-admin
"#;

pub fn pod(namespace: &str, name: &str, phase: &str, labels: Value) -> Value {
    json!({
        "metadata": {"name": name, "namespace": namespace, "labels": labels},
        "spec": {"containers": [{"name": "main", "image": "busybox"}]},
        "status": {"phase": phase}
    })
}
