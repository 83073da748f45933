// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Raw cluster access.
//!
//! `ClusterBackend` is the narrow surface the rest of the crate talks to:
//! version, discovery and CRUD over untyped JSON records. `KubeBackend`
//! implements it over a kube-rs `Client`; tests use an in-memory fake.

use anyhow::Context;
use async_trait::async_trait;
use kube::api::{
    DeleteParams, DynamicObject, ListParams, ObjectList, PostParams, PropagationPolicy,
};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::Discovery;
use kube::{Api, Client, Config};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::discovery::{ClusterVersion, ResourceSchema};
use crate::error::{Error, Result};

/// Timeout for connecting to K8s API
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for reading K8s API responses
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum retry attempts for transient failures
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (doubles each retry)
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Server-side list parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub namespace: Option<String>,
    /// List across every namespace; ignored for cluster-scoped resources
    pub all_namespaces: bool,
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
    pub limit: Option<u32>,
    pub continue_token: Option<String>,
}

impl ListOptions {
    pub fn namespaced(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Default::default()
        }
    }

    pub fn all_namespaces() -> Self {
        Self {
            all_namespaces: true,
            ..Default::default()
        }
    }

    pub fn labels(mut self, selector: impl Into<String>) -> Self {
        self.label_selector = Some(selector.into());
        self
    }

    pub fn fields(mut self, selector: impl Into<String>) -> Self {
        self.field_selector = Some(selector.into());
        self
    }

    fn to_params(&self) -> ListParams {
        let mut params = ListParams::default();
        if let Some(ref label_sel) = self.label_selector {
            params = params.labels(label_sel);
        }
        if let Some(ref field_sel) = self.field_selector {
            params = params.fields(field_sel);
        }
        if let Some(limit) = self.limit {
            params = params.limit(limit);
        }
        if let Some(ref token) = self.continue_token {
            params = params.continue_token(token);
        }
        params
    }
}

/// One page of list results as returned by the server
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawList {
    pub items: Vec<Value>,
    pub continue_token: Option<String>,
    pub remaining_item_count: Option<i64>,
}

/// Garbage collection policy for dependents of a deleted object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Propagation {
    #[default]
    Background,
    Foreground,
    Orphan,
}

impl Propagation {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "background" => Some(Self::Background),
            "foreground" => Some(Self::Foreground),
            "orphan" => Some(Self::Orphan),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    pub propagation: Option<Propagation>,
    pub dry_run: bool,
}

/// Untyped access to one cluster
#[async_trait]
pub trait ClusterBackend: Send + Sync {
    async fn server_version(&self) -> Result<ClusterVersion>;

    /// Look up a resource by plural name or kind; `Ok(None)` when the cluster does not serve it
    async fn discover(&self, name: &str, kind_guess: &str) -> Result<Option<ResourceSchema>>;

    async fn get(&self, schema: &ResourceSchema, namespace: Option<&str>, name: &str)
    -> Result<Value>;

    async fn list(&self, schema: &ResourceSchema, options: &ListOptions) -> Result<RawList>;

    async fn create(
        &self,
        schema: &ResourceSchema,
        namespace: Option<&str>,
        body: Value,
    ) -> Result<Value>;

    async fn replace(
        &self,
        schema: &ResourceSchema,
        namespace: Option<&str>,
        name: &str,
        body: Value,
    ) -> Result<Value>;

    async fn delete(
        &self,
        schema: &ResourceSchema,
        namespace: Option<&str>,
        name: &str,
        options: &DeleteOptions,
    ) -> Result<()>;
}

/// Builds backends from credential sources
#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn from_kubeconfig(
        &self,
        kubeconfig: Kubeconfig,
        context: Option<String>,
    ) -> anyhow::Result<Arc<dyn ClusterBackend>>;

    async fn in_cluster(&self) -> anyhow::Result<Arc<dyn ClusterBackend>>;
}

/// Factory producing kube-rs backed clients
#[derive(Debug, Default, Clone, Copy)]
pub struct KubeBackendFactory;

#[async_trait]
impl BackendFactory for KubeBackendFactory {
    async fn from_kubeconfig(
        &self,
        kubeconfig: Kubeconfig,
        context: Option<String>,
    ) -> anyhow::Result<Arc<dyn ClusterBackend>> {
        let label = context.clone().unwrap_or_else(|| "<current>".to_string());
        let mut config = Config::from_custom_kubeconfig(
            kubeconfig,
            &KubeConfigOptions {
                context,
                ..Default::default()
            },
        )
        .await
        .with_context(|| format!("Failed to load kubeconfig for context '{}'", label))?;

        config.connect_timeout = Some(CONNECT_TIMEOUT);
        config.read_timeout = Some(READ_TIMEOUT);

        let client = Client::try_from(config)
            .with_context(|| format!("Failed to create client for context '{}'", label))?;
        Ok(Arc::new(KubeBackend::new(client)))
    }

    async fn in_cluster(&self) -> anyhow::Result<Arc<dyn ClusterBackend>> {
        let mut config = Config::incluster().context("In-cluster configuration unavailable")?;
        config.connect_timeout = Some(CONNECT_TIMEOUT);
        config.read_timeout = Some(READ_TIMEOUT);
        let client = Client::try_from(config).context("Failed to create in-cluster client")?;
        Ok(Arc::new(KubeBackend::new(client)))
    }
}

/// `ClusterBackend` over a live kube-rs client
#[derive(Clone)]
pub struct KubeBackend {
    client: Client,
}

impl KubeBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, schema: &ResourceSchema, namespace: Option<&str>) -> Api<DynamicObject> {
        let ar = schema.api_resource();
        match namespace {
            Some(ns) if schema.takes_namespace() => Api::namespaced_with(self.client.clone(), ns, &ar),
            _ => Api::all_with(self.client.clone(), &ar),
        }
    }

    /// Run a read call, retrying transient failures with exponential backoff
    async fn with_retry<T, F, Fut>(&self, op: &str, resource: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, kube::Error>>,
    {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if Self::is_retryable_error(&e) => {
                    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt);
                    warn!(
                        op = %op,
                        resource = %resource,
                        attempt = attempt + 1,
                        max_attempts = MAX_RETRIES,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Retryable error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
                Err(e) => {
                    debug!(op = %op, resource = %resource, error = %e, "Non-retryable error");
                    return Err(e.into());
                }
            }
        }

        Err(match last_error {
            Some(e) => e.into(),
            None => Error::provider(0, "ClientError", format!("{} {} failed", op, resource)),
        })
    }

    /// Check if an error is retryable (transient failures)
    fn is_retryable_error(err: &kube::Error) -> bool {
        match err {
            kube::Error::HyperError(_) => true,
            // 429 (rate limit), 503 (unavailable), 504 (timeout)
            kube::Error::Api(api_err) => matches!(api_err.code, 429 | 503 | 504),
            _ => false,
        }
    }
}

fn to_dynamic(body: Value) -> Result<DynamicObject> {
    Ok(serde_json::from_value(body)?)
}

#[async_trait]
impl ClusterBackend for KubeBackend {
    async fn server_version(&self) -> Result<ClusterVersion> {
        let info = self
            .with_retry("version", "apiserver", || self.client.apiserver_version())
            .await?;
        let raw = format!("{}.{}", info.major, info.minor);
        ClusterVersion::parse(&raw)
            .or_else(|| ClusterVersion::parse(&info.git_version))
            .ok_or_else(|| Error::provider(0, "BadVersion", format!("unparseable version '{}'", raw)))
    }

    async fn discover(&self, name: &str, kind_guess: &str) -> Result<Option<ResourceSchema>> {
        let discovery = Discovery::new(self.client.clone()).run().await?;
        for group in discovery.groups() {
            for (ar, caps) in group.recommended_resources() {
                // Skip subresources like pods/log
                if ar.plural.contains('/') {
                    continue;
                }
                if ar.plural.eq_ignore_ascii_case(name)
                    || ar.kind.eq_ignore_ascii_case(name)
                    || ar.kind.eq_ignore_ascii_case(kind_guess)
                {
                    return Ok(Some(ResourceSchema::from_discovered(&ar, &caps)));
                }
            }
        }
        Ok(None)
    }

    async fn get(
        &self,
        schema: &ResourceSchema,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Value> {
        let api = self.api(schema, namespace);
        let obj = self.with_retry("get", &schema.plural, || api.get(name)).await?;
        Ok(serde_json::to_value(obj)?)
    }

    async fn list(&self, schema: &ResourceSchema, options: &ListOptions) -> Result<RawList> {
        let namespace = if options.all_namespaces {
            None
        } else {
            options.namespace.as_deref()
        };
        let api = self.api(schema, namespace);
        let params = options.to_params();
        let list: ObjectList<DynamicObject> = self
            .with_retry("list", &schema.plural, || api.list(&params))
            .await?;

        let items = list
            .items
            .into_iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(RawList {
            items,
            continue_token: list.metadata.continue_.filter(|t| !t.is_empty()),
            remaining_item_count: list.metadata.remaining_item_count,
        })
    }

    async fn create(
        &self,
        schema: &ResourceSchema,
        namespace: Option<&str>,
        body: Value,
    ) -> Result<Value> {
        let api = self.api(schema, namespace);
        let created = api.create(&PostParams::default(), &to_dynamic(body)?).await?;
        Ok(serde_json::to_value(created)?)
    }

    async fn replace(
        &self,
        schema: &ResourceSchema,
        namespace: Option<&str>,
        name: &str,
        body: Value,
    ) -> Result<Value> {
        let api = self.api(schema, namespace);
        let replaced = api
            .replace(name, &PostParams::default(), &to_dynamic(body)?)
            .await?;
        Ok(serde_json::to_value(replaced)?)
    }

    async fn delete(
        &self,
        schema: &ResourceSchema,
        namespace: Option<&str>,
        name: &str,
        options: &DeleteOptions,
    ) -> Result<()> {
        let api = self.api(schema, namespace);
        let params = DeleteParams {
            dry_run: options.dry_run,
            propagation_policy: options.propagation.map(|p| match p {
                Propagation::Background => PropagationPolicy::Background,
                Propagation::Foreground => PropagationPolicy::Foreground,
                Propagation::Orphan => PropagationPolicy::Orphan,
            }),
            ..Default::default()
        };
        api.delete(name, &params).await?;
        Ok(())
    }
}
