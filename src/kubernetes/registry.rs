// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Cluster id -> ready, credentialed connection.
//!
//! Connections are created on first use and cached by cluster id. A cached
//! connection is dropped when the cluster record's credential fields change
//! or when `invalidate` is called.

use anyhow::Context;
use kube::config::Kubeconfig;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};

use super::backend::{BackendFactory, ClusterBackend};
use super::cache::{SchemaCache, atomic_write, unique_filename};
use super::client::ResourceClient;
use super::context_matcher::ContextMatcher;
use super::discovery::{self, ClusterVersion, ResourceSchema};
use crate::error::{Error, Result};
use crate::store::{ClusterRecord, Store};

/// Credential fields a connection was built from
#[derive(Debug, Clone, PartialEq, Eq)]
struct CredentialFingerprint {
    kubeconfig_path: Option<String>,
    kubeconfig_content: Option<String>,
    context_name: Option<String>,
}

impl From<&ClusterRecord> for CredentialFingerprint {
    fn from(record: &ClusterRecord) -> Self {
        Self {
            kubeconfig_path: record.kubeconfig_path.clone(),
            kubeconfig_content: record.kubeconfig_content.clone(),
            context_name: record.context_name.clone(),
        }
    }
}

/// Live handle to one cluster with its version and schema caches
pub struct ClusterConnection {
    cluster_id: String,
    backend: Arc<dyn ClusterBackend>,
    baseline: ClusterVersion,
    version: OnceCell<ClusterVersion>,
    schemas: SchemaCache,
}

impl ClusterConnection {
    pub fn new(
        cluster_id: impl Into<String>,
        backend: Arc<dyn ClusterBackend>,
        baseline: ClusterVersion,
    ) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            backend,
            baseline,
            version: OnceCell::new(),
            schemas: SchemaCache::default(),
        }
    }

    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    pub fn backend(&self) -> Arc<dyn ClusterBackend> {
        self.backend.clone()
    }

    /// Server major.minor, fetched once; the baseline stands in when the fetch fails
    pub async fn cluster_version(&self) -> ClusterVersion {
        *self
            .version
            .get_or_init(|| async {
                match self.backend.server_version().await {
                    Ok(version) => {
                        debug!(cluster_id = %self.cluster_id, version = %version, "Fetched cluster version");
                        version
                    }
                    Err(e) => {
                        warn!(
                            cluster_id = %self.cluster_id,
                            baseline = %self.baseline,
                            error = %e,
                            "Could not fetch cluster version, assuming baseline"
                        );
                        self.baseline
                    }
                }
            })
            .await
    }

    pub async fn schema(&self, resource_type: &str, explicit: Option<&str>) -> Result<ResourceSchema> {
        if let Some(schema) = self.schemas.get(resource_type, explicit).await {
            return Ok(schema);
        }
        let version = self.cluster_version().await;
        let schema =
            discovery::resolve(resource_type, version, explicit, self.backend.as_ref()).await?;
        self.schemas
            .insert(resource_type, explicit, schema.clone())
            .await;
        Ok(schema)
    }

    /// Client for `resource_type`, resolving its schema if needed
    pub async fn resources(
        &self,
        resource_type: &str,
        explicit: Option<&str>,
    ) -> Result<ResourceClient> {
        let schema = self.schema(resource_type, explicit).await?;
        Ok(ResourceClient::new(schema, self.backend.clone()))
    }

    /// Forget resolved schemas, e.g. after CRDs were installed
    pub async fn invalidate_schemas(&self) {
        self.schemas.clear().await;
    }
}

struct CachedConnection {
    credentials: CredentialFingerprint,
    connection: Arc<ClusterConnection>,
}

/// Registry settings
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Where inline credentials are materialized as files
    pub credential_dir: PathBuf,
    pub baseline_version: ClusterVersion,
    pub allow_in_cluster: bool,
}

pub struct ConnectionRegistry {
    store: Arc<dyn Store>,
    factory: Arc<dyn BackendFactory>,
    options: RegistryOptions,
    connections: RwLock<HashMap<String, CachedConnection>>,
}

impl ConnectionRegistry {
    pub fn new(
        store: Arc<dyn Store>,
        factory: Arc<dyn BackendFactory>,
        options: RegistryOptions,
    ) -> Self {
        Self {
            store,
            factory,
            options,
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    /// Resolve a cluster id to a connection, reusing the cached one when credentials are unchanged
    pub async fn connect(&self, cluster_id: &str) -> Result<Arc<ClusterConnection>> {
        let record = self
            .store
            .get_cluster(cluster_id)
            .await?
            .ok_or_else(|| Error::InvalidClusterState {
                cluster_id: cluster_id.to_string(),
                reason: "no such cluster".to_string(),
            })?;

        if !record.status.is_connectable() {
            return Err(Error::InvalidClusterState {
                cluster_id: cluster_id.to_string(),
                reason: format!("status is {}", record.status),
            });
        }

        let fingerprint = CredentialFingerprint::from(&record);
        {
            let connections = self.connections.read().await;
            if let Some(cached) = connections.get(cluster_id)
                && cached.credentials == fingerprint
            {
                return Ok(cached.connection.clone());
            }
        }

        if record.kubeconfig_path.is_none() && record.kubeconfig_content.is_none() {
            return Err(Error::MissingCredential {
                cluster_id: cluster_id.to_string(),
            });
        }

        let backend = self.open(&record).await?;
        let connection = Arc::new(ClusterConnection::new(
            cluster_id,
            backend,
            self.options.baseline_version,
        ));

        let mut connections = self.connections.write().await;
        let replaced = connections
            .insert(
                cluster_id.to_string(),
                CachedConnection {
                    credentials: fingerprint,
                    connection: connection.clone(),
                },
            )
            .is_some();
        info!(cluster_id = %cluster_id, replaced, "Connected to cluster");
        Ok(connection)
    }

    /// Drop the cached connection; the next `connect` builds a fresh one
    pub async fn invalidate(&self, cluster_id: &str) -> bool {
        let removed = self.connections.write().await.remove(cluster_id).is_some();
        if removed {
            debug!(cluster_id = %cluster_id, "Invalidated cluster connection");
        }
        removed
    }

    /// Cluster ids with a cached connection
    pub async fn connected_clusters(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.connections.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Try credential tiers in order: file path, inline content, in-cluster
    async fn open(&self, record: &ClusterRecord) -> Result<Arc<dyn ClusterBackend>> {
        let mut failures: Vec<String> = Vec::new();
        let context = record.context_name.as_deref();

        if let Some(ref path) = record.kubeconfig_path {
            match self.open_file(Path::new(path), context).await {
                Ok(backend) => return Ok(backend),
                Err(e) => {
                    warn!(cluster_id = %record.id, path = %path, error = %e, "Credential file unusable");
                    failures.push(format!("file {}: {:#}", path, e));
                }
            }
        }

        if let Some(ref content) = record.kubeconfig_content {
            let opened = match self.materialize(&record.id, content) {
                Ok(path) => self.open_file(&path, context).await,
                Err(e) => Err(e),
            };
            match opened {
                Ok(backend) => return Ok(backend),
                Err(e) => {
                    warn!(cluster_id = %record.id, error = %e, "Inline credentials unusable");
                    failures.push(format!("inline content: {:#}", e));
                }
            }
        }

        if self.options.allow_in_cluster {
            match self.factory.in_cluster().await {
                Ok(backend) => {
                    info!(cluster_id = %record.id, "Using in-cluster credentials");
                    return Ok(backend);
                }
                Err(e) => failures.push(format!("in-cluster: {:#}", e)),
            }
        }

        Err(Error::ConnectionUnavailable {
            cluster_id: record.id.clone(),
            reason: failures.join("; "),
        })
    }

    async fn open_file(
        &self,
        path: &Path,
        explicit_context: Option<&str>,
    ) -> anyhow::Result<Arc<dyn ClusterBackend>> {
        let kubeconfig = Kubeconfig::read_from(path)
            .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
        let context = ContextMatcher::from_kubeconfig(&kubeconfig).select(explicit_context);
        debug!(path = %path.display(), context = ?context, "Opening kubeconfig");
        self.factory.from_kubeconfig(kubeconfig, context).await
    }

    /// Path of the materialized credential file for a cluster
    pub fn credential_path(&self, cluster_id: &str) -> PathBuf {
        self.options
            .credential_dir
            .join(format!("{}.kubeconfig", unique_filename(cluster_id)))
    }

    /// Write inline credentials to disk once; an existing file is reused as is
    fn materialize(&self, cluster_id: &str, content: &str) -> anyhow::Result<PathBuf> {
        let path = self.credential_path(cluster_id);
        if path.is_file() {
            debug!(cluster_id = %cluster_id, path = %path.display(), "Reusing credential file");
            return Ok(path);
        }

        std::fs::create_dir_all(&self.options.credential_dir).with_context(|| {
            format!(
                "Failed to create credential dir {}",
                self.options.credential_dir.display()
            )
        })?;
        atomic_write(&path, content.as_bytes(), Some(0o600))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(cluster_id = %cluster_id, path = %path.display(), "Materialized credential file");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kubernetes::testing::{FactoryCall, FakeBackend, FakeFactory, SAMPLE_KUBECONFIG};
    use crate::store::{ClusterStatus, MemoryStore};
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        store: Arc<MemoryStore>,
        backend: Arc<FakeBackend>,
        factory: Arc<FakeFactory>,
        registry: ConnectionRegistry,
    }

    fn fixture_with(factory: impl FnOnce(Arc<FakeBackend>) -> FakeFactory) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let backend = Arc::new(FakeBackend::new());
        let factory = Arc::new(factory(backend.clone()));
        let registry = ConnectionRegistry::new(
            store.clone(),
            factory.clone(),
            RegistryOptions {
                credential_dir: dir.path().join("credentials"),
                baseline_version: ClusterVersion::BASELINE,
                allow_in_cluster: true,
            },
        );
        Fixture {
            _dir: dir,
            store,
            backend,
            factory,
            registry,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(FakeFactory::new)
    }

    fn inline_cluster(id: &str) -> ClusterRecord {
        let mut record = ClusterRecord::new(id, id, ClusterStatus::Ready);
        record.kubeconfig_content = Some(SAMPLE_KUBECONFIG.to_string());
        record
    }

    #[tokio::test]
    async fn test_unknown_cluster() {
        let f = fixture();
        let err = f.registry.connect("nope").await.err().unwrap();
        assert!(matches!(err, Error::InvalidClusterState { .. }));
    }

    #[tokio::test]
    async fn test_not_ready_cluster() {
        let f = fixture();
        let mut record = inline_cluster("c1");
        record.status = ClusterStatus::Provisioning;
        f.store.put_cluster(record).await.unwrap();
        let err = f.registry.connect("c1").await.err().unwrap();
        assert!(matches!(err, Error::InvalidClusterState { .. }));
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let f = fixture();
        f.store
            .put_cluster(ClusterRecord::new("c1", "c1", ClusterStatus::Running))
            .await
            .unwrap();
        let err = f.registry.connect("c1").await.err().unwrap();
        assert!(matches!(err, Error::MissingCredential { .. }));
    }

    #[tokio::test]
    async fn test_materializes_once_and_reuses() {
        let f = fixture();
        f.store.put_cluster(inline_cluster("c1")).await.unwrap();

        let first = f.registry.connect("c1").await.unwrap();
        let path = f.registry.credential_path("c1");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), SAMPLE_KUBECONFIG);

        // Same credentials: cached connection is returned
        let second = f.registry.connect("c1").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        // Existing file is never rewritten
        std::fs::write(&path, SAMPLE_KUBECONFIG.replace("viewer-token", "edited")).unwrap();
        f.registry.invalidate("c1").await;
        f.registry.connect("c1").await.unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("edited"));
    }

    #[tokio::test]
    async fn test_lookalike_ids_get_their_own_credentials() {
        let f = fixture();
        let mut first = inline_cluster("prod.1");
        first.kubeconfig_content = Some(SAMPLE_KUBECONFIG.replace("viewer-token", "token-dot"));
        let mut second = inline_cluster("prod_1");
        second.kubeconfig_content = Some(SAMPLE_KUBECONFIG.replace("viewer-token", "token-underscore"));
        f.store.put_cluster(first).await.unwrap();
        f.store.put_cluster(second).await.unwrap();

        f.registry.connect("prod.1").await.unwrap();
        f.registry.connect("prod_1").await.unwrap();

        let dot = f.registry.credential_path("prod.1");
        let underscore = f.registry.credential_path("prod_1");
        assert_ne!(dot, underscore);
        assert!(std::fs::read_to_string(&dot).unwrap().contains("token-dot"));
        assert!(std::fs::read_to_string(&underscore).unwrap().contains("token-underscore"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_materialized_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let f = fixture();
        f.store.put_cluster(inline_cluster("c1")).await.unwrap();
        f.registry.connect("c1").await.unwrap();
        let mode = std::fs::metadata(f.registry.credential_path("c1"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_admin_context_selected() {
        let f = fixture();
        f.store.put_cluster(inline_cluster("c1")).await.unwrap();
        f.registry.connect("c1").await.unwrap();
        assert_eq!(
            f.factory.calls(),
            vec![FactoryCall::Kubeconfig {
                context: Some("prod-admin".to_string())
            }]
        );
    }

    #[tokio::test]
    async fn test_explicit_context_wins() {
        let f = fixture();
        let mut record = inline_cluster("c1");
        record.context_name = Some("viewer".into());
        f.store.put_cluster(record).await.unwrap();
        f.registry.connect("c1").await.unwrap();
        assert_eq!(
            f.factory.calls(),
            vec![FactoryCall::Kubeconfig {
                context: Some("viewer".to_string())
            }]
        );
    }

    #[tokio::test]
    async fn test_credential_change_rebuilds() {
        let f = fixture();
        f.store.put_cluster(inline_cluster("c1")).await.unwrap();
        let first = f.registry.connect("c1").await.unwrap();

        let mut record = inline_cluster("c1");
        record.context_name = Some("viewer".into());
        f.store.put_cluster(record).await.unwrap();
        let second = f.registry.connect("c1").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_unusable_file_falls_through_to_content() {
        let f = fixture();
        let mut record = inline_cluster("c1");
        record.kubeconfig_path = Some("/nonexistent/kubeconfig".into());
        f.store.put_cluster(record).await.unwrap();
        assert!(f.registry.connect("c1").await.is_ok());
        assert_eq!(f.factory.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_all_tiers_exhausted() {
        let f = fixture_with(|backend| {
            let mut factory = FakeFactory::new(backend);
            factory.kubeconfig_fails = true;
            factory
        });
        f.store.put_cluster(inline_cluster("c1")).await.unwrap();

        let err = f.registry.connect("c1").await.err().unwrap();
        match err {
            Error::ConnectionUnavailable { cluster_id, reason } => {
                assert_eq!(cluster_id, "c1");
                assert!(reason.contains("inline content"));
                assert!(reason.contains("in-cluster"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(f.factory.calls().last(), Some(&FactoryCall::InCluster));
    }

    #[tokio::test]
    async fn test_in_cluster_fallback() {
        let f = fixture_with(|backend| {
            let mut factory = FakeFactory::new(backend);
            factory.kubeconfig_fails = true;
            factory.in_cluster_fails = false;
            factory
        });
        f.store.put_cluster(inline_cluster("c1")).await.unwrap();
        assert!(f.registry.connect("c1").await.is_ok());
    }

    #[tokio::test]
    async fn test_version_fetched_once() {
        let f = fixture();
        f.store.put_cluster(inline_cluster("c1")).await.unwrap();
        let conn = f.registry.connect("c1").await.unwrap();

        assert_eq!(conn.cluster_version().await, ClusterVersion::new(1, 27));
        conn.schema("cronjobs", None).await.unwrap();
        conn.schema("hpa", None).await.unwrap();
        assert_eq!(f.backend.version_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_version_failure_uses_baseline() {
        let backend = Arc::new(FakeBackend::new().with_version(None));
        let conn = ClusterConnection::new("c1", backend.clone(), ClusterVersion::BASELINE);

        assert_eq!(conn.cluster_version().await, ClusterVersion::BASELINE);
        let schema = conn.schema("cronjobs", None).await.unwrap();
        assert_eq!(schema.api_version(), "batch/v1");
        // The fallback is cached too
        conn.cluster_version().await;
        assert_eq!(backend.version_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_schema_cache_and_invalidation() {
        let backend = Arc::new(FakeBackend::new().with_discovered(ResourceSchema {
            kind: "Widget".into(),
            group: "example.com".into(),
            version: "v1".into(),
            plural: "widgets".into(),
            namespaced: true,
            verbs: vec![],
            short_names: vec![],
            scope_inferred: false,
        }));
        let conn = ClusterConnection::new("c1", backend.clone(), ClusterVersion::BASELINE);

        let first = conn.schema("widgets", None).await.unwrap();
        let second = conn.schema("widgets", None).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.discover_calls.load(Ordering::SeqCst), 1);

        conn.invalidate_schemas().await;
        conn.schema("widgets", None).await.unwrap();
        assert_eq!(backend.discover_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_and_list() {
        let f = fixture();
        f.store.put_cluster(inline_cluster("b")).await.unwrap();
        f.store.put_cluster(inline_cluster("a")).await.unwrap();
        f.registry.connect("b").await.unwrap();
        f.registry.connect("a").await.unwrap();
        assert_eq!(f.registry.connected_clusters().await, vec!["a", "b"]);
        assert!(f.registry.invalidate("a").await);
        assert!(!f.registry.invalidate("a").await);
        assert_eq!(f.registry.connected_clusters().await, vec!["b"]);
    }
}
