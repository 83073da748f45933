// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

use async_trait::async_trait;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{ClusterRecord, NodeResourceRecord, Store, StoreState, WorkloadRecord};
use crate::error::{Error, Result};
use crate::kubernetes::cache::atomic_write;

/// Store persisted as one JSON document shared between processes.
///
/// Every operation re-reads the document under an advisory lock on a sidecar
/// `<file>.lock`; writers hold it exclusively from the read through the atomic
/// rewrite, so a `cluster add` and a running daemon never drop each other's
/// changes. The document on disk is the only copy of the state.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock_path: PathBuf,
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("state"));
    name.push(".lock");
    path.with_file_name(name)
}

/// Open the sidecar lock file and hold a shared or exclusive lock on it until dropped
fn acquire(lock_path: &Path, exclusive: bool) -> Result<File> {
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(lock_path)?;
    if exclusive {
        file.lock()?;
    } else {
        file.lock_shared()?;
    }
    Ok(file)
}

fn read_state(path: &Path) -> Result<StoreState> {
    if !path.exists() {
        return Ok(StoreState::default());
    }
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(StoreState::default());
    }
    serde_json::from_str(&content)
        .map_err(|e| Error::Store(format!("failed to parse state file {}: {}", path.display(), e)))
}

fn write_state(path: &Path, state: &StoreState) -> Result<()> {
    let content = serde_json::to_vec_pretty(state)?;
    atomic_write(path, &content, Some(0o600))?;
    debug!(path = %path.display(), bytes = content.len(), "Persisted state");
    Ok(())
}

impl FileStore {
    /// Open the state file at `path`, which may not exist yet
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let lock_path = lock_path_for(&path);
        let state = {
            let _lock = acquire(&lock_path, false)?;
            read_state(&path)?
        };

        info!(
            path = %path.display(),
            clusters = state.clusters.len(),
            workloads = state.workloads.len(),
            "Opened state file"
        );
        Ok(Self { path, lock_path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run blocking file work off the async runtime while holding the lock
    async fn locked<T: Send + 'static>(
        &self,
        exclusive: bool,
        f: impl FnOnce(&Path) -> Result<T> + Send + 'static,
    ) -> Result<T> {
        let path = self.path.clone();
        let lock_path = self.lock_path.clone();
        tokio::task::spawn_blocking(move || {
            let _lock = acquire(&lock_path, exclusive)?;
            f(&path)
        })
        .await
        .map_err(|e| Error::Store(format!("state file task failed: {}", e)))?
    }

    async fn read<T: Send + 'static>(
        &self,
        f: impl FnOnce(&StoreState) -> T + Send + 'static,
    ) -> Result<T> {
        self.locked(false, move |path| Ok(f(&read_state(path)?))).await
    }

    /// Re-read, apply `f` to the fresh copy and write it back.
    /// Nothing is written when the read fails, and a failed write leaves the old document.
    async fn mutate<T: Send + 'static>(
        &self,
        f: impl FnOnce(&mut StoreState) -> T + Send + 'static,
    ) -> Result<T> {
        self.locked(true, move |path| {
            let mut state = read_state(path)?;
            let out = f(&mut state);
            write_state(path, &state)?;
            Ok(out)
        })
        .await
    }
}

#[async_trait]
impl Store for FileStore {
    async fn get_cluster(&self, id: &str) -> Result<Option<ClusterRecord>> {
        let id = id.to_string();
        self.read(move |s| s.clusters.get(&id).cloned()).await
    }

    async fn list_clusters(&self) -> Result<Vec<ClusterRecord>> {
        self.read(|s| s.clusters.values().cloned().collect()).await
    }

    async fn put_cluster(&self, record: ClusterRecord) -> Result<()> {
        self.mutate(|s| {
            s.clusters.insert(record.id.clone(), record);
        })
        .await
    }

    async fn remove_cluster(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.mutate(move |s| s.remove_cluster(&id)).await
    }

    async fn get_workload(&self, id: &str) -> Result<Option<WorkloadRecord>> {
        let id = id.to_string();
        self.read(move |s| s.workloads.get(&id).cloned()).await
    }

    async fn find_workload(
        &self,
        cluster_id: &str,
        live_name: &str,
    ) -> Result<Option<WorkloadRecord>> {
        let (cluster_id, live_name) = (cluster_id.to_string(), live_name.to_string());
        self.read(move |s| s.find_workload(&cluster_id, &live_name))
            .await
    }

    async fn list_workloads(&self, cluster_id: &str) -> Result<Vec<WorkloadRecord>> {
        let cluster_id = cluster_id.to_string();
        self.read(move |s| s.workloads_where(|w| w.cluster_id == cluster_id))
            .await
    }

    async fn list_workloads_on_node(
        &self,
        cluster_id: &str,
        node_name: &str,
    ) -> Result<Vec<WorkloadRecord>> {
        let (cluster_id, node_name) = (cluster_id.to_string(), node_name.to_string());
        self.read(move |s| {
            s.workloads_where(|w| {
                w.cluster_id == cluster_id && w.node_name.as_deref() == Some(node_name.as_str())
            })
        })
        .await
    }

    async fn put_workload(&self, record: WorkloadRecord) -> Result<()> {
        self.mutate(|s| {
            s.workloads.insert(record.id.clone(), record);
        })
        .await
    }

    async fn delete_workload(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.mutate(move |s| s.workloads.remove(&id).is_some()).await
    }

    async fn get_node(
        &self,
        cluster_id: &str,
        node_name: &str,
    ) -> Result<Option<NodeResourceRecord>> {
        let (cluster_id, node_name) = (cluster_id.to_string(), node_name.to_string());
        self.read(move |s| s.get_node(&cluster_id, &node_name)).await
    }

    async fn list_nodes(&self, cluster_id: &str) -> Result<Vec<NodeResourceRecord>> {
        let cluster_id = cluster_id.to_string();
        self.read(move |s| s.list_nodes(&cluster_id)).await
    }

    async fn put_node(&self, record: NodeResourceRecord) -> Result<()> {
        self.mutate(|s| s.put_node(record)).await
    }

    async fn delete_nodes(&self, cluster_id: &str, node_name: Option<&str>) -> Result<usize> {
        let cluster_id = cluster_id.to_string();
        let node_name = node_name.map(String::from);
        self.mutate(move |s| s.delete_nodes(&cluster_id, node_name.as_deref()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ClusterStatus;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path().join("state.json")).unwrap();
        assert!(store.list_clusters().await.unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.json");

        {
            let store = FileStore::open(&path).unwrap();
            let mut cluster = ClusterRecord::new("c1", "prod", ClusterStatus::Running);
            cluster.kubeconfig_path = Some("/etc/k8s/prod.yaml".into());
            store.put_cluster(cluster).await.unwrap();
            let mut node = NodeResourceRecord::new("c1", "node-7");
            node.gpu_total = 8;
            store.put_node(node).await.unwrap();
        }

        let store = FileStore::open(&path).unwrap();
        let cluster = store.get_cluster("c1").await.unwrap().unwrap();
        assert_eq!(cluster.kubeconfig_path.as_deref(), Some("/etc/k8s/prod.yaml"));
        let node = store.get_node("c1", "node-7").await.unwrap().unwrap();
        assert_eq!(node.gpu_total, 8);
    }

    #[tokio::test]
    async fn test_two_handles_keep_each_others_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let daemon = FileStore::open(&path).unwrap();
        let cli = FileStore::open(&path).unwrap();

        daemon
            .put_cluster(ClusterRecord::new("c1", "prod", ClusterStatus::Ready))
            .await
            .unwrap();
        cli.put_cluster(ClusterRecord::new("c2", "staging", ClusterStatus::Ready))
            .await
            .unwrap();
        daemon.put_node(NodeResourceRecord::new("c1", "node-1")).await.unwrap();

        // The long-lived handle sees the cluster added through the other one
        assert!(daemon.get_cluster("c2").await.unwrap().is_some());

        let reopened = FileStore::open(&path).unwrap();
        let mut ids: Vec<String> = reopened
            .list_clusters()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["c1", "c2"]);
        assert!(reopened.get_node("c1", "node-1").await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_lose_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let a = std::sync::Arc::new(FileStore::open(&path).unwrap());
        let b = std::sync::Arc::new(FileStore::open(&path).unwrap());

        let mut tasks = Vec::new();
        for i in 0..20 {
            let store = if i % 2 == 0 { a.clone() } else { b.clone() };
            tasks.push(tokio::spawn(async move {
                store
                    .put_node(NodeResourceRecord::new("c1", &format!("node-{i}")))
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(a.list_nodes("c1").await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn test_unreadable_document_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let store = FileStore::open(&path).unwrap();
        store
            .put_cluster(ClusterRecord::new("c1", "prod", ClusterStatus::Ready))
            .await
            .unwrap();

        std::fs::write(&path, "{not json").unwrap();
        let err = store
            .put_cluster(ClusterRecord::new("c2", "staging", ClusterStatus::Ready))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store(_)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{not json");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_store_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(FileStore::open(&path), Err(Error::Store(_))));
    }
}
