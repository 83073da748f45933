// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ClusterRecord, NodeResourceRecord, Store, StoreState, WorkloadRecord};
use crate::error::Result;

/// Volatile store, used by tests and one-shot commands
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_cluster(&self, id: &str) -> Result<Option<ClusterRecord>> {
        Ok(self.state.read().await.clusters.get(id).cloned())
    }

    async fn list_clusters(&self) -> Result<Vec<ClusterRecord>> {
        Ok(self.state.read().await.clusters.values().cloned().collect())
    }

    async fn put_cluster(&self, record: ClusterRecord) -> Result<()> {
        self.state
            .write()
            .await
            .clusters
            .insert(record.id.clone(), record);
        Ok(())
    }

    async fn remove_cluster(&self, id: &str) -> Result<bool> {
        Ok(self.state.write().await.remove_cluster(id))
    }

    async fn get_workload(&self, id: &str) -> Result<Option<WorkloadRecord>> {
        Ok(self.state.read().await.workloads.get(id).cloned())
    }

    async fn find_workload(
        &self,
        cluster_id: &str,
        live_name: &str,
    ) -> Result<Option<WorkloadRecord>> {
        Ok(self.state.read().await.find_workload(cluster_id, live_name))
    }

    async fn list_workloads(&self, cluster_id: &str) -> Result<Vec<WorkloadRecord>> {
        Ok(self
            .state
            .read()
            .await
            .workloads_where(|w| w.cluster_id == cluster_id))
    }

    async fn list_workloads_on_node(
        &self,
        cluster_id: &str,
        node_name: &str,
    ) -> Result<Vec<WorkloadRecord>> {
        Ok(self.state.read().await.workloads_where(|w| {
            w.cluster_id == cluster_id && w.node_name.as_deref() == Some(node_name)
        }))
    }

    async fn put_workload(&self, record: WorkloadRecord) -> Result<()> {
        self.state
            .write()
            .await
            .workloads
            .insert(record.id.clone(), record);
        Ok(())
    }

    async fn delete_workload(&self, id: &str) -> Result<bool> {
        Ok(self.state.write().await.workloads.remove(id).is_some())
    }

    async fn get_node(
        &self,
        cluster_id: &str,
        node_name: &str,
    ) -> Result<Option<NodeResourceRecord>> {
        Ok(self.state.read().await.get_node(cluster_id, node_name))
    }

    async fn list_nodes(&self, cluster_id: &str) -> Result<Vec<NodeResourceRecord>> {
        Ok(self.state.read().await.list_nodes(cluster_id))
    }

    async fn put_node(&self, record: NodeResourceRecord) -> Result<()> {
        self.state.write().await.put_node(record);
        Ok(())
    }

    async fn delete_nodes(&self, cluster_id: &str, node_name: Option<&str>) -> Result<usize> {
        Ok(self.state.write().await.delete_nodes(cluster_id, node_name))
    }
}
