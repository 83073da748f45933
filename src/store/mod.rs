// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Controller-side persistence: clusters, workloads and node inventory.

mod file;
mod memory;
mod models;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use models::{
    ClusterRecord, ClusterStatus, NodeResourceRecord, ResourceShape, WorkloadRecord, WorkloadStatus,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_cluster(&self, id: &str) -> Result<Option<ClusterRecord>>;
    async fn list_clusters(&self) -> Result<Vec<ClusterRecord>>;
    async fn put_cluster(&self, record: ClusterRecord) -> Result<()>;
    /// Removes the cluster along with its workloads and node rows
    async fn remove_cluster(&self, id: &str) -> Result<bool>;

    async fn get_workload(&self, id: &str) -> Result<Option<WorkloadRecord>>;
    async fn find_workload(&self, cluster_id: &str, live_name: &str) -> Result<Option<WorkloadRecord>>;
    async fn list_workloads(&self, cluster_id: &str) -> Result<Vec<WorkloadRecord>>;
    async fn list_workloads_on_node(&self, cluster_id: &str, node_name: &str)
    -> Result<Vec<WorkloadRecord>>;
    async fn put_workload(&self, record: WorkloadRecord) -> Result<()>;
    async fn delete_workload(&self, id: &str) -> Result<bool>;

    async fn get_node(&self, cluster_id: &str, node_name: &str) -> Result<Option<NodeResourceRecord>>;
    async fn list_nodes(&self, cluster_id: &str) -> Result<Vec<NodeResourceRecord>>;
    async fn put_node(&self, record: NodeResourceRecord) -> Result<()>;
    /// Delete one node row, or every row of the cluster when `node_name` is None
    async fn delete_nodes(&self, cluster_id: &str, node_name: Option<&str>) -> Result<usize>;
}

/// Plain in-memory tables shared by the memory and file stores
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreState {
    #[serde(default)]
    clusters: BTreeMap<String, ClusterRecord>,
    #[serde(default)]
    workloads: BTreeMap<String, WorkloadRecord>,
    /// cluster id -> node name -> row
    #[serde(default)]
    nodes: BTreeMap<String, BTreeMap<String, NodeResourceRecord>>,
}

impl StoreState {
    fn remove_cluster(&mut self, id: &str) -> bool {
        let removed = self.clusters.remove(id).is_some();
        self.workloads.retain(|_, w| w.cluster_id != id);
        self.nodes.remove(id);
        removed
    }

    fn find_workload(&self, cluster_id: &str, live_name: &str) -> Option<WorkloadRecord> {
        self.workloads
            .values()
            .find(|w| w.cluster_id == cluster_id && w.live_name.as_deref() == Some(live_name))
            .cloned()
    }

    fn workloads_where(&self, pred: impl Fn(&WorkloadRecord) -> bool) -> Vec<WorkloadRecord> {
        self.workloads.values().filter(|w| pred(w)).cloned().collect()
    }

    fn get_node(&self, cluster_id: &str, node_name: &str) -> Option<NodeResourceRecord> {
        self.nodes.get(cluster_id)?.get(node_name).cloned()
    }

    fn list_nodes(&self, cluster_id: &str) -> Vec<NodeResourceRecord> {
        self.nodes
            .get(cluster_id)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    fn put_node(&mut self, record: NodeResourceRecord) {
        self.nodes
            .entry(record.cluster_id.clone())
            .or_default()
            .insert(record.node_name.clone(), record);
    }

    fn delete_nodes(&mut self, cluster_id: &str, node_name: Option<&str>) -> usize {
        match node_name {
            Some(name) => self
                .nodes
                .get_mut(cluster_id)
                .and_then(|rows| rows.remove(name))
                .map_or(0, |_| 1),
            None => self.nodes.remove(cluster_id).map_or(0, |rows| rows.len()),
        }
    }
}
