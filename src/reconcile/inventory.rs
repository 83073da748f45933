// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Node inventory reconciliation.
//!
//! For every live node: allocatable totals, then used totals recomputed from
//! scratch out of the container limits of the pods bound to it. Stored nodes
//! that vanished are removed and the workloads pinned to them are marked
//! `error`. Rows are only written when a value actually changes.

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{ClusterLocks, PassSummary, ReconcileJob};
use crate::error::Result;
use crate::kubernetes::{ConnectionRegistry, ListOptions, ResourceClient};
use crate::store::{NodeResourceRecord, Store, WorkloadStatus};
use crate::units;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventorySettings {
    /// Node label carrying the GPU product name
    pub gpu_model_label: String,
}

impl Default for InventorySettings {
    fn default() -> Self {
        Self {
            gpu_model_label: "nvidia.com/gpu.product".to_string(),
        }
    }
}

fn is_gpu_key(key: &str) -> bool {
    key.to_lowercase().contains("gpu")
}

/// Allocatable capacity of one node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeCapacity {
    pub cpu: f64,
    pub memory: f64,
    pub storage: f64,
    pub gpu_model: Option<String>,
    pub gpu_total: i64,
}

impl NodeCapacity {
    pub fn from_node(node: &Node, gpu_model_label: &str) -> Self {
        let empty = BTreeMap::new();
        let allocatable = node
            .status
            .as_ref()
            .and_then(|s| s.allocatable.as_ref())
            .unwrap_or(&empty);
        let quantity = |key: &str| allocatable.get(key).map(|q| q.0.as_str()).unwrap_or("0");

        let gpu_keys: Vec<(&String, &Quantity)> =
            allocatable.iter().filter(|(k, _)| is_gpu_key(k)).collect();
        let gpu_total: i64 = gpu_keys.iter().map(|(_, q)| units::count(&q.0)).sum();

        let gpu_model = node
            .metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(gpu_model_label))
            .cloned()
            .or_else(|| gpu_keys.first().map(|(k, _)| (*k).clone()));

        Self {
            cpu: units::round(units::cpu_cores(quantity("cpu"))),
            memory: units::round(units::gibibytes(quantity("memory"))),
            storage: units::round(units::gibibytes(quantity("ephemeral-storage"))),
            gpu_model,
            gpu_total,
        }
    }
}

/// Summed container limits of the pods on one node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeUsage {
    pub cpu: f64,
    pub memory: f64,
    pub storage: f64,
    pub gpu: i64,
    /// Pods holding no GPU, one per pod
    pub less_gpu_pods: i64,
}

impl NodeUsage {
    pub fn from_pods(pods: &[Pod]) -> Self {
        let mut usage = Self::default();
        for pod in pods {
            let mut pod_gpu = 0;
            let containers = pod.spec.iter().flat_map(|s| s.containers.iter());
            for container in containers {
                let Some(limits) = container.resources.as_ref().and_then(|r| r.limits.as_ref())
                else {
                    continue;
                };
                for (key, quantity) in limits {
                    match key.as_str() {
                        "cpu" => usage.cpu += units::cpu_cores(&quantity.0),
                        "memory" => usage.memory += units::gibibytes(&quantity.0),
                        "ephemeral-storage" => usage.storage += units::gibibytes(&quantity.0),
                        k if is_gpu_key(k) => pod_gpu += units::count(&quantity.0),
                        _ => {}
                    }
                }
            }
            usage.gpu += pod_gpu;
            if pod_gpu == 0 {
                usage.less_gpu_pods += 1;
            }
        }
        usage.cpu = units::round(usage.cpu);
        usage.memory = units::round(usage.memory);
        usage.storage = units::round(usage.storage);
        usage
    }
}

fn decode<T: serde::de::DeserializeOwned>(records: Vec<Value>, what: &str) -> Vec<T> {
    records
        .into_iter()
        .filter_map(|record| match serde_json::from_value(record) {
            Ok(obj) => Some(obj),
            Err(e) => {
                warn!(kind = %what, error = %e, "Skipping undecodable object");
                None
            }
        })
        .collect()
}

pub struct NodeInventoryJob {
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn Store>,
    locks: Arc<ClusterLocks>,
    settings: InventorySettings,
}

impl NodeInventoryJob {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        store: Arc<dyn Store>,
        locks: Arc<ClusterLocks>,
        settings: InventorySettings,
    ) -> Self {
        Self {
            registry,
            store,
            locks,
            settings,
        }
    }

    /// Reconcile one cluster; returns the number of nodes updated or removed
    pub async fn reconcile_cluster(&self, cluster_id: &str) -> Result<usize> {
        let _guard = self.locks.lock(cluster_id).await;

        let connection = self.registry.connect(cluster_id).await?;
        let nodes_client = connection.resources("nodes", None).await?;
        let pods_client = connection.resources("pods", None).await?;

        let live_nodes: Vec<Node> =
            decode(nodes_client.list_all(&ListOptions::default()).await?, "Node");
        let live_names: HashSet<String> = live_nodes
            .iter()
            .filter_map(|n| n.metadata.name.clone())
            .collect();

        let mut changes = 0;
        for stored in self.store.list_nodes(cluster_id).await? {
            if !live_names.contains(&stored.node_name) {
                changes += self.remove_node(cluster_id, &stored.node_name).await?;
            }
        }

        for node in &live_nodes {
            let Some(name) = node.metadata.name.as_deref() else {
                continue;
            };
            match self.sync_node(cluster_id, name, node, &pods_client).await {
                Ok(written) => changes += written,
                Err(e) => {
                    warn!(cluster_id = %cluster_id, node = %name, error = %e, "Node sync failed");
                }
            }
        }

        Ok(changes)
    }

    /// Drop a vanished node and flag the workloads that were running on it
    async fn remove_node(&self, cluster_id: &str, node_name: &str) -> Result<usize> {
        let pinned = self
            .store
            .list_workloads_on_node(cluster_id, node_name)
            .await?;
        for mut workload in pinned {
            workload.status = WorkloadStatus::Error;
            workload.message = Some(format!(
                "node {} is no longer present in cluster {}",
                node_name, cluster_id
            ));
            workload.update_time = Utc::now();
            info!(cluster_id = %cluster_id, node = %node_name, workload_id = %workload.id, "Workload lost its node");
            self.store.put_workload(workload).await?;
        }

        let removed = self.store.delete_nodes(cluster_id, Some(node_name)).await?;
        info!(cluster_id = %cluster_id, node = %node_name, "Removed vanished node");
        Ok(removed)
    }

    async fn sync_node(
        &self,
        cluster_id: &str,
        node_name: &str,
        node: &Node,
        pods_client: &ResourceClient,
    ) -> Result<usize> {
        let existing = self.store.get_node(cluster_id, node_name).await?;
        let mut row = existing
            .clone()
            .unwrap_or_else(|| NodeResourceRecord::new(cluster_id, node_name));
        let mut written = 0;

        // Totals first, so they land even if the pod listing fails
        let capacity = NodeCapacity::from_node(node, &self.settings.gpu_model_label);
        row.cpu_total = capacity.cpu;
        row.memory_total = capacity.memory;
        row.storage_total = capacity.storage;
        row.gpu_model = capacity.gpu_model;
        row.gpu_total = capacity.gpu_total;
        if existing.as_ref().is_none_or(|e| !e.same_values(&row)) {
            row.update_time = Utc::now();
            self.store.put_node(row.clone()).await?;
            written += 1;
        }

        let selector = format!("spec.nodeName={}", node_name);
        let pods: Vec<Pod> = decode(
            pods_client
                .list_all(&ListOptions::all_namespaces().fields(selector))
                .await?,
            "Pod",
        );
        let usage = NodeUsage::from_pods(&pods);

        let before = row.clone();
        row.cpu_used = usage.cpu;
        row.memory_used = usage.memory;
        row.storage_used = usage.storage;
        row.gpu_used = usage.gpu;
        row.less_gpu_pod_count = usage.less_gpu_pods;
        if !before.same_values(&row) {
            row.update_time = Utc::now();
            self.store.put_node(row).await?;
            written += 1;
        }

        if written > 0 {
            debug!(cluster_id = %cluster_id, node = %node_name, pods = pods.len(), "Node inventory updated");
        }
        Ok(written.min(1))
    }
}

#[async_trait]
impl ReconcileJob for NodeInventoryJob {
    fn name(&self) -> &'static str {
        "node-inventory"
    }

    async fn run_pass(&self) -> anyhow::Result<PassSummary> {
        let mut summary = PassSummary::default();
        for cluster in self.store.list_clusters().await? {
            if !cluster.status.is_connectable() {
                continue;
            }
            summary.clusters += 1;
            match self.reconcile_cluster(&cluster.id).await {
                Ok(changes) => summary.changes += changes,
                Err(e) => {
                    summary.failed_clusters += 1;
                    warn!(cluster_id = %cluster.id, error = %e, "Node inventory reconciliation failed");
                }
            }
        }
        Ok(summary)
    }
}
