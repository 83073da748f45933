// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Workload reconciliation: live labelled workloads vs. workload records.
//!
//! - matched: record status follows the live phase
//! - live without a record: deleted from the cluster
//! - bound record without a live workload: deleted from the store
//! - record not yet bound to a live name: left alone
//!
//! Live workloads and records are matched on (namespace, live name). A record
//! without a namespace matches a live workload of that name in any namespace
//! once no record claims the exact pair.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{ClusterLocks, PassSummary, ReconcileJob};
use crate::error::Result;
use crate::kubernetes::{ConnectionRegistry, ListOptions, Propagation};
use crate::query::status::resource_status;
use crate::store::{Store, WorkloadRecord, WorkloadStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSettings {
    /// Resource type the system launches workloads as
    pub resource_type: String,
    /// Label selector marking workloads the system owns
    pub ownership_label: String,
}

impl Default for WorkloadSettings {
    fn default() -> Self {
        Self {
            resource_type: "pods".to_string(),
            ownership_label: "k8sync.io/managed=true".to_string(),
        }
    }
}

pub struct WorkloadJob {
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn Store>,
    locks: Arc<ClusterLocks>,
    settings: WorkloadSettings,
}

type BindingKey = (Option<String>, String);

/// Name, namespace and lowercased phase of one live workload
struct LiveWorkload {
    name: String,
    namespace: Option<String>,
    phase: String,
    node_name: Option<String>,
}

impl LiveWorkload {
    fn from_record(record: &Value) -> Option<Self> {
        let metadata = record.get("metadata")?;
        Some(Self {
            name: metadata.get("name")?.as_str()?.to_string(),
            namespace: metadata
                .get("namespace")
                .and_then(Value::as_str)
                .map(String::from),
            phase: resource_status(record).unwrap_or_default().to_lowercase(),
            node_name: record
                .pointer("/spec/nodeName")
                .and_then(Value::as_str)
                .map(String::from),
        })
    }
}

impl WorkloadJob {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        store: Arc<dyn Store>,
        locks: Arc<ClusterLocks>,
        settings: WorkloadSettings,
    ) -> Self {
        Self {
            registry,
            store,
            locks,
            settings,
        }
    }

    /// Reconcile one cluster; returns the number of changes made
    pub async fn reconcile_cluster(&self, cluster_id: &str) -> Result<usize> {
        let _guard = self.locks.lock(cluster_id).await;

        let connection = self.registry.connect(cluster_id).await?;
        let client = connection
            .resources(&self.settings.resource_type, None)
            .await?;
        let live = client
            .list_all(&ListOptions::all_namespaces().labels(&self.settings.ownership_label))
            .await?;

        let mut bound: HashMap<BindingKey, Vec<WorkloadRecord>> = HashMap::new();
        for record in self.store.list_workloads(cluster_id).await? {
            if let Some(name) = record.live_name.clone() {
                bound
                    .entry((record.namespace.clone(), name))
                    .or_default()
                    .push(record);
            }
        }

        let mut changes = 0;
        for item in &live {
            let Some(workload) = LiveWorkload::from_record(item) else {
                continue;
            };

            let records = bound
                .remove(&(workload.namespace.clone(), workload.name.clone()))
                .or_else(|| bound.remove(&(None, workload.name.clone())));
            match records {
                Some(records) => {
                    for record in records {
                        if self.apply_live_state(record, &workload).await? {
                            changes += 1;
                        }
                    }
                }
                None => {
                    // Launched by us but unknown to the store
                    match client
                        .delete(
                            &workload.name,
                            workload.namespace.as_deref(),
                            Some(Propagation::Background),
                            false,
                        )
                        .await
                    {
                        Ok(report) if report.success => {
                            info!(cluster_id = %cluster_id, namespace = ?workload.namespace, name = %workload.name, "Deleted orphan workload");
                            changes += 1;
                        }
                        Ok(_) => {
                            debug!(cluster_id = %cluster_id, name = %workload.name, "Orphan already gone");
                        }
                        Err(e) => {
                            warn!(cluster_id = %cluster_id, name = %workload.name, error = %e, "Failed to delete orphan workload");
                        }
                    }
                }
            }
        }

        // Bound records whose workload no longer exists
        for ((namespace, live_name), records) in bound {
            for record in records {
                self.store.delete_workload(&record.id).await?;
                info!(
                    cluster_id = %cluster_id,
                    workload_id = %record.id,
                    namespace = ?namespace,
                    live_name = %live_name,
                    "Removed record of vanished workload"
                );
                changes += 1;
            }
        }

        Ok(changes)
    }

    /// Write the live phase into the record if anything differs
    async fn apply_live_state(&self, mut record: WorkloadRecord, live: &LiveWorkload) -> Result<bool> {
        let status = WorkloadStatus::classify(&live.phase);
        let real_status = Some(live.phase.clone());
        let node_name = record.node_name.clone().or_else(|| live.node_name.clone());

        if record.status == status && record.real_status == real_status && record.node_name == node_name {
            return Ok(false);
        }

        debug!(
            workload_id = %record.id,
            from = %record.status,
            to = %status,
            real_status = %live.phase,
            "Workload status changed"
        );
        record.status = status;
        record.real_status = real_status;
        record.node_name = node_name;
        record.update_time = Utc::now();
        self.store.put_workload(record).await?;
        Ok(true)
    }
}

#[async_trait]
impl ReconcileJob for WorkloadJob {
    fn name(&self) -> &'static str {
        "workload-reconcile"
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
                    warn!(cluster_id = %cluster.id, error = %e, "Workload reconciliation failed");
                }
            }
        }
        Ok(summary)
    }
}
