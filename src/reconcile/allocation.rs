// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Explicit allocate / release of a workload's resource shape on node rows.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use super::ClusterLocks;
use crate::error::{Error, Result};
use crate::store::{NodeResourceRecord, ResourceShape, Store, WorkloadRecord};
use crate::units;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Allocate,
    Release,
}

impl Direction {
    fn sign(self) -> f64 {
        match self {
            Self::Allocate => 1.0,
            Self::Release => -1.0,
        }
    }
}

/// A shape without a GPU model matches any GPU node
fn gpu_model_matches(node: &NodeResourceRecord, shape: &ResourceShape) -> bool {
    let Some(node_model) = node.gpu_model.as_deref() else {
        return false;
    };
    match shape.gpu_model.as_deref() {
        Some(wanted) => node_model.to_lowercase().contains(&wanted.to_lowercase()),
        None => true,
    }
}

fn adjust(row: &mut NodeResourceRecord, shape: &ResourceShape, direction: Direction) {
    let sign = direction.sign();
    let apply = |value: f64, delta: f64| units::round((value + sign * delta).max(0.0));
    row.cpu_used = apply(row.cpu_used, shape.cpu);
    row.memory_used = apply(row.memory_used, shape.memory);
    row.storage_used = apply(row.storage_used, shape.storage);

    let step = |value: i64, delta: i64| match direction {
        Direction::Allocate => value + delta,
        Direction::Release => (value - delta).max(0),
    };
    if shape.uses_gpu() {
        if gpu_model_matches(row, shape) {
            row.gpu_used = step(row.gpu_used, shape.gpu_count);
        }
    } else {
        row.less_gpu_pod_count = step(row.less_gpu_pod_count, 1);
    }
}

pub struct AllocationAdjuster {
    store: Arc<dyn Store>,
    locks: Arc<ClusterLocks>,
}

impl AllocationAdjuster {
    pub fn new(store: Arc<dyn Store>, locks: Arc<ClusterLocks>) -> Self {
        Self { store, locks }
    }

    /// Subtract `shape` from the node's used totals, never below zero
    pub async fn release(
        &self,
        cluster_id: &str,
        node_name: &str,
        shape: &ResourceShape,
    ) -> Result<NodeResourceRecord> {
        let _guard = self.locks.lock(cluster_id).await;
        self.apply(cluster_id, node_name, shape, Direction::Release)
            .await
    }

    /// Add `shape` to the node's used totals
    pub async fn allocate(
        &self,
        cluster_id: &str,
        node_name: &str,
        shape: &ResourceShape,
    ) -> Result<NodeResourceRecord> {
        let _guard = self.locks.lock(cluster_id).await;
        self.apply(cluster_id, node_name, shape, Direction::Allocate)
            .await
    }

    /// Move a workload's shape from its current node to `to_node` and rebind it.
    ///
    /// Both node rows must exist before anything is written. A workload that
    /// is not on any node is only allocated on the destination. The stored
    /// record is authoritative: once the origin has been released the record
    /// carries `migrating_to`, and a retry skips the release.
    pub async fn migrate(&self, workload: &WorkloadRecord, to_node: &str) -> Result<WorkloadRecord> {
        let cluster_id = workload.cluster_id.as_str();
        let _guard = self.locks.lock(cluster_id).await;

        let mut record = self
            .store
            .get_workload(&workload.id)
            .await?
            .unwrap_or_else(|| workload.clone());
        let resumed = record.migrating_to.is_some();
        let from_node = if resumed { None } else { record.node_name.clone() };
        if from_node.as_deref() == Some(to_node) {
            return Ok(record);
        }
        for node in from_node.as_deref().into_iter().chain(std::iter::once(to_node)) {
            self.tracked(cluster_id, node).await?;
        }

        if let Some(from) = from_node.as_deref() {
            self.apply(cluster_id, from, &record.shape, Direction::Release)
                .await?;
            record.migrating_to = Some(to_node.to_string());
            record.update_time = Utc::now();
            self.store.put_workload(record.clone()).await?;
        }
        self.apply(cluster_id, to_node, &record.shape, Direction::Allocate)
            .await?;

        record.node_name = Some(to_node.to_string());
        record.migrating_to = None;
        record.update_time = Utc::now();
        self.store.put_workload(record.clone()).await?;
        info!(
            cluster_id = %cluster_id,
            workload_id = %record.id,
            from = from_node.as_deref().unwrap_or("-"),
            to = %to_node,
            resumed,
            "Workload migrated"
        );
        Ok(record)
    }

    async fn tracked(&self, cluster_id: &str, node_name: &str) -> Result<NodeResourceRecord> {
        self.store
            .get_node(cluster_id, node_name)
            .await?
            .ok_or_else(|| Error::NodeNotTracked {
                cluster_id: cluster_id.to_string(),
                node: node_name.to_string(),
            })
    }

    async fn apply(
        &self,
        cluster_id: &str,
        node_name: &str,
        shape: &ResourceShape,
        direction: Direction,
    ) -> Result<NodeResourceRecord> {
        let mut row = self.tracked(cluster_id, node_name).await?;
        adjust(&mut row, shape, direction);
        row.update_time = Utc::now();
        self.store.put_node(row.clone()).await?;
        debug!(
            cluster_id = %cluster_id,
            node = %node_name,
            direction = ?direction,
            cpu_used = row.cpu_used,
            gpu_used = row.gpu_used,
            "Node allocation adjusted"
        );
        Ok(row)
    }
}
