// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle of a registered cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    Pending,
    Provisioning,
    Running,
    Ready,
    Error,
    Deleting,
}

impl ClusterStatus {
    /// Only running or ready clusters may be connected to
    pub fn is_connectable(self) -> bool {
        matches!(self, Self::Running | Self::Ready)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Provisioning => "provisioning",
            Self::Running => "running",
            Self::Ready => "ready",
            Self::Error => "error",
            Self::Deleting => "deleting",
        }
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRecord {
    pub id: String,
    pub name: String,
    pub status: ClusterStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_name: Option<String>,
}

impl ClusterRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, status: ClusterStatus) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status,
            kubeconfig_path: None,
            kubeconfig_content: None,
            context_name: None,
        }
    }
}

/// Controller-side status of a workload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    /// Set by inventory reconciliation when the hosting node disappears
    Error,
    Unknown,
}

impl WorkloadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }

    /// Map a live phase or waiting reason to a workload status
    pub fn classify(phase: &str) -> Self {
        match phase.trim().to_lowercase().as_str() {
            "running" => Self::Running,
            "pending" | "containercreating" | "podinitializing" => Self::Pending,
            "succeeded" | "completed" => Self::Completed,
            "failed" | "unknown" | "error" | "crashloopbackoff" | "imagepullbackoff"
            | "errimagepull" | "oomkilled" | "evicted" | "createcontainerconfigerror" => {
                Self::Failed
            }
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for WorkloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkloadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "error" => Ok(Self::Error),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown workload status '{}'", other)),
        }
    }
}

/// Resources a workload holds on its node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceShape {
    /// CPU cores
    pub cpu: f64,
    /// GiB
    pub memory: f64,
    /// GiB
    pub storage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_model: Option<String>,
    #[serde(default)]
    pub gpu_count: i64,
}

impl ResourceShape {
    pub fn uses_gpu(&self) -> bool {
        self.gpu_count > 0
    }
}

/// Controller-side record of a workload the system launched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadRecord {
    pub id: String,
    pub cluster_id: String,
    /// Name requested at submission
    pub desired_name: String,
    /// Name of the live object once bound; unbound records are left alone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub status: WorkloadStatus,
    /// Raw live phase, lowercased
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    /// Set while a migration has released the origin node but not yet allocated the destination
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migrating_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub shape: ResourceShape,
    pub update_time: DateTime<Utc>,
}

impl WorkloadRecord {
    pub fn new(id: impl Into<String>, cluster_id: impl Into<String>, desired_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cluster_id: cluster_id.into(),
            desired_name: desired_name.into(),
            live_name: None,
            namespace: None,
            status: WorkloadStatus::Pending,
            real_status: None,
            node_name: None,
            migrating_to: None,
            message: None,
            shape: ResourceShape::default(),
            update_time: Utc::now(),
        }
    }
}

/// Capacity and usage of one node, as last observed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeResourceRecord {
    pub cluster_id: String,
    pub node_name: String,
    pub cpu_total: f64,
    pub cpu_used: f64,
    pub memory_total: f64,
    pub memory_used: f64,
    pub storage_total: f64,
    pub storage_used: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_model: Option<String>,
    pub gpu_total: i64,
    pub gpu_used: i64,
    /// Pods on the node that hold no GPU
    pub less_gpu_pod_count: i64,
    pub update_time: DateTime<Utc>,
}

impl NodeResourceRecord {
    pub fn new(cluster_id: impl Into<String>, node_name: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            node_name: node_name.into(),
            cpu_total: 0.0,
            cpu_used: 0.0,
            memory_total: 0.0,
            memory_used: 0.0,
            storage_total: 0.0,
            storage_used: 0.0,
            gpu_model: None,
            gpu_total: 0,
            gpu_used: 0,
            less_gpu_pod_count: 0,
            update_time: Utc::now(),
        }
    }

    /// Equal in everything but the timestamp
    pub fn same_values(&self, other: &Self) -> bool {
        Self {
            update_time: other.update_time,
            ..self.clone()
        } == *other
    }
}
