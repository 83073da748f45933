// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Resource-specific status and readiness extraction.
//!
//! Each kind reports state differently: pods have a phase, controllers have
//! replica counts, nodes have conditions. These helpers reduce them to a
//! single status word and a readiness flag.

use serde_json::Value;

use super::path::lookup;

fn kind_of(record: &Value) -> String {
    record
        .get("kind")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_lowercase()
}

fn int_at(record: &Value, path: &str) -> Option<i64> {
    lookup(record, path).and_then(Value::as_i64)
}

fn str_at<'a>(record: &'a Value, path: &str) -> Option<&'a str> {
    lookup(record, path).and_then(Value::as_str)
}

/// Status of the `type` condition ("True", "False", "Unknown")
fn condition_status<'a>(record: &'a Value, condition_type: &str) -> Option<&'a str> {
    lookup(record, "status.conditions")?
        .as_array()?
        .iter()
        .find(|c| c.get("type").and_then(Value::as_str) == Some(condition_type))
        .and_then(|c| c.get("status"))
        .and_then(Value::as_str)
}

/// Desired and ready replica counts of a workload controller
fn replica_counts(record: &Value, kind: &str) -> (i64, i64) {
    if kind == "daemonset" {
        let desired = int_at(record, "status.desiredNumberScheduled").unwrap_or(0);
        let ready = int_at(record, "status.numberReady").unwrap_or(0);
        return (desired, ready);
    }
    let desired = int_at(record, "spec.replicas").unwrap_or(1);
    let ready = int_at(record, "status.readyReplicas").unwrap_or(0);
    (desired, ready)
}

/// First waiting reason among a pod's containers (e.g. CrashLoopBackOff)
pub fn pod_waiting_reason(record: &Value) -> Option<&str> {
    lookup(record, "status.containerStatuses")?
        .as_array()?
        .iter()
        .find_map(|cs| {
            cs.get("state")?
                .get("waiting")?
                .get("reason")?
                .as_str()
        })
}

/// Single-word status for a record, based on its kind
pub fn resource_status(record: &Value) -> Option<String> {
    let kind = kind_of(record);
    match kind.as_str() {
        "pod" => pod_waiting_reason(record)
            .or_else(|| str_at(record, "status.phase"))
            .map(String::from),
        "deployment" | "statefulset" | "replicaset" | "daemonset" => {
            let (desired, ready) = replica_counts(record, &kind);
            Some(if ready >= desired { "Running" } else { "Pending" }.to_string())
        }
        "node" => Some(
            match condition_status(record, "Ready") {
                Some("True") => "Ready",
                _ => "NotReady",
            }
            .to_string(),
        ),
        "job" => {
            if int_at(record, "status.succeeded").unwrap_or(0) > 0 {
                Some("Complete".to_string())
            } else if int_at(record, "status.failed").unwrap_or(0) > 0 {
                Some("Failed".to_string())
            } else {
                Some("Running".to_string())
            }
        }
        _ => str_at(record, "status.phase").map(String::from),
    }
}

/// Readiness for a record, based on its kind
pub fn resource_ready(record: &Value) -> Option<bool> {
    let kind = kind_of(record);
    match kind.as_str() {
        "pod" => {
            let statuses = lookup(record, "status.containerStatuses")?.as_array()?;
            Some(
                !statuses.is_empty()
                    && statuses
                        .iter()
                        .all(|cs| cs.get("ready").and_then(Value::as_bool).unwrap_or(false)),
            )
        }
        "deployment" | "statefulset" | "replicaset" | "daemonset" => {
            let (desired, ready) = replica_counts(record, &kind);
            Some(ready >= desired)
        }
        "node" => Some(condition_status(record, "Ready") == Some("True")),
        _ => condition_status(record, "Ready").map(|s| s == "True"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pod_phase() {
        let pod = json!({"kind": "Pod", "status": {"phase": "Running",
            "containerStatuses": [{"ready": true}, {"ready": true}]}});
        assert_eq!(resource_status(&pod).as_deref(), Some("Running"));
        assert_eq!(resource_ready(&pod), Some(true));
    }

    #[test]
    fn test_pod_waiting_reason_wins() {
        let pod = json!({"kind": "Pod", "status": {"phase": "Running",
            "containerStatuses": [
                {"ready": false, "state": {"waiting": {"reason": "CrashLoopBackOff"}}}
            ]}});
        assert_eq!(resource_status(&pod).as_deref(), Some("CrashLoopBackOff"));
        assert_eq!(resource_ready(&pod), Some(false));
    }

    #[test]
    fn test_deployment_replicas() {
        let ready = json!({"kind": "Deployment", "spec": {"replicas": 2},
            "status": {"readyReplicas": 2}});
        let pending = json!({"kind": "Deployment", "spec": {"replicas": 3},
            "status": {"readyReplicas": 1}});
        assert_eq!(resource_status(&ready).as_deref(), Some("Running"));
        assert_eq!(resource_status(&pending).as_deref(), Some("Pending"));
        assert_eq!(resource_ready(&pending), Some(false));
    }

    #[test]
    fn test_node_condition() {
        let node = json!({"kind": "Node", "status": {"conditions": [
            {"type": "MemoryPressure", "status": "False"},
            {"type": "Ready", "status": "True"}
        ]}});
        assert_eq!(resource_status(&node).as_deref(), Some("Ready"));
        assert_eq!(resource_ready(&node), Some(true));
    }

    #[test]
    fn test_job_states() {
        let done = json!({"kind": "Job", "status": {"succeeded": 1}});
        let failed = json!({"kind": "Job", "status": {"failed": 2}});
        assert_eq!(resource_status(&done).as_deref(), Some("Complete"));
        assert_eq!(resource_status(&failed).as_deref(), Some("Failed"));
    }

    #[test]
    fn test_generic_phase() {
        let pvc = json!({"kind": "PersistentVolumeClaim", "status": {"phase": "Bound"}});
        assert_eq!(resource_status(&pvc).as_deref(), Some("Bound"));
        let cm = json!({"kind": "ConfigMap", "data": {}});
        assert_eq!(resource_status(&cm), None);
        assert_eq!(resource_ready(&cm), None);
    }
}
