// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Resource schema resolution.
//!
//! Maps a resource type name ("pods", "cj", "widgets") to the kind,
//! group-version and scope needed to address it. Resolution order:
//!
//! 1. Static table of built-in resources (plural, singular or short name)
//! 2. For groups whose preferred version moved between releases, pick the
//!    group-version by the cluster's major.minor
//! 3. Live discovery by literal name or kind guess
//! 4. Morphological fallback for the kind; the version must then come from
//!    the caller

use kube::discovery::{ApiCapabilities, ApiResource, Scope};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use super::backend::ClusterBackend;
use crate::error::{Error, Result};

/// Verbs served by every built-in resource in the static table
const STANDARD_VERBS: &[&str] = &[
    "create",
    "delete",
    "deletecollection",
    "get",
    "list",
    "patch",
    "update",
    "watch",
];

/// How to address one class of cluster resources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSchema {
    pub kind: String,
    /// API group (empty string for core v1)
    pub group: String,
    pub version: String,
    pub plural: String,
    pub namespaced: bool,
    pub verbs: Vec<String>,
    pub short_names: Vec<String>,
    /// Scope was guessed, not reported by the cluster: a namespace is used when given
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub scope_inferred: bool,
}

impl ResourceSchema {
    /// Get the full API group/version string
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Whether requests may be addressed to a namespace
    pub fn takes_namespace(&self) -> bool {
        self.namespaced || self.scope_inferred
    }

    /// kube-rs view of this schema for dynamic API handles
    pub fn api_resource(&self) -> ApiResource {
        ApiResource {
            group: self.group.clone(),
            version: self.version.clone(),
            api_version: self.api_version(),
            kind: self.kind.clone(),
            plural: self.plural.clone(),
        }
    }

    /// Build a schema from a discovered API resource
    pub fn from_discovered(ar: &ApiResource, caps: &ApiCapabilities) -> Self {
        Self {
            kind: ar.kind.clone(),
            group: ar.group.clone(),
            version: ar.version.clone(),
            plural: ar.plural.clone(),
            namespaced: caps.scope == Scope::Namespaced,
            verbs: caps.operations.clone(),
            short_names: vec![],
            scope_inferred: false,
        }
    }

    fn with_api_version(mut self, api_version: &str) -> Self {
        let (group, version) = split_api_version(api_version);
        self.group = group;
        self.version = version;
        self
    }
}

/// Split "group/version" (or "v1" for core) into its parts
pub fn split_api_version(api_version: &str) -> (String, String) {
    match api_version.trim().rsplit_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.trim().to_string()),
    }
}

/// Kubernetes server version, major.minor only
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClusterVersion {
    pub major: u32,
    pub minor: u32,
}

impl ClusterVersion {
    /// Version assumed when the server version cannot be fetched
    pub const BASELINE: ClusterVersion = ClusterVersion::new(1, 24);

    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parse "1.22", "v1.22.3" or provider forms such as "1.22+" / "1.22-gke.100"
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().trim_start_matches(['v', 'V']);
        let mut parts = raw.split('.');
        let major = leading_number(parts.next()?)?;
        let minor = leading_number(parts.next()?)?;
        Some(Self::new(major, minor))
    }
}

fn leading_number(part: &str) -> Option<u32> {
    let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

impl fmt::Display for ClusterVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// A built-in resource and its group-version per release
struct StaticEntry {
    plural: &'static str,
    kind: &'static str,
    namespaced: bool,
    short_names: &'static [&'static str],
    /// (minimum cluster version, group/version), newest first; the last entry is the fallback
    versions: &'static [(ClusterVersion, &'static str)],
}

const ANY: ClusterVersion = ClusterVersion::new(0, 0);

impl StaticEntry {
    fn matches(&self, name: &str) -> bool {
        self.plural == name
            || self.kind.eq_ignore_ascii_case(name)
            || self.short_names.contains(&name)
    }

    fn api_version_for(&self, cluster: ClusterVersion) -> &'static str {
        self.versions
            .iter()
            .find(|(min, _)| cluster >= *min)
            .or(self.versions.last())
            .map(|(_, gv)| *gv)
            .unwrap_or("v1")
    }

    fn schema(&self, cluster: ClusterVersion) -> ResourceSchema {
        let (group, version) = split_api_version(self.api_version_for(cluster));
        ResourceSchema {
            kind: self.kind.to_string(),
            group,
            version,
            plural: self.plural.to_string(),
            namespaced: self.namespaced,
            verbs: STANDARD_VERBS.iter().map(|v| v.to_string()).collect(),
            short_names: self.short_names.iter().map(|s| s.to_string()).collect(),
            scope_inferred: false,
        }
    }
}

macro_rules! entry {
    ($plural:expr, $kind:expr, namespaced, [$($short:expr),*], $versions:expr) => {
        StaticEntry { plural: $plural, kind: $kind, namespaced: true, short_names: &[$($short),*], versions: $versions }
    };
    ($plural:expr, $kind:expr, cluster, [$($short:expr),*], $versions:expr) => {
        StaticEntry { plural: $plural, kind: $kind, namespaced: false, short_names: &[$($short),*], versions: $versions }
    };
}

const CORE_V1: &[(ClusterVersion, &str)] = &[(ANY, "v1")];
const APPS_V1: &[(ClusterVersion, &str)] = &[(ANY, "apps/v1")];
const RBAC_V1: &[(ClusterVersion, &str)] = &[(ANY, "rbac.authorization.k8s.io/v1")];
const STORAGE_V1: &[(ClusterVersion, &str)] = &[(ANY, "storage.k8s.io/v1")];

// Graduation thresholds follow the upstream deprecation guide
const CRONJOB_VERSIONS: &[(ClusterVersion, &str)] = &[
    (ClusterVersion::new(1, 21), "batch/v1"),
    (ANY, "batch/v1beta1"),
];
const HPA_VERSIONS: &[(ClusterVersion, &str)] = &[
    (ClusterVersion::new(1, 23), "autoscaling/v2"),
    (ClusterVersion::new(1, 12), "autoscaling/v2beta2"),
    (ANY, "autoscaling/v1"),
];
const PDB_VERSIONS: &[(ClusterVersion, &str)] = &[
    (ClusterVersion::new(1, 21), "policy/v1"),
    (ANY, "policy/v1beta1"),
];
const INGRESS_VERSIONS: &[(ClusterVersion, &str)] = &[
    (ClusterVersion::new(1, 19), "networking.k8s.io/v1"),
    (ClusterVersion::new(1, 14), "networking.k8s.io/v1beta1"),
    (ANY, "extensions/v1beta1"),
];
const INGRESS_CLASS_VERSIONS: &[(ClusterVersion, &str)] = &[
    (ClusterVersion::new(1, 19), "networking.k8s.io/v1"),
    (ANY, "networking.k8s.io/v1beta1"),
];
const CRD_VERSIONS: &[(ClusterVersion, &str)] = &[
    (ClusterVersion::new(1, 16), "apiextensions.k8s.io/v1"),
    (ANY, "apiextensions.k8s.io/v1beta1"),
];
const ENDPOINT_SLICE_VERSIONS: &[(ClusterVersion, &str)] = &[
    (ClusterVersion::new(1, 21), "discovery.k8s.io/v1"),
    (ANY, "discovery.k8s.io/v1beta1"),
];

static STATIC_TABLE: &[StaticEntry] = &[
    // Core API (v1) - namespaced resources
    entry!("pods", "Pod", namespaced, ["po"], CORE_V1),
    entry!("services", "Service", namespaced, ["svc"], CORE_V1),
    entry!("configmaps", "ConfigMap", namespaced, ["cm"], CORE_V1),
    entry!("secrets", "Secret", namespaced, [], CORE_V1),
    entry!("events", "Event", namespaced, ["ev"], CORE_V1),
    entry!("serviceaccounts", "ServiceAccount", namespaced, ["sa"], CORE_V1),
    entry!("endpoints", "Endpoints", namespaced, ["ep"], CORE_V1),
    entry!("persistentvolumeclaims", "PersistentVolumeClaim", namespaced, ["pvc"], CORE_V1),
    entry!("resourcequotas", "ResourceQuota", namespaced, ["quota"], CORE_V1),
    entry!("limitranges", "LimitRange", namespaced, ["limits"], CORE_V1),
    entry!("replicationcontrollers", "ReplicationController", namespaced, ["rc"], CORE_V1),
    entry!("podtemplates", "PodTemplate", namespaced, [], CORE_V1),
    // Core API (v1) - cluster-scoped resources
    entry!("nodes", "Node", cluster, ["no"], CORE_V1),
    entry!("namespaces", "Namespace", cluster, ["ns"], CORE_V1),
    entry!("persistentvolumes", "PersistentVolume", cluster, ["pv"], CORE_V1),
    // Apps API (apps/v1)
    entry!("deployments", "Deployment", namespaced, ["deploy"], APPS_V1),
    entry!("statefulsets", "StatefulSet", namespaced, ["sts"], APPS_V1),
    entry!("daemonsets", "DaemonSet", namespaced, ["ds"], APPS_V1),
    entry!("replicasets", "ReplicaSet", namespaced, ["rs"], APPS_V1),
    entry!("controllerrevisions", "ControllerRevision", namespaced, [], APPS_V1),
    // Batch
    entry!("jobs", "Job", namespaced, [], &[(ANY, "batch/v1")]),
    entry!("cronjobs", "CronJob", namespaced, ["cj"], CRONJOB_VERSIONS),
    // Autoscaling
    entry!("horizontalpodautoscalers", "HorizontalPodAutoscaler", namespaced, ["hpa"], HPA_VERSIONS),
    // Policy
    entry!("poddisruptionbudgets", "PodDisruptionBudget", namespaced, ["pdb"], PDB_VERSIONS),
    // Networking
    entry!("ingresses", "Ingress", namespaced, ["ing"], INGRESS_VERSIONS),
    entry!("ingressclasses", "IngressClass", cluster, [], INGRESS_CLASS_VERSIONS),
    entry!("networkpolicies", "NetworkPolicy", namespaced, ["netpol"], &[(ANY, "networking.k8s.io/v1")]),
    entry!("endpointslices", "EndpointSlice", namespaced, [], ENDPOINT_SLICE_VERSIONS),
    // API extensions
    entry!("customresourcedefinitions", "CustomResourceDefinition", cluster, ["crd", "crds"], CRD_VERSIONS),
    // RBAC
    entry!("roles", "Role", namespaced, [], RBAC_V1),
    entry!("rolebindings", "RoleBinding", namespaced, [], RBAC_V1),
    entry!("clusterroles", "ClusterRole", cluster, [], RBAC_V1),
    entry!("clusterrolebindings", "ClusterRoleBinding", cluster, [], RBAC_V1),
    // Storage
    entry!("storageclasses", "StorageClass", cluster, ["sc"], STORAGE_V1),
    entry!("volumeattachments", "VolumeAttachment", cluster, [], STORAGE_V1),
    entry!("csidrivers", "CSIDriver", cluster, [], STORAGE_V1),
    // Scheduling / coordination
    entry!("priorityclasses", "PriorityClass", cluster, ["pc"], &[(ANY, "scheduling.k8s.io/v1")]),
    entry!("leases", "Lease", namespaced, [], &[(ANY, "coordination.k8s.io/v1")]),
];

/// Guess a kind from a plural name: "widgets" -> "Widget", "policies" -> "Policy",
/// "classes" -> "Class"
pub fn guess_kind(plural: &str) -> String {
    let name = plural.trim();
    let singular = if let Some(stem) = name.strip_suffix("sses") {
        format!("{}ss", stem)
    } else if let Some(stem) = name.strip_suffix("ies") {
        format!("{}y", stem)
    } else if let Some(stem) = name.strip_suffix('s') {
        stem.to_string()
    } else {
        name.to_string()
    };

    let mut chars = singular.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Tier 1 and 2: static table lookup with version selection
pub fn resolve_static(resource_type: &str, cluster: ClusterVersion) -> Option<ResourceSchema> {
    let name = resource_type.trim().to_lowercase();
    STATIC_TABLE
        .iter()
        .find(|e| e.matches(&name))
        .map(|e| e.schema(cluster))
}

/// Tier 4: kind from morphology, version only from the caller.
/// The scope is unknown here, so requests follow whether the caller gives a namespace.
fn resolve_fallback(resource_type: &str, explicit: Option<&str>) -> Result<ResourceSchema> {
    let plural = resource_type.trim().to_lowercase();
    let kind = guess_kind(&plural);
    let Some(api_version) = explicit else {
        return Err(Error::UnresolvedApiVersion {
            resource: resource_type.to_string(),
        });
    };

    let schema = ResourceSchema {
        kind,
        group: String::new(),
        version: String::new(),
        plural,
        namespaced: false,
        verbs: STANDARD_VERBS.iter().map(|v| v.to_string()).collect(),
        short_names: vec![],
        scope_inferred: true,
    };
    Ok(schema.with_api_version(api_version))
}

/// Resolve without a cluster: static table, then morphological fallback
pub fn resolve_offline(
    resource_type: &str,
    cluster: ClusterVersion,
    explicit: Option<&str>,
) -> Result<ResourceSchema> {
    if resource_type.trim().is_empty() {
        return Err(Error::UnresolvedResourceKind {
            resource: resource_type.to_string(),
        });
    }
    if let Some(schema) = resolve_static(resource_type, cluster) {
        return Ok(apply_explicit(schema, explicit));
    }
    resolve_fallback(resource_type, explicit)
}

/// Resolve using every tier, including live discovery through `backend`
pub async fn resolve(
    resource_type: &str,
    cluster: ClusterVersion,
    explicit: Option<&str>,
    backend: &dyn ClusterBackend,
) -> Result<ResourceSchema> {
    if resource_type.trim().is_empty() {
        return Err(Error::UnresolvedResourceKind {
            resource: resource_type.to_string(),
        });
    }

    if let Some(schema) = resolve_static(resource_type, cluster) {
        debug!(resource = %resource_type, api_version = %schema.api_version(), "Resolved from static table");
        return Ok(apply_explicit(schema, explicit));
    }

    let name = resource_type.trim().to_lowercase();
    let kind_guess = guess_kind(&name);
    match backend.discover(&name, &kind_guess).await {
        Ok(Some(schema)) => {
            debug!(resource = %resource_type, kind = %schema.kind, "Resolved via discovery");
            return Ok(apply_explicit(schema, explicit));
        }
        Ok(None) => {
            debug!(resource = %resource_type, kind_guess = %kind_guess, "Discovery miss");
        }
        Err(e) => {
            debug!(resource = %resource_type, error = %e, "Discovery failed, using fallback");
        }
    }

    resolve_fallback(resource_type, explicit)
}

fn apply_explicit(schema: ResourceSchema, explicit: Option<&str>) -> ResourceSchema {
    match explicit {
        Some(api_version) if !api_version.trim().is_empty() => schema.with_api_version(api_version),
        _ => schema,
    }
}
