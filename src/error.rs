// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Error taxonomy shared by the resolver, resource client, registry and
//! reconciliation jobs.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// No credential tier produced a working client for the cluster
    #[error("no reachable credentials for cluster '{cluster_id}': {reason}")]
    ConnectionUnavailable { cluster_id: String, reason: String },

    /// The group-version could not be determined and none was supplied
    #[error("cannot determine API version for resource '{resource}'; pass one explicitly")]
    UnresolvedApiVersion { resource: String },

    #[error("cannot determine resource kind for '{resource}'")]
    UnresolvedResourceKind { resource: String },

    #[error("resource '{resource}' is namespaced; a namespace is required")]
    MissingNamespace { resource: String },

    #[error("argument mismatch: {0}")]
    ArgumentMismatch(String),

    /// Failure reported by the Kubernetes API server
    #[error("kubernetes API error {code} ({reason}): {message}")]
    ProviderApi {
        code: u16,
        reason: String,
        message: String,
    },

    #[error("cluster '{cluster_id}' is not usable: {reason}")]
    InvalidClusterState { cluster_id: String, reason: String },

    #[error("cluster '{cluster_id}' has neither a credential file nor inline credential content")]
    MissingCredential { cluster_id: String },

    /// Inventory reconciliation has not observed this node yet
    #[error("node '{node}' of cluster '{cluster_id}' has no inventory row")]
    NodeNotTracked { cluster_id: String, node: String },

    #[error("store error: {0}")]
    Store(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn provider(code: u16, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderApi {
            code,
            reason: reason.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ProviderApi { code: 404, .. })
    }

    /// Transient provider failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderApi { code: 429 | 503 | 504, .. })
    }
}

impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) => Self::ProviderApi {
                code: resp.code,
                reason: resp.reason,
                message: resp.message,
            },
            // Transport failures surface as 503 so callers treat them as transient
            kube::Error::HyperError(e) => Self::provider(503, "TransportError", e.to_string()),
            other => Self::provider(0, "ClientError", other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        assert!(Error::provider(404, "NotFound", "pods \"x\" not found").is_not_found());
        assert!(!Error::provider(409, "AlreadyExists", "exists").is_not_found());
    }

    #[test]
    fn test_retryable_codes() {
        assert!(Error::provider(429, "TooManyRequests", "").is_retryable());
        assert!(Error::provider(503, "ServiceUnavailable", "").is_retryable());
        assert!(!Error::provider(403, "Forbidden", "").is_retryable());
        assert!(
            !Error::MissingNamespace {
                resource: "pods".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_display_carries_status() {
        let err = Error::provider(422, "Invalid", "spec.replicas must be >= 0");
        let msg = err.to_string();
        assert!(msg.contains("422"));
        assert!(msg.contains("Invalid"));
        assert!(msg.contains("spec.replicas"));
    }
}
