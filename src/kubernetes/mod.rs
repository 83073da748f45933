// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

pub mod backend;
pub(crate) mod cache;
pub mod client;
mod context_matcher;
pub mod discovery;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{
    BackendFactory, ClusterBackend, DeleteOptions, KubeBackendFactory, ListOptions, Propagation,
};
pub use client::{DeleteReport, ListResult, ResourceClient};
pub use discovery::{ClusterVersion, ResourceSchema};
pub use registry::{ClusterConnection, ConnectionRegistry, RegistryOptions};
