// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Schema-agnostic Kubernetes access for a multi-cluster control plane.
//!
//! Clusters are reached through a [`kubernetes::ConnectionRegistry`]; any
//! resource type is resolved to a [`kubernetes::ResourceSchema`] and handled as
//! untyped JSON by a [`kubernetes::ResourceClient`]. The [`reconcile`] jobs keep
//! the [`store`] records of workloads and node inventory in step with the
//! live clusters.

pub mod cli;
pub mod config;
pub mod error;
pub mod kubernetes;
pub mod output;
pub mod query;
pub mod reconcile;
pub mod store;
pub mod units;
