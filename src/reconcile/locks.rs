// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per cluster id, shared by both jobs and the allocation adjuster
#[derive(Debug, Default)]
pub struct ClusterLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ClusterLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive write access to `cluster_id`
    pub async fn lock(&self, cluster_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(cluster_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}
