// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Kubeconfig context selection
//!
//! Picks which context of a credential file to connect with:
//! 1. The configured context name (exact, or a glob such as "prod-*")
//! 2. The lexicographically first context whose user name contains "admin"
//! 3. The file's current-context

use kube::config::Kubeconfig;
use regex::Regex;
use tracing::{debug, warn};

/// A context name paired with the user it authenticates as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextEntry {
    pub name: String,
    pub user: Option<String>,
}

impl ContextEntry {
    fn has_admin_user(&self) -> bool {
        self.user
            .as_deref()
            .is_some_and(|u| u.to_lowercase().contains("admin"))
    }
}

pub struct ContextMatcher {
    contexts: Vec<ContextEntry>,
    current: Option<String>,
}

impl ContextMatcher {
    pub fn new(contexts: Vec<ContextEntry>, current: Option<String>) -> Self {
        Self { contexts, current }
    }

    pub fn from_kubeconfig(kubeconfig: &Kubeconfig) -> Self {
        let contexts = kubeconfig
            .contexts
            .iter()
            .map(|named| {
                // Read the user through serde so we don't depend on the field's exact shape
                let user = serde_json::to_value(named)
                    .ok()
                    .and_then(|v| v.pointer("/context/user")?.as_str().map(String::from));
                ContextEntry {
                    name: named.name.clone(),
                    user,
                }
            })
            .collect();
        Self::new(contexts, kubeconfig.current_context.clone())
    }

    /// Choose the context to use; `None` lets the client fall back to its own default
    pub fn select(&self, explicit: Option<&str>) -> Option<String> {
        if let Some(pattern) = explicit.map(str::trim).filter(|p| !p.is_empty()) {
            let glob = glob_regex(pattern);
            if let Some(found) = self.contexts.iter().find(|c| {
                c.name == pattern || glob.as_ref().is_some_and(|re| re.is_match(&c.name))
            }) {
                debug!(context = %found.name, "Using configured context");
                return Some(found.name.clone());
            }
            warn!(context = %pattern, "Configured context not present in kubeconfig, falling back");
        }

        if let Some(admin) = self
            .contexts
            .iter()
            .filter(|c| c.has_admin_user())
            .min_by(|a, b| a.name.cmp(&b.name))
        {
            debug!(context = %admin.name, "Using administrative context");
            return Some(admin.name.clone());
        }

        self.current
            .clone()
            .filter(|current| self.contexts.iter().any(|c| &c.name == current))
            .or_else(|| self.contexts.first().map(|c| c.name.clone()))
    }
}

/// Anchored regex for a context pattern using `*` and `?`; `None` when it has no wildcard
fn glob_regex(pattern: &str) -> Option<Regex> {
    if !pattern.contains(['*', '?']) {
        return None;
    }
    let body = regex::escape(pattern)
        .replace(r"\*", ".*")
        .replace(r"\?", ".");
    Regex::new(&format!("^{}$", body)).ok()
}
