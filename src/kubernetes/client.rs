// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! CRUD over one resolved resource type.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use super::backend::{ClusterBackend, DeleteOptions, ListOptions, Propagation};
use super::discovery::ResourceSchema;
use crate::error::{Error, Result};

/// Page size for paginated list requests
const PAGE_SIZE: u32 = 500;

/// One server page, normalized
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResult {
    pub items: Vec<Value>,
    pub continue_token: Option<String>,
    pub remaining_item_count: Option<i64>,
}

/// Outcome of a delete call; not-found names make `success` false without failing the call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReport {
    pub success: bool,
    pub dry_run: bool,
    pub deleted: Vec<String>,
    pub not_found: Vec<String>,
}

impl DeleteReport {
    fn new(dry_run: bool) -> Self {
        Self {
            success: true,
            dry_run,
            ..Default::default()
        }
    }

    fn record_not_found(&mut self, name: &str) {
        self.success = false;
        self.not_found.push(name.to_string());
    }
}

/// Handle for one resource type on one cluster
#[derive(Clone)]
pub struct ResourceClient {
    schema: ResourceSchema,
    backend: Arc<dyn ClusterBackend>,
}

impl ResourceClient {
    pub fn new(schema: ResourceSchema, backend: Arc<dyn ClusterBackend>) -> Self {
        Self { schema, backend }
    }

    pub fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    /// Namespace to address: required for namespaced types, dropped for cluster-scoped ones,
    /// passed through as given when the scope is only inferred
    fn scope<'a>(&self, namespace: Option<&'a str>) -> Result<Option<&'a str>> {
        if !self.schema.takes_namespace() {
            return Ok(None);
        }
        let namespace = namespace.filter(|ns| !ns.is_empty());
        if self.schema.scope_inferred {
            return Ok(namespace);
        }
        match namespace {
            Some(ns) => Ok(Some(ns)),
            None => Err(Error::MissingNamespace {
                resource: self.schema.plural.clone(),
            }),
        }
    }

    /// Fill in apiVersion/kind, which list responses omit per item
    fn normalize(&self, mut record: Value) -> Value {
        if let Value::Object(ref mut map) = record {
            map.entry("apiVersion")
                .or_insert_with(|| Value::String(self.schema.api_version()));
            map.entry("kind")
                .or_insert_with(|| Value::String(self.schema.kind.clone()));
        }
        record
    }

    /// Prepare an outgoing body: stamp apiVersion/kind and the target namespace
    fn outgoing(&self, body: Value, namespace: Option<&str>) -> Result<Value> {
        let mut body = self.normalize(body);
        let Value::Object(ref mut map) = body else {
            return Err(Error::ArgumentMismatch(format!(
                "{} body must be a JSON object",
                self.schema.kind
            )));
        };
        if let Some(ns) = namespace {
            let metadata = map
                .entry("metadata")
                .or_insert_with(|| Value::Object(Default::default()));
            if let Value::Object(meta) = metadata {
                meta.insert("namespace".to_string(), Value::String(ns.to_string()));
            }
        }
        Ok(body)
    }

    pub async fn fetch_one(&self, name: &str, namespace: Option<&str>) -> Result<Value> {
        let namespace = self.scope(namespace)?;
        let record = self.backend.get(&self.schema, namespace, name).await?;
        Ok(self.normalize(record))
    }

    /// Fetch one server page
    pub async fn list(&self, options: &ListOptions) -> Result<ListResult> {
        let mut options = options.clone();
        if self.schema.takes_namespace() && !options.all_namespaces {
            options.namespace = self.scope(options.namespace.as_deref())?.map(String::from);
        }

        debug!(
            resource = %self.schema.plural,
            api_version = %self.schema.api_version(),
            namespace = ?options.namespace,
            all_namespaces = options.all_namespaces,
            "Listing resources"
        );

        let page = self.backend.list(&self.schema, &options).await?;
        Ok(ListResult {
            items: page.items.into_iter().map(|r| self.normalize(r)).collect(),
            continue_token: page.continue_token,
            remaining_item_count: page.remaining_item_count,
        })
    }

    /// Follow continue tokens until the collection is exhausted
    pub async fn list_all(&self, options: &ListOptions) -> Result<Vec<Value>> {
        let mut all_items = Vec::new();
        let mut page_options = options.clone();
        page_options.limit = Some(options.limit.unwrap_or(PAGE_SIZE));
        let mut page_count = 0u32;

        loop {
            let page = self.list(&page_options).await?;
            all_items.extend(page.items);
            page_count += 1;

            match page.continue_token {
                Some(token) if !token.is_empty() => page_options.continue_token = Some(token),
                _ => break,
            }
        }

        if page_count > 1 {
            debug!(
                resource = %self.schema.plural,
                pages = page_count,
                total_items = all_items.len(),
                "Pagination complete"
            );
        }
        Ok(all_items)
    }

    pub async fn create(&self, body: Value, namespace: Option<&str>) -> Result<Value> {
        let body_ns = body
            .pointer("/metadata/namespace")
            .and_then(Value::as_str)
            .map(String::from);
        let namespace = self.scope(namespace.or(body_ns.as_deref()))?;
        let body = self.outgoing(body, namespace)?;
        let created = self.backend.create(&self.schema, namespace, body).await?;
        Ok(self.normalize(created))
    }

    /// Replace `name`; the body's metadata.name must agree with it
    pub async fn update(&self, body: Value, name: &str, namespace: Option<&str>) -> Result<Value> {
        let body_name = body.pointer("/metadata/name").and_then(Value::as_str);
        if body_name != Some(name) {
            return Err(Error::ArgumentMismatch(format!(
                "body metadata.name {:?} does not match target '{}'",
                body_name.unwrap_or_default(),
                name
            )));
        }
        let namespace = self.scope(namespace)?;
        let body = self.outgoing(body, namespace)?;
        let updated = self
            .backend
            .replace(&self.schema, namespace, name, body)
            .await?;
        Ok(self.normalize(updated))
    }

    pub async fn delete(
        &self,
        name: &str,
        namespace: Option<&str>,
        propagation: Option<Propagation>,
        dry_run: bool,
    ) -> Result<DeleteReport> {
        self.delete_many(&[name.to_string()], namespace, propagation, dry_run)
            .await
    }

    /// Delete several names; missing ones are reported, other failures abort
    pub async fn delete_many(
        &self,
        names: &[String],
        namespace: Option<&str>,
        propagation: Option<Propagation>,
        dry_run: bool,
    ) -> Result<DeleteReport> {
        let namespace = self.scope(namespace)?;
        let options = DeleteOptions {
            propagation,
            dry_run,
        };
        let mut report = DeleteReport::new(dry_run);

        for name in names {
            match self
                .backend
                .delete(&self.schema, namespace, name, &options)
                .await
            {
                Ok(()) => {
                    info!(resource = %self.schema.plural, name = %name, namespace = ?namespace, dry_run, "Deleted");
                    report.deleted.push(name.clone());
                }
                Err(e) if e.is_not_found() => {
                    debug!(resource = %self.schema.plural, name = %name, "Already gone");
                    report.record_not_found(name);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }
}
