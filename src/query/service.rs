// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! One-call resource queries against a registered cluster.

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::{PageRequest, PageResult, SortOrder, run_pipeline};
use crate::error::Result;
use crate::kubernetes::{ConnectionRegistry, ListOptions, ResourceSchema};

/// Everything one query needs; built once, never mutated by `execute`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceQuery {
    pub resource_type: String,
    pub api_version: Option<String>,
    pub namespace: Option<String>,
    pub all_namespaces: bool,
    /// Fetch a single object instead of listing
    pub name: Option<String>,
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
    pub search: Option<String>,
    pub page: PageRequest,
    pub sort_by: Option<String>,
    pub sort_order: SortOrder,
    /// Server-side page size; with a limit only one server page is fetched
    pub limit: Option<u32>,
    pub continue_token: Option<String>,
}

impl ResourceQuery {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            ..Default::default()
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn all_namespaces(mut self) -> Self {
        self.all_namespaces = true;
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn sort(mut self, sort_by: impl Into<String>, order: SortOrder) -> Self {
        self.sort_by = Some(sort_by.into());
        self.sort_order = order;
        self
    }

    pub fn page(mut self, page: PageRequest) -> Self {
        self.page = page;
        self
    }

    fn list_options(&self) -> ListOptions {
        ListOptions {
            namespace: self.namespace.clone(),
            all_namespaces: self.all_namespaces,
            label_selector: self.label_selector.clone(),
            field_selector: self.field_selector.clone(),
            limit: self.limit,
            continue_token: self.continue_token.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub page: PageResult<Value>,
    /// Server continuation token, passed through untouched
    pub continue_token: Option<String>,
    pub remaining_item_count: Option<i64>,
    pub schema: ResourceSchema,
}

/// Connect, resolve, fetch and run the pipeline for one query
pub async fn execute(
    registry: &ConnectionRegistry,
    cluster_id: &str,
    query: &ResourceQuery,
) -> Result<QueryResponse> {
    let connection = registry.connect(cluster_id).await?;
    let client = connection
        .resources(&query.resource_type, query.api_version.as_deref())
        .await?;

    let (records, continue_token, remaining_item_count) = match query.name.as_deref() {
        Some(name) => {
            let record = client.fetch_one(name, query.namespace.as_deref()).await?;
            (vec![record], None, None)
        }
        None if query.limit.is_some() || query.continue_token.is_some() => {
            let page = client.list(&query.list_options()).await?;
            (page.items, page.continue_token, page.remaining_item_count)
        }
        None => (client.list_all(&query.list_options()).await?, None, None),
    };

    debug!(
        cluster_id = %cluster_id,
        resource = %query.resource_type,
        fetched = records.len(),
        "Running query pipeline"
    );

    let page = run_pipeline(
        records,
        query.search.as_deref(),
        query.sort_by.as_deref(),
        query.sort_order,
        query.page,
    );

    Ok(QueryResponse {
        page,
        continue_token,
        remaining_item_count,
        schema: client.schema().clone(),
    })
}
