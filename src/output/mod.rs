// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

mod json;
mod table;
mod yaml;

pub use json::JsonFormatter;
pub use table::TableFormatter;
pub use yaml::YamlFormatter;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

use crate::cli::OutputFormat;
use crate::kubernetes::{DeleteReport, ResourceSchema};
use crate::query::QueryResponse;
use crate::query::path::lookup;
use crate::query::status::resource_status;
use crate::store::ClusterRecord;

/// Tabular view of a result; structured formats serialize the result itself
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Trailing line under the table, e.g. paging position
    pub footer: Option<String>,
}

impl QueryResult {
    fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
            footer: None,
        }
    }

    /// One row per record: name, namespace, kind, status, creation time, labels
    pub fn from_records(records: &[Value]) -> Self {
        let mut result = Self::new(&["name", "namespace", "kind", "status", "created", "labels"]);
        let text = |record: &Value, path: &str| {
            lookup(record, path)
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string()
        };
        for record in records {
            let labels = record
                .pointer("/metadata/labels")
                .and_then(Value::as_object)
                .map(|m| {
                    m.iter()
                        .map(|(k, v)| format!("{}={}", k, v.as_str().unwrap_or_default()))
                        .collect::<Vec<_>>()
                        .join(",")
                })
                .unwrap_or_default();
            result.rows.push(vec![
                text(record, "metadata.name"),
                text(record, "metadata.namespace"),
                text(record, "kind"),
                resource_status(record).unwrap_or_default(),
                text(record, "metadata.creationTimestamp"),
                labels,
            ]);
        }
        result
    }

    pub fn from_response(response: &QueryResponse) -> Self {
        let page = &response.page;
        let mut result = Self::from_records(&page.items);
        let mut footer = format!(
            "page {}/{} of {} {}",
            page.current_page,
            page.total_pages.max(1),
            page.total_count,
            response.schema.plural
        );
        if let Some(token) = &response.continue_token {
            footer.push_str(&format!(", more on server (--continue {})", token));
        }
        result.footer = Some(footer);
        result
    }

    pub fn from_schema(schema: &ResourceSchema) -> Self {
        let mut result = Self::new(&["field", "value"]);
        let pairs = [
            ("kind", schema.kind.clone()),
            ("apiVersion", schema.api_version()),
            ("plural", schema.plural.clone()),
            (
                "namespaced",
                if schema.scope_inferred {
                    "unknown".to_string()
                } else {
                    schema.namespaced.to_string()
                },
            ),
            ("verbs", schema.verbs.join(",")),
            ("shortNames", schema.short_names.join(",")),
        ];
        for (field, value) in pairs {
            result.rows.push(vec![field.to_string(), value]);
        }
        result
    }

    pub fn from_delete_report(report: &DeleteReport) -> Self {
        let mut result = Self::new(&["name", "outcome"]);
        let deleted = if report.dry_run { "deleted (dry run)" } else { "deleted" };
        for name in &report.deleted {
            result.rows.push(vec![name.clone(), deleted.to_string()]);
        }
        for name in &report.not_found {
            result.rows.push(vec![name.clone(), "not found".to_string()]);
        }
        result
    }

    pub fn from_clusters(clusters: &[ClusterRecord]) -> Self {
        let mut result = Self::new(&["id", "name", "status", "credentials", "context"]);
        for cluster in clusters {
            let credentials = match (&cluster.kubeconfig_path, &cluster.kubeconfig_content) {
                (Some(path), _) => path.clone(),
                (None, Some(_)) => "(inline)".to_string(),
                (None, None) => "(none)".to_string(),
            };
            result.rows.push(vec![
                cluster.id.clone(),
                cluster.name.clone(),
                cluster.status.to_string(),
                credentials,
                cluster.context_name.clone().unwrap_or_default(),
            ]);
        }
        result
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Render `value` in the requested format; tables use the prepared view
pub fn render<T: Serialize>(
    value: &T,
    table: &QueryResult,
    format: OutputFormat,
    no_headers: bool,
) -> Result<String> {
    Ok(match format {
        OutputFormat::Table => TableFormatter::format(table, no_headers),
        OutputFormat::Json => JsonFormatter::format(value)?,
        OutputFormat::Yaml => YamlFormatter::format(value)?,
    })
}
