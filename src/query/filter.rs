// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Search-term filtering.
//!
//! A search string is a comma-joined list of terms, each either `key=value`
//! or a bare token (matched against the name). A record survives only if it
//! matches every term.

use serde_json::Value;

use super::path::{FieldPath, lookup, value_to_string};
use super::status::{resource_ready, resource_status};

/// One parsed search term
#[derive(Debug, Clone, PartialEq)]
pub enum FilterTerm {
    /// `name=...` or a bare token: case-insensitive substring of metadata.name
    Name(String),
    /// `label.<key>=...`: case-insensitive exact label value
    Label { key: String, value: String },
    /// `status=...` / `phase=...`: resource-specific status, case-insensitive
    Status(String),
    /// `ready=true|false`
    Ready(bool),
    /// `image=...`: substring of any container image
    Image(String),
    /// Any other dotted path: case-insensitive substring of the value
    Field { path: FieldPath, value: String },
    /// A term that can never match (unparseable path or ready value)
    Never,
}

impl FilterTerm {
    /// Parse a single term
    pub fn parse(term: &str) -> Option<Self> {
        let term = term.trim();
        if term.is_empty() {
            return None;
        }

        let Some((key, value)) = term.split_once('=') else {
            return Some(Self::Name(term.to_lowercase()));
        };
        let key = key.trim();
        let value = value.trim().to_string();

        if let Some(label_key) = key.strip_prefix("label.") {
            return Some(Self::Label {
                key: label_key.to_string(),
                value: value.to_lowercase(),
            });
        }

        let parsed = match key.to_lowercase().as_str() {
            "name" => Self::Name(value.to_lowercase()),
            "status" | "phase" => Self::Status(value.to_lowercase()),
            "ready" => match value.to_lowercase().as_str() {
                "true" | "yes" | "1" => Self::Ready(true),
                "false" | "no" | "0" => Self::Ready(false),
                _ => Self::Never,
            },
            "image" => Self::Image(value.to_lowercase()),
            _ => match FieldPath::parse(key) {
                Some(path) => Self::Field {
                    path,
                    value: value.to_lowercase(),
                },
                None => Self::Never,
            },
        };
        Some(parsed)
    }

    /// Check whether a record satisfies this term
    pub fn matches(&self, record: &Value) -> bool {
        match self {
            Self::Name(needle) => lookup(record, "metadata.name")
                .and_then(Value::as_str)
                .is_some_and(|name| name.to_lowercase().contains(needle)),
            Self::Label { key, value } => label_value(record, key)
                .is_some_and(|v| v.to_lowercase() == *value),
            Self::Status(wanted) => {
                resource_status(record).is_some_and(|s| s.to_lowercase() == *wanted)
            }
            Self::Ready(wanted) => resource_ready(record) == Some(*wanted),
            Self::Image(needle) => container_images(record)
                .iter()
                .any(|image| image.to_lowercase().contains(needle)),
            Self::Field { path, value } => path
                .lookup(record)
                .is_some_and(|v| value_to_string(v).to_lowercase().contains(value)),
            Self::Never => false,
        }
    }
}

/// Parse a comma-joined search string
pub fn parse_terms(search: &str) -> Vec<FilterTerm> {
    search.split(',').filter_map(FilterTerm::parse).collect()
}

/// Keep only records matching every term
pub fn apply(records: Vec<Value>, terms: &[FilterTerm]) -> Vec<Value> {
    if terms.is_empty() {
        return records;
    }
    records
        .into_iter()
        .filter(|record| terms.iter().all(|term| term.matches(record)))
        .collect()
}

fn label_value<'a>(record: &'a Value, key: &str) -> Option<&'a str> {
    let labels = lookup(record, "metadata.labels")?.as_object()?;
    labels
        .get(key)
        .or_else(|| {
            labels
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
        .and_then(Value::as_str)
}

/// All container images of a record, covering bare pods and pod templates
fn container_images(record: &Value) -> Vec<&str> {
    const CONTAINER_LISTS: &[&str] = &[
        "spec.containers",
        "spec.initContainers",
        "spec.template.spec.containers",
        "spec.template.spec.initContainers",
        "spec.jobTemplate.spec.template.spec.containers",
    ];

    CONTAINER_LISTS
        .iter()
        .filter_map(|path| lookup(record, path).and_then(Value::as_array))
        .flatten()
        .filter_map(|c| c.get("image").and_then(Value::as_str))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pods() -> Vec<Value> {
        vec![
            json!({"kind": "Pod", "metadata": {"name": "web-1", "labels": {"app": "Web", "tier": "front"}},
                "spec": {"containers": [{"image": "nginx:1.25"}], "nodeName": "node-a"},
                "status": {"phase": "Running", "containerStatuses": [{"ready": true}]}}),
            json!({"kind": "Pod", "metadata": {"name": "web-2", "labels": {"app": "web", "tier": "back"}},
                "spec": {"containers": [{"image": "envoy:1.29"}], "nodeName": "node-b"},
                "status": {"phase": "Pending", "containerStatuses": [{"ready": false}]}}),
            json!({"kind": "Pod", "metadata": {"name": "db-0", "labels": {"app": "db"}},
                "spec": {"containers": [{"image": "postgres:16"}], "initContainers": [{"image": "busybox"}],
                    "nodeName": "node-a"},
                "status": {"phase": "Running", "containerStatuses": [{"ready": true}]}}),
        ]
    }

    fn names(records: &[Value]) -> Vec<&str> {
        records
            .iter()
            .map(|r| r["metadata"]["name"].as_str().unwrap())
            .collect()
    }

    #[test]
    fn test_parse_terms() {
        let terms = parse_terms("web, status=Running ,label.app=web,,ready=true");
        assert_eq!(terms.len(), 4);
        assert_eq!(terms[0], FilterTerm::Name("web".to_string()));
        assert_eq!(terms[1], FilterTerm::Status("running".to_string()));
        assert_eq!(
            terms[2],
            FilterTerm::Label {
                key: "app".to_string(),
                value: "web".to_string()
            }
        );
        assert_eq!(terms[3], FilterTerm::Ready(true));
    }

    #[test]
    fn test_bare_token_matches_name() {
        let result = apply(pods(), &parse_terms("WEB"));
        assert_eq!(names(&result), vec!["web-1", "web-2"]);
    }

    #[test]
    fn test_label_exact_case_insensitive() {
        let result = apply(pods(), &parse_terms("label.app=WEB"));
        assert_eq!(names(&result), vec!["web-1", "web-2"]);
        let result = apply(pods(), &parse_terms("label.app=we"));
        assert!(result.is_empty());
    }

    #[test]
    fn test_status_and_ready() {
        let result = apply(pods(), &parse_terms("phase=running"));
        assert_eq!(names(&result), vec!["web-1", "db-0"]);
        let result = apply(pods(), &parse_terms("ready=false"));
        assert_eq!(names(&result), vec!["web-2"]);
    }

    #[test]
    fn test_image_includes_init_containers() {
        let result = apply(pods(), &parse_terms("image=busy"));
        assert_eq!(names(&result), vec!["db-0"]);
    }

    #[test]
    fn test_dotted_path_substring() {
        let result = apply(pods(), &parse_terms("spec.nodeName=NODE-A"));
        assert_eq!(names(&result), vec!["web-1", "db-0"]);
        let result = apply(pods(), &parse_terms("spec.containers[0].image=envoy"));
        assert_eq!(names(&result), vec!["web-2"]);
    }

    #[test]
    fn test_missing_path_excludes() {
        let result = apply(pods(), &parse_terms("status.podIP=10."));
        assert!(result.is_empty());
    }

    #[test]
    fn test_invalid_terms_never_match() {
        assert!(apply(pods(), &parse_terms("ready=maybe")).is_empty());
        assert!(apply(pods(), &parse_terms("spec..x=1")).is_empty());
    }

    #[test]
    fn test_conjunction_is_intersection() {
        let a = parse_terms("label.app=web");
        let b = parse_terms("spec.nodeName=node-a");
        let both: Vec<FilterTerm> = a.iter().chain(b.iter()).cloned().collect();

        let only_a = names(&apply(pods(), &a))
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        let only_b = names(&apply(pods(), &b))
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        let intersection: Vec<String> = only_a.into_iter().filter(|n| only_b.contains(n)).collect();

        let combined = apply(pods(), &both);
        assert_eq!(names(&combined), intersection);
        assert_eq!(names(&combined), vec!["web-1"]);
    }

    #[test]
    fn test_empty_search_keeps_all() {
        assert_eq!(apply(pods(), &parse_terms("")).len(), 3);
    }
}
