// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Stable sorting of records by a dotted field path.

use chrono::DateTime;
use serde_json::Value;
use std::cmp::Ordering;

use super::path::{FieldPath, value_to_string};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    /// Parse "asc"/"desc" (case-insensitive); anything else is ascending
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("desc") {
            Self::Desc
        } else {
            Self::Asc
        }
    }
}

/// Comparable projection of a field value
#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Number(f64),
    Timestamp(i64),
    Text(String),
}

impl SortKey {
    fn from_value(value: Option<&Value>) -> Self {
        let Some(value) = value else {
            return Self::Text(String::new());
        };
        match value {
            Value::Number(n) => n.as_f64().map(Self::Number).unwrap_or(Self::Text(n.to_string())),
            Value::String(s) => match DateTime::parse_from_rfc3339(s) {
                Ok(ts) => Self::Timestamp(ts.timestamp()),
                Err(_) => Self::Text(s.to_lowercase()),
            },
            Value::Object(map) => match map.get("seconds").and_then(Value::as_i64) {
                Some(seconds) => Self::Timestamp(seconds),
                None => Self::Text(value_to_string(value).to_lowercase()),
            },
            other => Self::Text(value_to_string(other).to_lowercase()),
        }
    }

    /// Numbers before timestamps before text when a column mixes kinds
    fn rank(&self) -> u8 {
        match self {
            Self::Number(_) => 0,
            Self::Timestamp(_) => 1,
            Self::Text(_) => 2,
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Timestamp(a), Self::Timestamp(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

/// Sort records in place by `sort_by`. An unparseable path leaves the order untouched.
pub fn apply(records: &mut [Value], sort_by: &str, order: SortOrder) {
    let Some(path) = FieldPath::parse(sort_by) else {
        return;
    };

    // Project keys once instead of per comparison
    let mut keyed: Vec<(SortKey, Value)> = records
        .iter_mut()
        .map(|record| (SortKey::from_value(path.lookup(record)), std::mem::take(record)))
        .collect();

    keyed.sort_by(|(a, _), (b, _)| {
        let ordering = a.compare(b);
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });

    for (slot, (_, record)) in records.iter_mut().zip(keyed) {
        *slot = record;
    }
}
