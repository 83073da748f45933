// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

use std::borrow::Cow;

use comfy_table::{Table, presets::ASCII_BORDERS_ONLY_CONDENSED};

use super::QueryResult;

/// Which end of an over-long cell survives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keep {
    /// Label lists read left to right
    Start,
    /// Credential paths are told apart by their file name
    End,
}

/// Width limit for free-form columns; everything else is printed whole
fn column_limit(column: &str) -> Option<(usize, Keep)> {
    match column {
        "labels" => Some((60, Keep::Start)),
        "credentials" => Some((48, Keep::End)),
        _ => None,
    }
}

fn elide(value: &str, max_len: usize, keep: Keep) -> Cow<'_, str> {
    let len = value.chars().count();
    if len <= max_len {
        return Cow::Borrowed(value);
    }
    let kept = max_len.saturating_sub(3);
    Cow::Owned(match keep {
        Keep::Start => format!("{}...", value.chars().take(kept).collect::<String>()),
        Keep::End => format!("...{}", value.chars().skip(len - kept).collect::<String>()),
    })
}

pub struct TableFormatter;

impl TableFormatter {
    pub fn format(result: &QueryResult, no_headers: bool) -> String {
        let summary = match &result.footer {
            Some(footer) => format!("({} rows)\n{}", result.rows.len(), footer),
            None => format!("({} rows)", result.rows.len()),
        };
        if result.rows.is_empty() {
            return summary;
        }

        let limits: Vec<Option<(usize, Keep)>> =
            result.columns.iter().map(|c| column_limit(c)).collect();

        let mut table = Table::new();
        table.load_preset(ASCII_BORDERS_ONLY_CONDENSED);
        if !no_headers {
            table.set_header(&result.columns);
        }
        for row in &result.rows {
            table.add_row(row.iter().zip(&limits).map(|(value, limit)| match limit {
                Some((max_len, keep)) => elide(value, *max_len, *keep),
                None => Cow::Borrowed(value.as_str()),
            }));
        }

        format!("{}\n{}", table, summary)
    }
}
