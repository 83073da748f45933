// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Query pipeline over untyped records: filter, then sort, then paginate.

pub mod filter;
pub mod paginate;
pub mod path;
pub mod service;
pub mod sort;
pub mod status;

pub use paginate::{PageRequest, PageResult};
pub use service::{QueryResponse, ResourceQuery, execute};
pub use sort::SortOrder;

use serde_json::Value;

/// Run the fixed filter -> sort -> paginate sequence
pub fn run_pipeline(
    records: Vec<Value>,
    search: Option<&str>,
    sort_by: Option<&str>,
    order: SortOrder,
    page: PageRequest,
) -> PageResult<Value> {
    let terms = search.map(filter::parse_terms).unwrap_or_default();
    let mut records = filter::apply(records, &terms);
    if let Some(sort_by) = sort_by.filter(|s| !s.trim().is_empty()) {
        sort::apply(&mut records, sort_by, order);
    }
    paginate::paginate(records, page)
}
