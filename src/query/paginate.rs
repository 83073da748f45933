// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Client-side paging over an already-fetched, filtered and sorted collection.

use serde::Serialize;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Requested page; both values are at least 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub page_size: i64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    pub fn new(page: i64, page_size: i64) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.max(1),
        }
    }

    /// Coerce raw caller values; unparseable values fall back to the defaults
    pub fn coerce(page: Option<&str>, page_size: Option<&str>) -> Self {
        fn to_int(raw: Option<&str>, default: i64) -> i64 {
            raw.and_then(|s| {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
            })
            .unwrap_or(default)
        }
        Self::new(
            to_int(page, DEFAULT_PAGE),
            to_int(page_size, DEFAULT_PAGE_SIZE),
        )
    }
}

/// One page of results plus navigation metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub current_page: i64,
    pub page_size: i64,
    pub total_count: usize,
    /// Zero for an empty collection
    pub total_pages: i64,
    pub has_next: bool,
    pub has_previous: bool,
    /// 0-based offset of the first returned item
    pub start_index: usize,
    /// Exclusive end offset; `end_index - start_index == items.len()`
    pub end_index: usize,
}

/// Slice `items` according to `request`, clamping the page into range
pub fn paginate<T>(items: Vec<T>, request: PageRequest) -> PageResult<T> {
    let page_size = request.page_size.max(1);
    let total_count = items.len();
    // Offsets saturate, so an oversized page is one page holding everything
    let size = usize::try_from(page_size).unwrap_or(usize::MAX);
    let total_pages = i64::try_from(total_count.div_ceil(size)).unwrap_or(i64::MAX);

    let current_page = request.page.clamp(1, total_pages.max(1));
    let skipped = usize::try_from(current_page - 1).unwrap_or(usize::MAX);
    let start_index = skipped.saturating_mul(size).min(total_count);
    let end_index = start_index.saturating_add(size).min(total_count);

    let page_items: Vec<T> = items
        .into_iter()
        .skip(start_index)
        .take(end_index - start_index)
        .collect();

    PageResult {
        items: page_items,
        current_page,
        page_size,
        total_count,
        total_pages,
        has_next: current_page < total_pages,
        has_previous: current_page > 1,
        start_index,
        end_index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_middle_page() {
        let result = paginate(vec!["p1", "p2", "p3", "p4", "p5"], PageRequest::new(2, 2));
        assert_eq!(result.items, vec!["p3", "p4"]);
        assert_eq!(result.total_pages, 3);
        assert_eq!(result.total_count, 5);
        assert!(result.has_next);
        assert!(result.has_previous);
        assert_eq!((result.start_index, result.end_index), (2, 4));
    }

    #[test]
    fn test_last_partial_page() {
        let result = paginate(vec![1, 2, 3, 4, 5], PageRequest::new(3, 2));
        assert_eq!(result.items, vec![5]);
        assert!(!result.has_next);
        assert_eq!((result.start_index, result.end_index), (4, 5));
    }

    #[test]
    fn test_page_beyond_last_clamps() {
        let result = paginate(vec![1, 2, 3], PageRequest::new(99, 2));
        assert_eq!(result.current_page, 2);
        assert_eq!(result.items, vec![3]);
    }

    #[test]
    fn test_page_below_one_clamps() {
        let result = paginate(vec![1, 2, 3], PageRequest::new(-4, 2));
        assert_eq!(result.current_page, 1);
        assert_eq!(result.items, vec![1, 2]);
        assert!(!result.has_previous);
    }

    #[test]
    fn test_empty_collection() {
        let result = paginate(Vec::<i32>::new(), PageRequest::new(5, 10));
        assert_eq!(result.current_page, 1);
        assert_eq!(result.total_pages, 0);
        assert!(result.items.is_empty());
        assert!(!result.has_next);
        assert!(!result.has_previous);
        assert_eq!((result.start_index, result.end_index), (0, 0));
    }

    #[test]
    fn test_coerce() {
        assert_eq!(PageRequest::coerce(Some("3"), Some("25")), PageRequest::new(3, 25));
        assert_eq!(PageRequest::coerce(Some("2.0"), Some("x")), PageRequest::new(2, 10));
        assert_eq!(PageRequest::coerce(None, Some("0")), PageRequest::new(1, 1));
        assert_eq!(PageRequest::coerce(Some("-1"), None), PageRequest::new(1, 10));
    }

    #[test]
    fn test_huge_page_size() {
        let request = PageRequest::coerce(Some("1"), Some("9223372036854775807"));
        assert_eq!(request.page_size, i64::MAX);
        let result = paginate(vec![1, 2, 3], request);
        assert_eq!(result.items, vec![1, 2, 3]);
        assert_eq!(result.total_pages, 1);
        assert!(!result.has_next);

        let saturated = PageRequest::coerce(Some("1e300"), Some("1e300"));
        let result = paginate(vec![1, 2, 3], saturated);
        assert_eq!(result.current_page, 1);
        assert_eq!((result.start_index, result.end_index), (0, 3));
    }

    #[test]
    fn test_walking_pages_reconstructs_collection() {
        for size in 1..=7 {
            for n in 0..=13 {
                let items: Vec<usize> = (0..n).collect();
                let first = paginate(items.clone(), PageRequest::new(1, size));
                let mut walked = Vec::new();
                for page in 1..=first.total_pages {
                    let result = paginate(items.clone(), PageRequest::new(page, size));
                    assert!(result.items.len() as i64 <= size);
                    assert_eq!(result.end_index - result.start_index, result.items.len());
                    walked.extend(result.items);
                }
                assert_eq!(walked, items, "size={size} n={n}");
            }
        }
    }
}
