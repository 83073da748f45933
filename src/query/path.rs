// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Dotted field paths over untyped records.
//!
//! # Syntax
//!
//! - `.field` - Object field access: `status.phase`
//! - `[n]` - Array index (0-based): `spec.containers[0].image`
//!
//! Field names may contain `-`, `/` and `_` so label-style keys such as
//! `metadata.labels.app` resolve. A missing key, an out-of-range index or a
//! malformed path yields no value; lookups never fail.

use serde_json::Value;
use std::iter::Peekable;
use std::str::Chars;

/// Parsed segment of a field path
#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
    /// Object field access: `.field_name`
    Field(String),
    /// Array index: `[0]`, `[1]`, etc.
    Index(usize),
}

/// A parsed field path
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

impl FieldPath {
    /// Parse a dotted path. Returns None for empty or malformed input.
    ///
    /// ```ignore
    /// let path = FieldPath::parse("spec.containers[0].image").unwrap();
    /// assert_eq!(path.segments().len(), 4);
    /// ```
    pub fn parse(path: &str) -> Option<Self> {
        let mut chars = path.trim().chars().peekable();
        let mut segments = Vec::new();

        let first = consume_field_name(&mut chars);
        if first.is_empty() {
            return None;
        }
        segments.push(PathSegment::Field(first));

        while let Some(&c) = chars.peek() {
            match c {
                '.' => {
                    chars.next();
                    let field = consume_field_name(&mut chars);
                    if field.is_empty() {
                        return None;
                    }
                    segments.push(PathSegment::Field(field));
                }
                '[' => {
                    chars.next();
                    segments.push(parse_bracket_index(&mut chars)?);
                }
                _ => return None,
            }
        }

        Some(Self { segments })
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Walk the record along this path
    pub fn lookup<'a>(&self, record: &'a Value) -> Option<&'a Value> {
        let mut current = record;
        for segment in &self.segments {
            current = match (segment, current) {
                (PathSegment::Field(name), Value::Object(map)) => map.get(name)?,
                (PathSegment::Index(idx), Value::Array(items)) => items.get(*idx)?,
                _ => return None,
            };
        }
        if current.is_null() { None } else { Some(current) }
    }
}

/// Look up a dotted path in a record in one call
pub fn lookup<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    FieldPath::parse(path)?.lookup(record)
}

/// Render a scalar value for text comparison; objects and arrays render as JSON
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Consume a field name from the character iterator.
fn consume_field_name(chars: &mut Peekable<Chars>) -> String {
    let mut field = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_alphanumeric() || c == '_' || c == '-' || c == '/' {
            field.push(c);
            chars.next();
        } else {
            break;
        }
    }
    field
}

/// Parse `n]` after an opening bracket and consume the closing bracket.
fn parse_bracket_index(chars: &mut Peekable<Chars>) -> Option<PathSegment> {
    let mut index_str = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            index_str.push(c);
            chars.next();
        } else {
            break;
        }
    }

    // Must have closing bracket
    if chars.peek() != Some(&']') {
        return None;
    }
    chars.next();

    index_str.parse::<usize>().ok().map(PathSegment::Index)
}
