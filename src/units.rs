// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Kubernetes quantity conversion
//!
//! Converts quantity strings ("250m", "16Gi", "1e9", "500M") into the units the
//! inventory stores: CPU in cores and memory/storage in GiB. All functions are
//! pure; unparseable input converts to zero.

use regex::Regex;
use std::sync::LazyLock;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

static QUANTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([+-]?(?:\d+\.?\d*|\.\d+))(?:[eE]([+-]?\d+))?(Ki|Mi|Gi|Ti|Pi|Ei|n|u|m|k|M|G|T|P|E)?$")
        .expect("quantity regex is valid")
});

/// Parse a quantity into its base unit (cores for CPU, bytes for memory)
pub fn parse_quantity(quantity: &str) -> Option<f64> {
    let captures = QUANTITY_RE.captures(quantity.trim())?;
    let number: f64 = captures.get(1)?.as_str().parse().ok()?;
    let exponent: i32 = match captures.get(2) {
        Some(exp) => exp.as_str().parse().ok()?,
        None => 0,
    };
    let multiplier = match captures.get(3).map(|m| m.as_str()) {
        None => 1.0,
        Some("n") => 1e-9,
        Some("u") => 1e-6,
        Some("m") => 1e-3,
        Some("k") => 1e3,
        Some("M") => 1e6,
        Some("G") => 1e9,
        Some("T") => 1e12,
        Some("P") => 1e15,
        Some("E") => 1e18,
        Some("Ki") => 1024.0,
        Some("Mi") => 1024.0_f64.powi(2),
        Some("Gi") => 1024.0_f64.powi(3),
        Some("Ti") => 1024.0_f64.powi(4),
        Some("Pi") => 1024.0_f64.powi(5),
        Some("Ei") => 1024.0_f64.powi(6),
        Some(_) => return None,
    };
    Some(number * 10f64.powi(exponent) * multiplier)
}

/// CPU quantity in cores ("250m" -> 0.25)
pub fn cpu_cores(quantity: &str) -> f64 {
    round(parse_quantity(quantity).unwrap_or(0.0))
}

/// Memory or storage quantity in GiB ("512Mi" -> 0.5)
pub fn gibibytes(quantity: &str) -> f64 {
    round(parse_quantity(quantity).unwrap_or(0.0) / GIB)
}

/// Integral count quantity, e.g. an extended resource like `nvidia.com/gpu`
pub fn count(quantity: &str) -> i64 {
    parse_quantity(quantity).map(|v| v.round() as i64).unwrap_or(0)
}

/// Round to 3 decimals so repeated sums stay comparable
pub fn round(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
