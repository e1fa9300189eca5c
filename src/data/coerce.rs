// Value coercion shared by every operator
// Author: Gabriel Demetrios Lafis

//! Comparison between heterogeneous values.
//!
//! Two values are compared by trying, in order:
//!
//! 1. same-type equality,
//! 2. numeric comparison (both sides parse as a decimal),
//! 3. temporal comparison (both sides parse as a timestamp),
//! 4. string comparison of the rendered values.
//!
//! Predicates and joins depend on this order, so every operator goes through
//! these functions instead of comparing values directly.

use std::cmp::Ordering;
use std::str::FromStr;

use chrono::NaiveDateTime;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use super::timestamp::parse_timestamp;
use super::Value;

/// Read a value as a decimal, parsing strings when needed
pub fn as_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Integer(i) => Some(Decimal::from(*i)),
        Value::Float(f) => Decimal::from_f64(*f),
        Value::Decimal(d) => Some(*d),
        Value::String(s) => parse_decimal(s),
        _ => None,
    }
}

/// Read a value as a 64-bit float, parsing strings when needed
pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(i) => Some(*i as f64),
        Value::Float(f) if f.is_finite() => Some(*f),
        Value::Decimal(d) => d.to_f64(),
        Value::String(s) => parse_decimal(s).and_then(|d| d.to_f64()),
        _ => None,
    }
}

/// Read a value as a timestamp, parsing strings when needed
pub fn as_timestamp(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Timestamp(ts) => Some(*ts),
        Value::String(s) => parse_timestamp(s),
        _ => None,
    }
}

/// Parse text as a decimal, accepting scientific notation
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    Decimal::from_str(text)
        .ok()
        .or_else(|| Decimal::from_scientific(text).ok())
}

/// Check two values for equality using the coercion order
pub fn values_equal(left: &Value, right: &Value) -> bool {
    if left.same_type(right) && left == right {
        return true;
    }

    match compare_values(left, right) {
        Some(ordering) => ordering == Ordering::Equal,
        None => false,
    }
}

/// Compare two values using the coercion order.
///
/// Returns `None` only for null/non-null pairs, which have no ordering.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, Value::Null) => return Some(Ordering::Equal),
        (Value::Null, _) | (_, Value::Null) => return None,
        _ => {}
    }

    if left.same_type(right) && left == right {
        return Some(Ordering::Equal);
    }

    if let (Some(a), Some(b)) = (as_decimal(left), as_decimal(right)) {
        return Some(a.cmp(&b));
    }

    if let (Some(a), Some(b)) = (as_timestamp(left), as_timestamp(right)) {
        return Some(a.cmp(&b));
    }

    Some(left.to_string().cmp(&right.to_string()))
}

/// Compare two values numerically; `None` unless both parse as decimals
pub fn compare_numeric(left: &Value, right: &Value) -> Option<Ordering> {
    let a = as_decimal(left)?;
    let b = as_decimal(right)?;
    Some(a.cmp(&b))
}
