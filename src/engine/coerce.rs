// SPDX-License-Identifier: MIT

//! Type coercion of incoming raw values
//!
//! Pure functions: a raw JSON value plus the destination type (and
//! optionally the sending store's type) yields a typed `StateValue`.
//! Nothing here fails; a numeric parse failure becomes NaN.

use serde_json::Value;

use super::config::{BoolConfig, BoolRepr, NumConfig, TypeConfig};
use super::units::UnitCatalog;
use super::value::{format_number, StateValue};

/// Fractional digits kept after a unit conversion
const CONVERSION_DIGITS: u32 = 10;

/// Coerce `raw` into the declared type of a store
pub fn coerce(
    raw: &Value,
    target: &TypeConfig,
    origin: Option<&TypeConfig>,
    units: &dyn UnitCatalog,
) -> StateValue {
    match target {
        TypeConfig::Str => StateValue::String(to_text(raw)),
        TypeConfig::Bool(config) => render_bool(to_bool(raw, config, origin), config),
        TypeConfig::Num(config) => StateValue::Number(to_number(raw, config, origin, units)),
        TypeConfig::Obj => to_structured(raw),
    }
}

/// Placeholder text an object stringifies to
const OBJECT_PLACEHOLDER: &str = "[object Object]";

/// Default stringification; serialized as JSON when it would be a placeholder
fn to_text(raw: &Value) -> String {
    let text = match raw {
        Value::Null => "null".to_string(),
        other => default_text(other),
    };
    if text.starts_with("[object") {
        raw.to_string()
    } else {
        text
    }
}

/// Arrays join their elements with `,`, rendering null elements as empty
fn default_text(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(n.as_f64().unwrap_or(f64::NAN)),
        Value::Array(items) => items
            .iter()
            .map(default_text)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => OBJECT_PLACEHOLDER.to_string(),
    }
}

fn to_bool(raw: &Value, config: &BoolConfig, origin: Option<&TypeConfig>) -> bool {
    // Labels of a string-pair boolean origin take precedence
    if let (Some(TypeConfig::Bool(from)), Value::String(s)) = (origin, raw) {
        if from.bool_type == BoolRepr::Str && !from.bool_str_true.is_empty() {
            if *s == from.bool_str_true {
                return true;
            }
            if *s == from.bool_str_false {
                return false;
            }
        }
    }

    match raw {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => {
            if let Some(n) = parse_decimal(s) {
                return n != 0.0;
            }
            let text = s.trim().to_lowercase();
            if label_matches(&text, &config.bool_str_true) {
                return true;
            }
            if label_matches(&text, &config.bool_str_false) {
                return false;
            }
            match text.as_str() {
                "true" => true,
                "false" => false,
                other => !other.is_empty(),
            }
        }
        _ => true,
    }
}

fn label_matches(text: &str, label: &str) -> bool {
    let label = label.trim();
    !label.is_empty() && text == label.to_lowercase()
}

fn render_bool(value: bool, config: &BoolConfig) -> StateValue {
    match config.bool_type {
        BoolRepr::Bool => StateValue::Bool(value),
        BoolRepr::Num => StateValue::Number(if value { 1.0 } else { 0.0 }),
        BoolRepr::Str => StateValue::String(if value {
            config.bool_str_true.clone()
        } else {
            config.bool_str_false.clone()
        }),
    }
}

fn to_number(
    raw: &Value,
    config: &NumConfig,
    origin: Option<&TypeConfig>,
    units: &dyn UnitCatalog,
) -> f64 {
    let mut n = match raw {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => parse_float(s),
        _ => f64::NAN,
    };
    if n.is_nan() {
        return n;
    }

    if let (Some(TypeConfig::Num(from)), Some(to)) = (origin, config.unit()) {
        if let Some(from) = from.unit() {
            if from != to {
                match units.convert(n, from, to) {
                    Some(converted) => n = round_to(converted, CONVERSION_DIGITS),
                    None => log::debug!("No conversion from '{}' to '{}'", from, to),
                }
            }
        }
    }

    if let Some(precision) = config.precision {
        n = round_to(n, precision);
    }
    if let Some(min) = config.num_min.filter(|m| *m != 0.0) {
        if n < min {
            n = min;
        }
    }
    if let Some(max) = config.num_max.filter(|m| *m != 0.0) {
        if n > max {
            n = max;
        }
    }
    n
}

fn to_structured(raw: &Value) -> StateValue {
    match raw {
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(parsed) => StateValue::from_json(parsed),
            Err(_) => StateValue::String(s.clone()),
        },
        other => StateValue::from_json(other.clone()),
    }
}

/// Round to at most `digits` fractional digits
pub fn round_to(n: f64, digits: u32) -> f64 {
    if !n.is_finite() {
        return n;
    }
    format!("{:.*}", digits as usize, n).parse().unwrap_or(n)
}

/// A whole string that reads as a decimal number
fn parse_decimal(s: &str) -> Option<f64> {
    let t = s.trim();
    if t.is_empty()
        || !t
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
    {
        return None;
    }
    t.parse().ok()
}

/// Longest leading numeric prefix, NaN when there is none
pub fn parse_float(s: &str) -> f64 {
    let t = s.trim_start();
    let bytes = t.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    if t[end..].starts_with("Infinity") {
        return if t.starts_with('-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }

    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut mantissa_digits = end - digits_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        mantissa_digits += frac_end - frac_start;
        end = frac_end;
    }
    if mantissa_digits == 0 {
        return f64::NAN;
    }

    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    t[..end].parse().unwrap_or(f64::NAN)
}
