use serde_json::{Number, Value};
use std::fmt;

/// Returns a copy of `value` without any object field named in `exclude_fields`,
/// at every depth, including objects nested in arrays.
pub fn strip_fields(value: &Value, exclude_fields: &[&str]) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| !exclude_fields.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), strip_fields(value, exclude_fields)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| strip_fields(item, exclude_fields))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Allowed distance between two non-integer numbers:
/// `|actual - expected| <= absolute + relative * |expected|`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub absolute: f64,
    pub relative: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            absolute: 1e-6,
            relative: 1e-6,
        }
    }
}

impl Tolerance {
    pub fn exact() -> Self {
        Self {
            absolute: 0.0,
            relative: 0.0,
        }
    }

    /// Integers are compared exactly; anything else goes through the tolerance.
    pub fn numbers_match(&self, expected: &Number, actual: &Number) -> bool {
        if let (Some(expected), Some(actual)) = (expected.as_i64(), actual.as_i64()) {
            return expected == actual;
        }
        if let (Some(expected), Some(actual)) = (expected.as_u64(), actual.as_u64()) {
            return expected == actual;
        }
        match (expected.as_f64(), actual.as_f64()) {
            (Some(expected), Some(actual)) => {
                (actual - expected).abs() <= self.absolute + self.relative * expected.abs()
            }
            _ => false,
        }
    }
}

/// One divergence between an expected and an actual payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Difference {
    Changed {
        path: String,
        expected: Value,
        actual: Value,
    },
    MissingField {
        path: String,
        expected: Value,
    },
    UnexpectedField {
        path: String,
        actual: Value,
    },
    MissingElement {
        path: String,
        expected: Value,
    },
    UnexpectedElement {
        path: String,
        actual: Value,
    },
}

impl Difference {
    /// JSONPath-like location, e.g. `$[3].title`.
    pub fn path(&self) -> &str {
        match self {
            Difference::Changed { path, .. }
            | Difference::MissingField { path, .. }
            | Difference::UnexpectedField { path, .. }
            | Difference::MissingElement { path, .. }
            | Difference::UnexpectedElement { path, .. } => path,
        }
    }
}

impl fmt::Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difference::Changed {
                path,
                expected,
                actual,
            } => write!(f, "{path}: expected {expected}, got {actual}"),
            Difference::MissingField { path, expected } => {
                write!(f, "{path}: missing field, expected {expected}")
            }
            Difference::UnexpectedField { path, actual } => {
                write!(f, "{path}: unexpected field with value {actual}")
            }
            Difference::MissingElement { path, expected } => {
                write!(f, "{path}: missing element, expected {expected}")
            }
            Difference::UnexpectedElement { path, actual } => {
                write!(f, "{path}: unexpected element {actual}")
            }
        }
    }
}

/// Deep comparison of two payloads. Array order matters, object key order does not.
/// Returns every divergence found, in document order.
pub fn diff_values(expected: &Value, actual: &Value, tolerance: Tolerance) -> Vec<Difference> {
    let mut differences = Vec::new();
    diff_at("$", expected, actual, tolerance, &mut differences);
    differences
}

fn diff_at(
    path: &str,
    expected: &Value,
    actual: &Value,
    tolerance: Tolerance,
    differences: &mut Vec<Difference>,
) {
    match (expected, actual) {
        (Value::Object(expected_map), Value::Object(actual_map)) => {
            for (key, expected_value) in expected_map {
                let field_path = format!("{path}.{key}");
                match actual_map.get(key) {
                    Some(actual_value) => {
                        diff_at(&field_path, expected_value, actual_value, tolerance, differences)
                    }
                    None => differences.push(Difference::MissingField {
                        path: field_path,
                        expected: expected_value.clone(),
                    }),
                }
            }
            for (key, actual_value) in actual_map {
                if !expected_map.contains_key(key) {
                    differences.push(Difference::UnexpectedField {
                        path: format!("{path}.{key}"),
                        actual: actual_value.clone(),
                    });
                }
            }
        }
        (Value::Array(expected_items), Value::Array(actual_items)) => {
            let len = expected_items.len().max(actual_items.len());
            for index in 0..len {
                let item_path = format!("{path}[{index}]");
                match (expected_items.get(index), actual_items.get(index)) {
                    (Some(expected_item), Some(actual_item)) => {
                        diff_at(&item_path, expected_item, actual_item, tolerance, differences)
                    }
                    (Some(expected_item), None) => differences.push(Difference::MissingElement {
                        path: item_path,
                        expected: expected_item.clone(),
                    }),
                    (None, Some(actual_item)) => {
                        differences.push(Difference::UnexpectedElement {
                            path: item_path,
                            actual: actual_item.clone(),
                        })
                    }
                    (None, None) => {}
                }
            }
        }
        (Value::Number(expected_number), Value::Number(actual_number)) => {
            if !tolerance.numbers_match(expected_number, actual_number) {
                differences.push(Difference::Changed {
                    path: path.to_string(),
                    expected: expected.clone(),
                    actual: actual.clone(),
                });
            }
        }
        _ => {
            if expected != actual {
                differences.push(Difference::Changed {
                    path: path.to_string(),
                    expected: expected.clone(),
                    actual: actual.clone(),
                });
            }
        }
    }
}
