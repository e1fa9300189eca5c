// Composite keys for grouping and joining
// Author: Gabriel Demetrios Lafis

use std::fmt;

use super::Record;

/// Delimiter used when a key is rendered as a single string
pub const KEY_DELIMITER: &str = "|~|";

/// Composite key built from the stringified values of a list of fields.
///
/// Keys compare by the rendered strings, not by coercion. An integer `1`, a
/// float `1.0` and the string `"1"` all render as `1` and share a key; the
/// string `"1.0"` does not. The parts are kept as a tuple so values
/// containing the delimiter cannot collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JoinKey {
    parts: Vec<String>,
}

impl JoinKey {
    /// Build the key of a record over the given fields; missing fields render as empty
    pub fn from_record(record: &Record, fields: &[String]) -> Self {
        JoinKey {
            parts: fields
                .iter()
                .map(|field| record.get_or_null(field).to_string())
                .collect(),
        }
    }

    /// Get the individual key parts
    pub fn parts(&self) -> &[String] {
        &self.parts
    }
}

impl fmt::Display for JoinKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.parts.join(KEY_DELIMITER))
    }
}
