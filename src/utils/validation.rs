// Validation utilities
// Author: Gabriel Demetrios Lafis

use crate::data::KEY_DELIMITER;

/// Validate that a field name is usable as a record field or key part
pub fn validate_field_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("field name cannot be empty".to_string());
    }

    if name.contains(KEY_DELIMITER) {
        return Err(format!(
            "field name '{}' contains the reserved delimiter '{}'",
            name, KEY_DELIMITER
        ));
    }

    Ok(())
}

/// Validate that a numeric value is in range
pub fn validate_range<T: PartialOrd + std::fmt::Display>(
    value: T,
    min: T,
    max: T,
    name: &str,
) -> Result<(), String> {
    if value < min || value > max {
        Err(format!(
            "'{}' must be between {} and {}, got {}",
            name, min, max, value
        ))
    } else {
        Ok(())
    }
}
