//! Identifier validation for tables and columns.
//!
//! Identifiers are interpolated into SQL, so only a conservative ASCII
//! subset is accepted:
//! - Must be non-empty and start with a letter or `_`
//! - May contain only letters, digits and `_`
//! - Table names must be lower case

use crate::error::{DictError, DictResult};

fn check_identifier(kind: &str, name: &str, allow_upper: bool) -> DictResult<()> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(DictError::InvalidArgument(format!("{kind} name must not be empty")));
    };
    let allowed = |c: char| {
        c == '_' || c.is_ascii_digit() || c.is_ascii_lowercase() || (allow_upper && c.is_ascii_uppercase())
    };
    if first.is_ascii_digit() || !allowed(first) || !chars.all(allowed) {
        return Err(DictError::InvalidArgument(format!(
            "invalid {kind} name {name:?}"
        )));
    }
    Ok(())
}

/// Validate a table name: a lower-case SQL identifier.
///
/// # Examples
///
/// ```
/// use dax_dict::names::validate_table_name;
///
/// assert!(validate_table_name("file_records").is_ok());
/// assert!(validate_table_name("FileRecords").is_err());
/// ```
pub fn validate_table_name(name: &str) -> DictResult<()> {
    check_identifier("table", name, false)
}

/// Validate a column (field or key) name.
pub fn validate_column_name(name: &str) -> DictResult<()> {
    check_identifier("column", name, true)
}
