//! Store name validation.
//!
//! Store names end up as directory names in the local backend and as
//! configuration-derived identifiers everywhere else, so they are held to a
//! conservative character set.

use crate::error::{ErrorKind, Result};

/// Validates a store name.
///
/// Accepts ASCII alphanumerics plus `-`, `_` and `.`. Rejects empty names,
/// names made only of dots (`.`/`..`), and anything else that could be
/// interpreted as a path.
///
/// # Examples
///
/// ```
/// use swkit_storage::validate_store_name;
/// assert!(validate_store_name("shop-static-v2").is_ok());
/// assert!(validate_store_name("shop_api.v1").is_ok());
/// assert!(validate_store_name("../etc").is_err());
/// assert!(validate_store_name("").is_err());
/// ```
pub fn validate(name: impl AsRef<str>) -> Result<String> {
    let name = name.as_ref();
    let legal = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.');
    if name.is_empty() || name.chars().all(|c| c == '.') || !name.chars().all(legal) {
        exn::bail!(ErrorKind::InvalidStoreName(name.to_string()));
    }
    Ok(name.to_string())
}
