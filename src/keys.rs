//! Canonical route key strings.
//!
//! `_` is reserved as the field separator, so node names must never contain
//! it; [`validate_name`] is the single place that rule is enforced.

use crate::error::Error;

/// `route = src + "_" + dst`.
pub fn route_key(src: &str, dst: &str) -> String {
    format!("{src}_{dst}")
}

/// Rejects names containing the reserved `_` separator.
pub fn validate_name(name: &str) -> Result<(), Error> {
    if name.contains('_') {
        Err(Error::ReservedSeparator(name.to_string()))
    } else {
        Ok(())
    }
}
