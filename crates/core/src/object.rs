//! The JSON-shaped value model for tracked resources
//!
//! An [`Object`] is a mapping from string keys to JSON values: strings,
//! integers, floats, booleans, nulls, nested objects, and arrays. The
//! representation is `serde_json::Map`, which keeps keys sorted: encoding
//! the same logical object always produces the same bytes, which is what
//! makes restored revisions comparable byte-for-byte with what was
//! committed.

use serde_json::Value;

/// A tracked resource body: a nested mapping from string keys to values.
pub type Object = serde_json::Map<String, Value>;

/// Extract `metadata.uid` from an object.
///
/// Returns `None` when the field is absent or not a string.
pub fn uid(object: &Object) -> Option<&str> {
    object.get("metadata")?.as_object()?.get("uid")?.as_str()
}

/// Extract `metadata.resourceVersion` from an object.
///
/// Used by the tracker for duplicate suppression. Returns `None` when the
/// field is absent or not a string.
pub fn resource_version(object: &Object) -> Option<&str> {
    object
        .get("metadata")?
        .as_object()?
        .get("resourceVersion")?
        .as_str()
}
