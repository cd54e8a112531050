//! Structural change-sets over nested maps
//!
//! [`diff`] computes the change-set that would turn map `a` into map `b`.
//! A change-set is itself an [`Object`] that contains only the keys that
//! differ: added or replaced keys carry their new value, removed keys carry
//! `null`, and modified nested maps are expressed recursively as sub
//! change-sets. [`apply`] replays a change-set onto a map in place.
//!
//! Both operations are total over well-formed inputs; they never fail.
//!
//! ## Equality rules
//!
//! Scalars compare by value *and* type: `1` and `1.0` are different, and a
//! type change (integer to string) is always a difference. Two maps are
//! fast-equal only when both are empty; non-empty maps are handled by the
//! recursion. Arrays fall back to deep structural equality and are replaced
//! wholesale when they differ.

use crate::object::Object;
use serde_json::Value;

/// A change-set with the same shape as [`Object`].
///
/// Interpretation per key: `null` means "delete this key", a nested map
/// means "recurse", any other value means "set this key to this value".
/// Absent keys are unchanged.
pub type DiffMap = Object;

/// Compute the minimal change-set required to transform `a` into `b`.
///
/// Returns `None` if `a` and `b` are structurally equal so that callers can
/// test for "no change" without allocating.
pub fn diff(a: &Object, b: &Object) -> Option<DiffMap> {
    if a.is_empty() && b.is_empty() {
        return None;
    }
    let mut out = DiffMap::new();
    diff_recursive(a, b, &mut out);
    if out.is_empty() {
        return None;
    }
    Some(out)
}

fn diff_recursive(a: &Object, b: &Object, out: &mut DiffMap) {
    for (key, value_a) in a {
        let Some(value_b) = b.get(key) else {
            // the key was removed
            out.insert(key.clone(), Value::Null);
            continue;
        };

        if equal_fast(value_a, value_b) {
            continue;
        }

        // Both present but not equal.
        if let (Value::Object(map_a), Value::Object(map_b)) = (value_a, value_b) {
            let mut sub = DiffMap::new();
            diff_recursive(map_a, map_b, &mut sub);
            if !sub.is_empty() {
                out.insert(key.clone(), Value::Object(sub));
            }
            continue;
        }
        // scalar changed or type mismatch
        out.insert(key.clone(), value_b.clone());
    }
    for (key, value_b) in b {
        if !a.contains_key(key) {
            out.insert(key.clone(), value_b.clone());
        }
    }
}

/// A tight equality test that dodges deep comparison where it can.
///
/// Falls back to full structural equality only for arrays.
fn equal_fast(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(va), Value::Bool(vb)) => va == vb,
        // serde_json numbers keep their integer/float identity, so `1`
        // and `1.0` come out unequal here.
        (Value::Number(va), Value::Number(vb)) => va == vb,
        (Value::String(va), Value::String(vb)) => va == vb,
        (Value::Object(va), Value::Object(vb)) => {
            // We do *not* recurse here; we only need "equal or not".
            va.is_empty() && vb.is_empty()
        }
        (Value::Array(va), Value::Array(vb)) => va == vb,
        _ => false,
    }
}

/// Mutate `dst` so that, after the call, it equals the map that originally
/// produced the change-set `change`.
///
/// ```
/// use retrace_core::diffmap::apply;
/// use serde_json::json;
///
/// let mut dst = json!({"a": 1, "b": {"c": false}});
/// let change = json!({"b": {"c": true}});
/// apply(
///     dst.as_object_mut().unwrap(),
///     change.as_object().unwrap(),
/// );
/// assert_eq!(dst, json!({"a": 1, "b": {"c": true}}));
/// ```
pub fn apply(dst: &mut Object, change: &DiffMap) {
    if change.is_empty() {
        return;
    }
    apply_recursive(dst, change);
}

fn apply_recursive(dst: &mut Object, change: &DiffMap) {
    for (key, value_change) in change {
        match value_change {
            // deletion
            Value::Null => {
                dst.remove(key);
            }

            // nested change-set
            Value::Object(sub_change) => {
                let slot = dst
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Object::new()));
                if !slot.is_object() {
                    // key present but not a map: replace it
                    *slot = Value::Object(Object::new());
                }
                if let Value::Object(sub_dst) = slot {
                    apply_recursive(sub_dst, sub_change);
                }
            }

            // scalar add / replace
            other => {
                dst.insert(key.clone(), other.clone());
            }
        }
    }
}
