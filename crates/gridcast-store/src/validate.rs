//! Update payload schema validation.

use serde_json::Value;

use crate::StoreError;

/// Keys an update payload may carry after the untrusted `name` is stripped.
const ALLOWED_KEYS: [&str; 2] = ["x", "y"];

/// Check an update payload: a mapping with integer `x` and `y` and nothing
/// else. The server strips `name` before calling this, so any leftover key
/// is a protocol violation.
pub fn validate_payload(args: &Value) -> bool {
    let Some(obj) = args.as_object() else {
        return false;
    };
    if obj.get("x").and_then(Value::as_i64).is_none()
        || obj.get("y").and_then(Value::as_i64).is_none()
    {
        return false;
    }
    obj.keys().all(|k| ALLOWED_KEYS.contains(&k.as_str()))
}

/// Reject coordinates outside the square world `(-bound, bound)` on both
/// axes, with a structured detail for the client.
pub fn check_world_bounds(x: i64, y: i64, bound: i64) -> Result<(), StoreError> {
    if x.abs() >= bound || y.abs() >= bound {
        return Err(StoreError::out_of_bounds(x, y, bound));
    }
    Ok(())
}
