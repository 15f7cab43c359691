use routine_interfaces::{AccountField, Region};
use serde_json::Value;

use crate::error::ActionError;

/// Small helpers for pulling typed fields out of a deserialized action or
/// condition record, used by every variant's `from_value` constructor so
/// malformed-field errors read consistently.
pub fn field_str<'a>(value: &'a Value, name: &str) -> Option<&'a str> {
    value.get(name).and_then(Value::as_str)
}

/// Required string field, erroring with a validation message naming the
/// field if absent or the wrong type.
pub fn require_str<'a>(value: &'a Value, action: &str, name: &str) -> Result<&'a str, ActionError> {
    field_str(value, name)
        .ok_or_else(|| ActionError::Validation(format!("{action}: missing or non-string field '{name}'")))
}

/// Required integer field.
pub fn require_i64(value: &Value, action: &str, name: &str) -> Result<i64, ActionError> {
    value
        .get(name)
        .and_then(Value::as_i64)
        .ok_or_else(|| ActionError::Validation(format!("{action}: missing or non-integer field '{name}'")))
}

/// Optional integer field with a default.
pub fn field_i64(value: &Value, name: &str, default: i64) -> i64 {
    value.get(name).and_then(Value::as_i64).unwrap_or(default)
}

/// Optional unsigned integer field with a default.
pub fn field_u64(value: &Value, name: &str, default: u64) -> u64 {
    value.get(name).and_then(Value::as_u64).unwrap_or(default)
}

/// Optional float field.
pub fn field_f64(value: &Value, name: &str) -> Option<f64> {
    value.get(name).and_then(Value::as_f64)
}

/// Optional boolean field with a default.
pub fn field_bool(value: &Value, name: &str, default: bool) -> bool {
    value.get(name).and_then(Value::as_bool).unwrap_or(default)
}

/// Optional region override, expected as `{x, y, width, height}`.
pub fn field_region(value: &Value, name: &str) -> Option<Region> {
    let region = value.get(name)?;
    Some(Region {
        x: region.get("x")?.as_i64()? as i32,
        y: region.get("y")?.as_i64()? as i32,
        width: region.get("width")?.as_i64()? as i32,
        height: region.get("height")?.as_i64()? as i32,
    })
}

/// Required allow-listed account-field name, accepted case-insensitively in
/// either `camelCase` or `snake_case` form.
pub fn require_account_field(value: &Value, action: &str, name: &str) -> Result<AccountField, ActionError> {
    let raw = require_str(value, action, name)?;
    let normalized = raw.replace('_', "").to_lowercase();
    let field = match normalized.as_str() {
        "packsopened" => AccountField::PacksOpened,
        "shinedust" => AccountField::Shinedust,
        "hourglasses" => AccountField::Hourglasses,
        "wonderpicks" => AccountField::WonderPicks,
        "lastusedat" => AccountField::LastUsedAt,
        "completedat" => AccountField::CompletedAt,
        "poolstatus" => AccountField::PoolStatus,
        "failurecount" => AccountField::FailureCount,
        "lasterror" => AccountField::LastError,
        "deviceaccount" => AccountField::DeviceAccount,
        _ => {
            return Err(ActionError::Validation(format!(
                "{action}: unknown account field '{raw}'"
            )))
        }
    };
    Ok(field)
}

/// The `actions`/`conditions` array field of a composite record.
pub fn require_array<'a>(
    value: &'a Value,
    action: &str,
    name: &str,
) -> Result<&'a Vec<Value>, ActionError> {
    value
        .get(name)
        .and_then(Value::as_array)
        .ok_or_else(|| ActionError::Validation(format!("{action}: missing or non-array field '{name}'")))
}
