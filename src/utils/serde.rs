/*!
 * Serde helpers for identifier encoding at the API boundary.
 *
 * Identifiers span the full 64-bit range, which JavaScript-style number
 * handling cannot represent exactly. They leave the crate as decimal strings
 * and are accepted back as either strings or JSON integers.
 */

use serde::{Deserialize, Deserializer, Serializer};

/// Serialize a `u64` as its decimal string form.
pub fn serialize_u64_as_string<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_string())
}

/// Deserialize a `u64` that may arrive as a JSON number or a decimal string.
///
/// ```json
/// { "order_id": "9223372036854775807" }
/// { "order_id": 42 }
/// ```
///
/// Negative numbers, floats and non-numeric strings are rejected.
pub fn deserialize_u64_from_string_or_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    use serde_json::Value;

    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| D::Error::custom(format!("Expected unsigned integer, found: {n}"))),
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| D::Error::custom(format!("Cannot parse '{s}' as unsigned integer"))),
        other => Err(D::Error::custom(format!(
            "Expected string or integer identifier, found: {other}"
        ))),
    }
}
