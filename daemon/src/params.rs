//! Typed accessors over a request's `params` map, each failing with
//! `INVALID_ARGS` rather than panicking on a malformed or missing field.

use model::{BrokerError, ErrorCode};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::fmt::Display;
use std::str::FromStr;

/// A required field is absent.
pub fn missing(field: &str) -> BrokerError {
    BrokerError::new(ErrorCode::InvalidArgs, format!("missing required parameter: {field}"))
}

/// A present field has the wrong shape.
pub fn invalid(field: &str, reason: impl Display) -> BrokerError {
    BrokerError::new(ErrorCode::InvalidArgs, format!("invalid parameter {field}: {reason}"))
}

fn require<'a>(params: &'a Map<String, Value>, field: &str) -> Result<&'a Value, BrokerError> {
    match params.get(field) {
        Some(value) if !value.is_null() => Ok(value),
        _ => Err(missing(field)),
    }
}

/// A required string field.
pub fn string(params: &Map<String, Value>, field: &str) -> Result<String, BrokerError> {
    require(params, field)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| invalid(field, "expected a string"))
}

/// An optional string field.
pub fn string_opt(params: &Map<String, Value>, field: &str) -> Result<Option<String>, BrokerError> {
    match params.get(field) {
        None => Ok(None),
        Some(value) if value.is_null() => Ok(None),
        Some(value) => value
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| invalid(field, "expected a string")),
    }
}

/// A boolean field, defaulting to `default` when absent.
pub fn bool_or(params: &Map<String, Value>, field: &str, default: bool) -> Result<bool, BrokerError> {
    match params.get(field) {
        None => Ok(default),
        Some(value) if value.is_null() => Ok(default),
        Some(value) => value.as_bool().ok_or_else(|| invalid(field, "expected a boolean")),
    }
}

/// A required decimal field, accepted as either a JSON number or a string.
pub fn decimal(params: &Map<String, Value>, field: &str) -> Result<Decimal, BrokerError> {
    value_to_decimal(require(params, field)?, field)
}

/// An optional decimal field.
pub fn decimal_opt(params: &Map<String, Value>, field: &str) -> Result<Option<Decimal>, BrokerError> {
    match params.get(field) {
        None => Ok(None),
        Some(value) if value.is_null() => Ok(None),
        Some(value) => value_to_decimal(value, field).map(Some),
    }
}

fn value_to_decimal(value: &Value, field: &str) -> Result<Decimal, BrokerError> {
    if let Some(text) = value.as_str() {
        return Decimal::from_str(text).map_err(|_| invalid(field, "expected a decimal"));
    }
    if let Some(n) = value.as_f64() {
        return Decimal::try_from(n).map_err(|_| invalid(field, "expected a decimal"));
    }
    Err(invalid(field, "expected a decimal"))
}

/// A required u64, parsed from a JSON number or numeric string.
pub fn u64_field(params: &Map<String, Value>, field: &str) -> Result<u64, BrokerError> {
    let value = require(params, field)?;
    if let Some(n) = value.as_u64() {
        return Ok(n);
    }
    if let Some(text) = value.as_str() {
        return text.parse().map_err(|_| invalid(field, "expected an unsigned integer"));
    }
    Err(invalid(field, "expected an unsigned integer"))
}

/// An optional usize, parsed from a JSON number.
pub fn usize_opt(params: &Map<String, Value>, field: &str) -> Result<Option<usize>, BrokerError> {
    match params.get(field) {
        None => Ok(None),
        Some(value) if value.is_null() => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| invalid(field, "expected a non-negative integer")),
    }
}

/// A required array of strings.
pub fn string_vec(params: &Map<String, Value>, field: &str) -> Result<Vec<String>, BrokerError> {
    require(params, field)?
        .as_array()
        .ok_or_else(|| invalid(field, "expected an array"))?
        .iter()
        .map(|v| v.as_str().map(str::to_string).ok_or_else(|| invalid(field, "expected an array of strings")))
        .collect()
}

/// An optional array of strings, defaulting to empty.
pub fn string_vec_opt(params: &Map<String, Value>, field: &str) -> Result<Vec<String>, BrokerError> {
    match params.get(field) {
        None => Ok(Vec::new()),
        Some(value) if value.is_null() => Ok(Vec::new()),
        Some(value) => value
            .as_array()
            .ok_or_else(|| invalid(field, "expected an array"))?
            .iter()
            .map(|v| v.as_str().map(str::to_string).ok_or_else(|| invalid(field, "expected an array of strings")))
            .collect(),
    }
}

/// Parse a required field via `FromStr`.
pub fn parse<T>(params: &Map<String, Value>, field: &str) -> Result<T, BrokerError>
where
    T: FromStr,
{
    let raw = string(params, field)?;
    raw.parse().map_err(|_| invalid(field, format!("unrecognized value '{raw}'")))
}

/// Parse an optional field via `FromStr`.
pub fn parse_opt<T>(params: &Map<String, Value>, field: &str) -> Result<Option<T>, BrokerError>
where
    T: FromStr,
{
    match string_opt(params, field)? {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| invalid(field, format!("unrecognized value '{raw}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::OrderSide;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn missing_required_string_is_invalid_args() {
        let p = params(json!({}));
        let err = string(&p, "symbol").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArgs);
    }

    #[test]
    fn decimal_accepts_both_numbers_and_strings() {
        let p = params(json!({"qty": 10, "limit": "99.5"}));
        assert_eq!(decimal(&p, "qty").unwrap(), Decimal::from(10));
        assert_eq!(decimal(&p, "limit").unwrap(), Decimal::from_str("99.5").unwrap());
    }

    #[test]
    fn parse_uses_from_str_for_enums() {
        let p = params(json!({"side": "buy"}));
        assert_eq!(parse::<OrderSide>(&p, "side").unwrap(), OrderSide::Buy);
        let p = params(json!({"side": "sideways"}));
        assert!(parse::<OrderSide>(&p, "side").is_err());
    }
}
