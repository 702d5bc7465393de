//! JSON interchange for values.
//!
//! Numbers map to numbers, strings to character sequences, arrays to
//! sequences and booleans to 1 or 0. JSON has no counterpart for `null` or
//! objects, so those are rejected.

use crate::ast::{Number, Value};
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Parse a JSON document into a value
pub fn parse_value(input: &str) -> Result<Value, Error> {
    let json_value: serde_json::Value = serde_json::from_str(input).map_err(|e| {
        ParseError::from_message(ParseErrorKind::InvalidSyntax, format!("Invalid JSON: {e}"))
    })?;

    from_json(json_value)
}

/// Convert a serde_json::Value into a value
pub fn from_json(json: serde_json::Value) -> Result<Value, Error> {
    from_json_at_depth(json, 0)
}

fn from_json_at_depth(json: serde_json::Value, depth: usize) -> Result<Value, Error> {
    if depth >= MAX_PARSE_DEPTH {
        return Err(ParseError::from_message(
            ParseErrorKind::TooDeeplyNested,
            format!("JSON value too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
        )
        .into());
    }
    match json {
        serde_json::Value::Null => Err(ParseError::from_message(
            ParseErrorKind::InvalidSyntax,
            "null has no value counterpart",
        )
        .into()),
        serde_json::Value::Bool(b) => Ok(Value::from_bool(b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::int(i))
            } else if let Some(x) = n.as_f64() {
                Ok(Value::float(x))
            } else {
                Err(ParseError::from_message(
                    ParseErrorKind::ImplementationLimit,
                    format!("Number out of range: {n}"),
                )
                .into())
            }
        }
        serde_json::Value::String(s) => Ok(Value::from(s)),
        serde_json::Value::Array(arr) => {
            let items = arr
                .into_iter()
                .map(|item| from_json_at_depth(item, depth + 1))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::list(items))
        }
        serde_json::Value::Object(_) => Err(ParseError::from_message(
            ParseErrorKind::InvalidSyntax,
            "JSON objects have no value counterpart",
        )
        .into()),
    }
}

/// Convert a value to serde_json::Value. Non-empty character sequences become
/// strings; non-finite floats cannot be represented.
pub fn to_json(value: &Value) -> Result<serde_json::Value, Error> {
    match value {
        Value::Number(Number::Int(i)) => Ok(serde_json::Value::Number((*i).into())),
        Value::Number(Number::Float(x)) => serde_json::Number::from_f64(*x)
            .map(serde_json::Value::Number)
            .ok_or_else(|| Error::TypeError(format!("{x} has no JSON representation"))),
        Value::Char(c) => Ok(serde_json::Value::String(c.to_string())),
        Value::List(_) if value.is_string() => Ok(serde_json::Value::String(value.to_string())),
        Value::List(items) => items
            .iter()
            .map(to_json)
            .collect::<Result<Vec<_>, _>>()
            .map(serde_json::Value::Array),
    }
}

/// Serialize a value as a JSON string
pub fn to_json_string(value: &Value) -> Result<String, Error> {
    let json_value = to_json(value)?;
    serde_json::to_string(&json_value)
        .map_err(|e| Error::EvalError(format!("JSON serialization failed: {e}")))
}
