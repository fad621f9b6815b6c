//! Typed parameter records, one per operation group.
//!
//! Models send loosely typed JSON: numbers as strings, strings as numbers,
//! nulls for absent values. Records are parsed leniently; anything that cannot
//! be interpreted becomes `None` and the handler decides whether that is fatal.

use crate::error::HandlerError;
use deskpilot_core::Arguments;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    })
}

pub trait ParamRecord: DeserializeOwned + Default {
    fn from_args(args: &Arguments) -> Self {
        serde_json::from_value(Value::Object(args.clone())).unwrap_or_default()
    }
}

/// Unwrap a parameter the operation cannot run without.
pub fn require<T>(value: Option<T>, name: &'static str) -> Result<T, HandlerError> {
    value.ok_or(HandlerError::MissingParameter(name))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SystemParams {
    #[serde(deserialize_with = "lenient_string")]
    pub action: Option<String>,
    #[serde(deserialize_with = "lenient_int")]
    pub value: Option<i64>,
    #[serde(deserialize_with = "lenient_string")]
    pub window_name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub process_name: Option<String>,
}

impl ParamRecord for SystemParams {}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileParams {
    #[serde(deserialize_with = "lenient_string")]
    pub path: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub content: Option<String>,
}

impl ParamRecord for FileParams {}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TerminalParams {
    #[serde(deserialize_with = "lenient_string")]
    pub command: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub process_name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub message: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub project_path: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub build_type: Option<String>,
}

impl ParamRecord for TerminalParams {}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WebParams {
    #[serde(deserialize_with = "lenient_string")]
    pub query: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub url: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub path: Option<String>,
}

impl ParamRecord for WebParams {}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MediaParams {
    #[serde(deserialize_with = "lenient_string")]
    pub prompt: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub size: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub path: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub instruction: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub text: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub voice: Option<String>,
}

impl ParamRecord for MediaParams {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Arguments {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_int_from_string_and_float() {
        let p = SystemParams::from_args(&args(json!({"action": "set", "value": "70%"})));
        assert_eq!(p.value, Some(70));
        let p = SystemParams::from_args(&args(json!({"action": "set", "value": 42.6})));
        assert_eq!(p.value, Some(43));
    }

    #[test]
    fn test_uninterpretable_values_become_none() {
        let p = SystemParams::from_args(&args(json!({"action": ["x"], "value": "loud"})));
        assert!(p.action.is_none());
        assert!(p.value.is_none());
    }

    #[test]
    fn test_missing_and_null_fields() {
        let p = FileParams::from_args(&args(json!({"path": null})));
        assert!(p.path.is_none());
        assert!(p.content.is_none());
        assert!(matches!(
            require(p.path, "path"),
            Err(HandlerError::MissingParameter("path"))
        ));
    }

    #[test]
    fn test_numbers_accepted_as_strings() {
        let p = WebParams::from_args(&args(json!({"query": 2026})));
        assert_eq!(p.query.as_deref(), Some("2026"));
    }
}
