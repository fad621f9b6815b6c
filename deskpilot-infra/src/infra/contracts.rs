use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One dispatched operation, as written to the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: String,
    pub session: String,
    pub operation: String,
    pub group: String,
    pub arguments: Map<String, Value>,
    pub ok: bool,
    pub message: String,
}

impl AuditEntry {
    /// Build from the JSON object the dispatcher emits. Absent fields fall
    /// back to empty values.
    pub fn from_value(value: &Value) -> Self {
        let text = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string()
        };
        Self {
            timestamp: text("timestamp"),
            session: text("session"),
            operation: text("operation"),
            group: text("group"),
            arguments: value
                .get("arguments")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            ok: value.get("ok").and_then(Value::as_bool).unwrap_or(false),
            message: text("message"),
        }
    }
}
