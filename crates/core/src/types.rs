//! Core data model shared by the dispatcher, the conversation loop and the
//! streaming controller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

use crate::error::CoreError;

/// Schema version for persisted transcript entries.
pub const SCHEMA_VERSION: u32 = 1;

/// Raw tool-call arguments as emitted by the conversational model.
pub type Arguments = Map<String, Value>;

/// Author of a transcript entry.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A single entry of the conversation transcript.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TranscriptEntry {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl TranscriptEntry {
    /// Create a new entry stamped with the current time.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    /// Create a new entry with metadata.
    pub fn with_metadata(role: Role, content: impl Into<String>, metadata: Value) -> Self {
        Self {
            metadata: Some(metadata),
            ..Self::new(role, content)
        }
    }

    /// Assistant entry recording that the model requested an operation.
    pub fn tool_call(request: &ToolCallRequest) -> Self {
        Self::with_metadata(
            Role::Assistant,
            String::new(),
            serde_json::json!({
                "tool_call": {
                    "operation": request.operation,
                    "arguments": request.arguments,
                    "call_id": request.call_id,
                }
            }),
        )
    }

    /// The tool call recorded on an assistant entry, if any.
    pub fn recorded_tool_call(&self) -> Option<ToolCallRequest> {
        let call = self.metadata.as_ref()?.get("tool_call")?;
        serde_json::from_value(call.clone()).ok()
    }

    /// Call id a tool result entry answers, if any.
    pub fn call_id(&self) -> Option<&str> {
        self.metadata.as_ref()?.get("call_id")?.as_str()
    }

    /// Validate schema version.
    pub fn validate_version(&self) -> Result<(), String> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(format!(
                "Schema version mismatch: expected {}, got {}",
                SCHEMA_VERSION, self.schema_version
            ));
        }
        Ok(())
    }
}

/// A named operation requested by the conversational model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRequest {
    pub operation: String,
    #[serde(default)]
    pub arguments: Arguments,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
}

impl ToolCallRequest {
    pub fn new(operation: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            operation: operation.into(),
            arguments,
            call_id: None,
        }
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }

    /// Build a request from the JSON-encoded argument string models emit.
    ///
    /// Arguments that fail to parse, or that are not an object, become an
    /// empty map so the dispatcher can still route the call.
    pub fn from_json_arguments(operation: impl Into<String>, raw: &str) -> Self {
        let arguments = match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            _ => Arguments::new(),
        };
        Self::new(operation, arguments)
    }
}

/// Outcome of a dispatched operation. Immutable once returned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallResult {
    pub ok: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}

impl ToolCallResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn success_with(message: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            ok: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            data: None,
        }
    }

    /// JSON payload handed back to the model as a function-call output.
    pub fn to_output_json(&self) -> Value {
        serde_json::json!({
            "ok": self.ok,
            "result": self.message,
            "data": self.data,
        })
    }
}

/// Active configuration of a session. Replaced wholesale, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    pub model: String,
    pub voice: String,
    pub initial_prompt: String,
    pub include_date: bool,
    pub include_time: bool,
    pub function_calling_enabled: bool,
    pub device_label: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            voice: "echo".to_string(),
            initial_prompt: String::new(),
            include_date: true,
            include_time: true,
            function_calling_enabled: true,
            device_label: "unknown".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.model.trim().is_empty() {
            return Err(CoreError::InvalidConfig("model cannot be empty".into()));
        }
        if self.voice.trim().is_empty() {
            return Err(CoreError::InvalidConfig("voice cannot be empty".into()));
        }
        Ok(())
    }
}

/// Lifecycle of a streaming session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamState {
    Idle,
    Connecting,
    Streaming,
    Closing,
    Closed,
    Failed(String),
}

impl StreamState {
    /// Whether the stream holds (or is acquiring) live resources.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            StreamState::Connecting | StreamState::Streaming | StreamState::Closing
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StreamState::Failed(_))
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamState::Idle => write!(f, "idle"),
            StreamState::Connecting => write!(f, "connecting"),
            StreamState::Streaming => write!(f, "streaming"),
            StreamState::Closing => write!(f, "closing"),
            StreamState::Closed => write!(f, "closed"),
            StreamState::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Fixed-size block of signed 16-bit mono samples.
///
/// Frames move by value from the capture callback to the outbound queue and
/// then to the network layer; there is no shared or mutable access after
/// construction.
#[derive(Debug, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Vec<i16>,
    sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Decode little-endian PCM16 bytes.
    pub fn from_le_bytes(bytes: &[u8], sample_rate: u32) -> Result<Self, CoreError> {
        if bytes.len() % 2 != 0 {
            return Err(CoreError::MalformedAudio(format!(
                "odd PCM16 byte length: {}",
                bytes.len()
            )));
        }
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(Self::new(samples, sample_rate))
    }

    /// Encode as little-endian PCM16 bytes.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Tool).unwrap(), r#""tool""#);
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            r#""assistant""#
        );
    }

    #[test]
    fn test_invalid_role_deserialization() {
        let invalid = r#"{"role": "operator", "content": "x", "timestamp": "2026-01-01T00:00:00Z"}"#;
        let result: Result<TranscriptEntry, _> = serde_json::from_str(invalid);
        assert!(result.is_err());
    }

    #[test]
    fn test_entry_defaults_schema_version() {
        let raw = r#"{"role": "user", "content": "hi", "timestamp": "2026-01-01T00:00:00Z"}"#;
        let entry: TranscriptEntry = serde_json::from_str(raw).unwrap();
        assert_eq!(entry.schema_version, SCHEMA_VERSION);
        assert!(entry.validate_version().is_ok());
    }

    #[test]
    fn test_tool_call_entry_records_request() {
        let mut args = Arguments::new();
        args.insert("path".into(), json!("notes.txt"));
        let request = ToolCallRequest::new("read_file", args).with_call_id("call_7");

        let entry = TranscriptEntry::tool_call(&request);
        assert_eq!(entry.role, Role::Assistant);
        assert_eq!(entry.recorded_tool_call(), Some(request));
    }

    #[test]
    fn test_arguments_from_invalid_json_are_empty() {
        let request = ToolCallRequest::from_json_arguments("list_processes", "not json");
        assert!(request.arguments.is_empty());

        let request = ToolCallRequest::from_json_arguments("read_file", "[1, 2]");
        assert!(request.arguments.is_empty());

        let request = ToolCallRequest::from_json_arguments("read_file", r#"{"path": "a"}"#);
        assert_eq!(request.arguments["path"], "a");
    }

    #[test]
    fn test_result_output_json() {
        let result = ToolCallResult::failure("Unknown action: fly");
        let out = result.to_output_json();
        assert_eq!(out["ok"], false);
        assert_eq!(out["result"], "Unknown action: fly");
    }

    #[test]
    fn test_stream_state_display() {
        assert_eq!(StreamState::Streaming.to_string(), "streaming");
        assert_eq!(
            StreamState::Failed("socket reset".into()).to_string(),
            "failed: socket reset"
        );
        assert!(StreamState::Closing.is_active());
        assert!(!StreamState::Closed.is_active());
    }

    #[test]
    fn test_audio_frame_pcm_roundtrip() {
        let frame = AudioFrame::new(vec![0, 1, -1, i16::MAX, i16::MIN], 24_000);
        let bytes = frame.to_le_bytes();
        assert_eq!(bytes.len(), 10);
        let decoded = AudioFrame::from_le_bytes(&bytes, 24_000).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_audio_frame_rejects_odd_length() {
        let err = AudioFrame::from_le_bytes(&[1, 2, 3], 24_000).unwrap_err();
        assert!(matches!(err, CoreError::MalformedAudio(_)));
    }

    #[test]
    fn test_audio_frame_duration() {
        let frame = AudioFrame::new(vec![0; 24_000], 24_000);
        assert_eq!(frame.duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_config_validation() {
        assert!(SessionConfig::default().validate().is_ok());
        let invalid = SessionConfig {
            model: " ".into(),
            ..SessionConfig::default()
        };
        assert!(invalid.validate().is_err());
    }
}
