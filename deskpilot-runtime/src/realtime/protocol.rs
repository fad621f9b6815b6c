//! Realtime wire protocol: JSON envelopes tagged by `type`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use deskpilot_core::{AudioFrame, CoreError, SessionConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::audio::WIRE_SAMPLE_RATE;

/// Events sent to the server.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionUpdate },

    #[serde(rename = "input_audio_buffer.append")]
    InputAudioAppend { audio: String },

    #[serde(rename = "conversation.item.create")]
    ItemCreate { item: ConversationItem },

    #[serde(rename = "response.create")]
    ResponseCreate {
        #[serde(skip_serializing_if = "Option::is_none")]
        response: Option<ResponseOptions>,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionUpdate {
    pub voice: String,
    pub instructions: String,
    pub input_audio_format: &'static str,
    pub output_audio_format: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationItem {
    Message {
        role: &'static str,
        content: Vec<InputContent>,
    },
    FunctionCallOutput {
        call_id: String,
        output: String,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputContent {
    InputText { text: String },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResponseOptions {
    pub modalities: Vec<&'static str>,
}

impl ClientEvent {
    /// Session setup sent right after the connection opens.
    pub fn session_update(config: &SessionConfig, tools: Vec<Value>) -> Self {
        let (tools, tool_choice) = if config.function_calling_enabled && !tools.is_empty() {
            (tools, Some("auto"))
        } else {
            (Vec::new(), None)
        };
        ClientEvent::SessionUpdate {
            session: SessionUpdate {
                voice: config.voice.clone(),
                instructions: config.initial_prompt.clone(),
                input_audio_format: "pcm16",
                output_audio_format: "pcm16",
                tools,
                tool_choice,
            },
        }
    }

    pub fn audio(frame: &AudioFrame) -> Self {
        ClientEvent::InputAudioAppend {
            audio: BASE64.encode(frame.to_le_bytes()),
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        ClientEvent::ItemCreate {
            item: ConversationItem::Message {
                role: "user",
                content: vec![InputContent::InputText { text: text.into() }],
            },
        }
    }

    pub fn function_output(call_id: impl Into<String>, output: &Value) -> Self {
        ClientEvent::ItemCreate {
            item: ConversationItem::FunctionCallOutput {
                call_id: call_id.into(),
                output: output.to_string(),
            },
        }
    }

    /// Ask for a text-only response (typed input).
    pub fn text_response() -> Self {
        ClientEvent::ResponseCreate {
            response: Some(ResponseOptions {
                modalities: vec!["text"],
            }),
        }
    }

    /// Ask for a response with the session's default modalities.
    pub fn response() -> Self {
        ClientEvent::ResponseCreate { response: None }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Events received from the server. Unrecognized types are kept as
/// [`ServerEvent::Unknown`] and ignored by the controller.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "session.created")]
    SessionCreated,

    #[serde(rename = "response.audio.delta")]
    AudioDelta { delta: String },

    #[serde(rename = "response.audio.done")]
    AudioDone,

    #[serde(rename = "response.text.done")]
    TextDone {
        #[serde(default)]
        text: String,
    },

    #[serde(rename = "response.audio_transcript.done")]
    AudioTranscriptDone {
        #[serde(default)]
        transcript: String,
    },

    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default)]
        response: ResponseBody,
    },

    #[serde(rename = "error")]
    Error { error: ErrorBody },

    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ResponseBody {
    #[serde(default)]
    pub output: Vec<OutputItem>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    FunctionCall {
        name: String,
        call_id: String,
        #[serde(default)]
        arguments: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl ServerEvent {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Decode a base64 pcm16 delta into a wire-rate frame.
pub fn decode_audio(delta: &str) -> Result<AudioFrame, CoreError> {
    let bytes = BASE64
        .decode(delta)
        .map_err(|e| CoreError::MalformedAudio(format!("invalid base64: {e}")))?;
    AudioFrame::from_le_bytes(&bytes, WIRE_SAMPLE_RATE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(function_calling: bool) -> SessionConfig {
        SessionConfig {
            voice: "sage".to_string(),
            initial_prompt: "Be brief.".to_string(),
            function_calling_enabled: function_calling,
            ..SessionConfig::default()
        }
    }

    #[test]
    fn test_session_update_carries_tools_only_when_enabled() {
        let tools = vec![json!({"type": "function", "name": "read_file"})];

        let on: Value = serde_json::from_str(
            &ClientEvent::session_update(&config(true), tools.clone()).to_json().unwrap(),
        )
        .unwrap();
        assert_eq!(on["type"], "session.update");
        assert_eq!(on["session"]["voice"], "sage");
        assert_eq!(on["session"]["instructions"], "Be brief.");
        assert_eq!(on["session"]["output_audio_format"], "pcm16");
        assert_eq!(on["session"]["tool_choice"], "auto");
        assert_eq!(on["session"]["tools"][0]["name"], "read_file");

        let off: Value = serde_json::from_str(
            &ClientEvent::session_update(&config(false), tools).to_json().unwrap(),
        )
        .unwrap();
        assert!(off["session"].get("tools").is_none());
        assert!(off["session"].get("tool_choice").is_none());
    }

    #[test]
    fn test_user_text_and_text_response_shapes() {
        let item: Value = serde_json::to_value(ClientEvent::user_text("hello")).unwrap();
        assert_eq!(
            item,
            json!({
                "type": "conversation.item.create",
                "item": {
                    "type": "message",
                    "role": "user",
                    "content": [{"type": "input_text", "text": "hello"}]
                }
            })
        );

        let response: Value = serde_json::to_value(ClientEvent::text_response()).unwrap();
        assert_eq!(response, json!({"type": "response.create", "response": {"modalities": ["text"]}}));
        let bare: Value = serde_json::to_value(ClientEvent::response()).unwrap();
        assert_eq!(bare, json!({"type": "response.create"}));
    }

    #[test]
    fn test_function_output_is_json_string() {
        let event = ClientEvent::function_output("call_1", &json!({"result": "done"}));
        let value: Value = serde_json::to_value(event).unwrap();
        assert_eq!(value["item"]["type"], "function_call_output");
        assert_eq!(value["item"]["call_id"], "call_1");
        assert_eq!(value["item"]["output"], r#"{"result":"done"}"#);
    }

    #[test]
    fn test_parse_response_done_with_function_call() {
        let raw = r#"{
            "type": "response.done",
            "event_id": "evt_1",
            "response": {"output": [
                {"type": "message", "role": "assistant", "content": []},
                {"type": "function_call", "name": "control_volume", "call_id": "c7",
                 "arguments": "{\"action\":\"up\"}"}
            ]}
        }"#;
        let ServerEvent::ResponseDone { response } = ServerEvent::parse(raw).unwrap() else {
            panic!("expected response.done");
        };
        assert_eq!(response.output[0], OutputItem::Other);
        assert_eq!(
            response.output[1],
            OutputItem::FunctionCall {
                name: "control_volume".to_string(),
                call_id: "c7".to_string(),
                arguments: r#"{"action":"up"}"#.to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_events_are_tolerated() {
        let event = ServerEvent::parse(r#"{"type": "rate_limits.updated", "rate_limits": []}"#).unwrap();
        assert_eq!(event, ServerEvent::Unknown);
        assert!(ServerEvent::parse("not json").is_err());
    }

    #[test]
    fn test_audio_round_trip_through_base64() {
        let frame = AudioFrame::new(vec![1, -2, 300], WIRE_SAMPLE_RATE);
        let ClientEvent::InputAudioAppend { audio } = ClientEvent::audio(&frame) else {
            panic!("expected audio append");
        };
        let decoded = decode_audio(&audio).unwrap();
        assert_eq!(decoded.samples(), frame.samples());
        assert!(decode_audio("%%%").is_err());
    }
}
