//! Text-mode conversation loop.

use crate::error::RuntimeError;
use crate::metrics::MetricTimer;
use chrono::Local;
use deskpilot_core::prompt::{augment_user_text, system_prompt};
use deskpilot_core::{Role, SessionState, ToolCallRequest, TranscriptEntry};
use deskpilot_providers::{ChatMessage, LLMProvider, ToolCall};
use deskpilot_tools::Dispatcher;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 5;

/// Drives one user turn: model call, tool-call rounds, final answer.
pub struct Conversation {
    provider: Arc<dyn LLMProvider>,
    dispatcher: Arc<Dispatcher>,
    max_tool_rounds: usize,
}

impl Conversation {
    pub fn new(provider: Arc<dyn LLMProvider>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            provider,
            dispatcher,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Execute one user turn and return the assistant's final text.
    ///
    /// The configuration is read once at the start of the turn; a concurrent
    /// `replace_config` only affects the next turn.
    pub async fn send(&self, session: &SessionState, text: &str) -> Result<String, RuntimeError> {
        let config = session.config();
        let now = Local::now();
        session.append(TranscriptEntry::new(
            Role::User,
            augment_user_text(text, &config, now),
        ));

        let system = system_prompt(&config, now);
        let schemas = self.dispatcher.registry().schemas();
        let tools = config.function_calling_enabled.then_some(schemas.as_slice());

        for round in 0..=self.max_tool_rounds {
            debug!("Model round {}/{}", round + 1, self.max_tool_rounds + 1);

            let mut messages = vec![ChatMessage::system(system.clone())];
            messages.extend(to_chat_messages(&session.snapshot()));

            let response = {
                let _timer = MetricTimer::new("model_request_latency");
                let reply = if config.model.is_empty() {
                    self.provider.generate(&messages, tools).await
                } else {
                    self.provider
                        .generate_with_model(&config.model, &messages, tools)
                        .await
                };
                reply.map_err(|e| {
                    error!("Model call via {} failed: {}", self.provider.name(), e);
                    e
                })?
            };

            if response.tool_calls.is_empty() || tools.is_none() {
                let content = response.content.unwrap_or_default();
                session.append(TranscriptEntry::new(Role::Assistant, content.clone()));
                info!("Turn finished after {} round(s)", round + 1);
                return Ok(content);
            }

            if round == self.max_tool_rounds {
                break;
            }

            for call in response.tool_calls {
                self.run_tool_call(session, call).await;
            }
        }

        warn!("Tool rounds exhausted for session {}", session.id());
        Err(RuntimeError::ToolRoundsExceeded(self.max_tool_rounds))
    }

    async fn run_tool_call(&self, session: &SessionState, call: ToolCall) {
        let request = ToolCallRequest::from_json_arguments(&call.function.name, &call.function.arguments)
            .with_call_id(call.id.clone());
        session.append(TranscriptEntry::tool_call(&request));

        let known = self.dispatcher.registry().lookup(&request.operation).is_ok();
        let result = self.dispatcher.dispatch(request, session).await;

        // The dispatcher leaves the transcript alone for unknown operations,
        // but every call id still needs an answer on the next request.
        if !known {
            session.append(TranscriptEntry::with_metadata(
                Role::Tool,
                result.message,
                json!({ "operation": call.function.name, "call_id": call.id, "ok": false }),
            ));
        }
    }
}

/// Rebuild chat-completions history from the transcript.
///
/// Tool results are only emitted directly after the tool call they answer;
/// a result whose call is unknown is folded into an assistant message.
pub fn to_chat_messages(entries: &[TranscriptEntry]) -> Vec<ChatMessage> {
    let answered: HashSet<&str> = entries
        .iter()
        .filter(|e| e.role == Role::Tool)
        .filter_map(|e| e.call_id())
        .collect();

    let mut messages = Vec::with_capacity(entries.len());
    let mut pending: HashSet<String> = HashSet::new();

    for entry in entries {
        match entry.role {
            Role::System => messages.push(ChatMessage::system(entry.content.clone())),
            Role::User => messages.push(ChatMessage::user(entry.content.clone())),
            Role::Assistant => match entry.recorded_tool_call() {
                Some(request) => {
                    let Some(id) = request.call_id.filter(|id| answered.contains(id.as_str())) else {
                        continue;
                    };
                    let arguments = serde_json::to_string(&request.arguments)
                        .unwrap_or_else(|_| "{}".to_string());
                    pending.insert(id.clone());
                    messages.push(ChatMessage::assistant_tool_calls(vec![ToolCall::new(
                        id,
                        request.operation,
                        arguments,
                    )]));
                }
                None => messages.push(ChatMessage::assistant(entry.content.clone())),
            },
            Role::Tool => match entry.call_id() {
                Some(id) if pending.remove(id) => {
                    messages.push(ChatMessage::tool_result(id, entry.content.clone()))
                }
                _ => messages.push(ChatMessage::assistant(entry.content.clone())),
            },
        }
    }

    messages
}
