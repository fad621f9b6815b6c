//! deskpilot runtime: the text-mode conversation loop and the realtime
//! streaming session, both feeding one shared [`SessionState`].
//!
//! [`SessionState`]: deskpilot_core::SessionState

pub mod audio;
pub mod conversation;
pub mod error;
pub mod metrics;
pub mod realtime;

pub use conversation::{to_chat_messages, Conversation, DEFAULT_MAX_TOOL_ROUNDS};
pub use error::{AudioError, RuntimeError, StreamError, TransportError};
pub use realtime::{
    Connector, ControllerOptions, StreamController, StreamNotice, WebSocketConnector,
};
