//! Realtime voice session over a bidirectional JSON channel.

pub mod controller;
pub mod protocol;
pub mod transport;

pub use controller::{ControllerOptions, StreamController, StreamNotice};
pub use protocol::{ClientEvent, ServerEvent};
pub use transport::{Connector, TransportPair, TransportSink, TransportStream, WebSocketConnector};
