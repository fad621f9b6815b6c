//! Shared data model for deskpilot: transcript entries, tool-call requests and
//! results, session configuration, stream state and audio frames, plus the
//! append-only session state both interaction modes write into.

pub mod error;
pub mod prompt;
pub mod session;
pub mod types;

pub use error::CoreError;
pub use session::SessionState;
pub use types::*;
