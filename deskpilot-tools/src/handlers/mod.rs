//! Capability handlers, one per operation group.

pub mod file;
pub mod media;
mod process;
pub mod system;
pub mod terminal;
pub mod web;

pub use file::FileHandler;
pub use media::{MediaConfig, MediaHandler};
pub use system::SystemHandler;
pub use terminal::TerminalHandler;
pub use web::{WebConfig, WebHandler};
