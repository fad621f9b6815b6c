pub mod audit;
pub mod operations;
pub mod realtime;
pub mod settings;
