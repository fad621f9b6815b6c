pub mod circuit_breaker;
pub mod openai_compatible;
pub mod traits;

pub use openai_compatible::OpenAICompatibleProvider;
pub use traits::{ChatMessage, GenerateResponse, LLMProvider, ProviderError, ToolCall};
