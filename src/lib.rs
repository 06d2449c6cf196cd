// Public modules
pub mod chat;
pub mod client;
pub mod client_logger;
pub mod conversation;
pub mod error;
pub mod provider;
pub mod render;
pub mod sse;
pub mod types;

mod observability;

// Re-exports
pub use chat::{ChatSession, SessionConfig, TurnOutcome, TurnStream};
pub use client::OpenAi;
pub use client_logger::{ClientLogger, JsonLinesLogger};
pub use conversation::ConversationLog;
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use provider::{ApiKey, CompletionProvider, DeltaStream};
pub use types::*;
