//! Wire and conversation types.

pub mod chat_completion;
pub mod model;
pub mod turn;

pub use chat_completion::{
    ChatCompletionChunk, ChatCompletionRequest, ChunkChoice, ChunkDelta, ProviderErrorBody,
    ProviderErrorDetail,
};
pub use model::{KnownModel, Model};
pub use turn::{Role, Turn};
