//! Local language-model providers: chat, token streaming and embeddings.

pub mod any;
pub mod error;
#[cfg(feature = "mock")]
pub mod mock;
pub mod ollama;
pub mod provider;

pub use any::AnyProvider;
pub use error::LlmError;
pub use provider::{ChatStream, EmbedFuture, LlmProvider, Message, Role};
