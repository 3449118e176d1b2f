use ollama_rs::Ollama;
use ollama_rs::generation::chat::ChatMessage;
use ollama_rs::generation::chat::request::ChatMessageRequest;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use tokio_stream::StreamExt;

use crate::error::LlmError;
use crate::provider::{ChatStream, LlmProvider, Message, Role};

const DEFAULT_PORT: u16 = 11434;

/// Chat and embeddings against a local Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Ollama,
    model: String,
    embedding_model: String,
}

impl OllamaProvider {
    #[must_use]
    pub fn new(base_url: &str, model: String, embedding_model: String) -> Self {
        let (host, port) = parse_host_port(base_url);
        Self {
            client: Ollama::new(host, port),
            model,
            embedding_model,
        }
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    /// Check if Ollama is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection to Ollama fails.
    pub async fn health_check(&self) -> Result<(), LlmError> {
        self.client.list_local_models().await.map_err(|e| {
            LlmError::Unavailable(format!("failed to connect to Ollama, is it running? {e}"))
        })?;
        Ok(())
    }

    /// Names of the models the server has pulled.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn local_models(&self) -> Result<Vec<String>, LlmError> {
        let models = self
            .client
            .list_local_models()
            .await
            .map_err(|e| request_error(&e))?;
        Ok(models.into_iter().map(|m| m.name).collect())
    }

    fn request(&self, messages: &[Message]) -> ChatMessageRequest {
        let messages = messages.iter().map(convert_message).collect();
        ChatMessageRequest::new(self.model.clone(), messages)
    }
}

impl LlmProvider for OllamaProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        let response = self
            .client
            .send_chat_messages(self.request(messages))
            .await
            .map_err(|e| request_error(&e))?;
        Ok(response.message.content)
    }

    async fn chat_stream(&self, messages: &[Message]) -> Result<ChatStream, LlmError> {
        let stream = self
            .client
            .send_chat_messages_stream(self.request(messages))
            .await
            .map_err(|e| request_error(&e))?;

        let mapped = stream.map(|item| match item {
            Ok(response) => Ok(response.message.content),
            Err(()) => Err(LlmError::Stream("Ollama stream chunk failed".into())),
        });
        Ok(Box::pin(mapped))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let request = GenerateEmbeddingsRequest::new(
            self.embedding_model.clone(),
            EmbeddingsInput::from(text),
        );
        let response = self
            .client
            .generate_embeddings(request)
            .await
            .map_err(|e| request_error(&e))?;

        response
            .embeddings
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse { provider: "ollama" })
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}

fn request_error(e: &impl std::fmt::Display) -> LlmError {
    LlmError::Request {
        provider: "ollama",
        message: e.to_string(),
    }
}

fn convert_message(msg: &Message) -> ChatMessage {
    let text = msg.content.clone();
    match msg.role {
        Role::System => ChatMessage::system(text),
        Role::User => ChatMessage::user(text),
        Role::Assistant => ChatMessage::assistant(text),
    }
}

fn parse_host_port(url: &str) -> (String, u16) {
    let url = url.trim_end_matches('/');
    if let Some((host, port)) = url.rsplit_once(':')
        && let Ok(port) = port.parse::<u16>()
    {
        return (host.to_owned(), port);
    }
    (url.to_owned(), DEFAULT_PORT)
}
