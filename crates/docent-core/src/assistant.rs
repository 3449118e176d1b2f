use std::sync::Arc;

use docent_llm::{ChatStream, LlmError, LlmProvider, Message};
use docent_memory::{KnowledgeBase, RetrievedChunk};

use crate::config::RetrievalConfig;

pub const SYSTEM_PROMPT: &str = "You are a helpful AI assistant. Your task is to answer questions \
based solely on the provided context.
If the context doesn't contain enough information to answer the question, say so.
Do not use any external knowledge or make assumptions beyond what's given in the context.
If asked about your capabilities or identity, refer only to being an AI assistant without \
mentioning specific models or companies.";

/// Grounded prompt: system prompt, retrieved context, then the question.
#[must_use]
pub fn build_prompt(context: &str, question: &str) -> String {
    format!("{SYSTEM_PROMPT}\n\nContext: {context}\n\nHuman: {question}\n\nAssistant:")
}

/// Answers questions with a provider, optionally grounded in the knowledge base.
pub struct Assistant<P: LlmProvider> {
    provider: P,
    knowledge: Arc<KnowledgeBase>,
    top_k: usize,
    use_rag: bool,
}

impl<P: LlmProvider> Assistant<P> {
    #[must_use]
    pub fn new(provider: P, knowledge: Arc<KnowledgeBase>, retrieval: &RetrievalConfig) -> Self {
        Self {
            provider,
            knowledge,
            top_k: retrieval.top_k,
            use_rag: retrieval.use_rag,
        }
    }

    #[must_use]
    pub fn use_rag(&self) -> bool {
        self.use_rag
    }

    pub fn set_use_rag(&mut self, enabled: bool) {
        self.use_rag = enabled;
    }

    #[must_use]
    pub fn knowledge(&self) -> &Arc<KnowledgeBase> {
        &self.knowledge
    }

    /// Chunks most relevant to `question`. Retrieval failures are logged and
    /// yield no context.
    pub async fn retrieve(&self, question: &str) -> Vec<RetrievedChunk> {
        match self.knowledge.similarity_search(question, self.top_k).await {
            Ok(results) => results,
            Err(e) => {
                tracing::error!("error retrieving context: {e}");
                Vec::new()
            }
        }
    }

    /// The text sent to the model for `question`.
    pub async fn prompt(&self, question: &str) -> String {
        if !self.use_rag {
            return question.to_owned();
        }
        let results = self.retrieve(question).await;
        let context = KnowledgeBase::build_context(&results);
        tracing::debug!(
            "context for question ({} chunks): {}",
            results.len(),
            context.chars().take(500).collect::<String>()
        );
        build_prompt(&context, question)
    }

    /// Stream the answer to `question`.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot start the answer.
    pub async fn ask(&self, question: &str) -> Result<ChatStream, LlmError> {
        let prompt = self.prompt(question).await;
        self.provider.chat_stream(&[Message::user(prompt)]).await
    }

    /// Wait for the whole answer to `question`.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails.
    pub async fn answer(&self, question: &str) -> Result<String, LlmError> {
        let prompt = self.prompt(question).await;
        self.provider.chat(&[Message::user(prompt)]).await
    }
}

impl<P: LlmProvider + std::fmt::Debug> std::fmt::Debug for Assistant<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assistant")
            .field("provider", &self.provider)
            .field("top_k", &self.top_k)
            .field("use_rag", &self.use_rag)
            .finish_non_exhaustive()
    }
}
