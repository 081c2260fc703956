//! Chat service — one conversational round-trip over memory, retrieval and
//! the model.
//!
//! ```text
//! channel ──text──▶ ChatService::respond
//!                    ├─ memory: append user turn, snapshot history
//!                    ├─ retrieval (optional): rewrite the last turn as a RAG prompt
//!                    ├─ llm: generate(history, system)
//!                    └─ memory: append assistant turn
//! ```
//!
//! No memory lock is held across the model call. If the call fails, the user
//! turn stays in the session unanswered; that is a valid state and the next
//! request simply continues from it.

pub mod prompt;

pub use prompt::{ChatPrompts, PromptBuilder};

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::llm::{LlmProvider, ProviderError};
use crate::subsystems::memory::{MemoryError, MemoryStore, Role, Turn, render_transcript};
#[cfg(feature = "subsystem-rag")]
use crate::subsystems::retrieval::{RetrievalError, Retriever, format_context};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[cfg(feature = "subsystem-rag")]
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
}

/// How history is handed to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromptStyle {
    /// Structured role-tagged turns.
    #[default]
    Messages,
    /// The whole history flattened into one `"<role>: <content>"` block sent
    /// as a single user message.
    Transcript,
}

#[cfg(feature = "subsystem-rag")]
struct Rag {
    retriever: Arc<dyn Retriever>,
    top_k: usize,
}

pub struct ChatService {
    memory: Arc<MemoryStore>,
    provider: LlmProvider,
    prompts: ChatPrompts,
    #[cfg(feature = "subsystem-rag")]
    rag: Option<Rag>,
}

impl ChatService {
    pub fn new(memory: Arc<MemoryStore>, provider: LlmProvider, prompts: ChatPrompts) -> Self {
        Self {
            memory,
            provider,
            prompts,
            #[cfg(feature = "subsystem-rag")]
            rag: None,
        }
    }

    /// Answer from retrieved context: the question sent to the model is
    /// wrapped in the RAG template with the `top_k` best chunks.
    #[cfg(feature = "subsystem-rag")]
    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>, top_k: usize) -> Self {
        self.rag = Some(Rag { retriever, top_k });
        self
    }

    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Record `text` as a user turn in `session_id`, ask the model, record
    /// and return its reply.
    pub async fn respond(&self, session_id: &str, text: &str, style: PromptStyle) -> Result<String, ChatError> {
        let conversation = self.memory.create_or_get(session_id)?;
        let mut history = conversation.append_and_snapshot(Role::User, text);

        #[cfg(feature = "subsystem-rag")]
        if let Some(rag) = &self.rag {
            let chunks = rag.retriever.retrieve(text, rag.top_k)?;
            debug!(%session_id, chunks = chunks.len(), "context retrieved");
            let prompt = self.prompts.rag_prompt(&format_context(&chunks), text);
            if let Some(last) = history.last_mut() {
                last.content = prompt;
            }
        }

        let request = match style {
            PromptStyle::Messages => history,
            PromptStyle::Transcript => vec![Turn::user(render_transcript(&history))],
        };

        debug!(
            %session_id,
            provider = self.provider.name(),
            ?style,
            turns = request.len(),
            "generating reply"
        );

        let reply = match self.provider.generate(&request, self.prompts.system.as_deref()).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(%session_id, "generation failed, user turn left unanswered: {e}");
                return Err(e.into());
            }
        };

        conversation.append(Role::Assistant, reply.as_str());
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::llm::providers;
    use crate::subsystems::memory::MemoryConfig;

    fn dummy_service() -> ChatService {
        let memory = Arc::new(MemoryStore::new(MemoryConfig::default()));
        let provider = providers::build(&Config::test_default().llm, None).unwrap();
        ChatService::new(memory, provider, ChatPrompts::default())
    }

    /// Points at a closed port so every request fails at the transport level.
    fn failing_service() -> ChatService {
        let mut cfg = Config::test_default();
        cfg.llm.provider = "openai".into();
        cfg.llm.openai.api_base_url = "http://127.0.0.1:9/v1/chat/completions".into();
        cfg.llm.openai.timeout_seconds = 2;
        let provider = providers::build(&cfg.llm, None).unwrap();
        let memory = Arc::new(MemoryStore::new(MemoryConfig::default()));
        ChatService::new(memory, provider, ChatPrompts::default())
    }

    #[tokio::test]
    async fn round_trip_records_both_turns() {
        let chat = dummy_service();
        let reply = chat.respond("s1", "hi", PromptStyle::Messages).await.unwrap();
        assert_eq!(reply, "[echo] hi");
        assert_eq!(chat.memory().render_text("s1").unwrap(), "user: hi\nassistant: [echo] hi");
    }

    #[tokio::test]
    async fn transcript_style_sends_flattened_history() {
        let chat = dummy_service();
        chat.respond("s", "first", PromptStyle::Messages).await.unwrap();
        let reply = chat.respond("s", "second", PromptStyle::Transcript).await.unwrap();
        // The dummy echoes the single flattened user message it was given.
        assert_eq!(reply, "[echo] user: first\nassistant: [echo] first\nuser: second");
        assert_eq!(chat.memory().render("s").unwrap().len(), 4);
    }

    #[tokio::test]
    async fn invalid_session_is_rejected() {
        let chat = dummy_service();
        let err = chat.respond("", "hi", PromptStyle::Messages).await.unwrap_err();
        assert!(matches!(err, ChatError::Memory(MemoryError::InvalidSession(_))));
        assert!(chat.memory().is_empty());
    }

    #[tokio::test]
    async fn failed_generation_leaves_dangling_user_turn() {
        let chat = failing_service();
        let err = chat.respond("s", "anyone there?", PromptStyle::Messages).await.unwrap_err();
        assert!(matches!(err, ChatError::Provider(_)));

        let turns = chat.memory().render("s").unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].content, "anyone there?");
    }

    #[cfg(feature = "channel-axum")]
    #[tokio::test]
    async fn idle_sweep_keeps_session_waiting_on_the_model() {
        use crate::llm::providers::slow_server::slow_completions;
        use std::time::Duration;

        let llm = slow_completions(Duration::from_millis(400), "slow reply").await;
        let provider = providers::build(&llm, None).unwrap();
        let memory = Arc::new(MemoryStore::new(MemoryConfig::default()));
        let chat = Arc::new(ChatService::new(memory, provider, ChatPrompts::default()));

        let pending = tokio::spawn({
            let chat = chat.clone();
            async move { chat.respond("s", "hello", PromptStyle::Messages).await }
        });
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(chat.memory().evict_idle(Duration::from_millis(200)), 0);

        assert_eq!(pending.await.unwrap().unwrap(), "slow reply");
        let turns = chat.memory().render("s").unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].content, "slow reply");

        // Once the exchange is done the session ages out normally.
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(chat.memory().evict_idle(Duration::from_millis(200)), 1);
    }

    #[cfg(feature = "subsystem-rag")]
    #[tokio::test]
    async fn rag_wraps_question_but_memory_keeps_it_raw() {
        use crate::subsystems::retrieval::{KeywordIndex, sample_documents};

        let index = KeywordIndex::build(&sample_documents(), 1000, 200).unwrap();
        let chat = dummy_service().with_retriever(Arc::new(index), 3);

        let reply = chat.respond("r", "What is Gemini?", PromptStyle::Messages).await.unwrap();
        assert!(reply.starts_with("[echo] Use ONLY the context below"));
        assert!(reply.contains("Gemini is Google’s family of generative models."));
        assert!(reply.ends_with("Question:\nWhat is Gemini?"));

        let turns = chat.memory().render("r").unwrap();
        assert_eq!(turns[0].content, "What is Gemini?");
    }
}
