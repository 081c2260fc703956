//! LLM provider abstraction.
//!
//! `LlmProvider` is an enum over concrete provider implementations.
//! Add a new variant + module in `providers/` for each additional backend.
//!
//! Providers are stateless with respect to conversations: history is owned by
//! the memory subsystem and passed in on every call.

pub mod providers;

use thiserror::Error;

use crate::subsystems::memory::Turn;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("provider '{0}' requires an API key")]
    MissingApiKey(String),
    #[error("provider request failed: {0}")]
    Request(String),
}

// ── Provider enum ─────────────────────────────────────────────────────────────

/// All available provider backends.
///
/// Enum dispatch keeps `generate` a plain `async fn`: no boxed futures or
/// trait objects at the call site.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    Dummy(providers::dummy::DummyProvider),
    Gemini(providers::gemini::GeminiProvider),
    OpenAiCompatible(providers::openai_compatible::OpenAiCompatibleProvider),
}

impl LlmProvider {
    /// Send the ordered `history` (oldest first, ending with the turn to
    /// answer) plus an optional system prompt; return the reply text.
    pub async fn generate(&self, history: &[Turn], system: Option<&str>) -> Result<String, ProviderError> {
        match self {
            LlmProvider::Dummy(p) => p.generate(history).await,
            LlmProvider::Gemini(p) => p.generate(history, system).await,
            LlmProvider::OpenAiCompatible(p) => p.generate(history, system).await,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LlmProvider::Dummy(_) => "dummy",
            LlmProvider::Gemini(_) => "gemini",
            LlmProvider::OpenAiCompatible(_) => "openai",
        }
    }
}
