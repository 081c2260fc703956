//! Dummy LLM provider — echoes the latest user turn prefixed with `[echo]`.
//! Used for keyless runs and for exercising the full chat round-trip in tests.

use crate::llm::ProviderError;
use crate::subsystems::memory::{Role, Turn};

#[derive(Debug, Clone)]
pub struct DummyProvider;

impl DummyProvider {
    pub async fn generate(&self, history: &[Turn]) -> Result<String, ProviderError> {
        let last = history
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
            .unwrap_or_default();
        Ok(format!("[echo] {last}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_latest_user_turn() {
        let p = DummyProvider;
        let history = vec![Turn::user("first"), Turn::assistant("[echo] first"), Turn::user("second")];
        assert_eq!(p.generate(&history).await.unwrap(), "[echo] second");
    }

    #[tokio::test]
    async fn empty_history() {
        let p = DummyProvider;
        assert_eq!(p.generate(&[]).await.unwrap(), "[echo] ");
    }
}
