//! Prompt templates loaded from `config/prompts/`.
//!
//! Prompts are assembled from plain-text fragments. Each layer is appended in
//! order; missing files are skipped so layers are optional. Variables use
//! `{{key}}` syntax and are substituted once, at [`build`](PromptBuilder::build).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

const SEPARATOR: &str = "\n\n";

/// File holding the optional system prompt.
pub const SYSTEM_PROMPT_FILE: &str = "system.md";
/// File holding the retrieval-augmented question template.
pub const RAG_TEMPLATE_FILE: &str = "rag_qa.txt";

/// Used when `rag_qa.txt` is absent.
pub const DEFAULT_RAG_TEMPLATE: &str = "Use ONLY the context below to answer the question.
If the answer is not in the context, say \"I don't know\".

Context:
{{context}}

Question:
{{question}}";

/// Fluent builder that assembles a prompt from template files and inline text.
pub struct PromptBuilder {
    prompts_dir: PathBuf,
    parts: Vec<String>,
    vars: HashMap<String, String>,
}

impl PromptBuilder {
    pub fn new(prompts_dir: impl Into<PathBuf>) -> Self {
        Self {
            prompts_dir: prompts_dir.into(),
            parts: Vec::new(),
            vars: HashMap::new(),
        }
    }

    /// Append the contents of `filename`; skipped when missing or blank.
    pub fn layer(mut self, filename: &str) -> Self {
        let path = self.prompts_dir.join(filename);
        match fs::read_to_string(&path) {
            Ok(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    self.parts.push(trimmed.to_string());
                }
            }
            Err(_) => debug!("prompt: layer '{}' not found, skipped", path.display()),
        }
        self
    }

    /// Append `filename`, or `fallback` when the file is missing or blank.
    pub fn layer_or(self, filename: &str, fallback: &str) -> Self {
        let before = self.parts.len();
        let this = self.layer(filename);
        if this.parts.len() == before { this.append(fallback) } else { this }
    }

    /// Append an inline text fragment.
    pub fn append(mut self, text: impl Into<String>) -> Self {
        let s = text.into();
        let trimmed = s.trim();
        if !trimmed.is_empty() {
            self.parts.push(trimmed.to_string());
        }
        self
    }

    pub fn var(mut self, key: &str, value: impl Into<String>) -> Self {
        self.vars.insert(key.to_string(), value.into());
        self
    }

    /// Join the layers with blank lines and substitute variables.
    ///
    /// Substitution runs over the template only, in one pass, so a value
    /// containing `{{...}}` is never expanded again.
    pub fn build(self) -> String {
        let template = self.parts.join(SEPARATOR);
        let mut out = String::with_capacity(template.len());
        let mut rest = template.as_str();

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find("}}") {
                Some(end) => {
                    let key = &after[..end];
                    match self.vars.get(key) {
                        Some(value) => out.push_str(value),
                        None => {
                            out.push_str("{{");
                            out.push_str(key);
                            out.push_str("}}");
                        }
                    }
                    rest = &after[end + 2..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// Prompt material resolved once at startup.
#[derive(Debug, Clone)]
pub struct ChatPrompts {
    /// Sent as the provider's system prompt when present.
    pub system: Option<String>,
    /// RAG template with `{{context}}` and `{{question}}` placeholders.
    pub rag_template: String,
}

impl ChatPrompts {
    pub fn load(prompts_dir: &Path) -> Self {
        let system = PromptBuilder::new(prompts_dir).layer(SYSTEM_PROMPT_FILE);
        let system = if system.is_empty() { None } else { Some(system.build()) };

        let rag_template = PromptBuilder::new(prompts_dir)
            .layer_or(RAG_TEMPLATE_FILE, DEFAULT_RAG_TEMPLATE)
            .build();

        Self { system, rag_template }
    }

    /// Fill the RAG template with retrieved `context` and the user's `question`.
    pub fn rag_prompt(&self, context: &str, question: &str) -> String {
        PromptBuilder::new("")
            .append(self.rag_template.as_str())
            .var("context", context)
            .var("question", question)
            .build()
    }
}

impl Default for ChatPrompts {
    fn default() -> Self {
        Self { system: None, rag_template: DEFAULT_RAG_TEMPLATE.to_string() }
    }
}
