//! Tests for the shipped config/ directory: prompt templates and default.toml.

use std::fs;
use std::path::Path;

use parley_bot::config::{self, EnvOverrides};
use parley_bot::subsystems::chat::ChatPrompts;

#[test]
fn test_rag_prompt_file_exists() {
    let path = "config/prompts/rag_qa.txt";
    assert!(fs::metadata(path).is_ok(), "rag_qa.txt prompt file missing");
}

#[test]
fn test_rag_prompt_template_vars() {
    let text = fs::read_to_string("config/prompts/rag_qa.txt").unwrap();
    assert!(text.contains("{{context}}"), "rag_qa.txt should contain {{context}} variable");
    assert!(text.contains("{{question}}"), "rag_qa.txt should contain {{question}} variable");
}

#[test]
fn test_shipped_prompts_load() {
    let prompts = ChatPrompts::load(Path::new("config/prompts"));
    assert!(prompts.system.is_some(), "system.md should provide a system prompt");
    let filled = prompts.rag_prompt("Ants carry leaves.", "What do ants carry?");
    assert!(filled.contains("Ants carry leaves."));
    assert!(filled.contains("What do ants carry?"));
    assert!(!filled.contains("{{"));
}

#[test]
fn test_default_config_parses() {
    let overrides = EnvOverrides { api_key: Some("test-key".into()), ..Default::default() };
    let cfg = config::load_from(Path::new("config/default.toml"), overrides).unwrap();
    assert_eq!(cfg.llm.provider, "gemini");
    assert_eq!(cfg.llm.gemini.model, "gemini-2.5-flash");
    assert_eq!(cfg.comms.pty.session_id, "cli");
    assert_eq!(cfg.comms.http.bind, "127.0.0.1:8000");
    assert_eq!(cfg.rag.top_k, 3);
    assert!(cfg.memory.max_turns.is_none());
}

#[test]
fn test_default_config_needs_key_for_gemini() {
    let err = config::load_from(Path::new("config/default.toml"), EnvOverrides::default()).unwrap_err();
    assert!(err.to_string().contains("API key"));
}
