//! End-to-end chat flow through the public API with the dummy provider.

use std::sync::Arc;
use std::time::Duration;

use parley_bot::config::Config;
use parley_bot::llm::providers;
use parley_bot::subsystems::chat::{ChatPrompts, ChatService, PromptStyle};
use parley_bot::subsystems::memory::{MemoryConfig, MemoryStore, Role};

fn chat_with(memory: MemoryConfig) -> ChatService {
    let config = Config::test_default();
    let provider = providers::build(&config.llm, None).unwrap();
    ChatService::new(Arc::new(MemoryStore::new(memory)), provider, ChatPrompts::default())
}

#[tokio::test]
async fn test_history_accumulates_per_session() {
    let chat = chat_with(MemoryConfig::default());

    chat.respond("alice", "my name is Alice", PromptStyle::Messages).await.unwrap();
    chat.respond("bob", "my name is Bob", PromptStyle::Messages).await.unwrap();
    chat.respond("alice", "what is my name?", PromptStyle::Messages).await.unwrap();

    let alice = chat.memory().render("alice").unwrap();
    let roles: Vec<Role> = alice.iter().map(|t| t.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User, Role::Assistant]);
    assert_eq!(alice[2].content, "what is my name?");

    assert_eq!(
        chat.memory().render_text("bob").unwrap(),
        "user: my name is Bob\nassistant: [echo] my name is Bob"
    );
    assert_eq!(chat.memory().session_ids(), vec!["alice", "bob"]);
}

#[tokio::test]
async fn test_max_turns_caps_history() {
    let chat = chat_with(MemoryConfig { max_turns: Some(4), session_ttl: None });

    for i in 0..5 {
        chat.respond("s", &format!("msg {i}"), PromptStyle::Messages).await.unwrap();
    }

    let turns = chat.memory().render("s").unwrap();
    assert_eq!(turns.len(), 4);
    assert_eq!(turns[0].content, "msg 3");
    assert_eq!(turns[3].content, "[echo] msg 4");
}

#[tokio::test]
async fn test_concurrent_sessions_stay_isolated() {
    let chat = Arc::new(chat_with(MemoryConfig::default()));

    let mut tasks = tokio::task::JoinSet::new();
    for s in 0..8 {
        let chat = chat.clone();
        tasks.spawn(async move {
            let session = format!("s{s}");
            for i in 0..10 {
                chat.respond(&session, &format!("{s}-{i}"), PromptStyle::Messages).await.unwrap();
            }
        });
    }
    while let Some(res) = tasks.join_next().await {
        res.unwrap();
    }

    for s in 0..8 {
        let turns = chat.memory().render(&format!("s{s}")).unwrap();
        assert_eq!(turns.len(), 20);
        for (i, pair) in turns.chunks(2).enumerate() {
            assert_eq!(pair[0].content, format!("{s}-{i}"));
            assert_eq!(pair[1].content, format!("[echo] {s}-{i}"));
        }
    }
}

#[tokio::test]
async fn test_idle_sessions_are_evicted() {
    let chat = chat_with(MemoryConfig::default());
    chat.respond("old", "hi", PromptStyle::Messages).await.unwrap();

    tokio::time::sleep(Duration::from_millis(60)).await;
    chat.respond("fresh", "hi", PromptStyle::Messages).await.unwrap();

    assert_eq!(chat.memory().evict_idle(Duration::from_millis(40)), 1);
    assert_eq!(chat.memory().session_ids(), vec!["fresh"]);
    assert!(chat.memory().render("old").unwrap().is_empty());
}
