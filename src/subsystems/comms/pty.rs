//! PTY (console) comms channel — reads lines from stdin, asks the chat
//! service, prints the reply to stdout.
//!
//! Every line goes into one session (`[comms.pty] session_id`, `cli` by
//! default). Runs until `exit` / `quit`, stdin is closed, or the `shutdown`
//! token is cancelled (Ctrl-C).

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::{CommsEvent, CommsState};
use crate::error::AppError;
use crate::subsystems::chat::PromptStyle;
use crate::subsystems::runtime::{Component, ComponentFuture};

const PROMPT: &str = "You: ";
const REPLY_PREFIX: &str = "Bot: ";

// ── PtyChannel ───────────────────────────────────────────────────────────────

pub struct PtyChannel {
    channel_id: String,
    session_id: String,
    state: Arc<CommsState>,
}

impl PtyChannel {
    pub fn new(channel_id: impl Into<String>, session_id: impl Into<String>, state: Arc<CommsState>) -> Self {
        Self {
            channel_id: channel_id.into(),
            session_id: session_id.into(),
            state,
        }
    }
}

impl Component for PtyChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(async move {
            info!(channel_id = %self.channel_id, session_id = %self.session_id, "pty channel started");
            let stdin = BufReader::new(tokio::io::stdin());
            let stdout = tokio::io::stdout();
            run_repl(&self.channel_id, &self.session_id, &self.state, stdin, stdout, shutdown).await
        })
    }
}

// ── run_repl ─────────────────────────────────────────────────────────────────

fn is_exit_command(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

/// Read-eval-print loop over any line source and sink.
pub(crate) async fn run_repl<R, W>(
    channel_id: &str,
    session_id: &str,
    state: &CommsState,
    reader: R,
    mut out: W,
    shutdown: CancellationToken,
) -> Result<(), AppError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();

    loop {
        out.write_all(PROMPT.as_bytes()).await?;
        out.flush().await?;

        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                out.write_all(b"\n").await?;
                info!("pty channel shutting down");
                break;
            }

            line = lines.next_line() => {
                let input = match line {
                    Err(e) => {
                        warn!("pty read error: {e}");
                        break;
                    }
                    Ok(None) => {
                        info!("pty stdin closed");
                        break;
                    }
                    Ok(Some(input)) => input,
                };

                let command = input.trim();
                if command.is_empty() {
                    continue;
                }
                if is_exit_command(command) {
                    debug!("pty exit command");
                    break;
                }

                debug!(input = %input, "pty received line");

                let reply = match state.send_message(channel_id, session_id, &input, PromptStyle::Messages).await {
                    Ok(reply) => reply,
                    Err(e) => {
                        warn!("pty chat error: {e}");
                        format!("[error] {e}")
                    }
                };
                out.write_all(format!("{REPLY_PREFIX}{reply}\n").as_bytes()).await?;
            }
        }
    }

    out.flush().await?;
    state.report_event(CommsEvent::ChannelShutdown { channel_id: channel_id.to_string() });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::llm::providers;
    use crate::subsystems::chat::{ChatPrompts, ChatService};
    use crate::subsystems::memory::{MemoryConfig, MemoryStore};
    use tokio::sync::mpsc;

    fn state() -> (CommsState, mpsc::Receiver<CommsEvent>) {
        let memory = Arc::new(MemoryStore::new(MemoryConfig::default()));
        let provider = providers::build(&Config::test_default().llm, None).unwrap();
        let chat = Arc::new(ChatService::new(memory, provider, ChatPrompts::default()));
        let (tx, rx) = mpsc::channel(8);
        (CommsState::new(chat, tx), rx)
    }

    async fn drive(state: &CommsState, input: &str) -> String {
        let mut out = Vec::new();
        run_repl("pty0", "cli", state, input.as_bytes(), &mut out, CancellationToken::new())
            .await
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn exit_commands_are_case_insensitive() {
        assert!(is_exit_command("exit"));
        assert!(is_exit_command("QUIT"));
        assert!(!is_exit_command("exit now"));
    }

    #[tokio::test]
    async fn replies_until_eof() {
        let (state, _rx) = state();
        let out = drive(&state, "hello\n\n  world  \n").await;
        assert_eq!(out, "You: Bot: [echo] hello\nYou: You: Bot: [echo]   world  \nYou: ");

        let history = state.session_history("cli").unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[2].content, "  world  ");
    }

    #[tokio::test]
    async fn padded_exit_command_still_stops() {
        let (state, _rx) = state();
        let out = drive(&state, "  exit \nnever\n").await;
        assert_eq!(out, "You: ");
        assert!(state.session_history("cli").is_none());
    }

    #[tokio::test]
    async fn quit_stops_before_remaining_lines() {
        let (state, mut rx) = state();
        let out = drive(&state, "one\nQuit\ntwo\n").await;
        assert_eq!(out, "You: Bot: [echo] one\nYou: ");
        assert_eq!(state.session_history("cli").unwrap().len(), 2);

        assert!(matches!(rx.try_recv(), Ok(CommsEvent::SessionStarted { .. })));
        assert!(matches!(rx.try_recv(), Ok(CommsEvent::ChannelShutdown { .. })));
    }

    #[tokio::test]
    async fn cancelled_token_ends_loop() {
        let (state, _rx) = state();
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let (reader, _writer) = tokio::io::duplex(64);
        let mut out = Vec::new();
        run_repl("pty0", "cli", &state, BufReader::new(reader), &mut out, shutdown)
            .await
            .unwrap();
        assert_eq!(out, b"You: \n");
        assert!(state.sessions().is_empty());
    }
}
