//! Parley Bot — entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve effective log level (CLI `-v` flags > RUST_LOG > config)
//!   4. Init logger once
//!   5. Build memory store, LLM provider, prompts and (optionally) the
//!      retrieval index
//!   6. Spawn Ctrl-C → shutdown signal watcher
//!   7. Run comms subsystem until shutdown or every channel exits

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use parley_bot::config::{self, Config};
use parley_bot::error::AppError;
use parley_bot::llm::providers;
use parley_bot::logger::{self, LogLevel};
use parley_bot::subsystems::chat::{ChatPrompts, ChatService};
use parley_bot::subsystems::comms;
use parley_bot::subsystems::memory::{MemoryConfig, MemoryStore};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present; ignore errors (file is optional).
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let mut config = config::load(args.config_path.as_deref())?;

    // Without -i, no stdio channel is active (daemon-safe default).
    if !args.interactive {
        config.comms.pty.enabled = false;
    }

    let log_level = LogLevel::from_env(args.log_level, &config.log_level);
    logger::init(&log_level)?;

    info!(
        bot_name = %config.bot_name,
        provider = %config.llm.provider,
        model = %config.llm.active_model(),
        configured_log_level = %config.log_level,
        effective_log_level = %log_level.directive(),
        log_level_source = ?log_level.source(),
        interactive = %args.interactive,
        "config loaded"
    );

    if !config.comms_pty_should_load() && !config.comms_http_should_load() {
        warn!("no channel enabled: pass -i for the console or set [comms.http] enabled = true");
    }

    let chat = Arc::new(build_chat(&config)?);

    // Shared shutdown token: Ctrl-C cancels it and all components watch it.
    let shutdown = CancellationToken::new();
    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    let handle = comms::start(&config, chat, shutdown.clone());
    info!(components = ?handle.component_ids(), "runtime started");
    let result = handle.join().await;

    // Stop anything still watching the token (e.g. the janitor after the
    // console exits on EOF).
    shutdown.cancel();
    info!("shutdown complete");
    result
}

fn build_chat(config: &Config) -> Result<ChatService, AppError> {
    let memory = Arc::new(MemoryStore::new(MemoryConfig::from(&config.memory)));

    let provider = providers::build(&config.llm, config.llm_api_key.clone())
        .map_err(|e| AppError::Llm(e.to_string()))?;

    let prompts = ChatPrompts::load(&config.prompts_dir);
    info!(
        prompts_dir = %config.prompts_dir.display(),
        system_prompt = prompts.system.is_some(),
        "prompts loaded"
    );

    let chat = ChatService::new(memory, provider, prompts);

    #[cfg(feature = "subsystem-rag")]
    let chat = if config.rag.enabled {
        use parley_bot::subsystems::retrieval::{KeywordIndex, load_documents, sample_documents};

        let documents = match &config.rag.documents_dir {
            Some(dir) => load_documents(dir).map_err(|e| AppError::Retrieval(e.to_string()))?,
            None => {
                info!("no [rag] documents_dir, indexing the built-in sample corpus");
                sample_documents()
            }
        };
        let index = KeywordIndex::build(&documents, config.rag.chunk_size, config.rag.chunk_overlap)
            .map_err(|e| AppError::Retrieval(e.to_string()))?;
        chat.with_retriever(Arc::new(index), config.rag.top_k)
    } else {
        chat
    };

    #[cfg(not(feature = "subsystem-rag"))]
    if config.rag.enabled {
        warn!("[rag] enabled but this build has no subsystem-rag feature; answering without context");
    }

    Ok(chat)
}

struct CliArgs {
    log_level: Option<&'static str>,
    interactive: bool,
    config_path: Option<String>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut interactive = false;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: parley-bot [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -i, --interactive          Chat on the console (enables the PTY channel)");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "-i" | "--interactive" => interactive = true,
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    //   -v → warn, -vv → info, -vvv → debug, -vvvv+ → trace
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { log_level, interactive, config_path }
}
