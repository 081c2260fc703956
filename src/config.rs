//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` (or the path given with `-f`), then applies
//! `PARLEY_LOG_LEVEL` and `MODEL_NAME` env overrides. The LLM API key comes
//! from `LLM_API_KEY`, falling back to `GOOGLE_API_KEY`; it is never read
//! from TOML.

use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::error::AppError;
use crate::logger;

/// PTY (console) channel configuration.
#[derive(Debug, Clone)]
pub struct PtyConfig {
    /// Whether the PTY channel is explicitly enabled.
    pub enabled: bool,
    /// Session every console line is recorded under.
    pub session_id: String,
}

/// HTTP channel configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub enabled: bool,
    /// Socket address to bind the HTTP channel to.
    pub bind: String,
    /// Upper bound on one `/chat` round-trip, model call included.
    pub request_timeout: Duration,
}

/// Comms subsystem configuration.
#[derive(Debug, Clone)]
pub struct CommsConfig {
    pub pty: PtyConfig,
    pub http: HttpConfig,
}

/// Connection settings shared by every hosted provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL (Gemini) or full chat completions endpoint (OpenAI).
    pub api_base_url: String,
    pub model: String,
    pub temperature: f32,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
}

/// LLM subsystem configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Active provider: `"dummy"`, `"gemini"`, `"openai"`.
    /// Maps to `default` in `[llm]`.
    pub provider: String,
    pub gemini: ProviderConfig,
    pub openai: ProviderConfig,
}

impl LlmConfig {
    /// Model name of the active provider, for logging.
    pub fn active_model(&self) -> &str {
        match self.provider.as_str() {
            "gemini" => &self.gemini.model,
            "openai" | "openai-compatible" => &self.openai.model,
            _ => "-",
        }
    }
}

/// Conversation memory configuration.
#[derive(Debug, Clone, Default)]
pub struct MemorySettings {
    /// Oldest turns are dropped once a session holds more than this.
    pub max_turns: Option<usize>,
    /// Sessions idle for longer than this are evicted by the janitor.
    pub session_ttl: Option<Duration>,
}

/// Retrieval-augmented answering configuration.
#[derive(Debug, Clone)]
pub struct RagConfig {
    pub enabled: bool,
    /// Directory of `.txt` / `.md` files; the built-in sample corpus is used
    /// when unset.
    pub documents_dir: Option<PathBuf>,
    pub top_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_name: String,
    pub log_level: String,
    /// Directory holding prompt templates (`system.md`, `rag_qa.txt`).
    pub prompts_dir: PathBuf,
    pub comms: CommsConfig,
    pub llm: LlmConfig,
    /// API key from `LLM_API_KEY` / `GOOGLE_API_KEY`; `None` for keyless
    /// local models and the dummy provider.
    pub llm_api_key: Option<String>,
    pub memory: MemorySettings,
    pub rag: RagConfig,
}

impl Config {
    pub fn comms_pty_should_load(&self) -> bool {
        self.comms.pty.enabled
    }

    pub fn comms_http_should_load(&self) -> bool {
        self.comms.http.enabled
    }
}

/// Raw TOML shape — `serde` target before resolution.
#[derive(Deserialize)]
struct RawConfig {
    bot: RawBot,
    #[serde(default)]
    comms: RawComms,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    memory: RawMemory,
    #[serde(default)]
    rag: RawRag,
}

#[derive(Deserialize)]
struct RawBot {
    bot_name: String,
    log_level: String,
    #[serde(default = "default_prompts_dir")]
    prompts_dir: String,
}

#[derive(Deserialize, Default)]
struct RawComms {
    #[serde(default)]
    pty: RawPty,
    #[serde(default)]
    http: RawHttp,
}

#[derive(Deserialize)]
struct RawPty {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_pty_session")]
    session_id: String,
}

#[derive(Deserialize)]
struct RawHttp {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_http_bind")]
    bind: String,
    #[serde(default = "default_http_timeout_seconds")]
    request_timeout_seconds: u64,
}

#[derive(Deserialize)]
struct RawLlm {
    #[serde(rename = "default", default = "default_llm_provider")]
    provider: String,
    #[serde(default)]
    gemini: RawProvider,
    #[serde(default)]
    openai: RawProvider,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            gemini: RawProvider::default(),
            openai: RawProvider::default(),
        }
    }
}

/// Every field is optional so a partial `[llm.gemini]` table keeps the
/// provider-specific defaults for what it leaves out.
#[derive(Deserialize, Default)]
struct RawProvider {
    api_base_url: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    timeout_seconds: Option<u64>,
}

impl RawProvider {
    fn resolve(self, defaults: ProviderConfig) -> ProviderConfig {
        ProviderConfig {
            api_base_url: self.api_base_url.unwrap_or(defaults.api_base_url),
            model: self.model.unwrap_or(defaults.model),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            timeout_seconds: self.timeout_seconds.unwrap_or(defaults.timeout_seconds),
        }
    }
}

fn gemini_defaults() -> ProviderConfig {
    ProviderConfig {
        api_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        model: "gemini-2.5-flash".to_string(),
        temperature: 0.2,
        timeout_seconds: 60,
    }
}

fn openai_defaults() -> ProviderConfig {
    ProviderConfig {
        api_base_url: "https://api.openai.com/v1/chat/completions".to_string(),
        model: "gpt-4o-mini".to_string(),
        temperature: 0.2,
        timeout_seconds: 60,
    }
}

#[derive(Deserialize, Default)]
struct RawMemory {
    max_turns: Option<usize>,
    session_ttl_seconds: Option<u64>,
}

#[derive(Deserialize)]
struct RawRag {
    #[serde(default = "default_false")]
    enabled: bool,
    documents_dir: Option<String>,
    #[serde(default = "default_top_k")]
    top_k: usize,
    #[serde(default = "default_chunk_size")]
    chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    chunk_overlap: usize,
}

impl Default for RawRag {
    fn default() -> Self {
        Self {
            enabled: false,
            documents_dir: None,
            top_k: default_top_k(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl Default for RawPty {
    fn default() -> Self {
        Self { enabled: true, session_id: default_pty_session() }
    }
}

impl Default for RawHttp {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_http_bind(),
            request_timeout_seconds: default_http_timeout_seconds(),
        }
    }
}

fn default_llm_provider() -> String { "dummy".to_string() }
fn default_prompts_dir() -> String { "config/prompts".to_string() }
fn default_pty_session() -> String { "cli".to_string() }
fn default_http_bind() -> String { "127.0.0.1:8000".to_string() }
fn default_http_timeout_seconds() -> u64 { 120 }
fn default_top_k() -> usize { 3 }
fn default_chunk_size() -> usize { 1000 }
fn default_chunk_overlap() -> usize { 200 }

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

/// Values taken from the process environment.
///
/// Kept separate so tests pass overrides directly instead of mutating env vars.
#[derive(Debug, Default, Clone)]
pub struct EnvOverrides {
    pub log_level: Option<String>,
    pub model_name: Option<String>,
    pub api_key: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            log_level: env::var("PARLEY_LOG_LEVEL").ok(),
            model_name: env::var("MODEL_NAME").ok().filter(|m| !m.trim().is_empty()),
            api_key: env::var("LLM_API_KEY")
                .or_else(|_| env::var("GOOGLE_API_KEY"))
                .ok()
                .filter(|k| !k.trim().is_empty()),
        }
    }
}

/// Load config from `path` (default `config/default.toml`), then apply
/// env-var overrides.
pub fn load(path: Option<&str>) -> Result<Config, AppError> {
    let path = Path::new(path.unwrap_or("config/default.toml"));
    load_from(path, EnvOverrides::from_env())
}

/// Internal loader: accepts an explicit path and overrides.
pub fn load_from(path: &Path, overrides: EnvOverrides) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
    parse(&raw, overrides)
        .map_err(|e| match e {
            AppError::Config(msg) => AppError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
}

fn parse(raw: &str, overrides: EnvOverrides) -> Result<Config, AppError> {
    let parsed: RawConfig = toml::from_str(raw)
        .map_err(|e| AppError::Config(format!("parse error: {e}")))?;

    let b = parsed.bot;
    let log_level = overrides.log_level.unwrap_or(b.log_level);
    logger::parse_level(&log_level).map_err(|e| AppError::Config(e.to_string()))?;

    let mut llm = LlmConfig {
        provider: parsed.llm.provider,
        gemini: parsed.llm.gemini.resolve(gemini_defaults()),
        openai: parsed.llm.openai.resolve(openai_defaults()),
    };
    if let Some(model) = overrides.model_name {
        match llm.provider.as_str() {
            "gemini" => llm.gemini.model = model,
            "openai" | "openai-compatible" => llm.openai.model = model,
            _ => {}
        }
    }
    if llm.provider == "gemini" && overrides.api_key.is_none() {
        return Err(AppError::Config(
            "provider 'gemini' needs an API key: set LLM_API_KEY or GOOGLE_API_KEY".into(),
        ));
    }

    let rag = parsed.rag;
    if rag.enabled {
        if rag.chunk_size == 0 || rag.top_k == 0 {
            return Err(AppError::Config("[rag] chunk_size and top_k must be > 0".into()));
        }
        if rag.chunk_overlap >= rag.chunk_size {
            return Err(AppError::Config(format!(
                "[rag] chunk_overlap ({}) must be smaller than chunk_size ({})",
                rag.chunk_overlap, rag.chunk_size
            )));
        }
    }

    Ok(Config {
        bot_name: b.bot_name,
        log_level,
        prompts_dir: expand_home(&b.prompts_dir),
        comms: CommsConfig {
            pty: PtyConfig {
                enabled: parsed.comms.pty.enabled,
                session_id: parsed.comms.pty.session_id,
            },
            http: HttpConfig {
                enabled: parsed.comms.http.enabled,
                bind: parsed.comms.http.bind,
                request_timeout: Duration::from_secs(parsed.comms.http.request_timeout_seconds),
            },
        },
        llm,
        llm_api_key: overrides.api_key,
        memory: MemorySettings {
            max_turns: parsed.memory.max_turns.filter(|&n| n > 0),
            session_ttl: parsed.memory.session_ttl_seconds.filter(|&s| s > 0).map(Duration::from_secs),
        },
        rag: RagConfig {
            enabled: rag.enabled,
            documents_dir: rag.documents_dir.as_deref().map(expand_home),
            top_k: rag.top_k,
            chunk_size: rag.chunk_size,
            chunk_overlap: rag.chunk_overlap,
        },
    })
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// Safe `Config` for tests: dummy LLM and every channel disabled.
impl Config {
    pub fn test_default() -> Self {
        Self {
            bot_name: "test".into(),
            log_level: "info".into(),
            prompts_dir: PathBuf::from("/nonexistent/prompts"),
            comms: CommsConfig {
                pty: PtyConfig { enabled: false, session_id: default_pty_session() },
                http: HttpConfig {
                    enabled: false,
                    bind: "127.0.0.1:0".into(),
                    request_timeout: Duration::from_secs(5),
                },
            },
            llm: LlmConfig {
                provider: "dummy".into(),
                gemini: gemini_defaults(),
                openai: openai_defaults(),
            },
            llm_api_key: None,
            memory: MemorySettings::default(),
            rag: RagConfig {
                enabled: false,
                documents_dir: None,
                top_k: default_top_k(),
                chunk_size: default_chunk_size(),
                chunk_overlap: default_chunk_overlap(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL_TOML: &str = r#"
[bot]
bot_name = "test-bot"
log_level = "info"
"#;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn parse_basic_config() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), EnvOverrides::default()).unwrap();
        assert_eq!(cfg.bot_name, "test-bot");
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.llm.provider, "dummy");
        assert_eq!(cfg.comms.http.bind, "127.0.0.1:8000");
        assert_eq!(cfg.comms.pty.session_id, "cli");
        assert!(cfg.memory.max_turns.is_none());
        assert!(!cfg.rag.enabled);
        assert_eq!(cfg.rag.chunk_size, 1000);
        assert_eq!(cfg.rag.chunk_overlap, 200);
    }

    #[test]
    fn gemini_defaults_survive_partial_table() {
        let toml = r#"
[bot]
bot_name = "b"
log_level = "info"

[llm]
default = "gemini"

[llm.gemini]
temperature = 0.7
"#;
        let f = write_toml(toml);
        let overrides = EnvOverrides { api_key: Some("k".into()), ..Default::default() };
        let cfg = load_from(f.path(), overrides).unwrap();
        assert_eq!(cfg.llm.gemini.model, "gemini-2.5-flash");
        assert_eq!(cfg.llm.gemini.temperature, 0.7);
        assert_eq!(cfg.llm.gemini.timeout_seconds, 60);
        assert_eq!(cfg.llm_api_key.as_deref(), Some("k"));
    }

    #[test]
    fn gemini_without_key_is_rejected() {
        let toml = "[bot]\nbot_name = \"b\"\nlog_level = \"info\"\n[llm]\ndefault = \"gemini\"\n";
        let f = write_toml(toml);
        let err = load_from(f.path(), EnvOverrides::default()).unwrap_err();
        assert!(err.to_string().contains("GOOGLE_API_KEY"));
    }

    #[test]
    fn model_name_overrides_active_provider_only() {
        let toml = "[bot]\nbot_name = \"b\"\nlog_level = \"info\"\n[llm]\ndefault = \"openai\"\n";
        let f = write_toml(toml);
        let overrides = EnvOverrides { model_name: Some("local-llama".into()), ..Default::default() };
        let cfg = load_from(f.path(), overrides).unwrap();
        assert_eq!(cfg.llm.openai.model, "local-llama");
        assert_eq!(cfg.llm.gemini.model, "gemini-2.5-flash");
        assert_eq!(cfg.llm.active_model(), "local-llama");
    }

    #[test]
    fn memory_section_parses() {
        let toml = r#"
[bot]
bot_name = "b"
log_level = "info"

[memory]
max_turns = 40
session_ttl_seconds = 900
"#;
        let f = write_toml(toml);
        let cfg = load_from(f.path(), EnvOverrides::default()).unwrap();
        assert_eq!(cfg.memory.max_turns, Some(40));
        assert_eq!(cfg.memory.session_ttl, Some(Duration::from_secs(900)));
    }

    #[test]
    fn zero_caps_mean_unbounded() {
        let toml = "[bot]\nbot_name = \"b\"\nlog_level = \"info\"\n[memory]\nmax_turns = 0\nsession_ttl_seconds = 0\n";
        let f = write_toml(toml);
        let cfg = load_from(f.path(), EnvOverrides::default()).unwrap();
        assert!(cfg.memory.max_turns.is_none());
        assert!(cfg.memory.session_ttl.is_none());
    }

    #[test]
    fn rag_overlap_must_be_smaller_than_chunk() {
        let toml = r#"
[bot]
bot_name = "b"
log_level = "info"

[rag]
enabled = true
chunk_size = 100
chunk_overlap = 100
"#;
        let f = write_toml(toml);
        let err = load_from(f.path(), EnvOverrides::default()).unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn invalid_log_level_is_config_error() {
        let toml = "[bot]\nbot_name = \"b\"\nlog_level = \"loud\"\n";
        let f = write_toml(toml);
        let err = load_from(f.path(), EnvOverrides::default()).unwrap_err();
        assert!(err.to_string().contains("config error"));
    }

    #[test]
    fn tilde_expands_to_home() {
        let home = dirs::home_dir().expect("home dir must exist in test env");
        let expanded = expand_home("~/docs");
        assert!(expanded.starts_with(&home));
        assert!(expanded.ends_with("docs"));
    }

    #[test]
    fn relative_path_unchanged() {
        assert_eq!(expand_home("relative/path"), PathBuf::from("relative/path"));
        assert_eq!(expand_home("/absolute/path"), PathBuf::from("/absolute/path"));
    }

    #[test]
    fn missing_file_errors() {
        let result = load_from(Path::new("/nonexistent/config.toml"), EnvOverrides::default());
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("config error"));
    }

    #[test]
    fn env_log_level_override() {
        let f = write_toml(MINIMAL_TOML);
        let overrides = EnvOverrides { log_level: Some("debug".into()), ..Default::default() };
        let cfg = load_from(f.path(), overrides).unwrap();
        assert_eq!(cfg.log_level, "debug");
    }
}
