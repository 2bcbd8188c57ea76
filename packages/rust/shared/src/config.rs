//! Application configuration for newsdigest.
//!
//! User config lives at `~/.newsdigest/newsdigest.toml`.
//! Precedence: CLI flags > environment > config file > defaults.
//!
//! Secrets never live in the file: each service section names the
//! environment variable holding its key. Environment access goes through a
//! caller-supplied lookup so library code never reads the process env.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{NewsDigestError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "newsdigest.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".newsdigest";

/// From address used when neither a sender nor an SMTP login is configured.
const DEFAULT_SENDER: &str = "newsletter@example.com";

/// Environment lookup used for overrides and secrets.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

// ---------------------------------------------------------------------------
// Config structs (matching newsdigest.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub exa: ExaConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub perplexity: PerplexityConfig,

    #[serde(default)]
    pub speech: SpeechConfig,

    #[serde(default)]
    pub email: EmailConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Topic used when none is given on the command line.
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Number of articles requested per webset.
    #[serde(default = "default_article_count")]
    pub article_count: u32,

    /// Directory receiving reports, backups, and audio.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            article_count: default_article_count(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_topic() -> String {
    "AI and Technology".into()
}
fn default_article_count() -> u32 {
    5
}
fn default_output_dir() -> String {
    "newsdigest-output".into()
}

/// `[exa]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExaConfig {
    /// Name of the env var holding the API key.
    #[serde(default = "default_exa_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_exa_base_url")]
    pub base_url: String,

    /// Base of the human-facing webset links printed in reports.
    #[serde(default = "default_dashboard_url")]
    pub dashboard_url: String,

    /// Domains the `analyze` and `answer` flows restrict themselves to.
    #[serde(default = "default_news_domains")]
    pub news_domains: Vec<String>,

    /// HTTP timeout for a single request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ExaConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_exa_key_env(),
            base_url: default_exa_base_url(),
            dashboard_url: default_dashboard_url(),
            news_domains: default_news_domains(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_exa_key_env() -> String {
    "EXA_API_KEY".into()
}
fn default_exa_base_url() -> String {
    "https://api.exa.ai".into()
}
fn default_dashboard_url() -> String {
    "https://websets.exa.ai".into()
}
fn default_news_domains() -> Vec<String> {
    [
        "techcrunch.com",
        "arstechnica.com",
        "theverge.com",
        "wired.com",
        "venturebeat.com",
        "technologyreview.com",
        "reuters.com",
        "bloomberg.com",
        "bbc.com",
        "cnbc.com",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_request_timeout() -> u64 {
    30
}

/// `[polling]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Fixed delay between status checks.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Wall-clock budget before the job is abandoned as incomplete.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Consecutive status-fetch failures tolerated before giving up.
    #[serde(default = "default_max_transient")]
    pub max_transient_errors: u32,

    /// Fraction of enrichments that must be complete to stop waiting.
    #[serde(default = "default_threshold")]
    pub enrichment_threshold: f64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            timeout_secs: default_timeout(),
            max_transient_errors: default_max_transient(),
            enrichment_threshold: default_threshold(),
        }
    }
}

fn default_interval() -> u64 {
    10
}
fn default_timeout() -> u64 {
    180
}
fn default_max_transient() -> u32 {
    3
}
fn default_threshold() -> f64 {
    0.8
}

/// `[retry]` section, applied to idempotent reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    #[serde(default = "default_retry_delay")]
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            delay_ms: default_retry_delay(),
        }
    }
}

fn default_attempts() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    2_000
}

/// `[perplexity]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerplexityConfig {
    #[serde(default = "default_pplx_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_pplx_url")]
    pub api_url: String,

    #[serde(default = "default_pplx_model")]
    pub model: String,

    #[serde(default = "default_pplx_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_pplx_temperature")]
    pub temperature: f32,
}

impl Default for PerplexityConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_pplx_key_env(),
            api_url: default_pplx_url(),
            model: default_pplx_model(),
            max_tokens: default_pplx_max_tokens(),
            temperature: default_pplx_temperature(),
        }
    }
}

fn default_pplx_key_env() -> String {
    "PERPLEXITY_API_KEY".into()
}
fn default_pplx_url() -> String {
    "https://api.perplexity.ai/chat/completions".into()
}
fn default_pplx_model() -> String {
    "sonar".into()
}
fn default_pplx_max_tokens() -> u32 {
    1_000
}
fn default_pplx_temperature() -> f32 {
    0.3
}

/// `[speech]` section (ElevenLabs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(default = "default_speech_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_speech_url")]
    pub base_url: String,

    #[serde(default = "default_voice_id")]
    pub voice_id: String,

    #[serde(default = "default_speech_model")]
    pub model_id: String,

    #[serde(default = "default_stability")]
    pub stability: f32,

    #[serde(default = "default_similarity")]
    pub similarity_boost: f32,

    /// Word budget of the spoken summary.
    #[serde(default = "default_max_words")]
    pub max_words: usize,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_speech_key_env(),
            base_url: default_speech_url(),
            voice_id: default_voice_id(),
            model_id: default_speech_model(),
            stability: default_stability(),
            similarity_boost: default_similarity(),
            max_words: default_max_words(),
        }
    }
}

fn default_speech_key_env() -> String {
    "ELEVENLABS_API_KEY".into()
}
fn default_speech_url() -> String {
    "https://api.elevenlabs.io".into()
}
fn default_voice_id() -> String {
    "pNInz6obpgDQGcFmaJgB".into()
}
fn default_speech_model() -> String {
    "eleven_monolingual_v1".into()
}
fn default_stability() -> f32 {
    0.5
}
fn default_similarity() -> f32 {
    0.8
}
fn default_max_words() -> usize {
    200
}

/// `[email]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub recipients: Vec<String>,

    /// From address. Unset means the SMTP login, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,

    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,

    /// Env var holding a Gmail API OAuth access token.
    #[serde(default = "default_gmail_token_env")]
    pub gmail_token_env: String,

    #[serde(default = "default_gmail_api_url")]
    pub gmail_api_url: String,

    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,

    #[serde(default = "default_smtp_user_env")]
    pub smtp_user_env: String,

    #[serde(default = "default_smtp_password_env")]
    pub smtp_password_env: String,

    /// Bodies longer than this are truncated before sending.
    #[serde(default = "default_max_body_chars")]
    pub max_body_chars: usize,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            recipients: Vec::new(),
            sender: None,
            subject_prefix: default_subject_prefix(),
            gmail_token_env: default_gmail_token_env(),
            gmail_api_url: default_gmail_api_url(),
            smtp_host: default_smtp_host(),
            smtp_user_env: default_smtp_user_env(),
            smtp_password_env: default_smtp_password_env(),
            max_body_chars: default_max_body_chars(),
        }
    }
}

impl EmailConfig {
    /// Configured sender, else the SMTP login, else a placeholder address.
    pub fn sender_address(&self, smtp_user: Option<&str>) -> String {
        let present = |s: &&str| !s.trim().is_empty();
        self.sender
            .as_deref()
            .filter(present)
            .or(smtp_user.filter(present))
            .unwrap_or(DEFAULT_SENDER)
            .to_string()
    }
}

fn default_subject_prefix() -> String {
    "AI Newsletter".into()
}
fn default_gmail_token_env() -> String {
    "GMAIL_ACCESS_TOKEN".into()
}
fn default_gmail_api_url() -> String {
    "https://gmail.googleapis.com/gmail/v1/users/me/messages/send".into()
}
fn default_smtp_host() -> String {
    "smtp.gmail.com".into()
}
fn default_smtp_user_env() -> String {
    "GMAIL_USER".into()
}
fn default_smtp_password_env() -> String {
    "GMAIL_APP_PASSWORD".into()
}
fn default_max_body_chars() -> usize {
    20_000
}

/// `[report]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Substitute sample items when a run yields nothing. Off by default.
    #[serde(default)]
    pub sample_fallback: bool,
}

// ---------------------------------------------------------------------------
// Environment overrides
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Apply the well-known environment overrides on top of file values.
    ///
    /// `NEWSLETTER_TOPIC`, `MAX_ARTICLES`, `ELEVENLABS_VOICE_ID`,
    /// `RECIPIENT_EMAILS` (comma separated) and `SENDER_EMAIL`.
    pub fn apply_env_overrides(&mut self, env: EnvLookup<'_>) -> Result<()> {
        if let Some(topic) = non_empty(env("NEWSLETTER_TOPIC")) {
            self.defaults.topic = topic;
        }
        if let Some(count) = non_empty(env("MAX_ARTICLES")) {
            self.defaults.article_count = count.parse().map_err(|_| {
                NewsDigestError::config(format!("MAX_ARTICLES must be a number, got '{count}'"))
            })?;
        }
        if let Some(voice) = non_empty(env("ELEVENLABS_VOICE_ID")) {
            self.speech.voice_id = voice;
        }
        if let Some(list) = non_empty(env("RECIPIENT_EMAILS")) {
            self.email.recipients = parse_recipients(&list);
        }
        if let Some(sender) = non_empty(env("SENDER_EMAIL")) {
            self.email.sender = Some(sender);
        }
        Ok(())
    }
}

/// Split a comma-separated address list, dropping blanks.
pub fn parse_recipients(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Resolve a required secret from the env var named in config.
pub fn require_secret(env: EnvLookup<'_>, var_name: &str, purpose: &str) -> Result<String> {
    non_empty(env(var_name)).ok_or_else(|| {
        NewsDigestError::config(format!(
            "{purpose} requires an API key. Set the {var_name} environment variable."
        ))
    })
}

/// Resolve an optional secret; blank values count as absent.
pub fn optional_secret(env: EnvLookup<'_>, var_name: &str) -> Option<String> {
    non_empty(env(var_name))
}

/// Mask a secret for display, keeping the last four characters.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{tail}", "*".repeat(chars.len() - 4))
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.newsdigest/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| NewsDigestError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.newsdigest/newsdigest.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Directory holding cached delivery credentials.
pub fn credentials_dir() -> Result<PathBuf> {
    Ok(config_dir()?.join("credentials"))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| NewsDigestError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        NewsDigestError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| NewsDigestError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| NewsDigestError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| NewsDigestError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
