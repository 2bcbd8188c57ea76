//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use newsdigest_core::analysis::{Analyzer, PerplexityAnalyzer};
use newsdigest_core::monitor::{
    DEFAULT_CRON, DEFAULT_TIMEZONE, MonitorSettings, start_monitor, watch_new_items,
};
use newsdigest_core::pipeline::{
    EmailPlan, ProgressReporter, RunResult, RunSettings, Services, StepOutcome, run_analysis,
    run_answer, run_digest,
};
use newsdigest_core::poller::{PollBudget, TokioClock};
use newsdigest_delivery::{
    CredentialStore, ElevenLabsSynthesizer, EmailSender, FallbackSender, FileCredentialStore,
    GmailApiSender, SmtpSender, SpeechSynthesizer,
};
use newsdigest_shared::{
    AppConfig, EnvLookup, ResultItem, init_config, load_config, load_config_from, mask_secret,
    optional_secret, require_secret,
};
use newsdigest_websets::{ExaClient, ExaClientOptions, RetryPolicy};
use tracing::info;
use url::Url;

/// Timeout for speech synthesis and email calls.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Name of the cached Gmail token under the credentials directory.
const GMAIL_CREDENTIAL: &str = "gmail";

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// newsdigest: topic-driven news digests from Exa websets.
#[derive(Parser)]
#[command(
    name = "newsdigest",
    version,
    about = "Search recent news on a topic, write an enriched report, and optionally narrate and email it.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.newsdigest/newsdigest.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Clear cached delivery credentials before doing anything else.
    #[arg(long, global = true)]
    pub reset_auth: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Topic, size, and output location shared by the report commands.
#[derive(Args, Debug, Default)]
pub(crate) struct TargetArgs {
    /// Topic to search for (defaults to the configured topic).
    #[arg(value_name = "TOPIC")]
    pub topic_arg: Option<String>,

    /// Topic to search for; same as the positional argument.
    #[arg(long = "topic", conflicts_with = "topic_arg")]
    pub topic: Option<String>,

    /// Number of articles to request.
    #[arg(short = 'n', long)]
    pub count: Option<u32>,

    /// Output directory for reports and audio.
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Build an enriched newsletter from a fresh webset.
    Digest {
        #[command(flatten)]
        target: TargetArgs,

        /// Narrate a short summary to MP3.
        #[arg(long)]
        audio: bool,

        /// Email the report to the configured recipients.
        #[arg(long)]
        email: bool,

        /// Also write an HTML copy of the report.
        #[arg(long)]
        html: bool,
    },

    /// Search trusted news domains and add an AI trend analysis.
    Analyze {
        #[command(flatten)]
        target: TargetArgs,

        #[arg(long)]
        audio: bool,

        #[arg(long)]
        email: bool,

        #[arg(long)]
        html: bool,
    },

    /// Write a newsletter from a single cited answer.
    Answer {
        #[command(flatten)]
        target: TargetArgs,

        /// Only write local files.
        #[arg(long, conflicts_with_all = ["email", "email_with_audio"])]
        content_only: bool,

        /// Email the newsletter.
        #[arg(long, conflicts_with = "email_with_audio")]
        email: bool,

        /// Email the newsletter with a narrated summary attached.
        #[arg(long)]
        email_with_audio: bool,

        #[arg(long)]
        html: bool,
    },

    /// Create a webset with a recurring monitor and print new results.
    Monitor {
        #[command(flatten)]
        target: TargetArgs,

        /// Cron expression for the monitor schedule.
        #[arg(long, default_value = DEFAULT_CRON)]
        cron: String,

        /// IANA timezone for the cron schedule.
        #[arg(long, default_value = DEFAULT_TIMEZONE)]
        timezone: String,

        /// Seconds between checks for new results.
        #[arg(long, default_value = "30")]
        interval: u64,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "warn,newsdigest=info",
        1 => "warn,newsdigest=debug",
        _ => "info,newsdigest=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// What a report command should deliver besides local files.
#[derive(Debug, Clone, Copy, Default)]
struct DeliveryFlags {
    audio: bool,
    email: bool,
    html: bool,
}

/// Which report flow to run.
#[derive(Debug, Clone, Copy)]
enum Flow {
    Digest,
    Analyze,
    Answer,
}

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    if cli.reset_auth {
        cmd_reset_auth()?;
    }

    let Some(command) = cli.command else {
        if cli.reset_auth {
            return Ok(());
        }
        return Err(eyre!("no command given; run `newsdigest --help` for usage"));
    };

    let env = |name: &str| std::env::var(name).ok();

    match command {
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(cli.config.as_deref(), &env).await,
        },
        Command::Digest {
            target,
            audio,
            email,
            html,
        } => {
            let config = resolve_config(cli.config.as_deref(), &env)?;
            let flags = DeliveryFlags { audio, email, html };
            cmd_report(Flow::Digest, &config, &env, &target, flags).await
        }
        Command::Analyze {
            target,
            audio,
            email,
            html,
        } => {
            let config = resolve_config(cli.config.as_deref(), &env)?;
            let flags = DeliveryFlags { audio, email, html };
            cmd_report(Flow::Analyze, &config, &env, &target, flags).await
        }
        Command::Answer {
            target,
            content_only,
            email,
            email_with_audio,
            html,
        } => {
            let config = resolve_config(cli.config.as_deref(), &env)?;
            let flags = answer_flags(content_only, email, email_with_audio, html);
            cmd_report(Flow::Answer, &config, &env, &target, flags).await
        }
        Command::Monitor {
            target,
            cron,
            timezone,
            interval,
        } => {
            let config = resolve_config(cli.config.as_deref(), &env)?;
            cmd_monitor(&config, &env, &target, cron, timezone, interval).await
        }
    }
}

fn answer_flags(content_only: bool, email: bool, email_with_audio: bool, html: bool) -> DeliveryFlags {
    if content_only {
        return DeliveryFlags {
            html,
            ..DeliveryFlags::default()
        };
    }
    DeliveryFlags {
        audio: email_with_audio,
        email: email || email_with_audio,
        html,
    }
}

// ---------------------------------------------------------------------------
// Config resolution
// ---------------------------------------------------------------------------

/// File (or defaults) → environment overrides, then sanity checks.
fn resolve_config(path: Option<&Path>, env: EnvLookup<'_>) -> Result<AppConfig> {
    let mut config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    config.apply_env_overrides(env)?;
    validate_endpoints(&config)?;
    if config.defaults.article_count == 0 {
        return Err(eyre!("article count must be at least 1"));
    }
    Ok(config)
}

fn validate_endpoints(config: &AppConfig) -> Result<()> {
    let endpoints = [
        ("exa.base_url", &config.exa.base_url),
        ("exa.dashboard_url", &config.exa.dashboard_url),
        ("perplexity.api_url", &config.perplexity.api_url),
        ("speech.base_url", &config.speech.base_url),
        ("email.gmail_api_url", &config.email.gmail_api_url),
    ];
    for (key, value) in endpoints {
        Url::parse(value).map_err(|e| eyre!("invalid URL for {key} '{value}': {e}"))?;
    }
    Ok(())
}

fn resolve_topic(target: &TargetArgs, config: &AppConfig) -> String {
    target
        .topic
        .clone()
        .or_else(|| target.topic_arg.clone())
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| config.defaults.topic.clone())
}

fn exa_client(config: &AppConfig, env: EnvLookup<'_>) -> Result<ExaClient> {
    let api_key = require_secret(env, &config.exa.api_key_env, "Exa search")?;
    let client = ExaClient::new(ExaClientOptions {
        base_url: config.exa.base_url.clone(),
        api_key,
        timeout: Duration::from_secs(config.exa.request_timeout_secs),
        retry: RetryPolicy::from(&config.retry),
    })?;
    Ok(client)
}

fn speech_synthesizer(config: &AppConfig, env: EnvLookup<'_>) -> Result<ElevenLabsSynthesizer> {
    let api_key = require_secret(env, &config.speech.api_key_env, "Audio narration")?;
    Ok(ElevenLabsSynthesizer::new(&config.speech, api_key, DELIVERY_TIMEOUT)?)
}

/// Gmail API first when a token is available, SMTP second.
fn email_sender(config: &AppConfig, env: EnvLookup<'_>) -> Result<FallbackSender> {
    if config.email.recipients.is_empty() {
        return Err(eyre!(
            "email delivery needs recipients: set RECIPIENT_EMAILS or [email] recipients"
        ));
    }

    let mut senders: Vec<Box<dyn EmailSender>> = Vec::new();

    let store = FileCredentialStore::named(GMAIL_CREDENTIAL)?;
    if let Some(token) = optional_secret(env, &config.email.gmail_token_env) {
        store.save(&token)?;
    }
    if store.load()?.is_some() {
        let store: Arc<dyn CredentialStore> = Arc::new(store);
        senders.push(Box::new(GmailApiSender::new(
            config.email.gmail_api_url.clone(),
            store,
            DELIVERY_TIMEOUT,
        )?));
    }

    let user = optional_secret(env, &config.email.smtp_user_env);
    let password = optional_secret(env, &config.email.smtp_password_env);
    if let (Some(user), Some(password)) = (user, password) {
        senders.push(Box::new(SmtpSender::new(
            &config.email.smtp_host,
            &user,
            &password,
            DELIVERY_TIMEOUT,
        )?));
    }

    let sender = FallbackSender::new(senders);
    if sender.is_empty() {
        return Err(eyre!(
            "email delivery needs credentials: set {} or both {} and {}",
            config.email.gmail_token_env,
            config.email.smtp_user_env,
            config.email.smtp_password_env
        ));
    }
    Ok(sender)
}

fn run_settings(
    config: &AppConfig,
    env: EnvLookup<'_>,
    target: &TargetArgs,
    flags: DeliveryFlags,
) -> RunSettings {
    let email = flags.email.then(|| EmailPlan {
        from: config
            .email
            .sender_address(optional_secret(env, &config.email.smtp_user_env).as_deref()),
        to: config.email.recipients.clone(),
        subject_prefix: config.email.subject_prefix.clone(),
        max_body_chars: config.email.max_body_chars,
    });
    RunSettings {
        topic: resolve_topic(target, config),
        count: target.count.unwrap_or(config.defaults.article_count),
        output_dir: target
            .out
            .clone()
            .unwrap_or_else(|| PathBuf::from(&config.defaults.output_dir)),
        dashboard_url: config.exa.dashboard_url.clone(),
        news_domains: config.exa.news_domains.clone(),
        budget: PollBudget::from(&config.polling),
        sample_fallback: config.report.sample_fallback,
        html: flags.html,
        audio: flags.audio,
        max_speech_words: config.speech.max_words,
        email,
        generated_at: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_report(
    flow: Flow,
    config: &AppConfig,
    env: EnvLookup<'_>,
    target: &TargetArgs,
    flags: DeliveryFlags,
) -> Result<()> {
    // Every credential is resolved before the first network call.
    let client = exa_client(config, env)?;
    let speech = if flags.audio {
        Some(speech_synthesizer(config, env)?)
    } else {
        None
    };
    let email = if flags.email {
        Some(email_sender(config, env)?)
    } else {
        None
    };
    let analyzer = match flow {
        Flow::Analyze => match optional_secret(env, &config.perplexity.api_key_env) {
            Some(key) => Some(PerplexityAnalyzer::new(
                &config.perplexity,
                key,
                DELIVERY_TIMEOUT,
            )?),
            None => {
                tracing::warn!(
                    var = %config.perplexity.api_key_env,
                    "no analysis API key set, the report will skip the AI analysis"
                );
                None
            }
        },
        _ => None,
    };

    let settings = run_settings(config, env, target, flags);
    info!(topic = %settings.topic, count = settings.count, ?flow, "starting run");

    let clock = TokioClock::start();
    let services = Services {
        clock: &clock,
        analyzer: analyzer.as_ref().map(|a| a as &dyn Analyzer),
        speech: speech.as_ref().map(|s| s as &dyn SpeechSynthesizer),
        email: email.as_ref().map(|e| e as &dyn EmailSender),
    };

    let reporter = CliProgress::new();
    let result = match flow {
        Flow::Digest => run_digest(&settings, &client, &services, &reporter).await,
        Flow::Analyze => run_analysis(&settings, &client, &services, &reporter).await,
        Flow::Answer => run_answer(&settings, &client, &services, &reporter).await,
    };
    reporter.spinner.finish_and_clear();
    let result = result?;

    print_summary(&settings.topic, &result);

    if let StepOutcome::Failed(reason) = &result.email {
        return Err(eyre!("email delivery failed: {reason}"));
    }
    Ok(())
}

fn print_summary(topic: &str, result: &RunResult) {
    println!();
    println!("  Report written!");
    println!("  Topic:    {topic}");
    println!("  Articles: {}", result.item_count);
    println!(
        "  Status:   {}{}",
        if result.complete { "complete" } else { "incomplete" },
        if result.fallback { " (sample content)" } else { "" }
    );
    println!("  Report:   {}", result.report_path.display());
    println!("  Backup:   {}", result.backup_path.display());
    if let Some(path) = &result.html_path {
        println!("  HTML:     {}", path.display());
    }
    if let Some(url) = &result.job_url {
        println!("  Webset:   {url}");
    }
    print_step("Audio", &result.audio);
    print_step("Email", &result.email);
    if let Some(path) = &result.sent_body_path {
        println!("  Sent:     {} (truncated body)", path.display());
    }
    println!("  Time:     {:.1}s", result.elapsed.as_secs_f64());
    println!();
}

fn print_step(label: &str, outcome: &StepOutcome) {
    match outcome {
        StepOutcome::Skipped => {}
        StepOutcome::Done(detail) => println!("  {label:<9} {detail}"),
        StepOutcome::Failed(reason) => println!("  {label:<9} FAILED: {reason}"),
    }
}

async fn cmd_monitor(
    config: &AppConfig,
    env: EnvLookup<'_>,
    target: &TargetArgs,
    cron: String,
    timezone: String,
    interval: u64,
) -> Result<()> {
    if interval == 0 {
        return Err(eyre!("--interval must be at least 1 second"));
    }
    let client = exa_client(config, env)?;
    let settings = MonitorSettings {
        topic: resolve_topic(target, config),
        count: target.count.unwrap_or(config.defaults.article_count),
        cron,
        timezone,
        dashboard_url: config.exa.dashboard_url.clone(),
    };

    let session = start_monitor(&settings, &client).await?;
    println!();
    println!("  Monitor scheduled!");
    println!("  Topic:    {}", settings.topic);
    println!("  Webset:   {}", session.dashboard_url);
    println!("  Monitor:  {}", session.monitor.id);
    println!("  Schedule: {} ({})", settings.cron, settings.timezone);
    println!();
    println!("  Watching for new results every {interval}s. Press Ctrl-C to stop.");
    println!();

    let clock = TokioClock::start();
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    let total = watch_new_items(
        &session.webset,
        &client,
        &clock,
        Duration::from_secs(interval),
        None,
        shutdown,
        &mut |items: &[ResultItem]| {
            for item in items {
                println!("  + {}", item.title.as_deref().unwrap_or("(untitled)"));
                println!("    {}", item.url);
            }
        },
    )
    .await?;

    println!();
    println!("  Stopped after {total} result(s). The monitor keeps running server-side.");
    Ok(())
}

fn cmd_reset_auth() -> Result<()> {
    let store = FileCredentialStore::named(GMAIL_CREDENTIAL)?;
    store.clear()?;
    println!("Cached credentials cleared: {}", store.path().display());
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(path: Option<&Path>, env: EnvLookup<'_>) -> Result<()> {
    let config = resolve_config(path, env)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");

    println!("# secrets (from environment)");
    let vars = [
        &config.exa.api_key_env,
        &config.perplexity.api_key_env,
        &config.speech.api_key_env,
        &config.email.gmail_token_env,
        &config.email.smtp_user_env,
        &config.email.smtp_password_env,
    ];
    for var in vars {
        let shown = optional_secret(env, var)
            .map(|v| mask_secret(&v))
            .unwrap_or_else(|| "(not set)".to_string());
        println!("# {var} = {shown}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn poll_status(&self, status: &str, found: u64, elapsed: Duration) {
        self.spinner.set_message(format!(
            "Waiting for results [{status}, {found} found, {}s]",
            elapsed.as_secs()
        ));
    }

    fn done(&self, _result: &RunResult) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn topic_flag_wins_over_config_default() {
        let config = AppConfig::default();
        let cli = Cli::try_parse_from(["newsdigest", "digest", "--topic", "robotics"]).unwrap();
        let Some(Command::Digest { target, .. }) = cli.command else {
            panic!("expected digest");
        };
        assert_eq!(resolve_topic(&target, &config), "robotics");

        let cli = Cli::try_parse_from(["newsdigest", "digest", "quantum"]).unwrap();
        let Some(Command::Digest { target, .. }) = cli.command else {
            panic!("expected digest");
        };
        assert_eq!(resolve_topic(&target, &config), "quantum");

        assert_eq!(
            resolve_topic(&TargetArgs::default(), &config),
            "AI and Technology"
        );
    }

    #[test]
    fn positional_and_flag_topic_conflict() {
        let parsed = Cli::try_parse_from(["newsdigest", "digest", "a", "--topic", "b"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn answer_modes_map_to_delivery() {
        let flags = answer_flags(false, false, true, false);
        assert!(flags.audio && flags.email);

        let flags = answer_flags(true, false, false, true);
        assert!(!flags.audio && !flags.email && flags.html);

        assert!(
            Cli::try_parse_from(["newsdigest", "answer", "--content-only", "--email"]).is_err()
        );
    }

    #[test]
    fn run_settings_layer_flags_over_config() {
        let mut config = AppConfig::default();
        config.email.recipients = vec!["a@example.com".into()];
        let target = TargetArgs {
            count: Some(9),
            out: Some(PathBuf::from("/tmp/news")),
            ..TargetArgs::default()
        };

        let settings = run_settings(
            &config,
            &|_: &str| None,
            &target,
            DeliveryFlags {
                email: true,
                ..DeliveryFlags::default()
            },
        );

        assert_eq!(settings.count, 9);
        assert_eq!(settings.output_dir, PathBuf::from("/tmp/news"));
        assert_eq!(settings.email.unwrap().to, vec!["a@example.com".to_string()]);
        assert!(!settings.audio);
    }

    #[test]
    fn email_sender_defaults_to_smtp_login() {
        let config = AppConfig::default();
        let env = |name: &str| (name == "GMAIL_USER").then(|| "me@gmail.com".to_string());
        let flags = DeliveryFlags {
            email: true,
            ..DeliveryFlags::default()
        };

        let settings = run_settings(&config, &env, &TargetArgs::default(), flags);
        assert_eq!(settings.email.unwrap().from, "me@gmail.com");

        let mut config = AppConfig::default();
        config.email.sender = Some("digest@corp.com".into());
        let settings = run_settings(&config, &env, &TargetArgs::default(), flags);
        assert_eq!(settings.email.unwrap().from, "digest@corp.com");
    }

    #[test]
    fn env_overrides_apply_before_validation() {
        let tmp = std::env::temp_dir().join(format!("newsdigest-cli-{}.toml", std::process::id()));
        std::fs::write(&tmp, "[defaults]\narticle_count = 4\n").unwrap();
        let env = |name: &str| match name {
            "MAX_ARTICLES" => Some("7".to_string()),
            _ => None,
        };

        let config = resolve_config(Some(tmp.as_path()), &env).unwrap();
        std::fs::remove_file(&tmp).ok();

        assert_eq!(config.defaults.article_count, 7);
    }

    #[test]
    fn bad_endpoint_is_rejected() {
        let mut config = AppConfig::default();
        config.exa.base_url = "not a url".into();
        assert!(validate_endpoints(&config).is_err());
    }
}
