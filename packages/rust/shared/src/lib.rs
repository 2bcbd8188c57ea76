//! Shared types, error model, and configuration for newsdigest.
//!
//! This crate is the foundation depended on by all other newsdigest crates.
//! It provides:
//! - [`NewsDigestError`], the unified error type
//! - Domain types ([`SearchRequest`], [`JobHandle`], [`ResultItem`], [`Report`])
//! - Configuration ([`AppConfig`], config loading, env overrides)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, EmailConfig, EnvLookup, ExaConfig, PerplexityConfig,
    PollingConfig, ReportConfig, RetryConfig, SpeechConfig, config_dir, config_file_path,
    credentials_dir, init_config, load_config, load_config_from, mask_secret, optional_secret,
    parse_recipients, require_secret,
};
pub use error::{NewsDigestError, Result};
pub use types::{
    BACKUP_SCHEMA_VERSION, EnrichmentFormat, EnrichmentSpec, JobHandle, JobStatus, LeadSection,
    Report, ReportBackup, ReportMeta, ResultItem, SearchRequest,
};
