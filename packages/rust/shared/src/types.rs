//! Core domain types shared by the client, core, and delivery crates.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version of the JSON backup layout.
pub const BACKUP_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// SearchRequest
// ---------------------------------------------------------------------------

/// Output format requested for an enrichment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentFormat {
    #[default]
    Text,
    Date,
    Number,
    Url,
    Email,
    Phone,
    Options,
}

/// A named, natural-language enrichment attached to every result item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentSpec {
    /// Display name, also the key in [`ResultItem::enrichments`].
    pub title: String,
    /// Instruction given to the enrichment agent.
    pub description: String,
    #[serde(default)]
    pub format: EnrichmentFormat,
}

impl EnrichmentSpec {
    pub fn text(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            format: EnrichmentFormat::Text,
        }
    }
}

/// Everything needed to create a webset. Built once, then only borrowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Human topic label used in report headings.
    pub topic: String,
    /// Search query sent to the API.
    pub query: String,
    /// Number of results requested.
    pub count: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_domains: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub criteria: Vec<String>,
    /// Earliest publication date (`YYYY-MM-DD`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_published_date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enrichments: Vec<EnrichmentSpec>,
}

impl SearchRequest {
    /// Enrichment names in request order; the formatter renders fields in this order.
    pub fn enrichment_order(&self) -> Vec<String> {
        self.enrichments.iter().map(|e| e.title.clone()).collect()
    }
}

// ---------------------------------------------------------------------------
// JobHandle / JobStatus
// ---------------------------------------------------------------------------

/// Identifier of a submitted webset, used for every subsequent poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
        }
    }

    /// Link to the job in the web dashboard.
    pub fn dashboard_url(&self, dashboard_base: &str) -> String {
        format!("{}/{}", dashboard_base.trim_end_matches('/'), self.id)
    }
}

/// Server-side status of a webset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Paused,
    Idle,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    /// `idle` and `completed` both mean the searches have finished.
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Idle | Self::Completed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }

    pub fn is_terminal(&self) -> bool {
        self.is_done() || self.is_failed()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Idle => "idle",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ResultItem
// ---------------------------------------------------------------------------

/// One retrieved article. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultItem {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Completed enrichments keyed by enrichment title.
    #[serde(default)]
    pub enrichments: BTreeMap<String, String>,
}

impl ResultItem {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            snippet: None,
            published_date: None,
            author: None,
            enrichments: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Free-form section rendered above the item list (answer text, AI analysis).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadSection {
    pub heading: String,
    pub body: String,
}

/// Metadata carried by both the rendered report and its JSON backup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMeta {
    pub topic: String,
    pub query: String,
    pub generated_at: DateTime<Utc>,
    pub item_count: usize,
    /// False when the polling budget ran out before a terminal state.
    pub complete: bool,
    /// True when placeholder sample content stands in for real results.
    #[serde(default)]
    pub fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_url: Option<String>,
}

/// A rendered report. Write-once.
#[derive(Debug, Clone)]
pub struct Report {
    pub meta: ReportMeta,
    pub text: String,
}

/// The machine-readable twin of a [`Report`], written as `<stem>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportBackup {
    pub schema_version: u32,
    pub meta: ReportMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead: Option<LeadSection>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enrichment_order: Vec<String>,
    pub items: Vec<ResultItem>,
}
