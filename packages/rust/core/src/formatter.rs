//! Render result items into a markdown report, its JSON backup, an HTML copy
//! and a short spoken script.
//!
//! Rendering is pure: the generation timestamp is an input, so the same items
//! and context always produce byte-identical output.

use std::fmt::Write as _;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use newsdigest_shared::{
    BACKUP_SCHEMA_VERSION, LeadSection, NewsDigestError, Report, ReportBackup, ReportMeta, Result,
    ResultItem,
};
use regex::Regex;

/// Rendered in place of any missing field.
pub const PLACEHOLDER: &str = "_not available_";

/// Everything about a run the formatter needs besides the items.
#[derive(Debug, Clone)]
pub struct ReportContext {
    /// Report heading, e.g. "AI Newsletter".
    pub title: String,
    pub topic: String,
    pub query: String,
    pub generated_at: DateTime<Utc>,
    pub complete: bool,
    pub fallback: bool,
    pub job_id: Option<String>,
    pub job_url: Option<String>,
    pub lead: Option<LeadSection>,
    /// Enrichment names in the order they were requested.
    pub enrichment_order: Vec<String>,
}

impl ReportContext {
    fn meta(&self, item_count: usize) -> ReportMeta {
        ReportMeta {
            topic: self.topic.clone(),
            query: self.query.clone(),
            generated_at: self.generated_at,
            item_count,
            complete: self.complete,
            fallback: self.fallback,
            job_id: self.job_id.clone(),
            job_url: self.job_url.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Markdown
// ---------------------------------------------------------------------------

fn or_placeholder(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.trim().is_empty() => v.trim(),
        _ => PLACEHOLDER,
    }
}

/// Enrichment names for one item: requested order first, then extras by name.
fn enrichment_names<'a>(item: &'a ResultItem, order: &'a [String]) -> Vec<&'a str> {
    let mut names: Vec<&str> = order.iter().map(String::as_str).collect();
    names.extend(
        item.enrichments
            .keys()
            .map(String::as_str)
            .filter(|k| !order.iter().any(|o| o == k)),
    );
    names
}

/// Render the markdown report. Items keep their input order; none are dropped.
pub fn render_report(items: &[ResultItem], ctx: &ReportContext) -> Report {
    let mut out = String::new();

    // writeln! on a String cannot fail.
    let _ = writeln!(out, "# {}", ctx.title);
    out.push('\n');
    let _ = writeln!(out, "**Date:** {}  ", ctx.generated_at.format("%B %d, %Y"));
    let _ = writeln!(out, "**Topic:** {}  ", or_placeholder(Some(ctx.topic.as_str())));
    let _ = writeln!(out, "**Query:** {}", or_placeholder(Some(ctx.query.as_str())));
    out.push('\n');

    if let Some(lead) = &ctx.lead {
        let _ = writeln!(out, "## {}", lead.heading);
        out.push('\n');
        let _ = writeln!(out, "{}", or_placeholder(Some(lead.body.as_str())));
        out.push('\n');
    }

    if items.is_empty() {
        out.push_str("_No articles were returned for this run._\n\n");
    }

    for (idx, item) in items.iter().enumerate() {
        let _ = writeln!(
            out,
            "## Story {}: {}",
            idx + 1,
            or_placeholder(item.title.as_deref())
        );
        out.push('\n');
        let _ = writeln!(out, "- **Source:** {}", or_placeholder(Some(item.url.as_str())));
        let _ = writeln!(
            out,
            "- **Published:** {}",
            or_placeholder(item.published_date.as_deref())
        );
        let _ = writeln!(out, "- **Author:** {}", or_placeholder(item.author.as_deref()));
        out.push('\n');
        let _ = writeln!(out, "{}", or_placeholder(item.snippet.as_deref()));
        out.push('\n');

        for name in enrichment_names(item, &ctx.enrichment_order) {
            let _ = writeln!(out, "### {name}");
            out.push('\n');
            let _ = writeln!(
                out,
                "{}",
                or_placeholder(item.enrichments.get(name).map(String::as_str))
            );
            out.push('\n');
        }
    }

    out.push_str("---\n\n## Metadata\n\n");
    let _ = writeln!(out, "- Articles analyzed: {}", items.len());
    let _ = writeln!(
        out,
        "- Generated: {}",
        ctx.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let status = if ctx.complete {
        "complete"
    } else {
        "incomplete (results gathered before the job finished)"
    };
    let _ = writeln!(out, "- Status: {status}");
    if ctx.fallback {
        out.push_str("- Fallback: sample content, no live results were available\n");
    }
    let _ = writeln!(out, "- Webset: {}", or_placeholder(ctx.job_url.as_deref()));

    Report {
        meta: ctx.meta(items.len()),
        text: out,
    }
}

// ---------------------------------------------------------------------------
// JSON backup
// ---------------------------------------------------------------------------

pub fn build_backup(items: &[ResultItem], ctx: &ReportContext) -> ReportBackup {
    ReportBackup {
        schema_version: BACKUP_SCHEMA_VERSION,
        meta: ctx.meta(items.len()),
        lead: ctx.lead.clone(),
        enrichment_order: ctx.enrichment_order.clone(),
        items: items.to_vec(),
    }
}

pub fn backup_to_json(backup: &ReportBackup) -> Result<String> {
    serde_json::to_string_pretty(backup)
        .map_err(|e| NewsDigestError::validation(format!("JSON serialization failed: {e}")))
}

/// Parse a backup written by [`backup_to_json`].
pub fn parse_backup(json: &str) -> Result<ReportBackup> {
    let backup: ReportBackup = serde_json::from_str(json)
        .map_err(|e| NewsDigestError::parse(format!("invalid report backup: {e}")))?;
    if backup.schema_version != BACKUP_SCHEMA_VERSION {
        return Err(NewsDigestError::parse(format!(
            "unsupported backup schema version {} (expected {BACKUP_SCHEMA_VERSION})",
            backup.schema_version
        )));
    }
    Ok(backup)
}

// ---------------------------------------------------------------------------
// HTML
// ---------------------------------------------------------------------------

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Minimal standalone HTML copy of a report, line breaks preserved.
pub fn render_html(report: &Report) -> String {
    let body = escape_html(&report.text).replace('\n', "<br>\n");
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; max-width: 800px; margin: 0 auto; padding: 20px; }}
.content {{ background: #f9f9f9; padding: 20px; border-radius: 8px; }}
</style>
</head>
<body>
<div class="content">
{body}
</div>
</body>
</html>
"#,
        title = escape_html(&format!("{} news digest", report.meta.topic)),
    )
}

// ---------------------------------------------------------------------------
// Audio script
// ---------------------------------------------------------------------------

/// Sentence-end search window at the end of a capped script.
const SENTENCE_WINDOW: usize = 50;

fn strip_markdown(text: &str) -> String {
    static LINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("valid regex"));
    static URL_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"https?://\S+").expect("valid regex"));
    static MARKUP_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[#*_`>|]+").expect("valid regex"));
    static EMOJI_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"[\p{Extended_Pictographic}\u{FE0F}\u{200D}]").expect("valid regex")
    });
    static SPACE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

    let text = LINK_RE.replace_all(text, "$1");
    let text = URL_RE.replace_all(&text, "");
    let text = MARKUP_RE.replace_all(&text, "");
    let text = EMOJI_RE.replace_all(&text, "");
    SPACE_RE.replace_all(&text, " ").trim().to_string()
}

fn first_sentences(text: &str, count: usize) -> String {
    let mut out = String::new();
    let mut seen = 0;
    for (idx, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?') {
            seen += 1;
            if seen == count {
                out.push_str(&text[..idx + c.len_utf8()]);
                return out;
            }
        }
    }
    text.to_string()
}

/// Cap `text` at `max_words`, preferring to end on a sentence boundary that
/// falls near the cut.
pub fn cap_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return words.join(" ");
    }
    let capped = words[..max_words].join(" ");
    let window_start = capped
        .char_indices()
        .rev()
        .nth(SENTENCE_WINDOW.saturating_sub(1))
        .map(|(idx, _)| idx)
        .unwrap_or(0);
    match capped[window_start..].rfind(['.', '!', '?']) {
        Some(pos) => capped[..window_start + pos + 1].to_string(),
        None => format!("{}.", capped.trim_end_matches([',', ';', ':'])),
    }
}

/// Spoken summary of a report: topic, story count, then the lead's opening
/// sentences or the story titles. Markdown and emoji are stripped.
pub fn audio_script(
    meta: &ReportMeta,
    lead: Option<&LeadSection>,
    items: &[ResultItem],
    max_words: usize,
) -> String {
    let mut script = format!(
        "Here is your {} news digest. Today we cover {} {}.",
        strip_markdown(&meta.topic),
        items.len(),
        if items.len() == 1 { "story" } else { "stories" }
    );

    match lead.map(|l| strip_markdown(&l.body)).filter(|b| !b.is_empty()) {
        Some(body) => {
            script.push(' ');
            script.push_str(&first_sentences(&body, 3));
        }
        None => {
            for (idx, item) in items.iter().take(5).enumerate() {
                if let Some(title) = item.title.as_deref().map(strip_markdown) {
                    if !title.is_empty() {
                        let _ = write!(script, " Story {}: {}.", idx + 1, title.trim_end_matches('.'));
                    }
                }
            }
        }
    }

    script.push_str(" Read the full report for details.");
    cap_words(&script, max_words)
}
