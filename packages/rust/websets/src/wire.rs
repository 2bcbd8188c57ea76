//! Request and response shapes of the Exa Websets and Answer endpoints.
//!
//! Only the fields newsdigest reads are modeled; everything else in the
//! payloads is ignored. Responses are parsed leniently because the API has
//! renamed item fields between versions.

use std::collections::HashMap;

use newsdigest_shared::{EnrichmentFormat, JobStatus, ResultItem, SearchRequest};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Webset creation
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(crate) struct CreateWebsetBody<'a> {
    pub search: SearchBody<'a>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enrichments: Vec<EnrichmentBody<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchBody<'a> {
    pub query: &'a str,
    pub count: u32,
    pub entity: EntityBody,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub criteria: Vec<CriterionBody<'a>>,
    #[serde(skip_serializing_if = "is_empty_slice")]
    pub include_domains: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_published_date: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct EntityBody {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl EntityBody {
    pub fn article() -> Self {
        Self { kind: "article" }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CriterionBody<'a> {
    pub description: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct EnrichmentBody<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub format: EnrichmentFormat,
}

impl<'a> CreateWebsetBody<'a> {
    pub fn from_request(request: &'a SearchRequest) -> Self {
        Self {
            search: SearchBody {
                query: &request.query,
                count: request.count,
                entity: EntityBody::article(),
                criteria: request
                    .criteria
                    .iter()
                    .map(|c| CriterionBody { description: c })
                    .collect(),
                include_domains: &request.include_domains,
                start_published_date: request.start_published_date.as_deref(),
            },
            enrichments: request
                .enrichments
                .iter()
                .map(|e| EnrichmentBody {
                    title: &e.title,
                    description: &e.description,
                    format: e.format,
                })
                .collect(),
        }
    }
}

fn is_empty_slice(values: &&[String]) -> bool {
    values.is_empty()
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedWebset {
    pub id: String,
}

// ---------------------------------------------------------------------------
// Webset status
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct WebsetDto {
    #[serde(default)]
    pub id: String,
    #[serde(default = "unknown_status")]
    pub status: JobStatus,
    #[serde(default)]
    pub searches: Vec<SearchDto>,
    #[serde(default)]
    pub enrichments: Vec<EnrichmentDefDto>,
}

fn unknown_status() -> JobStatus {
    JobStatus::Unknown
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchDto {
    #[serde(default)]
    pub progress: Option<ProgressDto>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ProgressDto {
    #[serde(default)]
    pub found: u64,
    #[serde(default)]
    pub completion: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EnrichmentDefDto {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl WebsetDto {
    /// Map enrichment ids to the titles they were created with.
    pub fn enrichment_titles(&self) -> HashMap<String, String> {
        self.enrichments
            .iter()
            .filter_map(|e| {
                e.title
                    .clone()
                    .or_else(|| e.description.clone())
                    .map(|title| (e.id.clone(), title))
            })
            .collect()
    }

    pub fn progress(&self) -> (u64, f64) {
        self.searches
            .first()
            .and_then(|s| s.progress.as_ref())
            .map(|p| (p.found, p.completion))
            .unwrap_or((0, 0.0))
    }
}

// ---------------------------------------------------------------------------
// Webset items
// ---------------------------------------------------------------------------

/// The item list has been returned under `data`, `items` and `results`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ItemsPage {
    #[serde(default)]
    data: Option<Vec<ItemDto>>,
    #[serde(default)]
    items: Option<Vec<ItemDto>>,
    #[serde(default)]
    results: Option<Vec<ItemDto>>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    next_cursor: Option<String>,
}

impl ItemsPage {
    /// Cursor of the following page, if the server has more.
    pub fn next_cursor(&self) -> Option<String> {
        if !self.has_more {
            return None;
        }
        self.next_cursor.clone().filter(|c| !c.trim().is_empty())
    }

    pub fn into_items(self) -> Vec<ItemDto> {
        self.data
            .filter(|v| !v.is_empty())
            .or(self.items.filter(|v| !v.is_empty()))
            .or(self.results)
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ItemDto {
    #[serde(default)]
    pub properties: PropertiesDto,
    #[serde(default)]
    pub enrichments: Vec<EnrichmentResultDto>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PropertiesDto {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub published_date: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub article: Option<ArticleDto>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ArticleDto {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EnrichmentResultDto {
    #[serde(default)]
    pub enrichment_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
}

impl EnrichmentResultDto {
    /// Joined result text, present only for completed enrichments.
    fn value(&self) -> Option<String> {
        if self.status.as_deref() != Some("completed") {
            return None;
        }
        let text = match self.result.as_ref()? {
            serde_json::Value::Array(values) => values
                .iter()
                .filter_map(json_text)
                .collect::<Vec<_>>()
                .join("; "),
            other => json_text(other)?,
        };
        let text = text.trim().to_string();
        (!text.is_empty()).then_some(text)
    }

    fn name(&self, titles: &HashMap<String, String>) -> String {
        self.enrichment_id
            .as_ref()
            .and_then(|id| titles.get(id).cloned())
            .or_else(|| self.title.clone())
            .or_else(|| self.enrichment_id.clone())
            .unwrap_or_else(|| "enrichment".to_string())
    }
}

fn json_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Counts of enrichment cells seen while mapping a page of items.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EnrichmentTally {
    pub completed: usize,
    pub total: usize,
}

/// Convert a wire item into a [`ResultItem`], keyed by enrichment title.
///
/// Items without a URL are skipped by returning `None`.
pub(crate) fn map_item(
    dto: ItemDto,
    titles: &HashMap<String, String>,
    tally: &mut EnrichmentTally,
) -> Option<ResultItem> {
    let props = dto.properties;
    let url = non_blank(props.url)?;
    let article = props.article.unwrap_or_default();

    let mut item = ResultItem::new(url);
    item.title = non_blank(article.title).or_else(|| non_blank(props.description.clone()));
    item.snippet = non_blank(props.content).or_else(|| non_blank(props.description));
    item.published_date = non_blank(props.published_date).or_else(|| non_blank(article.published_at));
    item.author = non_blank(props.author).or_else(|| non_blank(article.author));

    for enrichment in &dto.enrichments {
        tally.total += 1;
        if let Some(value) = enrichment.value() {
            tally.completed += 1;
            item.enrichments.insert(enrichment.name(titles), value);
        }
    }

    Some(item)
}

// ---------------------------------------------------------------------------
// Monitors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateMonitorBody<'a> {
    pub webset_id: &'a str,
    pub cadence: CadenceBody<'a>,
    pub behavior: BehaviorBody<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CadenceBody<'a> {
    pub cron: &'a str,
    pub timezone: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct BehaviorBody<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub config: BehaviorConfigBody<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct BehaviorConfigBody<'a> {
    pub query: &'a str,
    pub entity: EntityBody,
    pub count: u32,
    pub behavior: &'static str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedMonitor {
    pub id: String,
}

// ---------------------------------------------------------------------------
// Answer
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(crate) struct AnswerBody<'a> {
    pub query: &'a str,
    pub text: bool,
    #[serde(skip_serializing_if = "is_empty_slice")]
    pub include_domains: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_published_date: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_published_date: Option<&'a str>,
}
