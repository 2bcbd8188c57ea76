//! reqwest-backed client for the Exa REST API.

use std::time::Duration;

use async_trait::async_trait;
use newsdigest_shared::{JobHandle, NewsDigestError, Result, SearchRequest};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use crate::retry::RetryPolicy;
use crate::wire::{
    self, BehaviorBody, BehaviorConfigBody, CadenceBody, CreateMonitorBody, CreateWebsetBody,
    CreatedMonitor, CreatedWebset, EnrichmentTally, EntityBody, ItemsPage, WebsetDto,
};
use crate::{ItemBatch, JobSource, MonitorHandle, MonitorSpec, StatusSnapshot, WebsetApi};

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("NewsDigest/", env!("CARGO_PKG_VERSION"));

/// Error bodies are cut to this many characters before being surfaced.
const MAX_ERROR_BODY: usize = 500;

const WEBSETS_PATH: &str = "/websets/v0/websets";
const MONITORS_PATH: &str = "/websets/v0/monitors";

/// Largest page requested from the items endpoint.
const ITEMS_PAGE_LIMIT: u32 = 100;

/// Upper bound on pages followed in one items read.
const MAX_ITEM_PAGES: u32 = 50;

/// Connection settings for [`ExaClient`]. All values are explicit; nothing is
/// read from the environment here.
#[derive(Debug, Clone)]
pub struct ExaClientOptions {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

/// Client for webset, monitor, and answer endpoints.
#[derive(Debug, Clone)]
pub struct ExaClient {
    http: Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl ExaClient {
    pub fn new(opts: ExaClientOptions) -> Result<Self> {
        if opts.api_key.trim().is_empty() {
            return Err(NewsDigestError::config("Exa API key is empty"));
        }
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(opts.timeout)
            .build()
            .map_err(|e| NewsDigestError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: opts.base_url.trim_end_matches('/').to_string(),
            api_key: opts.api_key,
            retry: opts.retry,
        })
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub(crate) fn post(&self, path: &str) -> RequestBuilder {
        self.http
            .post(self.url(path))
            .header("x-api-key", &self.api_key)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.http
            .get(self.url(path))
            .header("x-api-key", &self.api_key)
    }

    /// GET with the retry policy applied.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get_json_with(path, &[]).await
    }

    async fn get_json_with<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        self.retry
            .run(path, || send_json(self.get(path).query(query), path))
            .await
    }

    /// Submit a new webset. Never retried: a repeated POST would create a
    /// second job.
    #[instrument(skip_all, fields(query = %request.query, count = request.count))]
    pub async fn create_webset(&self, request: &SearchRequest) -> Result<JobHandle> {
        if request.query.trim().is_empty() {
            return Err(NewsDigestError::validation("search query is empty"));
        }
        if request.count == 0 {
            return Err(NewsDigestError::validation("result count must be at least 1"));
        }

        let body = CreateWebsetBody::from_request(request);
        let created: CreatedWebset =
            send_json(self.post(WEBSETS_PATH).json(&body), WEBSETS_PATH).await?;
        if created.id.trim().is_empty() {
            return Err(NewsDigestError::parse("webset creation returned an empty id"));
        }

        info!(webset_id = %created.id, "webset created");
        Ok(JobHandle::new(created.id))
    }

    pub(crate) async fn webset(&self, id: &str) -> Result<WebsetDto> {
        self.get_json(&format!("{WEBSETS_PATH}/{id}")).await
    }

    /// Fetch every page of items and map them to [`ItemBatch`].
    #[instrument(skip_all, fields(webset_id = %id))]
    pub async fn webset_items(&self, id: &str) -> Result<ItemBatch> {
        let webset = self.webset(id).await?;
        let titles = webset.enrichment_titles();
        let items_path = format!("{WEBSETS_PATH}/{id}/items");

        let mut dtos = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0u32;
        loop {
            let mut query = vec![("limit", ITEMS_PAGE_LIMIT.to_string())];
            if let Some(cursor) = &cursor {
                query.push(("cursor", cursor.clone()));
            }
            let page: ItemsPage = self.get_json_with(&items_path, &query).await?;
            pages += 1;
            cursor = page.next_cursor();
            dtos.extend(page.into_items());

            if cursor.is_none() {
                break;
            }
            if pages >= MAX_ITEM_PAGES {
                warn!(pages, items = dtos.len(), "item page limit reached, later pages skipped");
                break;
            }
        }

        let fetched = dtos.len();
        let mut tally = EnrichmentTally::default();
        let items: Vec<_> = dtos
            .into_iter()
            .filter_map(|dto| wire::map_item(dto, &titles, &mut tally))
            .collect();

        let skipped = fetched - items.len();
        if skipped > 0 {
            warn!(skipped, "webset items without a URL were skipped");
        }
        debug!(
            items = items.len(),
            pages,
            enrichments_completed = tally.completed,
            enrichments_total = tally.total,
            "fetched webset items"
        );

        Ok(ItemBatch {
            items,
            enrichments_completed: tally.completed,
            enrichments_total: tally.total,
            enrichments_requested: webset.enrichments.len(),
        })
    }

    /// Attach a recurring search to an existing webset.
    #[instrument(skip_all, fields(webset_id = %spec.webset_id, cron = %spec.cron))]
    pub async fn create_monitor_for(&self, spec: &MonitorSpec) -> Result<MonitorHandle> {
        let body = CreateMonitorBody {
            webset_id: &spec.webset_id,
            cadence: CadenceBody {
                cron: &spec.cron,
                timezone: &spec.timezone,
            },
            behavior: BehaviorBody {
                kind: "search",
                config: BehaviorConfigBody {
                    query: &spec.query,
                    entity: EntityBody::article(),
                    count: spec.count,
                    behavior: "append",
                },
            },
        };
        let created: CreatedMonitor =
            send_json(self.post(MONITORS_PATH).json(&body), MONITORS_PATH).await?;
        info!(monitor_id = %created.id, "monitor created");
        Ok(MonitorHandle { id: created.id })
    }
}

#[async_trait]
impl JobSource for ExaClient {
    async fn status(&self, handle: &JobHandle) -> Result<StatusSnapshot> {
        let webset = self.webset(&handle.id).await?;
        let (found, completion) = webset.progress();
        debug!(webset_id = %webset.id, status = %webset.status, found, completion, "status");
        Ok(StatusSnapshot {
            status: webset.status,
            found,
            completion,
        })
    }

    async fn items(&self, handle: &JobHandle) -> Result<ItemBatch> {
        self.webset_items(&handle.id).await
    }
}

#[async_trait]
impl WebsetApi for ExaClient {
    async fn create(&self, request: &SearchRequest) -> Result<JobHandle> {
        self.create_webset(request).await
    }

    async fn create_monitor(&self, spec: &MonitorSpec) -> Result<MonitorHandle> {
        self.create_monitor_for(spec).await
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Send a request and decode a JSON body, mapping failures onto the error taxonomy.
pub(crate) async fn send_json<T: DeserializeOwned>(request: RequestBuilder, what: &str) -> Result<T> {
    let response = request
        .send()
        .await
        .map_err(|e| NewsDigestError::Network(format!("{what}: {e}")))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| NewsDigestError::Network(format!("{what}: failed to read body: {e}")))?;

    if !status.is_success() {
        return Err(NewsDigestError::Api {
            service: "exa",
            status: status.as_u16(),
            body: truncate_chars(&body, MAX_ERROR_BODY),
        });
    }

    serde_json::from_str(&body)
        .map_err(|e| NewsDigestError::parse(format!("{what}: unexpected response: {e}")))
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
