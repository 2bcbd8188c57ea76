//! Trend analysis over fetched items via an OpenAI-compatible chat endpoint
//! (Perplexity by default).

use std::time::Duration;

use async_trait::async_trait;
use newsdigest_shared::{NewsDigestError, PerplexityConfig, Result, ResultItem};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

/// Items included in the prompt.
const MAX_PROMPT_ITEMS: usize = 8;

/// Characters of each item's snippet included in the prompt.
const SNIPPET_CHARS: usize = 200;

/// Something that can turn a list of articles into a written analysis.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, topic: &str, items: &[ResultItem]) -> Result<String>;
}

/// Chat-completions client for trend analysis.
pub struct PerplexityAnalyzer {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl PerplexityAnalyzer {
    pub fn new(config: &PerplexityConfig, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("NewsDigest/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| NewsDigestError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            api_key: api_key.into(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

#[async_trait]
impl Analyzer for PerplexityAnalyzer {
    #[instrument(skip_all, fields(topic = %topic, items = items.len(), model = %self.model))]
    async fn analyze(&self, topic: &str, items: &[ResultItem]) -> Result<String> {
        let prompt = analysis_prompt(topic, items);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| NewsDigestError::Network(format!("{}: {e}", self.api_url)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NewsDigestError::Api {
                service: "perplexity",
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| NewsDigestError::parse(format!("chat completion response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| NewsDigestError::parse("chat completion returned no content"))?;

        info!(chars = content.len(), "analysis received");
        Ok(content)
    }
}

/// Prompt listing up to eight items with truncated snippets.
pub fn analysis_prompt(topic: &str, items: &[ResultItem]) -> String {
    let listing = items
        .iter()
        .take(MAX_PROMPT_ITEMS)
        .map(|item| {
            let title = item.title.as_deref().unwrap_or(&item.url);
            let snippet: String = item
                .snippet
                .as_deref()
                .unwrap_or_default()
                .chars()
                .take(SNIPPET_CHARS)
                .collect();
            format!("- {title}: {snippet}...")
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Analyze the following recent news articles about {topic} and provide:\n\
         1. Key trends and patterns\n\
         2. Most significant developments\n\
         3. Potential implications and predictions\n\
         4. Market/industry impact assessment\n\n\
         News Articles:\n{listing}\n\n\
         Please provide a structured analysis with clear insights."
    )
}

/// Run the analyzer, degrading to an explanatory paragraph on failure.
pub async fn analyze_or_placeholder(
    analyzer: Option<&dyn Analyzer>,
    topic: &str,
    items: &[ResultItem],
) -> String {
    let Some(analyzer) = analyzer else {
        return "AI analysis skipped: no analysis API key is configured.".to_string();
    };
    if items.is_empty() {
        return "AI analysis skipped: no articles were available to analyze.".to_string();
    }
    match analyzer.analyze(topic, items).await {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "analysis failed, using placeholder");
            format!("AI analysis unavailable for this run ({e}).")
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn items(n: usize) -> Vec<ResultItem> {
        (0..n)
            .map(|i| {
                let mut item = ResultItem::new(format!("https://news.example/{i}"));
                item.title = Some(format!("Story {i}"));
                item.snippet = Some("x".repeat(300));
                item
            })
            .collect()
    }

    fn analyzer_for(server: &MockServer) -> PerplexityAnalyzer {
        let config = PerplexityConfig {
            api_url: format!("{}/chat/completions", server.uri()),
            ..PerplexityConfig::default()
        };
        PerplexityAnalyzer::new(&config, "pplx-key", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn prompt_limits_items_and_snippets() {
        let prompt = analysis_prompt("AI", &items(10));
        assert_eq!(prompt.matches("\n- Story").count(), 8);
        assert!(prompt.contains(&format!("- Story 0: {}...", "x".repeat(200))));
        assert!(!prompt.contains(&"x".repeat(201)));
    }

    #[tokio::test]
    async fn analyze_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer pplx-key"))
            .and(body_partial_json(json!({"model": "sonar", "max_tokens": 1000})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": " Trends are up. "}}]
            })))
            .mount(&server)
            .await;

        let text = analyzer_for(&server).analyze("AI", &items(2)).await.unwrap();
        assert_eq!(text, "Trends are up.");
    }

    #[tokio::test]
    async fn failed_analysis_becomes_placeholder() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let analyzer = analyzer_for(&server);
        let text = analyze_or_placeholder(Some(&analyzer), "AI", &items(1)).await;
        assert!(text.starts_with("AI analysis unavailable"));
        assert!(text.contains("401"));
    }

    #[tokio::test]
    async fn missing_analyzer_is_skipped() {
        let text = analyze_or_placeholder(None, "AI", &items(1)).await;
        assert!(text.contains("skipped"));
    }
}
