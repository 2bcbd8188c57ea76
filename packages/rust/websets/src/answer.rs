//! Exa Answer: a single grounded answer with its source citations.

use async_trait::async_trait;
use newsdigest_shared::{NewsDigestError, Result, ResultItem};
use serde::Deserialize;
use tracing::{info, instrument};

use crate::AnswerSource;
use crate::client::{ExaClient, send_json};
use crate::wire::AnswerBody;

const ANSWER_PATH: &str = "/answer";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerRequest {
    pub query: String,
    pub include_domains: Vec<String>,
    /// `YYYY-MM-DD`
    pub start_published_date: Option<String>,
    pub end_published_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AnswerResponse {
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub published_date: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

impl From<Citation> for ResultItem {
    fn from(citation: Citation) -> Self {
        let mut item = ResultItem::new(citation.url);
        item.title = citation.title.filter(|t| !t.trim().is_empty());
        item.snippet = citation.text.filter(|t| !t.trim().is_empty());
        item.published_date = citation.published_date;
        item.author = citation.author;
        item
    }
}

#[async_trait]
impl AnswerSource for ExaClient {
    #[instrument(skip_all, fields(query = %request.query))]
    async fn answer(&self, request: &AnswerRequest) -> Result<AnswerResponse> {
        if request.query.trim().is_empty() {
            return Err(NewsDigestError::validation("answer query is empty"));
        }
        let body = AnswerBody {
            query: &request.query,
            text: true,
            include_domains: &request.include_domains,
            start_published_date: request.start_published_date.as_deref(),
            end_published_date: request.end_published_date.as_deref(),
        };
        let response: AnswerResponse =
            send_json(self.post(ANSWER_PATH).json(&body), ANSWER_PATH).await?;
        info!(citations = response.citations.len(), "answer received");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::{ExaClientOptions, RetryPolicy};

    #[tokio::test]
    async fn answer_parses_citations() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/answer"))
            .and(body_partial_json(json!({"query": "AI news", "text": true, "include_domains": ["reuters.com"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "answer": "Models got faster.",
                "citations": [
                    {"url": "https://reuters.com/a", "title": "Fast models", "text": "Body"},
                    {"url": "https://reuters.com/b"}
                ]
            })))
            .mount(&server)
            .await;

        let client = ExaClient::new(ExaClientOptions {
            base_url: server.uri(),
            api_key: "k".into(),
            timeout: Duration::from_secs(5),
            retry: RetryPolicy::none(),
        })
        .unwrap();

        let response = client
            .answer(&AnswerRequest {
                query: "AI news".into(),
                include_domains: vec!["reuters.com".into()],
                start_published_date: None,
                end_published_date: None,
            })
            .await
            .unwrap();

        assert_eq!(response.answer, "Models got faster.");
        assert_eq!(response.citations.len(), 2);
        let item: ResultItem = response.citations[1].clone().into();
        assert_eq!(item.url, "https://reuters.com/b");
        assert!(item.title.is_none());
    }
}
