//! Builders for the search payloads each flow submits.
//!
//! Every builder takes today's date explicitly so the requests are
//! reproducible in tests.

use chrono::{Days, NaiveDate};
use newsdigest_shared::{EnrichmentSpec, NewsDigestError, Result, SearchRequest};
use newsdigest_websets::AnswerRequest;

/// How far back the newsletter search looks.
const NEWSLETTER_LOOKBACK_DAYS: u64 = 7;

/// How far back the trend-analysis search looks.
const ANALYSIS_LOOKBACK_DAYS: u64 = 30;

/// How far back the answer flow looks.
const ANSWER_LOOKBACK_DAYS: u64 = 3;

/// Trim and reject empty topics.
pub fn validate_topic(topic: &str) -> Result<String> {
    let topic = topic.trim();
    if topic.is_empty() {
        return Err(NewsDigestError::validation("topic must not be empty"));
    }
    Ok(topic.to_string())
}

fn days_before(today: NaiveDate, days: u64) -> String {
    today
        .checked_sub_days(Days::new(days))
        .unwrap_or(today)
        .format("%Y-%m-%d")
        .to_string()
}

/// The three enrichments attached to every newsletter item, in render order.
pub fn newsletter_enrichments() -> Vec<EnrichmentSpec> {
    vec![
        EnrichmentSpec::text(
            "Article Summary",
            "Provide a 2-3 sentence summary of the main points and key takeaways",
        ),
        EnrichmentSpec::text(
            "Key Details",
            "Extract company names, product names, key figures, and important dates mentioned",
        ),
        EnrichmentSpec::text(
            "Industry Impact",
            "Analyze the significance and potential impact of this news on the industry",
        ),
    ]
}

/// Enriched webset over last week's coverage of `topic`.
pub fn newsletter_request(topic: &str, count: u32, today: NaiveDate) -> Result<SearchRequest> {
    let topic = validate_topic(topic)?;
    Ok(SearchRequest {
        query: format!(
            "latest {topic} news developments announcements {}",
            today.format("%Y-%m")
        ),
        count: count.max(1),
        include_domains: Vec::new(),
        criteria: vec![
            format!("Recent article about {topic} developments or breakthroughs"),
            "Article from credible tech or business publication".to_string(),
            "Article contains specific details about companies, products, or research".to_string(),
            "Article published within the last week".to_string(),
        ],
        start_published_date: Some(days_before(today, NEWSLETTER_LOOKBACK_DAYS)),
        enrichments: newsletter_enrichments(),
        topic,
    })
}

/// Plain news webset restricted to trusted outlets, fed to trend analysis.
pub fn analysis_request(
    topic: &str,
    count: u32,
    domains: &[String],
    today: NaiveDate,
) -> Result<SearchRequest> {
    let topic = validate_topic(topic)?;
    Ok(SearchRequest {
        query: format!("{topic} news recent developments"),
        count: count.max(1),
        include_domains: domains.to_vec(),
        criteria: Vec::new(),
        start_published_date: Some(days_before(today, ANALYSIS_LOOKBACK_DAYS)),
        enrichments: Vec::new(),
        topic,
    })
}

/// Seed webset for a daily monitor.
pub fn monitor_request(topic: &str, count: u32) -> Result<SearchRequest> {
    let topic = validate_topic(topic)?;
    Ok(SearchRequest {
        query: format!("{topic} breakthrough news"),
        count: count.max(1),
        include_domains: Vec::new(),
        criteria: Vec::new(),
        start_published_date: None,
        enrichments: Vec::new(),
        topic,
    })
}

/// Question for the answer endpoint covering the last few days.
pub fn answer_request(topic: &str, domains: &[String], today: NaiveDate) -> Result<AnswerRequest> {
    let topic = validate_topic(topic)?;
    Ok(AnswerRequest {
        query: format!(
            "Create a comprehensive newsletter about the latest {topic} developments. \
             Include at least 5 recent stories covering company announcements and breakthroughs, \
             product launches, funding rounds, research advances, and industry trends. \
             For each story, provide the title, key details, and significance to the {topic} industry."
        ),
        include_domains: domains.to_vec(),
        start_published_date: Some(days_before(today, ANSWER_LOOKBACK_DAYS)),
        end_published_date: Some(today.format("%Y-%m-%d").to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 15).unwrap()
    }

    #[test]
    fn newsletter_request_carries_topic_and_window() {
        let req = newsletter_request("  AI startups ", 5, day()).unwrap();
        assert_eq!(req.topic, "AI startups");
        assert_eq!(req.query, "latest AI startups news developments announcements 2026-10");
        assert_eq!(req.start_published_date.as_deref(), Some("2026-10-08"));
        assert_eq!(req.criteria.len(), 4);
        assert_eq!(
            req.enrichment_order(),
            vec!["Article Summary", "Key Details", "Industry Impact"]
        );
    }

    #[test]
    fn empty_topic_is_rejected() {
        assert!(newsletter_request("   ", 5, day()).is_err());
        assert!(monitor_request("", 5).is_err());
    }

    #[test]
    fn zero_count_is_clamped() {
        let req = monitor_request("Robotics", 0).unwrap();
        assert_eq!(req.count, 1);
    }

    #[test]
    fn analysis_request_uses_domains() {
        let domains = vec!["reuters.com".to_string()];
        let req = analysis_request("Chips", 8, &domains, day()).unwrap();
        assert_eq!(req.include_domains, domains);
        assert!(req.enrichments.is_empty());
        assert_eq!(req.start_published_date.as_deref(), Some("2026-09-15"));
    }

    #[test]
    fn answer_request_spans_three_days() {
        let req = answer_request("AI", &[], day()).unwrap();
        assert_eq!(req.start_published_date.as_deref(), Some("2026-10-12"));
        assert_eq!(req.end_published_date.as_deref(), Some("2026-10-15"));
        assert!(req.query.contains("latest AI developments"));
    }
}
