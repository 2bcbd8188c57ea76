//! End-to-end runs: request → webset → poll → format → persist → deliver.
//!
//! Three flows share one tail: the enriched newsletter (`run_digest`), the
//! trend analysis (`run_analysis`) and the answer newsletter (`run_answer`).
//! Every step is sequential. Local files are written before any delivery is
//! attempted, and delivery failures never remove them.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use newsdigest_delivery::{Attachment, EmailMessage, EmailSender, SpeechSynthesizer, truncate_body};
use newsdigest_shared::{
    JobHandle, LeadSection, NewsDigestError, Report, Result, ResultItem, SearchRequest,
};
use newsdigest_websets::{AnswerSource, ItemBatch, StatusSnapshot, WebsetApi};
use tracing::{info, instrument, warn};

use crate::analysis::{Analyzer, analyze_or_placeholder};
use crate::formatter::{
    ReportContext, audio_script, backup_to_json, build_backup, render_html, render_report,
};
use crate::output::OutputWriter;
use crate::poller::{Clock, PollBudget, PollObserver, poll_until_terminal};
use crate::request;

/// Attachment name of the spoken summary.
const AUDIO_ATTACHMENT_NAME: &str = "newsletter_summary.mp3";

// ---------------------------------------------------------------------------
// Settings and results
// ---------------------------------------------------------------------------

/// Which flow produced a report; also the artifact file prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Newsletter,
    Analysis,
    Answer,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Newsletter => "newsletter",
            Self::Analysis => "news_analysis",
            Self::Answer => "answer_newsletter",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Self::Newsletter => "AI Newsletter",
            Self::Analysis => "News Analysis Report",
            Self::Answer => "AI Newsletter",
        }
    }
}

/// Where and how to email the report.
#[derive(Debug, Clone)]
pub struct EmailPlan {
    pub from: String,
    pub to: Vec<String>,
    pub subject_prefix: String,
    pub max_body_chars: usize,
}

/// Explicit inputs of one run. Nothing here is read from the environment.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub topic: String,
    pub count: u32,
    pub output_dir: PathBuf,
    pub dashboard_url: String,
    pub news_domains: Vec<String>,
    pub budget: PollBudget,
    pub sample_fallback: bool,
    pub html: bool,
    pub audio: bool,
    pub max_speech_words: usize,
    pub email: Option<EmailPlan>,
    /// Timestamp stamped into the report and the file names.
    pub generated_at: DateTime<Utc>,
}

/// Capabilities a run may use. Optional ones are skipped when absent.
pub struct Services<'a> {
    pub clock: &'a dyn Clock,
    pub analyzer: Option<&'a dyn Analyzer>,
    pub speech: Option<&'a dyn SpeechSynthesizer>,
    pub email: Option<&'a dyn EmailSender>,
}

/// Result of an optional delivery step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Skipped,
    Done(String),
    Failed(String),
}

impl StepOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Summary of a finished run.
#[derive(Debug)]
pub struct RunResult {
    pub kind: ReportKind,
    pub report_path: PathBuf,
    pub backup_path: PathBuf,
    pub html_path: Option<PathBuf>,
    pub audio_path: Option<PathBuf>,
    /// Exact body sent, present only when the email body was truncated.
    pub sent_body_path: Option<PathBuf>,
    pub item_count: usize,
    pub complete: bool,
    pub fallback: bool,
    pub job_url: Option<String>,
    pub audio: StepOutcome,
    pub email: StepOutcome,
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each status check while waiting on a webset.
    fn poll_status(&self, status: &str, found: u64, elapsed: Duration);
    /// Called when the run completes.
    fn done(&self, result: &RunResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn poll_status(&self, _status: &str, _found: u64, _elapsed: Duration) {}
    fn done(&self, _result: &RunResult) {}
}

/// Adapts a `ProgressReporter` to the poller's observer interface and logs
/// what the poller itself does not.
struct PipelinePollObserver<'a> {
    inner: &'a dyn ProgressReporter,
}

impl PollObserver for PipelinePollObserver<'_> {
    fn on_status(&self, snapshot: &StatusSnapshot, elapsed: Duration) {
        tracing::debug!(status = %snapshot.status, found = snapshot.found, ?elapsed, "poll");
        self.inner
            .poll_status(snapshot.status.as_str(), snapshot.found, elapsed);
    }

    fn on_items(&self, batch: &ItemBatch) {
        tracing::debug!(
            items = batch.items.len(),
            enrichments_completed = batch.enrichments_completed,
            enrichments_total = batch.enrichments_total,
            "items fetched"
        );
    }

    fn on_transient_error(&self, error: &NewsDigestError, consecutive: u32) {
        warn!(%error, consecutive, "transient polling error");
    }

    fn on_budget_exhausted(&self, elapsed: Duration) {
        warn!(?elapsed, "polling budget exhausted, using partial results");
    }
}

// ---------------------------------------------------------------------------
// Flows
// ---------------------------------------------------------------------------

/// Enriched-webset newsletter.
#[instrument(skip_all, fields(topic = %settings.topic, count = settings.count))]
pub async fn run_digest(
    settings: &RunSettings,
    webset: &dyn WebsetApi,
    services: &Services<'_>,
    progress: &dyn ProgressReporter,
) -> Result<RunResult> {
    let start = Instant::now();
    let request = request::newsletter_request(
        &settings.topic,
        settings.count,
        settings.generated_at.date_naive(),
    )?;

    let fetched = fetch_webset(&request, settings, webset, services, progress).await?;
    let draft = Draft {
        kind: ReportKind::Newsletter,
        query: request.query.clone(),
        enrichment_order: request.enrichment_order(),
        lead: None,
        fetched,
    };
    finish(draft, settings, services, progress, start).await
}

/// Trusted-domain news webset followed by an AI trend analysis.
#[instrument(skip_all, fields(topic = %settings.topic, count = settings.count))]
pub async fn run_analysis(
    settings: &RunSettings,
    webset: &dyn WebsetApi,
    services: &Services<'_>,
    progress: &dyn ProgressReporter,
) -> Result<RunResult> {
    let start = Instant::now();
    let request = request::analysis_request(
        &settings.topic,
        settings.count,
        &settings.news_domains,
        settings.generated_at.date_naive(),
    )?;

    let fetched = fetch_webset(&request, settings, webset, services, progress).await?;

    progress.phase("Analyzing trends");
    let analysis = analyze_or_placeholder(services.analyzer, &settings.topic, &fetched.items).await;

    let draft = Draft {
        kind: ReportKind::Analysis,
        query: request.query.clone(),
        enrichment_order: Vec::new(),
        lead: Some(LeadSection {
            heading: "AI Analysis".into(),
            body: analysis,
        }),
        fetched,
    };
    finish(draft, settings, services, progress, start).await
}

/// Single grounded answer with its citations as items.
#[instrument(skip_all, fields(topic = %settings.topic))]
pub async fn run_answer(
    settings: &RunSettings,
    answers: &dyn AnswerSource,
    services: &Services<'_>,
    progress: &dyn ProgressReporter,
) -> Result<RunResult> {
    let start = Instant::now();
    let request = request::answer_request(
        &settings.topic,
        &settings.news_domains,
        settings.generated_at.date_naive(),
    )?;

    progress.phase("Requesting answer");
    let (lead, fetched) = match answers.answer(&request).await {
        Ok(response) => {
            let items: Vec<ResultItem> = response.citations.into_iter().map(Into::into).collect();
            let lead = LeadSection {
                heading: format!("{} Highlights", settings.topic),
                body: response.answer,
            };
            let fetched = Fetched {
                items,
                complete: true,
                fallback: false,
                job: None,
            };
            (Some(lead), fetched)
        }
        Err(e) if settings.sample_fallback => {
            warn!(error = %e, "answer request failed, using sample content");
            (None, Fetched::sample(&settings.topic, None))
        }
        Err(e) => return Err(e),
    };

    let draft = Draft {
        kind: ReportKind::Answer,
        query: request.query,
        enrichment_order: Vec::new(),
        lead,
        fetched: fetched.with_sample_fallback(settings),
    };
    finish(draft, settings, services, progress, start).await
}

// ---------------------------------------------------------------------------
// Shared steps
// ---------------------------------------------------------------------------

struct Fetched {
    items: Vec<ResultItem>,
    complete: bool,
    fallback: bool,
    job: Option<(JobHandle, String)>,
}

impl Fetched {
    fn sample(topic: &str, job: Option<(JobHandle, String)>) -> Self {
        Self {
            items: sample_items(topic),
            complete: false,
            fallback: true,
            job,
        }
    }

    /// Substitute sample items for an empty result when enabled.
    fn with_sample_fallback(self, settings: &RunSettings) -> Self {
        if self.items.is_empty() && settings.sample_fallback {
            warn!(topic = %settings.topic, "no results, using sample content");
            return Self::sample(&settings.topic, self.job);
        }
        self
    }
}

struct Draft {
    kind: ReportKind,
    query: String,
    enrichment_order: Vec<String>,
    lead: Option<LeadSection>,
    fetched: Fetched,
}

/// Create the webset and wait for it. Creation and job failure are fatal;
/// other polling errors degrade to an incomplete, empty result.
async fn fetch_webset(
    request: &SearchRequest,
    settings: &RunSettings,
    webset: &dyn WebsetApi,
    services: &Services<'_>,
    progress: &dyn ProgressReporter,
) -> Result<Fetched> {
    progress.phase("Creating webset");
    let handle = webset.create(request).await?;
    let job_url = handle.dashboard_url(&settings.dashboard_url);
    info!(webset_id = %handle.id, %job_url, "webset submitted");

    progress.phase("Waiting for results");
    let observer = PipelinePollObserver { inner: progress };
    let fetched = match poll_until_terminal(&handle, &settings.budget, webset, services.clock, &observer)
        .await
    {
        Ok(outcome) => {
            info!(
                items = outcome.items.len(),
                complete = outcome.complete,
                polls = outcome.polls,
                "polling finished"
            );
            Fetched {
                items: outcome.items,
                complete: outcome.complete,
                fallback: false,
                job: Some((handle, job_url)),
            }
        }
        Err(e @ NewsDigestError::JobFailed { .. }) => return Err(e),
        Err(e) => {
            warn!(error = %e, "polling gave up, writing an incomplete report");
            Fetched {
                items: Vec::new(),
                complete: false,
                fallback: false,
                job: Some((handle, job_url)),
            }
        }
    };

    Ok(fetched.with_sample_fallback(settings))
}

/// Render, persist, then deliver.
async fn finish(
    draft: Draft,
    settings: &RunSettings,
    services: &Services<'_>,
    progress: &dyn ProgressReporter,
    start: Instant,
) -> Result<RunResult> {
    let Draft {
        kind,
        query,
        enrichment_order,
        lead,
        fetched,
    } = draft;

    let (job_id, job_url) = match &fetched.job {
        Some((handle, url)) => (Some(handle.id.clone()), Some(url.clone())),
        None => (None, None),
    };

    progress.phase("Formatting report");
    let ctx = ReportContext {
        title: kind.title().to_string(),
        topic: settings.topic.clone(),
        query,
        generated_at: settings.generated_at,
        complete: fetched.complete,
        fallback: fetched.fallback,
        job_id,
        job_url: job_url.clone(),
        lead,
        enrichment_order,
    };
    let items = fetched.items;
    let report = render_report(&items, &ctx);
    let backup = backup_to_json(&build_backup(&items, &ctx))?;

    progress.phase("Saving report");
    let writer = OutputWriter::new(&settings.output_dir, settings.generated_at);
    let stem = writer.stem(kind.as_str());
    let report_path = writer.write_text(&format!("{stem}.md"), &report.text)?.path;
    let backup_path = writer.write_text(&format!("{stem}.json"), &backup)?.path;
    let html_path = if settings.html {
        Some(writer.write_text(&format!("{stem}.html"), &render_html(&report))?.path)
    } else {
        None
    };

    let mut audio_bytes = None;
    let mut audio_path = None;
    let audio = if settings.audio {
        progress.phase("Synthesizing audio");
        match synthesize(&report, ctx.lead.as_ref(), &items, settings, services).await {
            Ok(Some(bytes)) => {
                let path = writer
                    .write_bytes(&Path::new("audio").join(format!("{stem}.mp3")), &bytes)?
                    .path;
                audio_bytes = Some(bytes);
                audio_path = Some(path.clone());
                StepOutcome::Done(path.display().to_string())
            }
            Ok(None) => StepOutcome::Skipped,
            Err(e) => {
                warn!(error = %e, "audio synthesis failed, continuing without audio");
                StepOutcome::Failed(e.to_string())
            }
        }
    } else {
        StepOutcome::Skipped
    };

    let mut sent_body_path = None;
    let email = match (&settings.email, services.email) {
        (Some(plan), Some(sender)) => {
            progress.phase("Sending email");
            let body = truncate_body(&report.text, plan.max_body_chars);
            if body.truncated {
                warn!(limit = plan.max_body_chars, "email body truncated");
                sent_body_path = Some(writer.write_text(&format!("{stem}_sent.txt"), &body.text)?.path);
            }
            let message = build_email(plan, &report, body.text, audio_bytes);
            match sender.send(&message).await {
                Ok(()) => StepOutcome::Done(format!(
                    "sent to {} recipient(s) via {}",
                    plan.to.len(),
                    sender.name()
                )),
                Err(e) => {
                    warn!(error = %e, "email delivery failed");
                    StepOutcome::Failed(e.to_string())
                }
            }
        }
        _ => StepOutcome::Skipped,
    };

    let result = RunResult {
        kind,
        report_path,
        backup_path,
        html_path,
        audio_path,
        sent_body_path,
        item_count: items.len(),
        complete: fetched.complete,
        fallback: fetched.fallback,
        job_url,
        audio,
        email,
        elapsed: start.elapsed(),
    };

    info!(
        kind = kind.as_str(),
        items = result.item_count,
        complete = result.complete,
        elapsed_ms = result.elapsed.as_millis() as u64,
        "run complete"
    );
    progress.done(&result);
    Ok(result)
}

async fn synthesize(
    report: &Report,
    lead: Option<&LeadSection>,
    items: &[ResultItem],
    settings: &RunSettings,
    services: &Services<'_>,
) -> Result<Option<Vec<u8>>> {
    let Some(speech) = services.speech else {
        return Ok(None);
    };
    let script = audio_script(&report.meta, lead, items, settings.max_speech_words);
    speech.synthesize(&script).await.map(Some)
}

fn build_email(plan: &EmailPlan, report: &Report, text: String, audio: Option<Vec<u8>>) -> EmailMessage {
    let html = render_html(&Report {
        meta: report.meta.clone(),
        text: text.clone(),
    });
    EmailMessage {
        from: plan.from.clone(),
        to: plan.to.clone(),
        subject: format!(
            "{} - {}",
            plan.subject_prefix,
            report.meta.generated_at.format("%B %d, %Y")
        ),
        text,
        html: Some(html),
        attachments: audio
            .map(|bytes| Attachment {
                filename: AUDIO_ATTACHMENT_NAME.to_string(),
                content_type: "audio/mpeg".to_string(),
                bytes,
            })
            .into_iter()
            .collect(),
    }
}

/// Placeholder items used only when sample fallback is enabled.
pub fn sample_items(topic: &str) -> Vec<ResultItem> {
    let mut item = ResultItem::new("https://example.com/news1");
    item.title = Some(format!("Recent {topic} Development"));
    item.snippet = Some(format!(
        "Sample entry: no live {topic} results were available for this run."
    ));
    item.enrichments.insert(
        "Article Summary".into(),
        format!("Significant advancement in {topic} technology with new breakthrough announced."),
    );
    vec![item]
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use newsdigest_shared::JobStatus;
    use newsdigest_websets::{AnswerRequest, AnswerResponse, Citation};

    use super::*;
    use crate::formatter::parse_backup;
    use crate::poller::testing::{FakeClock, ScriptedWebset, batch, item, snapshot};

    fn settings(dir: &Path) -> RunSettings {
        RunSettings {
            topic: "AI startups".into(),
            count: 3,
            output_dir: dir.to_path_buf(),
            dashboard_url: "https://websets.exa.ai".into(),
            news_domains: vec!["reuters.com".into()],
            budget: PollBudget {
                interval: Duration::from_secs(10),
                timeout: Duration::from_secs(60),
                max_transient_errors: 2,
                enrichment_threshold: 0.8,
            },
            sample_fallback: false,
            html: false,
            audio: false,
            max_speech_words: 200,
            email: None,
            generated_at: Utc.with_ymd_and_hms(2026, 10, 15, 9, 30, 0).unwrap(),
        }
    }

    fn services(clock: &FakeClock) -> Services<'_> {
        Services {
            clock,
            analyzer: None,
            speech: None,
            email: None,
        }
    }

    fn done_webset() -> ScriptedWebset {
        ScriptedWebset::new(
            vec![Ok(snapshot(JobStatus::Running)), Ok(snapshot(JobStatus::Idle))],
            batch(
                vec![item("https://a.example", "A"), item("https://b.example", "B"), item("https://c.example", "C")],
                9,
                9,
            ),
        )
    }

    struct FakeSpeech;

    #[async_trait]
    impl SpeechSynthesizer for FakeSpeech {
        async fn synthesize(&self, _text: &str) -> Result<Vec<u8>> {
            Ok(vec![7, 7, 7])
        }
    }

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<EmailMessage>>,
        fail: bool,
    }

    #[async_trait]
    impl EmailSender for RecordingSender {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn send(&self, message: &EmailMessage) -> Result<()> {
            self.sent.lock().unwrap().push(message.clone());
            if self.fail {
                Err(NewsDigestError::Delivery("smtp down".into()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn digest_writes_report_in_item_order() {
        let tmp = tempfile::tempdir().unwrap();
        let clock = FakeClock::default();
        let webset = done_webset();

        let result = run_digest(&settings(tmp.path()), &webset, &services(&clock), &SilentProgress)
            .await
            .unwrap();

        assert!(result.complete);
        assert_eq!(result.item_count, 3);
        assert_eq!(
            result.report_path,
            tmp.path().join("newsletter_20261015_093000.md")
        );
        let text = std::fs::read_to_string(&result.report_path).unwrap();
        let a = text.find("## Story 1: A").unwrap();
        let b = text.find("## Story 2: B").unwrap();
        let c = text.find("## Story 3: C").unwrap();
        assert!(a < b && b < c);
        assert!(text.contains("Articles analyzed: 3"));
        assert!(text.contains("https://websets.exa.ai/ws_test"));

        let backup = parse_backup(&std::fs::read_to_string(&result.backup_path).unwrap()).unwrap();
        assert_eq!(backup.items.len(), 3);
        assert_eq!(backup.enrichment_order[0], "Article Summary");

        let created = webset.created.lock().unwrap();
        assert_eq!(created[0].topic, "AI startups");
        assert_eq!(created[0].count, 3);
    }

    #[tokio::test]
    async fn failed_creation_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("out");
        let clock = FakeClock::default();
        let webset = ScriptedWebset::failing_create(500);

        let err = run_digest(&settings(&out), &webset, &services(&clock), &SilentProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, NewsDigestError::Api { status: 500, .. }));
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn failed_job_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("out");
        let clock = FakeClock::default();
        let webset = ScriptedWebset::new(vec![Ok(snapshot(JobStatus::Failed))], ItemBatch::default());

        let err = run_digest(&settings(&out), &webset, &services(&clock), &SilentProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, NewsDigestError::JobFailed { .. }));
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn timeout_produces_incomplete_report() {
        let tmp = tempfile::tempdir().unwrap();
        let clock = FakeClock::default();
        let webset = ScriptedWebset::new(
            vec![Ok(snapshot(JobStatus::Running))],
            batch(vec![item("https://a.example", "A")], 0, 3),
        );

        let result = run_digest(&settings(tmp.path()), &webset, &services(&clock), &SilentProgress)
            .await
            .unwrap();

        assert!(!result.complete);
        assert_eq!(result.item_count, 1);
        let text = std::fs::read_to_string(&result.report_path).unwrap();
        assert!(text.contains("- Status: incomplete"));
    }

    #[tokio::test]
    async fn empty_run_uses_sample_only_when_enabled() {
        let tmp = tempfile::tempdir().unwrap();
        let clock = FakeClock::default();
        let mut cfg = settings(tmp.path());

        let webset = ScriptedWebset::new(vec![Ok(snapshot(JobStatus::Running))], ItemBatch::default());
        let result = run_digest(&cfg, &webset, &services(&clock), &SilentProgress)
            .await
            .unwrap();
        assert_eq!(result.item_count, 0);
        assert!(!result.fallback);

        cfg.sample_fallback = true;
        cfg.generated_at = Utc.with_ymd_and_hms(2026, 10, 15, 9, 31, 0).unwrap();
        let clock = FakeClock::default();
        let webset = ScriptedWebset::new(vec![Ok(snapshot(JobStatus::Running))], ItemBatch::default());
        let result = run_digest(&cfg, &webset, &services(&clock), &SilentProgress)
            .await
            .unwrap();
        assert!(result.fallback);
        assert_eq!(result.item_count, 1);
        let backup = parse_backup(&std::fs::read_to_string(&result.backup_path).unwrap()).unwrap();
        assert!(backup.meta.fallback);
    }

    #[tokio::test]
    async fn audio_and_email_are_delivered() {
        let tmp = tempfile::tempdir().unwrap();
        let clock = FakeClock::default();
        let webset = done_webset();
        let sender = RecordingSender::default();
        let mut cfg = settings(tmp.path());
        cfg.audio = true;
        cfg.html = true;
        cfg.email = Some(EmailPlan {
            from: "news@example.com".into(),
            to: vec!["reader@example.com".into()],
            subject_prefix: "AI Newsletter".into(),
            max_body_chars: 20_000,
        });
        let services = Services {
            clock: &clock,
            analyzer: None,
            speech: Some(&FakeSpeech),
            email: Some(&sender),
        };

        let result = run_digest(&cfg, &webset, &services, &SilentProgress).await.unwrap();

        let audio_path = result.audio_path.clone().unwrap();
        assert_eq!(audio_path, tmp.path().join("audio/newsletter_20261015_093000.mp3"));
        assert_eq!(std::fs::read(&audio_path).unwrap(), vec![7, 7, 7]);
        assert!(result.html_path.unwrap().exists());
        assert!(matches!(result.email, StepOutcome::Done(_)));
        assert!(result.sent_body_path.is_none());

        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent[0].subject, "AI Newsletter - October 15, 2026");
        assert_eq!(sent[0].attachments[0].filename, "newsletter_summary.mp3");
    }

    #[tokio::test]
    async fn email_failure_keeps_files_and_records_truncation() {
        let tmp = tempfile::tempdir().unwrap();
        let clock = FakeClock::default();
        let webset = done_webset();
        let sender = RecordingSender {
            fail: true,
            ..RecordingSender::default()
        };
        let mut cfg = settings(tmp.path());
        cfg.email = Some(EmailPlan {
            from: "news@example.com".into(),
            to: vec!["reader@example.com".into()],
            subject_prefix: "AI Newsletter".into(),
            max_body_chars: 200,
        });
        let services = Services {
            clock: &clock,
            analyzer: None,
            speech: None,
            email: Some(&sender),
        };

        let result = run_digest(&cfg, &webset, &services, &SilentProgress).await.unwrap();

        assert!(result.email.is_failed());
        assert!(result.report_path.exists());
        let sent_path = result.sent_body_path.unwrap();
        let sent_text = std::fs::read_to_string(sent_path).unwrap();
        assert_eq!(sent_text, sender.sent.lock().unwrap()[0].text);
    }

    struct FixedAnalyzer;

    #[async_trait]
    impl Analyzer for FixedAnalyzer {
        async fn analyze(&self, _topic: &str, items: &[ResultItem]) -> Result<String> {
            Ok(format!("{} articles show growth.", items.len()))
        }
    }

    #[tokio::test]
    async fn analysis_report_leads_with_analysis() {
        let tmp = tempfile::tempdir().unwrap();
        let clock = FakeClock::default();
        let webset = done_webset();
        let services = Services {
            clock: &clock,
            analyzer: Some(&FixedAnalyzer),
            speech: None,
            email: None,
        };

        let result = run_analysis(&settings(tmp.path()), &webset, &services, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(result.kind, ReportKind::Analysis);
        let text = std::fs::read_to_string(&result.report_path).unwrap();
        assert!(text.contains("## AI Analysis\n\n3 articles show growth."));
        assert_eq!(webset.created.lock().unwrap()[0].include_domains, vec!["reuters.com"]);
    }

    struct FixedAnswers;

    #[async_trait]
    impl AnswerSource for FixedAnswers {
        async fn answer(&self, _request: &AnswerRequest) -> Result<AnswerResponse> {
            Ok(AnswerResponse {
                answer: "Chips got faster.".into(),
                citations: vec![Citation {
                    url: "https://reuters.com/chips".into(),
                    title: Some("Faster chips".into()),
                    text: None,
                    published_date: None,
                    author: None,
                }],
            })
        }
    }

    #[tokio::test]
    async fn answer_report_lists_citations() {
        let tmp = tempfile::tempdir().unwrap();
        let clock = FakeClock::default();

        let result = run_answer(&settings(tmp.path()), &FixedAnswers, &services(&clock), &SilentProgress)
            .await
            .unwrap();

        assert!(result.complete);
        assert!(result.job_url.is_none());
        let text = std::fs::read_to_string(&result.report_path).unwrap();
        assert!(text.contains("## AI startups Highlights\n\nChips got faster."));
        assert!(text.contains("## Story 1: Faster chips"));
    }
}
