//! Poll a webset until it reaches a terminal state or the budget runs out.
//!
//! The poller owns no I/O of its own: the transport, the clock and the
//! progress sink are all injected, so the whole loop runs under a fake
//! clock in tests. It also never logs; callers observe it through
//! [`PollObserver`].

use std::time::Duration;

use async_trait::async_trait;
use newsdigest_shared::{JobHandle, JobStatus, NewsDigestError, PollingConfig, Result, ResultItem};
use newsdigest_websets::{ItemBatch, JobSource, StatusSnapshot};

// ---------------------------------------------------------------------------
// Budget
// ---------------------------------------------------------------------------

/// Limits for a single polling run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollBudget {
    /// Fixed delay between status checks.
    pub interval: Duration,
    /// Wall-clock budget measured from the first check.
    pub timeout: Duration,
    /// Consecutive transient failures tolerated before giving up.
    pub max_transient_errors: u32,
    /// Enrichment completion ratio treated as "done enough".
    pub enrichment_threshold: f64,
}

impl From<&PollingConfig> for PollBudget {
    fn from(config: &PollingConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_secs),
            timeout: Duration::from_secs(config.timeout_secs),
            max_transient_errors: config.max_transient_errors,
            enrichment_threshold: config.enrichment_threshold,
        }
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Time source for the poll loop.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock was created.
    fn elapsed(&self) -> Duration;
    async fn sleep(&self, duration: Duration);
}

/// Real clock backed by the Tokio timer.
#[derive(Debug)]
pub struct TokioClock {
    start: tokio::time::Instant,
}

impl TokioClock {
    pub fn start() -> Self {
        Self {
            start: tokio::time::Instant::now(),
        }
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Receives poll progress. Every method defaults to a no-op.
pub trait PollObserver: Send + Sync {
    fn on_status(&self, _snapshot: &StatusSnapshot, _elapsed: Duration) {}
    fn on_items(&self, _batch: &ItemBatch) {}
    fn on_transient_error(&self, _error: &NewsDigestError, _consecutive: u32) {}
    fn on_budget_exhausted(&self, _elapsed: Duration) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl PollObserver for NoopObserver {}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// What the poller ended with.
#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome {
    /// Last status observed.
    pub status: JobStatus,
    pub items: Vec<ResultItem>,
    /// False when the budget ran out first.
    pub complete: bool,
    pub elapsed: Duration,
    /// Number of status checks issued.
    pub polls: u32,
    pub enrichment_ratio: Option<f64>,
}

// ---------------------------------------------------------------------------
// Poll loop
// ---------------------------------------------------------------------------

/// Poll `handle` until the webset finishes, fails, or the budget is spent.
///
/// - done with items and enough enrichments: `complete = true`
/// - `failed`: [`NewsDigestError::JobFailed`]
/// - budget spent: whatever items exist, `complete = false`
/// - more than `max_transient_errors` consecutive transient failures: the last error
pub async fn poll_until_terminal<S>(
    handle: &JobHandle,
    budget: &PollBudget,
    source: &S,
    clock: &dyn Clock,
    observer: &dyn PollObserver,
) -> Result<PollOutcome>
where
    S: JobSource + ?Sized,
{
    let mut polls = 0u32;
    let mut consecutive_errors = 0u32;
    let mut last_status = JobStatus::Pending;
    let mut last_batch: Option<ItemBatch> = None;

    loop {
        polls += 1;
        match check_once(handle, budget, source, observer, clock).await {
            Ok(Check::Complete { status, batch }) => {
                return Ok(PollOutcome {
                    status,
                    enrichment_ratio: batch.enrichment_ratio(),
                    items: batch.items,
                    complete: true,
                    elapsed: clock.elapsed(),
                    polls,
                });
            }
            Ok(Check::Pending { status, batch }) => {
                consecutive_errors = 0;
                last_status = status;
                if batch.is_some() {
                    last_batch = batch;
                }
            }
            Err(e) if e.is_transient() => {
                consecutive_errors += 1;
                observer.on_transient_error(&e, consecutive_errors);
                if consecutive_errors > budget.max_transient_errors {
                    return Err(e);
                }
            }
            Err(e) => return Err(e),
        }

        let elapsed = clock.elapsed();
        if elapsed >= budget.timeout {
            break;
        }
        clock.sleep(budget.interval.min(budget.timeout - elapsed)).await;
        if clock.elapsed() >= budget.timeout {
            break;
        }
    }

    let elapsed = clock.elapsed();
    observer.on_budget_exhausted(elapsed);

    let batch = match source.items(handle).await {
        Ok(batch) => {
            observer.on_items(&batch);
            batch
        }
        Err(e) => {
            observer.on_transient_error(&e, consecutive_errors + 1);
            last_batch.unwrap_or_default()
        }
    };

    Ok(PollOutcome {
        status: last_status,
        enrichment_ratio: batch.enrichment_ratio(),
        items: batch.items,
        complete: false,
        elapsed,
        polls,
    })
}

enum Check {
    Complete { status: JobStatus, batch: ItemBatch },
    Pending { status: JobStatus, batch: Option<ItemBatch> },
}

async fn check_once<S>(
    handle: &JobHandle,
    budget: &PollBudget,
    source: &S,
    observer: &dyn PollObserver,
    clock: &dyn Clock,
) -> Result<Check>
where
    S: JobSource + ?Sized,
{
    let snapshot = source.status(handle).await?;
    observer.on_status(&snapshot, clock.elapsed());

    if snapshot.status.is_failed() {
        return Err(NewsDigestError::JobFailed {
            job_id: handle.id.clone(),
            detail: format!(
                "webset reported status failed after finding {} items",
                snapshot.found
            ),
        });
    }

    if !snapshot.status.is_done() {
        return Ok(Check::Pending {
            status: snapshot.status,
            batch: None,
        });
    }

    // Items can lag the status flip, and enrichments run after the search.
    let batch = source.items(handle).await?;
    observer.on_items(&batch);

    let enriched = batch.enrichments_settled(budget.enrichment_threshold);

    if !batch.items.is_empty() && enriched {
        Ok(Check::Complete {
            status: snapshot.status,
            batch,
        })
    } else {
        Ok(Check::Pending {
            status: snapshot.status,
            batch: Some(batch),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted fakes shared by the poller, pipeline and monitor tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use newsdigest_shared::SearchRequest;
    use newsdigest_websets::{MonitorHandle, MonitorSpec, WebsetApi};

    use super::*;

    /// Clock whose time only advances when something sleeps.
    #[derive(Default)]
    pub struct FakeClock {
        now: Mutex<Duration>,
        pub longest_sleep: Mutex<Duration>,
    }

    #[async_trait]
    impl Clock for FakeClock {
        fn elapsed(&self) -> Duration {
            *self.now.lock().unwrap()
        }

        async fn sleep(&self, duration: Duration) {
            *self.now.lock().unwrap() += duration;
            let mut longest = self.longest_sleep.lock().unwrap();
            if duration > *longest {
                *longest = duration;
            }
        }
    }

    /// Webset that replays scripted statuses; the last entry repeats forever.
    pub struct ScriptedWebset {
        pub statuses: Mutex<VecDeque<Result<StatusSnapshot>>>,
        pub last: Mutex<Option<StatusSnapshot>>,
        pub batch: Mutex<ItemBatch>,
        pub create_error: Option<u16>,
        pub created: Mutex<Vec<SearchRequest>>,
        pub status_calls: Mutex<u32>,
    }

    impl ScriptedWebset {
        pub fn new(statuses: Vec<Result<StatusSnapshot>>, batch: ItemBatch) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                last: Mutex::new(None),
                batch: Mutex::new(batch),
                create_error: None,
                created: Mutex::new(Vec::new()),
                status_calls: Mutex::new(0),
            }
        }

        pub fn failing_create(status: u16) -> Self {
            let mut webset = Self::new(Vec::new(), ItemBatch::default());
            webset.create_error = Some(status);
            webset
        }
    }

    pub fn snapshot(status: JobStatus) -> StatusSnapshot {
        StatusSnapshot {
            status,
            found: 0,
            completion: 0.0,
        }
    }

    pub fn item(url: &str, title: &str) -> ResultItem {
        let mut item = ResultItem::new(url);
        item.title = Some(title.to_string());
        item
    }

    pub fn batch(items: Vec<ResultItem>, completed: usize, total: usize) -> ItemBatch {
        ItemBatch {
            items,
            enrichments_completed: completed,
            enrichments_total: total,
            enrichments_requested: 0,
        }
    }

    /// Batch from a webset that defines `requested` enrichment columns.
    pub fn requesting(requested: usize, batch: ItemBatch) -> ItemBatch {
        ItemBatch {
            enrichments_requested: requested,
            ..batch
        }
    }

    #[async_trait]
    impl JobSource for ScriptedWebset {
        async fn status(&self, _handle: &JobHandle) -> Result<StatusSnapshot> {
            *self.status_calls.lock().unwrap() += 1;
            let next = self.statuses.lock().unwrap().pop_front();
            match next {
                Some(Ok(snapshot)) => {
                    *self.last.lock().unwrap() = Some(snapshot.clone());
                    Ok(snapshot)
                }
                Some(Err(e)) => Err(e),
                None => Ok(self
                    .last
                    .lock()
                    .unwrap()
                    .clone()
                    .unwrap_or_else(|| snapshot(JobStatus::Running))),
            }
        }

        async fn items(&self, _handle: &JobHandle) -> Result<ItemBatch> {
            Ok(self.batch.lock().unwrap().clone())
        }
    }

    #[async_trait]
    impl WebsetApi for ScriptedWebset {
        async fn create(&self, request: &SearchRequest) -> Result<JobHandle> {
            if let Some(status) = self.create_error {
                return Err(NewsDigestError::Api {
                    service: "exa",
                    status,
                    body: "rejected".into(),
                });
            }
            self.created.lock().unwrap().push(request.clone());
            Ok(JobHandle::new("ws_test"))
        }

        async fn create_monitor(&self, spec: &MonitorSpec) -> Result<MonitorHandle> {
            Ok(MonitorHandle {
                id: format!("mon_{}", spec.webset_id),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn budget() -> PollBudget {
        PollBudget {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(60),
            max_transient_errors: 2,
            enrichment_threshold: 0.8,
        }
    }

    fn network_error() -> Result<StatusSnapshot> {
        Err(NewsDigestError::Network("connection reset".into()))
    }

    #[tokio::test]
    async fn returns_complete_when_done_and_enriched() {
        let source = ScriptedWebset::new(
            vec![
                Ok(snapshot(JobStatus::Running)),
                Ok(snapshot(JobStatus::Idle)),
            ],
            batch(vec![item("https://a", "A")], 3, 3),
        );
        let clock = FakeClock::default();

        let outcome = poll_until_terminal(&JobHandle::new("ws"), &budget(), &source, &clock, &NoopObserver)
            .await
            .unwrap();

        assert!(outcome.complete);
        assert_eq!(outcome.status, JobStatus::Idle);
        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.polls, 2);
        assert_eq!(clock.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn never_terminating_job_is_incomplete_within_one_interval() {
        let source = ScriptedWebset::new(
            vec![Ok(snapshot(JobStatus::Running))],
            batch(vec![item("https://a", "A")], 0, 3),
        );
        let clock = FakeClock::default();
        let budget = budget();

        let outcome = poll_until_terminal(&JobHandle::new("ws"), &budget, &source, &clock, &NoopObserver)
            .await
            .unwrap();

        assert!(!outcome.complete);
        assert_eq!(outcome.items.len(), 1);
        assert!(outcome.elapsed >= budget.timeout);
        assert!(outcome.elapsed <= budget.timeout + budget.interval);
    }

    #[tokio::test]
    async fn never_sleeps_past_the_budget() {
        let source = ScriptedWebset::new(vec![Ok(snapshot(JobStatus::Running))], ItemBatch::default());
        let clock = FakeClock::default();
        let budget = PollBudget {
            interval: Duration::from_secs(25),
            timeout: Duration::from_secs(60),
            ..budget()
        };

        let outcome = poll_until_terminal(&JobHandle::new("ws"), &budget, &source, &clock, &NoopObserver)
            .await
            .unwrap();

        assert!(!outcome.complete);
        assert_eq!(outcome.elapsed, Duration::from_secs(60));
        assert!(outcome.items.is_empty());
    }

    #[tokio::test]
    async fn failed_job_is_an_error() {
        let source = ScriptedWebset::new(vec![Ok(snapshot(JobStatus::Failed))], ItemBatch::default());
        let clock = FakeClock::default();

        let err = poll_until_terminal(&JobHandle::new("ws_x"), &budget(), &source, &clock, &NoopObserver)
            .await
            .unwrap_err();

        assert!(matches!(err, NewsDigestError::JobFailed { ref job_id, .. } if job_id == "ws_x"));
    }

    #[tokio::test]
    async fn waits_for_enrichment_threshold() {
        let source = ScriptedWebset::new(
            vec![Ok(snapshot(JobStatus::Idle))],
            batch(vec![item("https://a", "A")], 1, 3),
        );
        let clock = FakeClock::default();

        let outcome = poll_until_terminal(&JobHandle::new("ws"), &budget(), &source, &clock, &NoopObserver)
            .await
            .unwrap();

        assert!(!outcome.complete);
        assert_eq!(outcome.status, JobStatus::Idle);
        assert!(outcome.polls > 1);
    }

    #[tokio::test]
    async fn requested_enrichments_without_cells_keep_polling() {
        let source = ScriptedWebset::new(
            vec![Ok(snapshot(JobStatus::Idle))],
            requesting(3, batch(vec![item("https://a", "A")], 0, 0)),
        );
        let clock = FakeClock::default();
        let budget = PollBudget {
            timeout: Duration::from_secs(120),
            ..budget()
        };

        let outcome = poll_until_terminal(&JobHandle::new("ws"), &budget, &source, &clock, &NoopObserver)
            .await
            .unwrap();

        assert!(!outcome.complete);
        assert_eq!(outcome.items.len(), 1);
        assert!(outcome.polls > 1);
        assert_eq!(outcome.enrichment_ratio, None);
    }

    #[tokio::test]
    async fn empty_items_keep_polling() {
        let source = ScriptedWebset::new(vec![Ok(snapshot(JobStatus::Completed))], ItemBatch::default());
        let clock = FakeClock::default();

        let outcome = poll_until_terminal(&JobHandle::new("ws"), &budget(), &source, &clock, &NoopObserver)
            .await
            .unwrap();

        assert!(!outcome.complete);
        assert!(outcome.items.is_empty());
    }

    #[tokio::test]
    async fn tolerates_transient_errors_up_to_limit() {
        let source = ScriptedWebset::new(
            vec![network_error(), network_error(), Ok(snapshot(JobStatus::Idle))],
            batch(vec![item("https://a", "A")], 0, 0),
        );
        let clock = FakeClock::default();

        let outcome = poll_until_terminal(&JobHandle::new("ws"), &budget(), &source, &clock, &NoopObserver)
            .await
            .unwrap();

        assert!(outcome.complete);
        assert_eq!(outcome.enrichment_ratio, None);
    }

    #[tokio::test]
    async fn too_many_transient_errors_surface() {
        let source = ScriptedWebset::new(
            vec![network_error(), network_error(), network_error()],
            ItemBatch::default(),
        );
        let clock = FakeClock::default();

        let err = poll_until_terminal(&JobHandle::new("ws"), &budget(), &source, &clock, &NoopObserver)
            .await
            .unwrap_err();

        assert!(matches!(err, NewsDigestError::Network(_)));
        assert_eq!(*source.status_calls.lock().unwrap(), 3);
    }

    #[test]
    fn budget_from_config() {
        let budget = PollBudget::from(&PollingConfig::default());
        assert_eq!(budget.interval, Duration::from_secs(10));
        assert_eq!(budget.timeout, Duration::from_secs(180));
        assert_eq!(budget.enrichment_threshold, 0.8);
    }
}
