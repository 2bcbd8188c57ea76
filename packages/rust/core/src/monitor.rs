//! Scheduled webset monitoring.
//!
//! `start_monitor` creates a webset plus a recurring monitor on it.
//! `watch_new_items` then re-reads the webset on a fixed interval and hands
//! every item whose URL has not been seen before to a callback, until the
//! shutdown future resolves.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use newsdigest_shared::{JobHandle, Result, ResultItem};
use newsdigest_websets::{JobSource, MonitorHandle, MonitorSpec, WebsetApi};
use tracing::{info, instrument, warn};

use crate::poller::Clock;
use crate::request;

/// Default cron: every day at 09:00.
pub const DEFAULT_CRON: &str = "0 9 * * *";
pub const DEFAULT_TIMEZONE: &str = "UTC";

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub topic: String,
    pub count: u32,
    pub cron: String,
    pub timezone: String,
    pub dashboard_url: String,
}

/// Handles of a running monitor.
#[derive(Debug, Clone)]
pub struct MonitorSession {
    pub webset: JobHandle,
    pub monitor: MonitorHandle,
    pub dashboard_url: String,
}

/// Create the webset and attach a recurring search monitor to it.
#[instrument(skip_all, fields(topic = %settings.topic, cron = %settings.cron))]
pub async fn start_monitor(settings: &MonitorSettings, api: &dyn WebsetApi) -> Result<MonitorSession> {
    let search = request::monitor_request(&settings.topic, settings.count)?;
    let webset = api.create(&search).await?;

    let spec = MonitorSpec {
        webset_id: webset.id.clone(),
        cron: settings.cron.clone(),
        timezone: settings.timezone.clone(),
        query: search.query,
        count: search.count,
    };
    let monitor = api.create_monitor(&spec).await?;
    let dashboard_url = webset.dashboard_url(&settings.dashboard_url);

    info!(webset_id = %webset.id, monitor_id = %monitor.id, "monitor scheduled");
    Ok(MonitorSession {
        webset,
        monitor,
        dashboard_url,
    })
}

/// URLs already reported.
#[derive(Debug, Default)]
pub struct SeenUrls(HashSet<String>);

impl SeenUrls {
    /// Keep only items not seen before, remembering them.
    pub fn fresh(&mut self, items: Vec<ResultItem>) -> Vec<ResultItem> {
        items
            .into_iter()
            .filter(|item| self.0.insert(item.url.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Re-read `handle` every `interval`, reporting unseen items.
///
/// Transient fetch errors are logged and retried on the next tick. Stops when
/// `shutdown` resolves or after `max_checks` reads. Returns the number of
/// distinct items reported.
pub async fn watch_new_items<S, F>(
    handle: &JobHandle,
    source: &S,
    clock: &dyn Clock,
    interval: Duration,
    max_checks: Option<u32>,
    shutdown: F,
    on_new: &mut dyn FnMut(&[ResultItem]),
) -> Result<usize>
where
    S: JobSource + ?Sized,
    F: Future<Output = ()>,
{
    let mut seen = SeenUrls::default();
    let mut checks = 0u32;
    tokio::pin!(shutdown);

    loop {
        checks += 1;
        match source.items(handle).await {
            Ok(batch) => {
                let fresh = seen.fresh(batch.items);
                if !fresh.is_empty() {
                    info!(new = fresh.len(), total = seen.len(), "new monitor results");
                    on_new(&fresh);
                }
            }
            Err(e) if e.is_transient() => warn!(error = %e, "monitor check failed, retrying"),
            Err(e) => return Err(e),
        }

        if max_checks.is_some_and(|max| checks >= max) {
            break;
        }

        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("monitor watch stopped");
                break;
            }
            _ = clock.sleep(interval) => {}
        }
    }

    Ok(seen.len())
}
