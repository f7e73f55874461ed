//! Metric agent
//!
//! Two loops share a pending batch:
//!
//! ```text
//! poll tick ──▶ Collector::sample ──▶ PendingBatch (merge)
//! report tick ──▶ PendingBatch::take ──▶ Reporter::send ──(failure)──▶ PendingBatch::restore
//! ```
//!
//! Pending counters are summed between reports, so a failed or slow report
//! never loses polls.

pub mod collector;
pub mod reporter;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::AgentSettings;
use crate::metric::{Metric, MetricKind};
use crate::storage::backend::sort_listing;

use collector::Collector;
use reporter::Reporter;

/// Metrics sampled since the last successful report
#[derive(Debug, Default)]
pub struct PendingBatch {
    metrics: HashMap<String, Metric>,
}

impl PendingBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge metrics in; counters add up, gauges keep the latest value
    pub fn absorb(&mut self, metrics: Vec<Metric>) {
        for metric in metrics {
            match self.metrics.get_mut(metric.id()) {
                Some(pending) => {
                    if let Err(e) = pending.merge(&metric) {
                        warn!("dropping sample: {}", e);
                    }
                }
                None => {
                    self.metrics.insert(metric.id().to_string(), metric);
                }
            }
        }
    }

    /// Merge back a batch taken before the current contents
    ///
    /// Counters add up as usual. A gauge only fills an id that has no newer
    /// sample pending.
    pub fn restore(&mut self, older: Vec<Metric>) {
        for metric in older {
            match self.metrics.get_mut(metric.id()) {
                Some(pending) if metric.kind() == MetricKind::Counter => {
                    if let Err(e) = pending.merge(&metric) {
                        warn!("dropping unreported counter: {}", e);
                    }
                }
                Some(_) => {}
                None => {
                    self.metrics.insert(metric.id().to_string(), metric);
                }
            }
        }
    }

    /// Drain everything, ordered by kind then id
    pub fn take(&mut self) -> Vec<Metric> {
        let mut metrics: Vec<Metric> = self.metrics.drain().map(|(_, m)| m).collect();
        sort_listing(&mut metrics);
        metrics
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

/// Run the agent until `cancel` fires
#[instrument(skip_all, fields(server = %settings.server_url))]
pub async fn run(settings: AgentSettings, cancel: CancellationToken) -> anyhow::Result<()> {
    let reporter = Reporter::new(&settings.server_url, settings.retrier.clone())?;
    let pending = Arc::new(Mutex::new(PendingBatch::new()));

    info!(
        "sampling every {:?}, reporting every {:?}",
        settings.poll_interval, settings.report_interval
    );

    let poller = tokio::spawn(poll_loop(settings.clone(), pending.clone(), cancel.clone()));

    report_loop(&settings, &reporter, &pending, &cancel).await;

    if let Err(e) = poller.await {
        error!("poll loop ended abnormally: {}", e);
    }

    info!("agent stopped");
    Ok(())
}

async fn poll_loop(
    settings: AgentSettings,
    pending: Arc<Mutex<PendingBatch>>,
    cancel: CancellationToken,
) {
    let mut collector = Collector::new();
    let mut ticker = time::interval(settings.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let sample = collector.sample();
                pending.lock().await.absorb(sample);
            }
        }
    }

    debug!("poll loop stopped");
}

async fn report_loop(
    settings: &AgentSettings,
    reporter: &Reporter,
    pending: &Mutex<PendingBatch>,
    cancel: &CancellationToken,
) {
    let mut ticker = time::interval_at(
        time::Instant::now() + settings.report_interval,
        settings.report_interval,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let batch = pending.lock().await.take();
                if let Err(e) = reporter.send(cancel, &batch).await {
                    error!(
                        "report failed, keeping {} metrics for the next round: {}",
                        batch.len(),
                        e
                    );
                    pending.lock().await.restore(batch);
                }
            }
        }
    }

    debug!("report loop stopped");
}
