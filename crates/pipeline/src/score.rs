//! Running totals, one actor per metric.
//!
//! Workers push increments through cloned [`MetricStream`] handles. The owning
//! [`ScoreAggregator`] is the only task that touches the sum. Shutdown is a
//! one-shot request carrying a private reply channel: the actor drains what is
//! already queued, reports, acknowledges with the total and exits.
//!
//! Callers must only request shutdown once every producer is finished (the
//! driver does so after the admission pool barrier). The actor cannot check
//! this itself; increments sent after shutdown fail with
//! [`PipelineError::Closed`].

use crate::error::{PipelineError, Result};
use crate::stats::MetricTotal;
use crate::transform::Tally;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const STREAM_CAPACITY: usize = 1024;

/// Sink for final totals.
pub trait ScoreReporter: Send + Sync + 'static {
    fn report(&self, metric: &str, total: i64);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ScoreReporter for LogReporter {
    fn report(&self, metric: &str, total: i64) {
        log::info!("{metric} -> {total}");
    }
}

/// Sending half of one metric's increment channel.
#[derive(Debug, Clone)]
pub struct MetricStream {
    name: Arc<str>,
    tx: mpsc::Sender<i64>,
}

impl MetricStream {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn add(&self, amount: i64) -> Result<()> {
        self.tx
            .send(amount)
            .await
            .map_err(|_| PipelineError::Closed(self.name.to_string()))
    }
}

struct ShutdownRequest {
    reply: oneshot::Sender<i64>,
}

/// Owner of one running total.
pub struct ScoreAggregator {
    stream: MetricStream,
    shutdown_tx: oneshot::Sender<ShutdownRequest>,
    handle: JoinHandle<()>,
}

impl ScoreAggregator {
    pub fn spawn(name: impl Into<String>, reporter: Arc<dyn ScoreReporter>) -> Self {
        let name: Arc<str> = Arc::from(name.into());
        let (tx, scores) = mpsc::channel(STREAM_CAPACITY);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(keep_score(name.clone(), scores, shutdown_rx, reporter));

        Self {
            stream: MetricStream { name, tx },
            shutdown_tx,
            handle,
        }
    }

    pub fn name(&self) -> &str {
        self.stream.name()
    }

    #[must_use]
    pub fn stream(&self) -> MetricStream {
        self.stream.clone()
    }

    /// Sends the single shutdown request and waits for the acknowledgment.
    pub async fn shutdown(self) -> Result<i64> {
        let name = self.stream.name.to_string();
        let (reply, ack) = oneshot::channel();
        self.shutdown_tx
            .send(ShutdownRequest { reply })
            .map_err(|_| PipelineError::Closed(name.clone()))?;

        let total = ack
            .await
            .map_err(|_| PipelineError::Closed(name.clone()))?;
        self.handle
            .await
            .map_err(|err| PipelineError::Other(format!("join aggregator {name}: {err}")))?;
        Ok(total)
    }
}

async fn keep_score(
    name: Arc<str>,
    mut scores: mpsc::Receiver<i64>,
    mut shutdown: oneshot::Receiver<ShutdownRequest>,
    reporter: Arc<dyn ScoreReporter>,
) {
    let mut count: i64 = 0;
    let mut scores_open = true;

    loop {
        tokio::select! {
            request = &mut shutdown => {
                let Ok(request) = request else {
                    log::debug!("Aggregator {name} dropped without shutdown request");
                    return;
                };
                // Drain what producers already queued; never wait for more.
                scores.close();
                while let Ok(score) = scores.try_recv() {
                    count += score;
                }
                reporter.report(&name, count);
                let _ = request.reply.send(count);
                return;
            }
            score = scores.recv(), if scores_open => match score {
                Some(score) => count += score,
                None => scores_open = false,
            }
        }
    }
}

/// Cloneable set of metric handles handed to every file worker.
#[derive(Debug, Clone, Default)]
pub struct MetricStreams {
    streams: Vec<MetricStream>,
}

impl MetricStreams {
    pub fn get(&self, name: &str) -> Option<&MetricStream> {
        self.streams.iter().find(|s| s.name() == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.streams.iter().map(MetricStream::name)
    }

    /// Sends one increment per entry of `tally`.
    pub async fn submit(&self, tally: &Tally) -> Result<()> {
        for (metric, amount) in tally.iter() {
            match self.get(metric) {
                Some(stream) => stream.add(amount).await?,
                None => log::warn!("Dropping increment for untracked metric {metric}"),
            }
        }
        Ok(())
    }
}

/// Registry of aggregators for one batch run.
pub struct ScoreBoard {
    aggregators: Vec<ScoreAggregator>,
}

impl ScoreBoard {
    pub fn spawn(metrics: &[&str], reporter: Arc<dyn ScoreReporter>) -> Self {
        let mut aggregators: Vec<ScoreAggregator> = Vec::with_capacity(metrics.len());
        for metric in metrics {
            if aggregators.iter().any(|a| a.name() == *metric) {
                continue;
            }
            aggregators.push(ScoreAggregator::spawn(*metric, reporter.clone()));
        }
        Self { aggregators }
    }

    #[must_use]
    pub fn streams(&self) -> MetricStreams {
        MetricStreams {
            streams: self.aggregators.iter().map(ScoreAggregator::stream).collect(),
        }
    }

    /// Shuts every aggregator down in registration order.
    pub async fn shutdown(self) -> Result<Vec<MetricTotal>> {
        let mut totals = Vec::with_capacity(self.aggregators.len());
        for aggregator in self.aggregators {
            let metric = aggregator.name().to_string();
            let total = aggregator.shutdown().await?;
            totals.push(MetricTotal { metric, total });
        }
        Ok(totals)
    }
}
