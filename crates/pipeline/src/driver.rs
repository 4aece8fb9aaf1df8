use crate::catalog::FileTask;
use crate::error::{PipelineError, Result};
use crate::output::OutputLayout;
use crate::pool::{default_reader_count, parse_reader_count, AdmissionPool};
use crate::score::{LogReporter, ScoreBoard, ScoreReporter};
use crate::source::SourceResolver;
use crate::stats::BatchSummary;
use crate::transform::{RecordTransform, ERRORS_METRIC, TOTAL_METRIC};
use crate::worker::{FileOutcome, FileWorker};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

const READERS_ENV: &str = "ARCHIVE_SCAN_READERS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Maximum number of files processed at once
    pub readers: usize,
}

impl BatchConfig {
    pub fn new(readers: usize) -> Self {
        Self {
            readers: parse_reader_count(None, readers),
        }
    }

    /// Reader count from `ARCHIVE_SCAN_READERS`, else available parallelism.
    pub fn from_env() -> Self {
        let raw = std::env::var(READERS_ENV).ok();
        Self {
            readers: parse_reader_count(raw.as_deref(), default_reader_count()),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Runs one transform over a list of archives with bounded concurrency.
pub struct BatchRunner {
    config: BatchConfig,
    resolver: Arc<dyn SourceResolver>,
    transform: Arc<dyn RecordTransform>,
    output: Option<OutputLayout>,
    reporter: Arc<dyn ScoreReporter>,
}

impl BatchRunner {
    pub fn new(
        config: BatchConfig,
        resolver: Arc<dyn SourceResolver>,
        transform: Arc<dyn RecordTransform>,
    ) -> Self {
        Self {
            config,
            resolver,
            transform,
            output: None,
            reporter: Arc::new(LogReporter),
        }
    }

    #[must_use]
    pub fn with_output(mut self, output: OutputLayout) -> Self {
        self.output = Some(output);
        self
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ScoreReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Tracked metrics in report order.
    pub fn metrics(&self) -> Vec<&'static str> {
        [TOTAL_METRIC, ERRORS_METRIC]
            .into_iter()
            .chain(self.transform.metrics().iter().copied())
            .collect()
    }

    /// Processes every task, newest first, and returns the final totals.
    ///
    /// Aggregators are shut down only after the admission pool barrier, so no
    /// worker can still be producing increments at that point.
    pub async fn run(&self, tasks: Vec<FileTask>) -> Result<BatchSummary> {
        let start = Instant::now();

        if self.transform.writes_output() {
            let layout = self.output.as_ref().ok_or_else(|| {
                PipelineError::Other(format!(
                    "{} pipeline requires an output root",
                    self.transform.name()
                ))
            })?;
            layout.prepare(&tasks).await?;
        }

        let board = ScoreBoard::spawn(&self.metrics(), self.reporter.clone());
        let pool = AdmissionPool::new(self.config.readers);
        let worker = Arc::new(FileWorker::new(
            self.resolver.clone(),
            self.transform.clone(),
            self.output.clone(),
            board.streams(),
        ));
        let processed = Arc::new(AtomicUsize::new(0));
        let skipped = Arc::new(AtomicUsize::new(0));

        log::info!(
            "Running {} over {} archives with {} readers",
            self.transform.name(),
            tasks.len(),
            pool.limit()
        );

        // Later archives are larger; starting them first evens out the tail.
        for task in tasks.into_iter().rev() {
            let token = pool.acquire().await;
            let worker = worker.clone();
            let processed = processed.clone();
            let skipped = skipped.clone();
            tokio::spawn(async move {
                let _token = token;
                match worker.run(task).await {
                    FileOutcome::Processed { .. } => processed.fetch_add(1, Ordering::Relaxed),
                    FileOutcome::Skipped { .. } => skipped.fetch_add(1, Ordering::Relaxed),
                };
            });
        }

        pool.wait_all().await;
        let pool_state = pool.snapshot();
        log::info!(
            "All readers finished ({} files, peak concurrency {})",
            pool_state.returned,
            pool_state.peak
        );

        let totals = board.shutdown().await?;

        Ok(BatchSummary {
            pipeline: self.transform.name().to_string(),
            totals,
            files_processed: processed.load(Ordering::Relaxed),
            files_skipped: skipped.load(Ordering::Relaxed),
            pool: pool_state,
            time_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_clamps_reader_count() {
        assert_eq!(BatchConfig::new(0).readers, 1);
        assert_eq!(BatchConfig::new(3).readers, 3);
        assert_eq!(BatchConfig::new(100_000).readers, 256);
    }
}
