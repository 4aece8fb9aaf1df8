use crate::catalog::FileTask;
use crate::error::{PipelineError, Result};
use crate::output::OutputLayout;
use crate::record::{RecordScanner, ScannedLine};
use crate::score::MetricStreams;
use crate::source::{OpenedSource, SourceResolver};
use crate::transform::{RecordTransform, Tally, ERRORS_METRIC, TOTAL_METRIC};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Processed { lines: u64, errors: u64 },
    Skipped { reason: String },
}

/// Processes one archive end to end and reports its subtotals.
///
/// The caller holds the pool token for the duration of [`FileWorker::run`].
/// Every failure short of a parse error skips the whole file: nothing is sent
/// to the metric streams for it.
pub struct FileWorker {
    resolver: Arc<dyn SourceResolver>,
    transform: Arc<dyn RecordTransform>,
    output: Option<OutputLayout>,
    streams: MetricStreams,
    metrics: Arc<[&'static str]>,
}

impl FileWorker {
    pub fn new(
        resolver: Arc<dyn SourceResolver>,
        transform: Arc<dyn RecordTransform>,
        output: Option<OutputLayout>,
        streams: MetricStreams,
    ) -> Self {
        let metrics: Vec<&'static str> = [TOTAL_METRIC, ERRORS_METRIC]
            .into_iter()
            .chain(transform.metrics().iter().copied())
            .collect();
        Self {
            resolver,
            transform,
            output,
            streams,
            metrics: metrics.into(),
        }
    }

    pub async fn run(&self, task: FileTask) -> FileOutcome {
        let resolver = self.resolver.clone();
        let transform = self.transform.clone();
        let output = self.output.clone();
        let metrics = self.metrics.clone();
        let id = task.id().to_string();

        // Decoding and parsing are blocking work.
        let scanned = tokio::task::spawn_blocking(move || {
            scan_file(
                resolver.as_ref(),
                transform.as_ref(),
                output.as_ref(),
                &task,
                &metrics,
            )
        })
        .await;

        let tally = match scanned {
            Ok(Ok(tally)) => tally,
            Ok(Err(err)) => {
                log::warn!("Skipping {id}: {err}");
                return FileOutcome::Skipped {
                    reason: err.to_string(),
                };
            }
            Err(err) => {
                log::error!("Worker for {id} failed: {err}");
                return FileOutcome::Skipped {
                    reason: format!("worker task failed: {err}"),
                };
            }
        };

        if let Err(err) = self.streams.submit(&tally).await {
            log::error!("Failed to report subtotals for {id}: {err}");
            return FileOutcome::Skipped {
                reason: format!("report subtotals: {err}"),
            };
        }

        let lines = u64::try_from(tally.get(TOTAL_METRIC)).unwrap_or(0);
        let errors = u64::try_from(tally.get(ERRORS_METRIC)).unwrap_or(0);
        log::debug!("Finished {id}: {lines} lines, {errors} errors");
        FileOutcome::Processed { lines, errors }
    }
}

fn scan_file(
    resolver: &dyn SourceResolver,
    transform: &dyn RecordTransform,
    output: Option<&OutputLayout>,
    task: &FileTask,
    metrics: &[&'static str],
) -> Result<Tally> {
    let OpenedSource { file, reader } = resolver.open(task)?;

    let mut sink = if transform.writes_output() {
        let layout = output.ok_or_else(|| {
            PipelineError::Other(format!("{} needs an output root", transform.name()))
        })?;
        let path = layout.path_for(task);
        let created = File::create(&path).map_err(|err| {
            PipelineError::Other(format!("create output {}: {err}", path.display()))
        })?;
        Some(BufWriter::new(created))
    } else {
        None
    };

    let mut tally = Tally::new(metrics);
    let mut scanner = RecordScanner::new(reader);
    while let Some(line) = scanner.next_line().map_err(|err| {
        PipelineError::Other(format!("read {}: {err}", file.path.display()))
    })? {
        match line {
            ScannedLine::Parsed(record) => transform
                .apply(
                    &record,
                    &mut tally,
                    sink.as_mut().map(|w| w as &mut dyn Write),
                )
                .map_err(|err| PipelineError::Other(format!("write output for {task}: {err}")))?,
            ScannedLine::Malformed(err) => {
                log::debug!("{task} line {}: {err}", scanner.lines());
            }
        }
    }

    if let Some(mut writer) = sink {
        writer
            .flush()
            .map_err(|err| PipelineError::Other(format!("flush output for {task}: {err}")))?;
    }

    tally.add(TOTAL_METRIC, i64::try_from(scanner.lines()).unwrap_or(i64::MAX));
    tally.add(ERRORS_METRIC, i64::try_from(scanner.errors()).unwrap_or(i64::MAX));
    Ok(tally)
}
