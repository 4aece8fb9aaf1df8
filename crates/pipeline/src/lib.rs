//! # Archive Pipeline
//!
//! Bounded-concurrency batch scanning of monthly JSON-lines archives.
//!
//! ## Pipeline
//!
//! ```text
//! Catalog (/{year}/RC_{year}-{MM})
//!     │
//!     ├──> Admission Pool (N tokens, reverse dispatch)
//!     │      └─> File Worker per archive
//!     │             ├─> Source Resolver (plain, else .bz2)
//!     │             ├─> Record Scanner (line → Comment)
//!     │             └─> Record Transform (+ optional output file)
//!     │
//!     └──> Score Board (one aggregator per metric)
//!            └─> Final totals after the pool barrier
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use archive_pipeline::{ArchiveCatalog, BatchConfig, BatchRunner, FsSourceResolver, SizeBuckets};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> archive_pipeline::Result<()> {
//!     let tasks = ArchiveCatalog::new(2008, 2009)?.tasks();
//!     let resolver = FsSourceResolver::new(Some("/data/unzipped".into()), Some("/data/zipped".into()));
//!     let summary = BatchRunner::new(BatchConfig::new(4), Arc::new(resolver), Arc::new(SizeBuckets))
//!         .run(tasks)
//!         .await?;
//!
//!     println!("Total: {}", summary.total("Total").unwrap_or(0));
//!     Ok(())
//! }
//! ```

mod catalog;
mod driver;
mod error;
mod output;
mod pool;
mod record;
mod score;
mod source;
mod stats;
mod transform;
mod worker;

pub use catalog::{ArchiveCatalog, FileTask, FIRST_YEAR, LAST_YEAR};
pub use driver::{BatchConfig, BatchRunner};
pub use error::{PipelineError, Result};
pub use output::OutputLayout;
pub use pool::{default_reader_count, parse_reader_count, AdmissionPool, PoolSnapshot, PoolToken};
pub use record::{Comment, RecordScanner, ScannedLine};
pub use score::{
    LogReporter, MetricStream, MetricStreams, ScoreAggregator, ScoreBoard, ScoreReporter,
};
pub use source::{
    is_bzip2_magic, FsSourceResolver, OpenedSource, ResolvedFile, SourceForm, SourceResolver,
    BZIP2_SUFFIX,
};
pub use stats::{BatchSummary, MetricTotal};
pub use transform::{
    size_bucket, strip_newlines, tokenize, DeletedAuthors, RecordTransform, SizeBuckets,
    StripNewlines, Tally, TokenCorpus, DELETED_AUTHOR, ERRORS_METRIC, SIZE_BUCKETS, TOTAL_METRIC,
    WRITTEN_METRIC,
};
pub use worker::{FileOutcome, FileWorker};
