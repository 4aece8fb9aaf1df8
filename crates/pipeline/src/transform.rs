use crate::record::Comment;
use std::io::{self, Write};

/// Every scanned line, malformed ones included.
pub const TOTAL_METRIC: &str = "Total";
/// Lines that failed to parse.
pub const ERRORS_METRIC: &str = "Errors";
/// Lines written to the output sink.
pub const WRITTEN_METRIC: &str = "Written";

/// Author value the archive uses for removed accounts.
pub const DELETED_AUTHOR: &str = "[deleted]";
const DELETED_METRIC: &str = "Deleted authors";

pub const SIZE_BUCKETS: [&str; 7] = [
    "Smaller than 10",
    "Smaller than 50",
    "Smaller than 100",
    "Smaller than 500",
    "Smaller than 1000",
    "Smaller than 5000",
    "At least 5000",
];
const SIZE_LIMITS: [usize; 6] = [10, 50, 100, 500, 1000, 5000];

/// Per-file subtotals, one slot per tracked metric in registration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally {
    counts: Vec<(&'static str, i64)>,
}

impl Tally {
    pub fn new(metrics: &[&'static str]) -> Self {
        Self {
            counts: metrics.iter().map(|name| (*name, 0)).collect(),
        }
    }

    pub fn add(&mut self, metric: &'static str, amount: i64) {
        match self.counts.iter_mut().find(|(name, _)| *name == metric) {
            Some((_, count)) => *count += amount,
            None => self.counts.push((metric, amount)),
        }
    }

    pub fn get(&self, metric: &str) -> i64 {
        self.counts
            .iter()
            .find(|(name, _)| *name == metric)
            .map_or(0, |(_, count)| *count)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, i64)> + '_ {
        self.counts.iter().copied()
    }
}

/// Per-record classification or rewrite applied by every file worker.
///
/// `apply` only ever sees successfully parsed records. When `writes_output`
/// is true the worker hands in the file's output sink.
pub trait RecordTransform: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Metrics this transform reports, in addition to Total and Errors.
    fn metrics(&self) -> &'static [&'static str];

    fn writes_output(&self) -> bool {
        false
    }

    fn apply(
        &self,
        record: &Comment,
        tally: &mut Tally,
        sink: Option<&mut dyn Write>,
    ) -> io::Result<()>;
}

/// Bucket name for a body of `len` bytes.
///
/// Every bucket is "strictly less than" its limit except the last, which takes
/// everything from 5000 up.
pub fn size_bucket(len: usize) -> &'static str {
    SIZE_LIMITS
        .iter()
        .position(|&limit| len < limit)
        .map_or(SIZE_BUCKETS[SIZE_BUCKETS.len() - 1], |idx| SIZE_BUCKETS[idx])
}

pub fn strip_newlines(body: &str) -> String {
    body.chars().filter(|c| !matches!(c, '\n' | '\r')).collect()
}

/// Lowercases, drops everything but ASCII letters, digits and spaces, and
/// collapses the result into single-space separated tokens.
pub fn tokenize(body: &str) -> String {
    let cleaned: String = body
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
        .collect();
    cleaned.split(' ').filter(|t| !t.is_empty()).collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SizeBuckets;

impl RecordTransform for SizeBuckets {
    fn name(&self) -> &'static str {
        "sizes"
    }

    fn metrics(&self) -> &'static [&'static str] {
        &SIZE_BUCKETS
    }

    fn apply(&self, record: &Comment, tally: &mut Tally, _: Option<&mut dyn Write>) -> io::Result<()> {
        tally.add(size_bucket(record.body.len()), 1);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeletedAuthors;

impl RecordTransform for DeletedAuthors {
    fn name(&self) -> &'static str {
        "deleted"
    }

    fn metrics(&self) -> &'static [&'static str] {
        &[DELETED_METRIC]
    }

    fn apply(&self, record: &Comment, tally: &mut Tally, _: Option<&mut dyn Write>) -> io::Result<()> {
        if record.author == DELETED_AUTHOR {
            tally.add(DELETED_METRIC, 1);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StripNewlines;

impl RecordTransform for StripNewlines {
    fn name(&self) -> &'static str {
        "strip"
    }

    fn metrics(&self) -> &'static [&'static str] {
        &[WRITTEN_METRIC]
    }

    fn writes_output(&self) -> bool {
        true
    }

    fn apply(
        &self,
        record: &Comment,
        tally: &mut Tally,
        sink: Option<&mut dyn Write>,
    ) -> io::Result<()> {
        if let Some(out) = sink {
            writeln!(out, "{}", strip_newlines(&record.body))?;
            tally.add(WRITTEN_METRIC, 1);
        }
        Ok(())
    }
}

/// Token lines for embedding training. Records without any token are not written.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCorpus;

impl RecordTransform for TokenCorpus {
    fn name(&self) -> &'static str {
        "tokens"
    }

    fn metrics(&self) -> &'static [&'static str] {
        &[WRITTEN_METRIC]
    }

    fn writes_output(&self) -> bool {
        true
    }

    fn apply(
        &self,
        record: &Comment,
        tally: &mut Tally,
        sink: Option<&mut dyn Write>,
    ) -> io::Result<()> {
        let tokens = tokenize(&record.body);
        if tokens.is_empty() {
            return Ok(());
        }
        if let Some(out) = sink {
            writeln!(out, "{tokens}")?;
            tally.add(WRITTEN_METRIC, 1);
        }
        Ok(())
    }
}
