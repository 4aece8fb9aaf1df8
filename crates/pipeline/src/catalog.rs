use crate::error::{PipelineError, Result};
use std::fmt;

/// First year present in the corpus (starts in October).
pub const FIRST_YEAR: i32 = 2007;
/// Last year present in the corpus (ends in May).
pub const LAST_YEAR: i32 = 2015;

const FIRST_MONTH_OF_FIRST_YEAR: u32 = 10;
const LAST_MONTH_OF_LAST_YEAR: u32 = 5;

/// One unit of work: a logical archive identifier such as `/2008/RC_2008-01`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileTask {
    id: String,
}

impl FileTask {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn for_month(year: i32, month: u32) -> Self {
        Self::new(format!("/{year}/RC_{year}-{month:02}"))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Identifier without the leading separator, for joining under a root.
    pub fn relative(&self) -> &str {
        self.id.trim_start_matches('/')
    }
}

impl fmt::Display for FileTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Enumerates the monthly archives of a validated year range.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveCatalog {
    start: i32,
    last: i32,
}

impl ArchiveCatalog {
    pub fn new(start: i32, last: i32) -> Result<Self> {
        if FIRST_YEAR > start || start > last || last > LAST_YEAR {
            return Err(PipelineError::InvalidRange {
                start,
                last,
                first: FIRST_YEAR,
                max: LAST_YEAR,
            });
        }
        Ok(Self { start, last })
    }

    pub fn start(&self) -> i32 {
        self.start
    }

    pub fn last(&self) -> i32 {
        self.last
    }

    /// Tasks in chronological order.
    pub fn tasks(&self) -> Vec<FileTask> {
        let mut tasks = Vec::new();
        for year in self.start..=self.last {
            let first_month = if year == FIRST_YEAR {
                FIRST_MONTH_OF_FIRST_YEAR
            } else {
                1
            };
            let last_month = if year == LAST_YEAR {
                LAST_MONTH_OF_LAST_YEAR
            } else {
                12
            };
            for month in first_month..=last_month {
                tasks.push(FileTask::for_month(year, month));
            }
        }
        log::debug!(
            "Catalog {}..={} yields {} archives",
            self.start,
            self.last,
            tasks.len()
        );
        tasks
    }
}
