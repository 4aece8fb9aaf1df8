use archive_pipeline::{ArchiveCatalog, BatchConfig, FsSourceResolver, OutputLayout, PipelineError};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Problems detected before any archive is touched. Each class has its own
/// process exit status.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No data folder given: use --zipped, --unzipped or --data")]
    NoDataRoot,

    #[error("Could not read from {0}: make sure it exists and is readable")]
    UnreadableRoot(PathBuf),

    #[error("{0}")]
    InvalidRange(#[source] PipelineError),

    #[error("The {0} pipeline writes files: use --output")]
    NoOutputRoot(&'static str),

    #[error("Could not create output folder {path}: {source}")]
    OutputUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    pub const fn exit_code(&self) -> i32 {
        match self {
            ConfigError::NoDataRoot => 1,
            ConfigError::UnreadableRoot(_) => 2,
            ConfigError::InvalidRange(_) => 3,
            ConfigError::NoOutputRoot(_) | ConfigError::OutputUnwritable { .. } => 4,
        }
    }
}

/// Raw roots and range as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct RawSettings {
    pub zipped: Option<PathBuf>,
    pub unzipped: Option<PathBuf>,
    pub data: Option<PathBuf>,
    pub compressed: bool,
    pub output: Option<PathBuf>,
    pub readers: Option<usize>,
    pub start: i32,
    pub last: i32,
}

/// Validated settings for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub resolver: FsSourceResolver,
    pub catalog: ArchiveCatalog,
    pub batch: BatchConfig,
    pub output: Option<OutputLayout>,
}

impl RunConfig {
    /// Checks data roots, then the year range, then the output root.
    pub fn validate(
        raw: RawSettings,
        pipeline: &'static str,
        writes_output: bool,
    ) -> Result<Self, ConfigError> {
        let mut zipped = raw.zipped;
        let mut unzipped = raw.unzipped;
        if let Some(data) = raw.data {
            if raw.compressed {
                zipped.get_or_insert(data);
            } else {
                unzipped.get_or_insert(data);
            }
        }

        if zipped.is_none() && unzipped.is_none() {
            return Err(ConfigError::NoDataRoot);
        }
        for root in zipped.iter().chain(unzipped.iter()) {
            if !root_exists(root) {
                return Err(ConfigError::UnreadableRoot(root.clone()));
            }
        }

        let catalog =
            ArchiveCatalog::new(raw.start, raw.last).map_err(ConfigError::InvalidRange)?;

        let output = if writes_output {
            let root = raw.output.ok_or(ConfigError::NoOutputRoot(pipeline))?;
            std::fs::create_dir_all(&root).map_err(|source| ConfigError::OutputUnwritable {
                path: root.clone(),
                source,
            })?;
            Some(OutputLayout::new(root))
        } else {
            None
        };

        let batch = raw
            .readers
            .map(BatchConfig::new)
            .unwrap_or_else(BatchConfig::from_env);

        Ok(Self {
            resolver: FsSourceResolver::new(unzipped, zipped),
            catalog,
            batch,
            output,
        })
    }
}

fn root_exists(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(_) => true,
        Err(err) => err.kind() != std::io::ErrorKind::NotFound,
    }
}
