use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Could not read {id} (tried {})", display_paths(.tried))]
    NotFound { id: String, tried: Vec<PathBuf> },

    #[error("{} is not a bzip2 stream", .0.display())]
    BadMagic(PathBuf),

    #[error("Metric stream {0} is closed")]
    Closed(String),

    #[error("Invalid date range (from {start} to {last}); must be {first} <= start <= last <= {max}")]
    InvalidRange {
        start: i32,
        last: i32,
        first: i32,
        max: i32,
    },

    #[error("{0}")]
    Other(String),
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "no configured roots".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
