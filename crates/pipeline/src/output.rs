use crate::catalog::FileTask;
use crate::error::Result;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Output files mirror the input identifiers under one root.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, task: &FileTask) -> PathBuf {
        self.root.join(task.relative())
    }

    /// Creates every parent directory the tasks will write into.
    pub async fn prepare(&self, tasks: &[FileTask]) -> Result<()> {
        let dirs: BTreeSet<PathBuf> = tasks
            .iter()
            .filter_map(|task| self.path_for(task).parent().map(Path::to_path_buf))
            .collect();
        for dir in dirs {
            tokio::fs::create_dir_all(&dir).await?;
            log::debug!("Prepared output directory {}", dir.display());
        }
        Ok(())
    }
}
