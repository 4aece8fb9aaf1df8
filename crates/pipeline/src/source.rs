//! Locating and opening the physical form of an archive.
//!
//! # Resolution order
//! 1. `<unzipped_root>/<id>` read as-is.
//! 2. `<zipped_root>/<id>.bz2`, which must start with the bzip2 magic and is
//!    decoded on the fly (concatenated streams are treated as one).
//! 3. Otherwise [`PipelineError::NotFound`] listing every path that was tried.
//!
//! The returned reader owns the file handle; dropping it closes the file.

use crate::catalog::FileTask;
use crate::error::{PipelineError, Result};
use bzip2::read::MultiBzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

pub const BZIP2_SUFFIX: &str = ".bz2";

/// bzip2 stream header: `BZh` followed by the block size digit.
const BZIP2_MAGIC: [u8; 3] = *b"BZh";

#[inline]
pub fn is_bzip2_magic(header: &[u8]) -> bool {
    header.len() >= 4 && header[..3] == BZIP2_MAGIC && (b'1'..=b'9').contains(&header[3])
}

/// Only a definite "not found" counts as absent. A path that cannot be
/// inspected is still chosen, and opening it reports the real error.
fn path_present(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(_) => true,
        Err(err) => err.kind() != std::io::ErrorKind::NotFound,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceForm {
    Plain,
    Bzip2,
}

/// A task whose physical location has been determined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    pub task: FileTask,
    pub path: PathBuf,
    pub form: SourceForm,
}

/// A reader of decoded bytes for one archive.
pub struct OpenedSource {
    pub file: ResolvedFile,
    pub reader: Box<dyn BufRead + Send>,
}

/// Collaborator that turns a [`FileTask`] into decoded bytes.
pub trait SourceResolver: Send + Sync + 'static {
    fn open(&self, task: &FileTask) -> Result<OpenedSource>;
}

/// Filesystem resolver with an optional plain root and an optional bzip2 root.
#[derive(Debug, Clone, Default)]
pub struct FsSourceResolver {
    unzipped_root: Option<PathBuf>,
    zipped_root: Option<PathBuf>,
}

impl FsSourceResolver {
    pub fn new(unzipped_root: Option<PathBuf>, zipped_root: Option<PathBuf>) -> Self {
        Self {
            unzipped_root,
            zipped_root,
        }
    }

    pub fn unzipped_root(&self) -> Option<&Path> {
        self.unzipped_root.as_deref()
    }

    pub fn zipped_root(&self) -> Option<&Path> {
        self.zipped_root.as_deref()
    }

    fn plain_path(&self, task: &FileTask) -> Option<PathBuf> {
        self.unzipped_root
            .as_ref()
            .map(|root| root.join(task.relative()))
    }

    fn compressed_path(&self, task: &FileTask) -> Option<PathBuf> {
        self.zipped_root
            .as_ref()
            .map(|root| root.join(format!("{}{BZIP2_SUFFIX}", task.relative())))
    }

    /// Picks the physical file for `task`, preferring the uncompressed copy.
    pub fn locate(&self, task: &FileTask) -> Result<ResolvedFile> {
        let plain = self.plain_path(task);
        if let Some(path) = plain.as_ref().filter(|p| path_present(p)) {
            return Ok(ResolvedFile {
                task: task.clone(),
                path: path.clone(),
                form: SourceForm::Plain,
            });
        }

        let compressed = self.compressed_path(task);
        if let Some(path) = compressed.as_ref().filter(|p| path_present(p)) {
            return Ok(ResolvedFile {
                task: task.clone(),
                path: path.clone(),
                form: SourceForm::Bzip2,
            });
        }

        Err(PipelineError::NotFound {
            id: task.id().to_string(),
            tried: plain.into_iter().chain(compressed).collect(),
        })
    }
}

impl SourceResolver for FsSourceResolver {
    fn open(&self, task: &FileTask) -> Result<OpenedSource> {
        let file = self.locate(task)?;
        let mut buffered = BufReader::new(File::open(&file.path)?);

        let reader: Box<dyn BufRead + Send> = match file.form {
            SourceForm::Plain => Box::new(buffered),
            SourceForm::Bzip2 => {
                if !is_bzip2_magic(buffered.fill_buf()?) {
                    return Err(PipelineError::BadMagic(file.path));
                }
                Box::new(BufReader::new(MultiBzDecoder::new(buffered)))
            }
        };

        log::info!("Reading file {} from {}", task, file.path.display());
        Ok(OpenedSource { file, reader })
    }
}
