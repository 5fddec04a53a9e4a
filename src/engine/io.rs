// src/engine/io.rs
//
// I/O operations: Source enum (memory / memory-mapped / lazy path) and atomic file output.

use crate::error::ToolboxError;
use memmap2::Mmap;
use std::borrow::Cow;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

type IoResult<T> = std::result::Result<T, ToolboxError>;

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Image source - in-memory data, a memory-mapped file, or a path read on demand.
#[derive(Clone, Debug)]
pub enum Source {
    /// In-memory image data
    Memory(Arc<Vec<u8>>),
    /// Memory-mapped file (zero-copy access)
    Mapped(Arc<Mmap>),
    /// File path for lazy loading (data is read only when needed)
    Path(PathBuf),
}

impl Source {
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Source::Memory(Arc::new(data.into()))
    }

    /// Map `path` into memory. The OS pages in only what the decoder touches.
    pub fn map_file(path: impl AsRef<Path>) -> IoResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ToolboxError::file_not_found(display(path)));
        }
        let file = File::open(path).map_err(|e| ToolboxError::file_read_failed(display(path), e))?;
        let len = file
            .metadata()
            .map_err(|e| ToolboxError::file_read_failed(display(path), e))?
            .len();
        // Zero-length mappings are rejected by some platforms.
        if len == 0 {
            return Ok(Source::Memory(Arc::new(Vec::new())));
        }

        // Safety: the file is assumed not to be truncated or modified while mapped.
        let mmap = unsafe { Mmap::map(&file) }
            .map_err(|e| ToolboxError::mmap_failed(display(path), e))?;
        tracing::trace!(target: "imgtoolbox::io", path = %path.display(), len, "mapped file");
        Ok(Source::Mapped(Arc::new(mmap)))
    }

    /// Remember `path`; nothing is read until `bytes()` is called.
    pub fn lazy_path(path: impl Into<PathBuf>) -> Self {
        Source::Path(path.into())
    }

    /// Borrow the bytes for Memory/Mapped sources, read the file for Path sources.
    pub fn bytes(&self) -> IoResult<Cow<'_, [u8]>> {
        match self {
            Source::Memory(data) => Ok(Cow::Borrowed(data.as_slice())),
            Source::Mapped(mmap) => Ok(Cow::Borrowed(mmap.as_ref())),
            Source::Path(path) => {
                if !path.exists() {
                    return Err(ToolboxError::file_not_found(display(path)));
                }
                std::fs::read(path)
                    .map(Cow::Owned)
                    .map_err(|e| ToolboxError::file_read_failed(display(path), e))
            }
        }
    }

    /// Get path if this is a Path source
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Source::Path(p) => Some(p),
            Source::Memory(_) | Source::Mapped(_) => None,
        }
    }

    /// Get the bytes directly. None only for Path sources, which need to be loaded first.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Source::Memory(data) => Some(data.as_slice()),
            Source::Mapped(mmap) => Some(mmap.as_ref()),
            Source::Path(_) => None,
        }
    }

    /// Length of the source data; 0 for Path sources until loaded.
    pub fn len(&self) -> usize {
        self.as_bytes().map_or(0, <[u8]>::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<u8>> for Source {
    fn from(data: Vec<u8>) -> Self {
        Source::from_bytes(data)
    }
}

/// Write `data` to `path` atomically: a temp file in the same directory is
/// written, synced and renamed over the target. Returns the bytes written.
pub fn write_atomic(path: impl AsRef<Path>, data: &[u8]) -> IoResult<u64> {
    let path = path.as_ref();
    let output_dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        Some(_) => Path::new("."),
        None => {
            return Err(ToolboxError::invalid_argument(
                "path",
                display(path),
                "output path must name a file",
            ))
        }
    };

    // Same directory as the target so the final rename never crosses filesystems.
    let mut temp_file = NamedTempFile::new_in(output_dir)
        .map_err(|e| ToolboxError::file_write_failed(display(output_dir), e))?;
    let temp_path = temp_file.path().to_path_buf();
    temp_file
        .write_all(data)
        .map_err(|e| ToolboxError::file_write_failed(display(&temp_path), e))?;
    temp_file
        .as_file_mut()
        .sync_all()
        .map_err(|e| ToolboxError::file_write_failed(display(&temp_path), e))?;

    // tempfile removes the temp file if the rename fails
    temp_file
        .persist(path)
        .map_err(|e| ToolboxError::file_write_failed(display(path), e.error))?;

    tracing::debug!(target: "imgtoolbox::io", path = %path.display(), bytes = data.len(), "wrote file");
    Ok(data.len() as u64)
}
