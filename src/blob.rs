//! Strategies for turning a BLOB column into a consumable stream.
//!
//! SQLite hands out BLOB contents through an incremental I/O handle that
//! borrows the connection and is invalidated as soon as the row changes. The
//! strategies differ in how they detach the returned stream from that handle:
//!
//! - [`BlobExtractor::Direct`] returns the handle itself. Nothing is copied,
//!   but the stream is bound to the connection borrow and must be consumed
//!   before the row is modified.
//! - [`BlobExtractor::MemoryBuffered`] reads the whole BLOB into memory.
//! - [`BlobExtractor::FileBuffered`] copies the whole BLOB into a private
//!   temporary file that is deleted when the returned reader is dropped.
//!
//! All three yield identical bytes.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::TempPath;

use db_blobstore_core::config::BlobExtractorConfig;
use db_blobstore_core::{Error, Result};

/// Buffer files whose deletion failed, retried on the next extraction.
static LEFTOVERS: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());

const BUFFER_FILE_PREFIX: &str = "blobstore-";
const BUFFER_FILE_SUFFIX: &str = ".buf";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BlobExtractor {
    Direct,
    #[default]
    MemoryBuffered,
    FileBuffered {
        buffer_dir: PathBuf,
    },
}

impl BlobExtractor {
    /// File-buffered extraction into the OS temp directory.
    pub fn file_buffered() -> Self {
        Self::file_buffered_in(std::env::temp_dir())
    }

    pub fn file_buffered_in(buffer_dir: impl Into<PathBuf>) -> Self {
        BlobExtractor::FileBuffered {
            buffer_dir: buffer_dir.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BlobExtractor::Direct => "direct",
            BlobExtractor::MemoryBuffered => "memory_buffered",
            BlobExtractor::FileBuffered { .. } => "file_buffered",
        }
    }

    /// `true` when the returned stream stays bound to the source handle.
    pub fn is_direct(&self) -> bool {
        matches!(self, BlobExtractor::Direct)
    }

    /// Converts a cursor-bound BLOB stream into the stream handed to callers.
    ///
    /// `size_hint` is the stored BLOB size and is only used to size buffers.
    pub fn extract<'c, R: Read + 'c>(
        &self,
        mut blob: R,
        size_hint: u64,
    ) -> Result<Box<dyn Read + 'c>> {
        match self {
            BlobExtractor::Direct => Ok(Box::new(blob)),
            BlobExtractor::MemoryBuffered => {
                let capacity = usize::try_from(size_hint).unwrap_or(0);
                let mut buf = Vec::with_capacity(capacity);
                blob.read_to_end(&mut buf)
                    .map_err(|err| Error::backend("failed to read blob into memory", err))?;
                Ok(Box::new(Cursor::new(buf)))
            }
            BlobExtractor::FileBuffered { buffer_dir } => {
                Ok(Box::new(BufferFileReader::fill(buffer_dir, blob)?))
            }
        }
    }
}

impl From<&BlobExtractorConfig> for BlobExtractor {
    fn from(config: &BlobExtractorConfig) -> Self {
        match config {
            BlobExtractorConfig::Direct => BlobExtractor::Direct,
            BlobExtractorConfig::MemoryBuffered => BlobExtractor::MemoryBuffered,
            BlobExtractorConfig::FileBuffered { buffer_dir: None } => BlobExtractor::file_buffered(),
            BlobExtractorConfig::FileBuffered {
                buffer_dir: Some(dir),
            } => BlobExtractor::file_buffered_in(dir),
        }
    }
}

/// Reader over a buffer file; the file is removed when the reader is dropped.
#[derive(Debug)]
pub struct BufferFileReader {
    reader: Option<BufReader<File>>,
    path: Option<TempPath>,
}

impl BufferFileReader {
    fn fill<R: Read>(buffer_dir: &Path, mut blob: R) -> Result<Self> {
        purge_leftover_buffers();

        fs::create_dir_all(buffer_dir).map_err(|err| {
            Error::backend(
                format!("failed to create buffer dir {}", buffer_dir.display()),
                err,
            )
        })?;
        let temp = tempfile::Builder::new()
            .prefix(BUFFER_FILE_PREFIX)
            .suffix(BUFFER_FILE_SUFFIX)
            .tempfile_in(buffer_dir)
            .map_err(|err| Error::backend("failed to create buffer file", err))?;
        restrict_permissions(temp.path());

        let (file, path) = temp.into_parts();
        match copy_and_rewind(&mut blob, file) {
            Ok(file) => {
                tracing::debug!(path = %path.display(), "buffered blob to file");
                Ok(Self {
                    reader: Some(BufReader::new(file)),
                    path: Some(path),
                })
            }
            Err(err) => {
                discard(path);
                Err(Error::backend("failed to buffer blob to file", err))
            }
        }
    }
}

impl Read for BufferFileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reader.as_mut() {
            Some(reader) => reader.read(buf),
            None => Ok(0),
        }
    }
}

impl Drop for BufferFileReader {
    fn drop(&mut self) {
        // Close the handle first; some platforms refuse to unlink open files.
        drop(self.reader.take());
        if let Some(path) = self.path.take() {
            discard(path);
        }
    }
}

fn copy_and_rewind<R: Read>(blob: &mut R, file: File) -> io::Result<File> {
    let mut writer = BufWriter::new(file);
    io::copy(blob, &mut writer)?;
    let mut file = writer.into_inner().map_err(|err| err.into_error())?;
    file.seek(SeekFrom::Start(0))?;
    Ok(file)
}

fn discard(path: TempPath) {
    let owned = path.to_path_buf();
    if let Err(err) = path.close() {
        if err.kind() == io::ErrorKind::NotFound {
            return;
        }
        tracing::warn!(
            path = %owned.display(),
            err = %err,
            "failed to delete buffer file; will retry later"
        );
        queue_leftover(owned);
    }
}

fn queue_leftover(path: PathBuf) {
    LEFTOVERS
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .push(path);
}

/// Retries deletion of buffer files that could not be removed earlier.
///
/// Returns how many files are still pending.
pub fn purge_leftover_buffers() -> usize {
    let mut pending = LEFTOVERS
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    pending.retain(|path| match fs::remove_file(path) {
        Ok(()) => false,
        Err(err) if err.kind() == io::ErrorKind::NotFound => false,
        Err(err) => {
            tracing::debug!(path = %path.display(), err = %err, "buffer file still not deletable");
            true
        }
    });
    pending.len()
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Err(err) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        tracing::debug!(path = %path.display(), err = %err, "cannot restrict buffer file permissions");
    }
}

#[cfg(not(unix))]
fn restrict_permissions(path: &Path) {
    tracing::debug!(path = %path.display(), "owner-only permissions are not supported on this platform");
}
