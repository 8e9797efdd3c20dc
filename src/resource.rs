//! Byte sources accepted by [`BlobStore::write`](crate::vfs::BlobStore::write).

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

pub trait Resource {
    /// Length of the content in bytes.
    ///
    /// Only consulted when [`is_open`](Self::is_open) is `false`; an error is
    /// treated as "length unknown".
    fn content_length(&self) -> io::Result<u64>;

    /// Modification time in milliseconds since the Unix epoch, if known.
    fn last_modified_ms(&self) -> Option<u64> {
        None
    }

    /// `true` for single-pass streams whose length cannot be known before
    /// they are consumed.
    fn is_open(&self) -> bool {
        false
    }

    fn open(&mut self) -> io::Result<Box<dyn Read + '_>>;

    fn description(&self) -> String;
}

/// In-memory content.
#[derive(Debug, Clone)]
pub struct BytesResource {
    bytes: Vec<u8>,
    last_modified_ms: Option<u64>,
}

impl BytesResource {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            last_modified_ms: None,
        }
    }

    pub fn with_last_modified_ms(mut self, ms: u64) -> Self {
        self.last_modified_ms = Some(ms);
        self
    }
}

impl Resource for BytesResource {
    fn content_length(&self) -> io::Result<u64> {
        Ok(self.bytes.len() as u64)
    }

    fn last_modified_ms(&self) -> Option<u64> {
        self.last_modified_ms
    }

    fn open(&mut self) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(self.bytes.as_slice()))
    }

    fn description(&self) -> String {
        format!("byte array resource ({} bytes)", self.bytes.len())
    }
}

/// A file on the local filesystem; length and mtime come from its metadata.
#[derive(Debug, Clone)]
pub struct FileResource {
    path: PathBuf,
}

impl FileResource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Resource for FileResource {
    fn content_length(&self) -> io::Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    fn last_modified_ms(&self) -> Option<u64> {
        let modified = std::fs::metadata(&self.path).ok()?.modified().ok()?;
        let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
        Some(since_epoch.as_millis().min(u128::from(u64::MAX)) as u64)
    }

    fn open(&mut self) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(BufReader::new(File::open(&self.path)?)))
    }

    fn description(&self) -> String {
        format!("file [{}]", self.path.display())
    }
}

/// A single-pass reader. Its length is unknown until it has been consumed,
/// and it can be opened only once.
pub struct ReaderResource<R> {
    reader: Option<R>,
    description: String,
}

impl<R: Read> ReaderResource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
            description: "stream resource".to_string(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl<R: Read> Resource for ReaderResource<R> {
    fn content_length(&self) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "stream length is unknown before it is consumed",
        ))
    }

    fn is_open(&self) -> bool {
        true
    }

    fn open(&mut self) -> io::Result<Box<dyn Read + '_>> {
        match self.reader.take() {
            Some(reader) => Ok(Box::new(reader)),
            None => Err(io::Error::other(format!(
                "{} has already been consumed",
                self.description
            ))),
        }
    }

    fn description(&self) -> String {
        self.description.clone()
    }
}
