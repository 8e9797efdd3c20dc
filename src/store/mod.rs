use db_blobstore_core::config::validate_table_name;
use db_blobstore_core::path::VirtualPath;
use db_blobstore_core::{Error, Result};

pub mod sqlite;

pub(crate) const LIKE_ESCAPE: char = '\\';

/// Sentinel stored in `content_length` until a streamed write is measured.
pub const UNKNOWN_LENGTH: i64 = -1;

/// Metadata of one stored file; content is never part of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub path: VirtualPath,
    /// Decompressed length, `None` while the row still carries the sentinel.
    pub content_length: Option<u64>,
    pub last_modified_ms: u64,
}

impl FileMeta {
    pub fn filename(&self) -> &str {
        self.path.filename()
    }
}

/// Column values of a row about to be inserted.
#[derive(Debug, Clone)]
pub(crate) struct NewRow<'a> {
    pub path: &'a VirtualPath,
    pub content_length: Option<u64>,
    pub last_modified_ms: u64,
    pub compressed: bool,
}

/// A configured table name in both of its forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    raw: String,
    quoted: String,
}

impl TableName {
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        validate_table_name(&raw)?;
        let quoted = quote_identifier(&raw);
        Ok(Self { raw, quoted })
    }

    /// The name as configured, for APIs that take a plain identifier.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The name quoted for interpolation into SQL text.
    pub fn quoted(&self) -> &str {
        &self.quoted
    }
}

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Builds a `LIKE` pattern matching every string that starts with `prefix`.
pub fn like_prefix_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for ch in prefix.chars() {
        if matches!(ch, '%' | '_') || ch == LIKE_ESCAPE {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn db_err(err: impl std::error::Error + Send + Sync + 'static) -> Error {
    Error::backend(err.to_string(), err)
}

fn u64_to_i64(value: u64, field: &'static str) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| Error::InvalidArgument(format!("integer overflow converting {field}")))
}

fn length_from_sql(value: i64) -> Option<u64> {
    u64::try_from(value).ok()
}
