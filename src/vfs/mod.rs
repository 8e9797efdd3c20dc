mod delete;
mod list;
mod read;
mod rename;
mod util;
mod write;

use std::ops::Deref;

use rusqlite::Connection;

use db_blobstore_core::config::{Compression, StoreConfig};
use db_blobstore_core::{Error, Result};

use crate::blob::BlobExtractor;
use crate::resource::{BytesResource, Resource};
use crate::store::sqlite::SqliteTable;
use crate::store::{FileMeta, TableName};

pub use read::FileHandle;

/// A file store over one table, reached through one SQLite connection.
///
/// `C` is anything that dereferences to a [`Connection`]: an owned
/// connection, a borrowed one, or a pooled connection.
#[derive(Debug)]
pub struct BlobStore<C> {
    conn: C,
    table: TableName,
    compression: Compression,
    extractor: BlobExtractor,
    span: tracing::Span,
}

impl<C: Deref<Target = Connection>> BlobStore<C> {
    pub fn builder() -> BlobStoreBuilder<C> {
        BlobStoreBuilder::default()
    }

    pub fn from_config(conn: C, config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        Self::builder()
            .connection(conn)
            .table_name(config.table_name.clone())
            .compression(config.compression)
            .blob_extractor(BlobExtractor::from(&config.blob_extractor))
            .build()
    }

    pub fn table_name(&self) -> &str {
        self.table.raw()
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn blob_extractor(&self) -> &BlobExtractor {
        &self.extractor
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Lists file metadata under `directory` (`None` is the root).
    ///
    /// With `recurse`, files in every subdirectory are included.
    pub fn list<'p>(
        &self,
        directory: impl Into<Option<&'p str>>,
        recurse: bool,
    ) -> Result<Vec<FileMeta>> {
        list::list(self, directory.into(), recurse)
    }

    pub fn get(&self, path: &str) -> Result<FileHandle<'_, C>> {
        read::get(self, path)
    }

    /// Wraps metadata obtained from [`list`](Self::list) in a handle.
    pub fn handle(&self, meta: FileMeta) -> FileHandle<'_, C> {
        FileHandle::new(self, meta)
    }

    pub fn write<R: Resource + ?Sized>(&self, path: &str, resource: &mut R) -> Result<()> {
        write::write(self, path, resource)
    }

    pub fn write_bytes(&self, path: &str, bytes: impl Into<Vec<u8>>) -> Result<()> {
        self.write(path, &mut BytesResource::new(bytes))
    }

    pub fn rename(&self, source: &str, target: &str) -> Result<()> {
        rename::rename(self, source, target)
    }

    pub fn delete(&self, path: &str) -> Result<()> {
        delete::delete(self, path)
    }

    fn table(&self) -> SqliteTable<'_> {
        SqliteTable::new(&self.conn, &self.table)
    }
}

/// Collects the four required parts of a [`BlobStore`].
#[derive(Debug)]
pub struct BlobStoreBuilder<C> {
    connection: Option<C>,
    table_name: Option<String>,
    compression: Option<Compression>,
    blob_extractor: Option<BlobExtractor>,
    span: Option<tracing::Span>,
}

impl<C> Default for BlobStoreBuilder<C> {
    fn default() -> Self {
        Self {
            connection: None,
            table_name: None,
            compression: None,
            blob_extractor: None,
            span: None,
        }
    }
}

impl<C: Deref<Target = Connection>> BlobStoreBuilder<C> {
    pub fn connection(mut self, connection: C) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = Some(compression);
        self
    }

    pub fn blob_extractor(mut self, blob_extractor: BlobExtractor) -> Self {
        self.blob_extractor = Some(blob_extractor);
        self
    }

    /// Span entered by every operation. Defaults to a `blob_store` span
    /// carrying the table name.
    pub fn span(mut self, span: tracing::Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn build(self) -> Result<BlobStore<C>> {
        let conn = self.connection.ok_or_else(|| missing("connection"))?;
        let table = TableName::new(self.table_name.ok_or_else(|| missing("table_name"))?)?;
        let compression = self.compression.ok_or_else(|| missing("compression"))?;
        let extractor = self
            .blob_extractor
            .ok_or_else(|| missing("blob_extractor"))?;
        let span = self
            .span
            .unwrap_or_else(|| tracing::debug_span!("blob_store", table = %table.raw()));

        span.in_scope(|| {
            tracing::debug!(
                compression = %compression,
                extractor = extractor.name(),
                "blob store ready"
            );
        });

        Ok(BlobStore {
            conn,
            table,
            compression,
            extractor,
            span,
        })
    }
}

fn missing(field: &str) -> Error {
    Error::InvalidArgument(format!("{field} is required"))
}
