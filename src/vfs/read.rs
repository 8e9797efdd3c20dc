use std::io::Read;
use std::ops::Deref;

use rusqlite::Connection;

use db_blobstore_core::path::VirtualPath;
use db_blobstore_core::{Error, Result};

use crate::codec;
use crate::store::FileMeta;
use crate::store::sqlite::{TxGuard, TxMode};

use super::BlobStore;
use super::util::file_path;

pub(super) fn get<'s, C: Deref<Target = Connection>>(
    store: &'s BlobStore<C>,
    path: &str,
) -> Result<FileHandle<'s, C>> {
    let _enter = store.span.enter();
    let path = file_path(path)?;
    match store.table().find_meta(&path)? {
        Some(meta) => Ok(FileHandle::new(store, meta)),
        None => Err(Error::NotFound(path.to_string())),
    }
}

/// A stored file as seen at lookup time.
///
/// Metadata is a snapshot; content is fetched on every [`open`](Self::open).
#[derive(Debug)]
pub struct FileHandle<'s, C> {
    store: &'s BlobStore<C>,
    meta: FileMeta,
}

impl<'s, C: Deref<Target = Connection>> FileHandle<'s, C> {
    pub(super) fn new(store: &'s BlobStore<C>, meta: FileMeta) -> Self {
        Self { store, meta }
    }

    pub fn meta(&self) -> &FileMeta {
        &self.meta
    }

    pub fn path(&self) -> &VirtualPath {
        &self.meta.path
    }

    pub fn filename(&self) -> &str {
        self.meta.filename()
    }

    pub fn content_length(&self) -> Option<u64> {
        self.meta.content_length
    }

    pub fn last_modified_ms(&self) -> u64 {
        self.meta.last_modified_ms
    }

    /// Checks whether the row still exists. Backend failures read as `false`.
    pub fn exists(&self) -> bool {
        let _enter = self.store.span.enter();
        match self.store.table().count(&self.meta.path) {
            Ok(count) => count > 0,
            Err(err) => {
                tracing::debug!(path = %self.meta.path, err = %err, "existence check failed");
                false
            }
        }
    }

    /// Opens the decompressed content.
    ///
    /// With [`BlobExtractor::Direct`](crate::blob::BlobExtractor::Direct) the
    /// stream reads the database incrementally and must be consumed while
    /// the store is borrowed; the buffered strategies detach it first.
    pub fn open(&self) -> Result<Box<dyn Read + 's>> {
        let store = self.store;
        let _enter = store.span.enter();
        let table = store.table();
        let path = &self.meta.path;

        let tx = if store.extractor.is_direct() {
            None
        } else {
            Some(TxGuard::begin(&store.conn, TxMode::Read)?)
        };

        let Some(rowid) = table.locate_contents(path)? else {
            return Err(Error::NotFound(path.to_string()));
        };
        let Some(blob) = table.open_contents(rowid)? else {
            return Err(Error::NotFound(path.to_string()));
        };
        let Some(compressed) = table.confirm_contents(rowid, path)? else {
            return Err(Error::NotFound(path.to_string()));
        };
        let stored_len = blob.len() as u64;
        tracing::debug!(
            %path,
            stored_len,
            compressed,
            extractor = store.extractor.name(),
            "opening file"
        );

        let extracted = store.extractor.extract(blob, stored_len)?;
        if let Some(tx) = tx {
            tx.commit()?;
        }
        Ok(codec::decoder(extracted, compressed))
    }

    pub fn read_to_vec(&self) -> Result<Vec<u8>> {
        let mut reader = self.open()?;
        let mut out = Vec::with_capacity(
            self.meta
                .content_length
                .and_then(|len| usize::try_from(len).ok())
                .unwrap_or(0),
        );
        reader
            .read_to_end(&mut out)
            .map_err(|err| Error::backend(format!("failed to read {}", self.meta.path), err))?;
        Ok(out)
    }
}
