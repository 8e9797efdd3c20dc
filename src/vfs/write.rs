use std::io::{self, Read, Seek};
use std::ops::Deref;

use rusqlite::Connection;

use db_blobstore_core::{Error, Result};

use crate::codec;
use crate::counting::CountingReader;
use crate::resource::Resource;
use crate::store::NewRow;
use crate::store::sqlite::{TxGuard, TxMode};

use super::BlobStore;
use super::util::{file_path, now_ms};

/// Encoded payloads up to this size are spooled in memory; larger ones go
/// to an anonymous temp file.
const SPOOL_MEMORY_LIMIT: usize = 8 * 1024 * 1024;

pub(super) fn write<C, R>(store: &BlobStore<C>, path: &str, resource: &mut R) -> Result<()>
where
    C: Deref<Target = Connection>,
    R: Resource + ?Sized,
{
    let _enter = store.span.enter();
    let path = file_path(path)?;

    let description = resource.description();
    let declared = if resource.is_open() {
        None
    } else {
        match resource.content_length() {
            Ok(len) => Some(len),
            Err(err) => {
                tracing::debug!(resource = %description, err = %err, "content length unavailable");
                None
            }
        }
    };
    let last_modified_ms = resource
        .last_modified_ms()
        .filter(|ms| *ms > 0)
        .unwrap_or_else(now_ms);
    let compressed = store.compression.is_enabled();

    let source = resource
        .open()
        .map_err(|err| Error::backend(format!("failed to open {description}"), err))?;
    let counting = CountingReader::new(source);
    let counter = counting.counter();
    let mut encoded = codec::encoder(counting, store.compression);

    // The BLOB is allocated at its final size, so anything whose stored size
    // is not known yet is encoded into a spool first.
    let mut spool;
    let (stored_len, payload): (u64, &mut dyn Read) = match declared {
        Some(len) if !compressed => (len, &mut *encoded),
        _ => {
            spool = tempfile::spooled_tempfile(SPOOL_MEMORY_LIMIT);
            let stored_len = io::copy(&mut encoded, &mut spool)
                .map_err(|err| Error::backend(format!("failed to read {description}"), err))?;
            spool
                .rewind()
                .map_err(|err| Error::backend("failed to rewind spooled payload", err))?;
            (stored_len, &mut spool as &mut dyn Read)
        }
    };

    tracing::debug!(
        %path,
        declared = ?declared,
        stored_len,
        compressed,
        resource = %description,
        "writing file"
    );

    let tx = TxGuard::begin(&store.conn, TxMode::Write)?;
    let table = store.table();
    let row = NewRow {
        path: &path,
        content_length: declared,
        last_modified_ms,
        compressed,
    };
    table.insert(&row, stored_len, payload)?;

    // A source longer than announced shows up as one byte past the end.
    let mut probe = [0u8; 1];
    let overrun = encoded
        .read(&mut probe)
        .map_err(|err| Error::backend(format!("failed to read {description}"), err))?
        > 0;
    let total = counter.get();

    match declared {
        Some(len) if overrun || len != total => {
            return Err(Error::backend_msg(format!(
                "{description} announced {len} bytes but {total} were read"
            )));
        }
        Some(_) => {}
        None => table.update_length(&path, total)?,
    }

    tx.commit()?;
    tracing::debug!(%path, content_length = total, "stored file");
    Ok(())
}
