use std::ops::Deref;

use rusqlite::Connection;

use db_blobstore_core::{Error, Result};

use crate::store::sqlite::RowOutcome;

use super::BlobStore;
use super::util::file_path;

pub(super) fn delete<C: Deref<Target = Connection>>(
    store: &BlobStore<C>,
    path: &str,
) -> Result<()> {
    let _enter = store.span.enter();
    let path = file_path(path)?;

    match store.table().delete(&path)? {
        RowOutcome::Applied => {
            tracing::debug!(%path, "deleted file");
            Ok(())
        }
        RowOutcome::NotFound => Err(Error::NotFound(path.to_string())),
    }
}
