use std::ops::Deref;

use rusqlite::Connection;

use db_blobstore_core::{Error, Result};

use crate::store::sqlite::RowOutcome;

use super::BlobStore;
use super::util::file_path;

pub(super) fn rename<C: Deref<Target = Connection>>(
    store: &BlobStore<C>,
    source: &str,
    target: &str,
) -> Result<()> {
    let _enter = store.span.enter();
    let source = file_path(source)?;
    let target = file_path(target)?;

    match store.table().rename(&source, &target)? {
        RowOutcome::Applied => {
            tracing::debug!(%source, %target, "renamed file");
            Ok(())
        }
        RowOutcome::NotFound => Err(Error::NotFound(source.to_string())),
    }
}
