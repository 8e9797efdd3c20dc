use std::ops::Deref;

use rusqlite::Connection;

use db_blobstore_core::Result;
use db_blobstore_core::path::VirtualPath;

use crate::store::FileMeta;

use super::BlobStore;

pub(super) fn list<C: Deref<Target = Connection>>(
    store: &BlobStore<C>,
    directory: Option<&str>,
    recurse: bool,
) -> Result<Vec<FileMeta>> {
    let _enter = store.span.enter();
    let directory = directory.map_or_else(VirtualPath::root, VirtualPath::for_directory);

    let table = store.table();
    let files = if recurse {
        table.list_tree(directory.directory())?
    } else {
        table.list_directory(directory.directory())?
    };

    tracing::debug!(
        directory = directory.directory(),
        recurse,
        count = files.len(),
        "listed files"
    );
    Ok(files)
}
