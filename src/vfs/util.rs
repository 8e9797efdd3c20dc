use std::time::{SystemTime, UNIX_EPOCH};

use db_blobstore_core::path::VirtualPath;
use db_blobstore_core::{Error, Result};

pub(super) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().min(u128::from(u64::MAX)) as u64)
        .unwrap_or(0)
}

/// Parses `raw` as a file path; directory-shaped input (empty filename) is rejected.
pub(super) fn file_path(raw: &str) -> Result<VirtualPath> {
    let path = VirtualPath::for_file(raw);
    if path.filename().is_empty() {
        return Err(Error::InvalidArgument(format!(
            "{path} names a directory, not a file"
        )));
    }
    Ok(path)
}
