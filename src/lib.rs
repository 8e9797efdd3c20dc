#![forbid(unsafe_code)]

//! `db-blobstore` stores files as BLOB rows in an SQLite table.
//!
//! - `vfs`: the [`BlobStore`] engine (list/get/write/rename/delete)
//! - `store`: table naming and the SQL behind each operation
//! - `blob`: strategies that turn a database BLOB into a caller-owned stream
//! - `codec`, `counting`: zlib framing and byte counting on the write path
//! - `resource`: byte sources accepted by writes
//! - `migrations`: schema bootstrap for a file table

pub mod blob;
pub mod codec;
pub mod counting;
pub mod migrations;
pub mod resource;
pub mod store;
pub mod vfs;

pub use blob::{BlobExtractor, purge_leftover_buffers};
pub use db_blobstore_core::config::{BlobExtractorConfig, Compression, StoreConfig};
pub use db_blobstore_core::path::VirtualPath;
pub use db_blobstore_core::{Error, ErrorKind, Result};
pub use resource::{BytesResource, FileResource, ReaderResource, Resource};
pub use store::FileMeta;
pub use vfs::{BlobStore, BlobStoreBuilder, FileHandle};
