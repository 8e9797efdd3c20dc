use std::io::{self, Read};

use rusqlite::blob::Blob;
use rusqlite::{Connection, DatabaseName, OptionalExtension, params};

use db_blobstore_core::path::VirtualPath;
use db_blobstore_core::{Error, Result};

use super::{
    FileMeta, LIKE_ESCAPE, NewRow, TableName, UNKNOWN_LENGTH, db_err, length_from_sql,
    u64_to_i64,
};

const CONTENTS_COLUMN: &str = "file_contents";
const SAVEPOINT_NAME: &str = "blobstore";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Applied,
    NotFound,
}

/// Statements against one file table, borrowed from an open connection.
pub struct SqliteTable<'c> {
    conn: &'c Connection,
    name: &'c TableName,
}

impl<'c> SqliteTable<'c> {
    pub fn new(conn: &'c Connection, name: &'c TableName) -> Self {
        Self { conn, name }
    }

    pub fn list_directory(&self, directory: &str) -> Result<Vec<FileMeta>> {
        let sql = format!(
            "SELECT directory, filename, content_length, last_modified
             FROM {}
             WHERE directory = ?1",
            self.name.quoted()
        );
        self.query_metas(&sql, params![directory])
    }

    /// Lists every file whose directory starts with `prefix`.
    pub fn list_tree(&self, prefix: &str) -> Result<Vec<FileMeta>> {
        // LIKE folds ASCII case in SQLite; the substr comparison keeps the match exact.
        let sql = format!(
            "SELECT directory, filename, content_length, last_modified
             FROM {}
             WHERE directory LIKE ?1 ESCAPE '{LIKE_ESCAPE}'
               AND substr(directory, 1, length(?2)) = ?2",
            self.name.quoted()
        );
        let pattern = super::like_prefix_pattern(prefix);
        self.query_metas(&sql, params![pattern, prefix])
    }

    fn query_metas(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<FileMeta>> {
        tracing::debug!(sql = %sql, "list");
        let mut stmt = self.conn.prepare(sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params, |row| {
                let directory = row.get::<_, String>(0)?;
                let filename = row.get::<_, String>(1)?;
                Ok(FileMeta {
                    path: VirtualPath::for_file(&format!("{directory}{filename}")),
                    content_length: length_from_sql(row.get::<_, i64>(2)?),
                    last_modified_ms: i64_to_u64_sql(row.get::<_, i64>(3)?, "last_modified")?,
                })
            })
            .map_err(db_err)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(db_err)?);
        }
        Ok(out)
    }

    pub fn find_meta(&self, path: &VirtualPath) -> Result<Option<FileMeta>> {
        let sql = format!(
            "SELECT content_length, last_modified
             FROM {}
             WHERE directory = ?1 AND filename = ?2",
            self.name.quoted()
        );
        tracing::debug!(sql = %sql, "lookup");
        self.conn
            .query_row(&sql, params![path.directory(), path.filename()], |row| {
                Ok(FileMeta {
                    path: path.clone(),
                    content_length: length_from_sql(row.get::<_, i64>(0)?),
                    last_modified_ms: i64_to_u64_sql(row.get::<_, i64>(1)?, "last_modified")?,
                })
            })
            .optional()
            .map_err(db_err)
    }

    pub fn count(&self, path: &VirtualPath) -> Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE directory = ?1 AND filename = ?2",
            self.name.quoted()
        );
        tracing::debug!(sql = %sql, "count");
        let count = self
            .conn
            .query_row(&sql, params![path.directory(), path.filename()], |row| {
                row.get::<_, i64>(0)
            })
            .map_err(db_err)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Returns the rowid of the row holding `path`.
    pub fn locate_contents(&self, path: &VirtualPath) -> Result<Option<i64>> {
        let sql = format!(
            "SELECT rowid FROM {} WHERE directory = ?1 AND filename = ?2",
            self.name.quoted()
        );
        tracing::debug!(sql = %sql, "locate");
        self.conn
            .query_row(&sql, params![path.directory(), path.filename()], |row| {
                row.get::<_, i64>(0)
            })
            .optional()
            .map_err(db_err)
    }

    /// Re-reads the `compressed` flag of `rowid`, provided it still holds `path`.
    ///
    /// Rowids are reused after deletes, so a rowid found by
    /// [`locate_contents`](Self::locate_contents) is checked again once its
    /// BLOB is open; later changes to the row expire the open BLOB.
    pub fn confirm_contents(&self, rowid: i64, path: &VirtualPath) -> Result<Option<bool>> {
        let sql = format!(
            "SELECT compressed FROM {} WHERE rowid = ?1 AND directory = ?2 AND filename = ?3",
            self.name.quoted()
        );
        tracing::debug!(sql = %sql, "confirm");
        self.conn
            .query_row(
                &sql,
                params![rowid, path.directory(), path.filename()],
                |row| row.get::<_, bool>(0),
            )
            .optional()
            .map_err(db_err)
    }

    /// Opens the BLOB column of `rowid` for incremental reading.
    ///
    /// Returns `None` when the row no longer exists.
    pub fn open_contents(&self, rowid: i64) -> Result<Option<Blob<'c>>> {
        match self.conn.blob_open(
            DatabaseName::Main,
            self.name.raw(),
            CONTENTS_COLUMN,
            rowid,
            true,
        ) {
            Ok(blob) => Ok(Some(blob)),
            Err(err) if is_missing_row(&err) => Ok(None),
            Err(err) => Err(db_err(err)),
        }
    }

    /// Inserts a row whose BLOB is `stored_len` bytes read from `payload`.
    ///
    /// The BLOB is allocated with `zeroblob` and filled through incremental
    /// I/O, so the payload never has to be held in memory. Callers run this
    /// inside a [`TxGuard`] so a failed copy leaves no row behind.
    pub(crate) fn insert(
        &self,
        row: &NewRow<'_>,
        stored_len: u64,
        payload: &mut dyn Read,
    ) -> Result<()> {
        let content_length = match row.content_length {
            Some(len) => u64_to_i64(len, "content_length")?,
            None => UNKNOWN_LENGTH,
        };
        let last_modified = u64_to_i64(row.last_modified_ms, "last_modified")?;
        let stored_len_i64 = u64_to_i64(stored_len, "stored_len")?;

        let sql = format!(
            "INSERT INTO {} (
                directory, filename, content_length, last_modified, compressed, file_contents
             ) VALUES (?1, ?2, ?3, ?4, ?5, zeroblob(?6))",
            self.name.quoted()
        );
        tracing::debug!(sql = %sql, "insert");
        let res = self.conn.execute(
            &sql,
            params![
                row.path.directory(),
                row.path.filename(),
                content_length,
                last_modified,
                row.compressed,
                stored_len_i64,
            ],
        );
        if let Err(err) = res {
            if is_unique_violation(&err) {
                tracing::debug!(path = %row.path, err = %err, "insert hit unique constraint");
                return Err(Error::AlreadyExists(row.path.to_string()));
            }
            return Err(db_err(err));
        }

        let rowid = self.conn.last_insert_rowid();
        let mut blob = self
            .conn
            .blob_open(DatabaseName::Main, self.name.raw(), CONTENTS_COLUMN, rowid, false)
            .map_err(db_err)?;
        let copied = io::copy(&mut (&mut *payload).take(stored_len), &mut blob)
            .map_err(|err| Error::backend("failed to stream payload into blob", err))?;
        if copied != stored_len {
            return Err(Error::backend_msg(format!(
                "payload for {} ended after {copied} of {stored_len} bytes",
                row.path
            )));
        }
        blob.close().map_err(db_err)
    }

    pub fn update_length(&self, path: &VirtualPath, content_length: u64) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET content_length = ?1 WHERE directory = ?2 AND filename = ?3",
            self.name.quoted()
        );
        tracing::debug!(sql = %sql, "update length");
        let content_length = u64_to_i64(content_length, "content_length")?;
        self.conn
            .execute(&sql, params![content_length, path.directory(), path.filename()])
            .map_err(db_err)?;
        Ok(())
    }

    pub fn rename(&self, source: &VirtualPath, target: &VirtualPath) -> Result<RowOutcome> {
        let sql = format!(
            "UPDATE {}
             SET directory = ?1, filename = ?2
             WHERE directory = ?3 AND filename = ?4",
            self.name.quoted()
        );
        tracing::debug!(sql = %sql, "rename");
        let res = self.conn.execute(
            &sql,
            params![
                target.directory(),
                target.filename(),
                source.directory(),
                source.filename(),
            ],
        );
        match res {
            Ok(0) => Ok(RowOutcome::NotFound),
            Ok(_) => Ok(RowOutcome::Applied),
            Err(err) if is_unique_violation(&err) => {
                tracing::debug!(%source, %target, err = %err, "rename hit unique constraint");
                Err(Error::AlreadyExists(target.to_string()))
            }
            Err(err) => Err(db_err(err)),
        }
    }

    pub fn delete(&self, path: &VirtualPath) -> Result<RowOutcome> {
        let sql = format!(
            "DELETE FROM {} WHERE directory = ?1 AND filename = ?2",
            self.name.quoted()
        );
        tracing::debug!(sql = %sql, "delete");
        let deleted = self
            .conn
            .execute(&sql, params![path.directory(), path.filename()])
            .map_err(db_err)?;
        Ok(if deleted == 0 {
            RowOutcome::NotFound
        } else {
            RowOutcome::Applied
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    Read,
    Write,
}

/// Transaction scope that nests under a caller's open transaction.
///
/// On a connection in autocommit mode this is a real transaction (`BEGIN
/// IMMEDIATE` for writes so concurrent writers queue on the busy handler);
/// inside an existing transaction it is a savepoint. Dropping the guard
/// without [`commit`](Self::commit) rolls back.
pub struct TxGuard<'c> {
    conn: &'c Connection,
    nested: bool,
    finished: bool,
}

impl<'c> TxGuard<'c> {
    pub fn begin(conn: &'c Connection, mode: TxMode) -> Result<Self> {
        let nested = !conn.is_autocommit();
        let sql = match (nested, mode) {
            (true, _) => format!("SAVEPOINT {SAVEPOINT_NAME}"),
            (false, TxMode::Read) => "BEGIN DEFERRED".to_string(),
            (false, TxMode::Write) => "BEGIN IMMEDIATE".to_string(),
        };
        conn.execute_batch(&sql).map_err(db_err)?;
        Ok(Self {
            conn,
            nested,
            finished: false,
        })
    }

    /// Commits; on failure the guard still rolls back when dropped.
    pub fn commit(mut self) -> Result<()> {
        let sql = if self.nested {
            format!("RELEASE {SAVEPOINT_NAME}")
        } else {
            "COMMIT".to_string()
        };
        self.conn.execute_batch(&sql).map_err(db_err)?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for TxGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let sql = if self.nested {
            format!("ROLLBACK TO {SAVEPOINT_NAME}; RELEASE {SAVEPOINT_NAME}")
        } else {
            "ROLLBACK".to_string()
        };
        if let Err(err) = self.conn.execute_batch(&sql) {
            tracing::warn!(err = %err, "rollback failed");
        }
    }
}

fn i64_to_u64_sql(value: i64, field: &'static str) -> rusqlite::Result<u64> {
    u64::try_from(value).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Integer,
            Box::new(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid negative {field} value: {value}"),
            )),
        )
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    use rusqlite::Error::SqliteFailure;
    match err {
        SqliteFailure(code, _) => {
            matches!(code.code, rusqlite::ErrorCode::ConstraintViolation)
                && matches!(
                    code.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                )
        }
        _ => false,
    }
}

fn is_missing_row(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.starts_with("no such rowid")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Connection, TableName) {
        let conn = Connection::open_in_memory().unwrap();
        crate::migrations::create_table(&conn, "files").unwrap();
        (conn, TableName::new("files").unwrap())
    }

    fn insert(table: &SqliteTable<'_>, raw_path: &str, body: &[u8]) -> Result<()> {
        let path = VirtualPath::for_file(raw_path);
        let row = NewRow {
            path: &path,
            content_length: Some(body.len() as u64),
            last_modified_ms: 1,
            compressed: false,
        };
        table.insert(&row, body.len() as u64, &mut &body[..])
    }

    #[test]
    fn duplicate_insert_is_already_exists() {
        let (conn, name) = setup();
        let table = SqliteTable::new(&conn, &name);
        insert(&table, "/a.txt", b"one").unwrap();
        let err = insert(&table, "/a.txt", b"two").unwrap_err();
        assert_eq!(err.code(), "already_exists");
    }

    #[test]
    fn short_payload_is_rejected() {
        let (conn, name) = setup();
        let table = SqliteTable::new(&conn, &name);
        let path = VirtualPath::for_file("/short.txt");
        let row = NewRow {
            path: &path,
            content_length: Some(10),
            last_modified_ms: 1,
            compressed: false,
        };
        let err = table.insert(&row, 10, &mut &b"abc"[..]).unwrap_err();
        assert_eq!(err.code(), "backend");
    }

    #[test]
    fn tree_listing_is_case_sensitive_and_literal() {
        let (conn, name) = setup();
        let table = SqliteTable::new(&conn, &name);
        insert(&table, "/Dir/a.txt", b"a").unwrap();
        insert(&table, "/dir/b.txt", b"b").unwrap();
        insert(&table, "/50%_off/c.txt", b"c").unwrap();
        insert(&table, "/50xxoff/d.txt", b"d").unwrap();

        assert_eq!(table.list_tree("/dir/").unwrap().len(), 1);
        assert_eq!(table.list_tree("/Dir/").unwrap().len(), 1);
        let literal = table.list_tree("/50%_off/").unwrap();
        assert_eq!(literal.len(), 1);
        assert_eq!(literal[0].filename(), "c.txt");
        assert_eq!(table.list_tree("/").unwrap().len(), 4);
    }

    #[test]
    fn rename_and_delete_report_missing_rows() {
        let (conn, name) = setup();
        let table = SqliteTable::new(&conn, &name);
        let missing = VirtualPath::for_file("/nope");
        let target = VirtualPath::for_file("/other");
        assert_eq!(table.rename(&missing, &target).unwrap(), RowOutcome::NotFound);
        assert_eq!(table.delete(&missing).unwrap(), RowOutcome::NotFound);
    }

    #[test]
    fn reused_rowid_is_not_confirmed_for_old_path() {
        let (conn, name) = setup();
        let table = SqliteTable::new(&conn, &name);
        let old = VirtualPath::for_file("/old.txt");
        insert(&table, "/old.txt", b"old").unwrap();
        let rowid = table.locate_contents(&old).unwrap().unwrap();
        assert_eq!(table.confirm_contents(rowid, &old).unwrap(), Some(false));

        table.delete(&old).unwrap();
        insert(&table, "/new.txt", b"new").unwrap();
        let new = VirtualPath::for_file("/new.txt");
        let reused = table.locate_contents(&new).unwrap().unwrap();
        assert_eq!(reused, rowid);
        assert!(table.open_contents(rowid).unwrap().is_some());
        assert_eq!(table.confirm_contents(rowid, &old).unwrap(), None);
    }

    #[test]
    fn open_contents_of_missing_row_is_none() {
        let (conn, name) = setup();
        let table = SqliteTable::new(&conn, &name);
        assert!(table.open_contents(12345).unwrap().is_none());
    }

    #[test]
    fn guard_rolls_back_when_dropped() {
        let (conn, name) = setup();
        let table = SqliteTable::new(&conn, &name);
        {
            let _tx = TxGuard::begin(&conn, TxMode::Write).unwrap();
            insert(&table, "/gone.txt", b"x").unwrap();
        }
        assert!(conn.is_autocommit());
        assert_eq!(table.count(&VirtualPath::for_file("/gone.txt")).unwrap(), 0);
    }

    #[test]
    fn guard_nests_as_savepoint() {
        let (conn, name) = setup();
        let table = SqliteTable::new(&conn, &name);
        conn.execute_batch("BEGIN").unwrap();
        insert(&table, "/kept.txt", b"k").unwrap();
        {
            let _tx = TxGuard::begin(&conn, TxMode::Write).unwrap();
            insert(&table, "/dropped.txt", b"d").unwrap();
        }
        let tx = TxGuard::begin(&conn, TxMode::Write).unwrap();
        insert(&table, "/released.txt", b"r").unwrap();
        tx.commit().unwrap();
        assert!(!conn.is_autocommit());
        conn.execute_batch("COMMIT").unwrap();

        assert_eq!(table.count(&VirtualPath::for_file("/kept.txt")).unwrap(), 1);
        assert_eq!(table.count(&VirtualPath::for_file("/dropped.txt")).unwrap(), 0);
        assert_eq!(table.count(&VirtualPath::for_file("/released.txt")).unwrap(), 1);
    }
}
