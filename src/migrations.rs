use crate::store::quote_identifier;

const SQLITE_INIT: &str = include_str!("../migrations/sqlite/0001_init.sql");

/// Creates the file table `table` if it does not exist yet.
///
/// The table keeps SQLite's implicit rowid; incremental BLOB I/O addresses
/// rows by it.
pub fn create_table(conn: &rusqlite::Connection, table: &str) -> rusqlite::Result<()> {
    let sql = SQLITE_INIT.replace("{table}", &quote_identifier(table));
    tracing::debug!(sql = %sql, "create table");
    conn.execute_batch(&sql)?;
    Ok(())
}
