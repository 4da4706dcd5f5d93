//! PRAGMA settings for building the relational snapshot
//!
//! The snapshot is written once into a temporary file and renamed into place,
//! so durability of individual transactions is traded for load speed. The
//! rollback journal stays in memory so a failed batch still rolls back.

use rusqlite::Connection;

pub fn apply_bulk_load_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "MEMORY")?;
    conn.pragma_update(None, "synchronous", "OFF")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    // negative value = KiB
    conn.pragma_update(None, "cache_size", -64_000)?;
    conn.pragma_update(None, "foreign_keys", "OFF")?;

    log::debug!("Applied bulk-load PRAGMAs (journal=MEMORY, synchronous=OFF)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pragmas_applied() {
        let dir = tempfile::tempdir().unwrap();
        let conn = Connection::open(dir.path().join("t.db")).unwrap();
        apply_bulk_load_pragmas(&conn).unwrap();

        let journal: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(journal.to_lowercase(), "memory");

        let temp_store: i64 = conn
            .query_row("PRAGMA temp_store", [], |row| row.get(0))
            .unwrap();
        assert_eq!(temp_store, 2);
    }
}
