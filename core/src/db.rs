use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

/// SQLite-backed document table: one JSON body per `(collection, id)`.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS documents (
                    collection TEXT NOT NULL,
                    id TEXT NOT NULL,
                    body TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (collection, id)
                );

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    pub fn get_document(&self, collection: &str, id: &str) -> Result<Option<String>> {
        let body = self
            .conn
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(body)
    }

    /// Replace the whole document body. Last writer wins.
    pub fn put_document(&self, collection: &str, id: &str, body: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO documents (collection, id, body, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(collection, id) DO UPDATE SET
                body = excluded.body,
                updated_at = excluded.updated_at",
            params![collection, id, body, now],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_document_is_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_document("c", "doc").unwrap().is_none());
    }

    #[test]
    fn test_put_replaces_whole_body() {
        let db = Database::open_in_memory().unwrap();
        db.put_document("c", "doc", r#"{"a":1,"b":2}"#).unwrap();
        db.put_document("c", "doc", r#"{"a":3}"#).unwrap();
        assert_eq!(
            db.get_document("c", "doc").unwrap().as_deref(),
            Some(r#"{"a":3}"#)
        );
    }

    #[test]
    fn test_documents_are_keyed_by_collection_and_id() {
        let db = Database::open_in_memory().unwrap();
        db.put_document("one", "doc", "1").unwrap();
        db.put_document("two", "doc", "2").unwrap();
        assert_eq!(db.get_document("one", "doc").unwrap().as_deref(), Some("1"));
        assert_eq!(db.get_document("two", "doc").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn test_file_database_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nutri.db");
        {
            let db = Database::open(&path).unwrap();
            db.put_document("c", "doc", "{}").unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.get_document("c", "doc").unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        let version: i64 = db
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }
}
