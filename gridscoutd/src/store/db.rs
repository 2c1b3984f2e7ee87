use std::path::Path;
use anyhow::{Context, Result};
use rusqlite::{Connection, params, OptionalExtension};
use chrono::Utc;
use super::BlobStore;

pub struct SqliteBlobStore {
    conn: Connection,
}

impl SqliteBlobStore {
    /// Open or create the SQLite database with WAL mode enabled
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")
            .context("Failed to enable WAL mode")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS blobs (
                key        TEXT PRIMARY KEY,
                value      BLOB NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .context("Failed to create database schema")?;

        Ok(Self { conn })
    }

    /// Keys currently stored, for diagnostics
    pub fn keys(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM blobs ORDER BY key")
            .context("Failed to prepare query")?;

        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("Failed to query keys")?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to collect keys")?;

        Ok(keys)
    }
}

impl BlobStore for SqliteBlobStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.conn
            .query_row(
                "SELECT value FROM blobs WHERE key = ?1",
                params![key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()
            .with_context(|| format!("Failed to read blob {}", key))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.conn
            .execute(
                r#"
                INSERT INTO blobs (key, value, updated_at) VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                "#,
                params![key, value, Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("Failed to write blob {}", key))?;
        Ok(())
    }
}
