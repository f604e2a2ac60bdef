use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio_rusqlite::Connection;

use crate::document::ChunkRecord;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),
    #[error("Database connection error: {0}")]
    Connection(String),
}

/// Tables the service owns. Table names are never taken from input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Chunks,
    QueryResponses,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Chunks => "chunks",
            Table::QueryResponses => "query_responses",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredChunk {
    pub id: i64,
    pub text: String,
    pub page: i64,
    pub source: String,
}

#[derive(Clone)]
pub struct Database {
    conn: Arc<Connection>,
}

impl Database {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DatabaseError::Connection(e.to_string()))?;
        }
        let conn = Connection::open(path)
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;
        tracing::info!("Successfully connected to the database: {}", path.display());
        Self::with_connection(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;
        Self::with_connection(conn).await
    }

    async fn with_connection(conn: Connection) -> Result<Self, DatabaseError> {
        let db = Self {
            conn: Arc::new(conn),
        };
        db.initialize().await?;
        Ok(db)
    }

    async fn initialize(&self) -> Result<(), DatabaseError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "CREATE TABLE IF NOT EXISTS chunks (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        text TEXT NOT NULL,
                        page INTEGER NOT NULL,
                        source TEXT NOT NULL
                    );
                    CREATE TABLE IF NOT EXISTS query_responses (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        user_id TEXT NOT NULL,
                        query TEXT NOT NULL,
                        response TEXT NOT NULL,
                        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
                    );
                    CREATE INDEX IF NOT EXISTS idx_query_responses_lookup
                        ON query_responses (user_id, query);",
                )?;
                Ok(())
            })
            .await?;

        tracing::info!("Tables 'chunks' and 'query_responses' are ready");
        Ok(())
    }

    pub async fn insert_chunks(&self, records: &[ChunkRecord]) -> Result<usize, DatabaseError> {
        let records = records.to_vec();
        let inserted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt =
                        tx.prepare("INSERT INTO chunks (text, page, source) VALUES (?1, ?2, ?3)")?;
                    for record in &records {
                        stmt.execute((&record.text, record.page, &record.source))?;
                    }
                }
                tx.commit()?;
                Ok(records.len())
            })
            .await?;

        tracing::info!("Inserted {} chunk(s) into 'chunks' table.", inserted);
        Ok(inserted)
    }

    pub async fn all_chunks(&self) -> Result<Vec<StoredChunk>, DatabaseError> {
        let chunks = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT id, text, page, source FROM chunks ORDER BY id")?;
                let rows = stmt.query_map([], |row| {
                    Ok(StoredChunk {
                        id: row.get(0)?,
                        text: row.get(1)?,
                        page: row.get(2)?,
                        source: row.get(3)?,
                    })
                })?;

                let mut chunks = Vec::new();
                for row in rows {
                    chunks.push(row?);
                }
                Ok(chunks)
            })
            .await?;

        tracing::info!("Pulled {} row(s) from table 'chunks'.", chunks.len());
        Ok(chunks)
    }

    pub async fn clear(&self, table: Table) -> Result<usize, DatabaseError> {
        let sql = format!("DELETE FROM {}", table.as_str());
        let deleted = self
            .conn
            .call(move |conn| {
                let deleted = conn.execute(&sql, [])?;
                Ok(deleted)
            })
            .await?;

        tracing::info!("All records deleted from table '{}' ({} rows).", table.as_str(), deleted);
        Ok(deleted)
    }

    pub async fn count(&self, table: Table) -> Result<i64, DatabaseError> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.as_str());
        let count = self
            .conn
            .call(move |conn| {
                let count = conn.query_row(&sql, [], |row| row.get::<_, i64>(0))?;
                Ok(count)
            })
            .await?;
        Ok(count)
    }

    pub async fn save_query_response(
        &self,
        user_id: String,
        query: String,
        response: String,
    ) -> Result<(), DatabaseError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO query_responses (user_id, query, response) VALUES (?1, ?2, ?3)",
                    [&user_id, &query, &response],
                )?;
                Ok(())
            })
            .await?;

        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn drop_table(&self, table: Table) -> Result<(), DatabaseError> {
        let sql = format!("DROP TABLE {}", table.as_str());
        self.conn
            .call(move |conn| {
                conn.execute_batch(&sql)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Most recent answer given to this user for exactly this query.
    pub async fn cached_response(
        &self,
        user_id: String,
        query: String,
    ) -> Result<Option<String>, DatabaseError> {
        let result = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT response FROM query_responses
                     WHERE user_id = ?1 AND query = ?2
                     ORDER BY id DESC
                     LIMIT 1",
                )?;
                let mut rows = stmt.query([&user_id, &query])?;

                let cached = match rows.next()? {
                    Some(row) => Some(row.get::<_, String>(0)?),
                    None => None,
                };
                Ok(cached)
            })
            .await?;

        Ok(result)
    }
}
