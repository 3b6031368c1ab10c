//! Durable Buffer
//!
//! Persists pending and failed messages across process restarts. One SQLite
//! file per port (spec.md §6: `buffer_<portname>.db`), following the
//! `david-t-martel-serial-mcp-server` example's choice of `sqlx` for async,
//! transactional access from tokio tasks. `PRAGMA journal_mode=WAL` lets
//! the retry/flush tasks read concurrently while a single pool serializes
//! writers, giving the single-writer discipline spec.md §4.4/§5 calls for.
//!
//! The schema is the one table from spec.md §6, shared by both transport
//! variants — the Python original's HTTP-relay path uses a second,
//! divergent `pending_messages` table; this implementation does not carry
//! that split over.

use crate::error::{ForwarderError, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;

const PENDING_SENTINEL: &str = "PENDING_ACCUMULATOR";

#[derive(Debug, Clone)]
pub struct BufferedMessage {
    pub id: i64,
    pub data: Vec<u8>,
    pub timestamp: DateTime<Utc>,
    pub sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
}

pub struct Buffer {
    pool: SqlitePool,
    port_name: String,
    capacity: usize,
}

impl Buffer {
    /// `capacity` bounds the number of *unsent* rows (spec.md §8
    /// "Boundaries"): once at capacity, `insert` evicts the oldest unsent
    /// row before admitting the new one, rather than rejecting the write or
    /// growing unbounded. Sent rows are never evicted by this path; they
    /// age out only via [`Self::purge_old_sent`].
    pub async fn open(port_name: &str, path: &Path, capacity: usize) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
            .map_err(|e| persist_err(port_name, e))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| persist_err(port_name, e))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS buffer (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                data BLOB NOT NULL,
                timestamp TEXT NOT NULL,
                sent INTEGER NOT NULL DEFAULT 0,
                sent_timestamp TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| persist_err(port_name, e))?;

        Ok(Self {
            pool,
            port_name: port_name.to_string(),
            capacity,
        })
    }

    pub async fn insert(&self, payload: &[u8]) -> Result<i64> {
        if self.capacity > 0 && self.count_unsent().await? >= self.capacity as u64 {
            self.evict_oldest_unsent().await?;
        }

        let now = Utc::now().to_rfc3339();
        let result = sqlx::query("INSERT INTO buffer (data, timestamp, sent) VALUES (?, ?, 0)")
            .bind(payload)
            .bind(&now)
            .execute(&self.pool)
            .await
            .map_err(|e| self.persist_err(e))?;
        Ok(result.last_insert_rowid())
    }

    async fn evict_oldest_unsent(&self) -> Result<()> {
        sqlx::query(
            "DELETE FROM buffer WHERE id = (
                SELECT id FROM buffer WHERE sent = 0 AND timestamp != ? ORDER BY id ASC LIMIT 1
            )",
        )
        .bind(PENDING_SENTINEL)
        .execute(&self.pool)
        .await
        .map_err(|e| self.persist_err(e))?;
        Ok(())
    }

    pub async fn mark_sent(&self, ids: &[i64], sent_at: DateTime<Utc>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(|e| self.persist_err(e))?;
        let sent_at_str = sent_at.to_rfc3339();

        for id in ids {
            sqlx::query("UPDATE buffer SET sent = 1, sent_timestamp = ? WHERE id = ?")
                .bind(&sent_at_str)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| self.persist_err(e))?;
        }

        tx.commit().await.map_err(|e| self.persist_err(e))
    }

    pub async fn enumerate_unsent(&self) -> Result<Vec<BufferedMessage>> {
        let rows = sqlx::query(
            "SELECT id, data, timestamp, sent, sent_timestamp FROM buffer
             WHERE sent = 0 AND timestamp != ? ORDER BY id ASC",
        )
        .bind(PENDING_SENTINEL)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| self.persist_err(e))?;

        rows.into_iter().map(|row| self.row_to_message(row)).collect()
    }

    pub async fn count_unsent(&self) -> Result<u64> {
        let row = sqlx::query(
            "SELECT COUNT(*) as c FROM buffer WHERE sent = 0 AND timestamp != ?",
        )
        .bind(PENDING_SENTINEL)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| self.persist_err(e))?;
        Ok(row.get::<i64, _>("c") as u64)
    }

    pub async fn purge_old_sent(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let cutoff_str = cutoff.to_rfc3339();
        let result = sqlx::query(
            "DELETE FROM buffer WHERE sent = 1 AND sent_timestamp IS NOT NULL AND sent_timestamp < ?",
        )
        .bind(&cutoff_str)
        .execute(&self.pool)
        .await
        .map_err(|e| self.persist_err(e))?;
        Ok(result.rows_affected())
    }

    /// Replace the single pending-accumulator row with `bytes`
    pub async fn put_pending(&self, bytes: &[u8]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| self.persist_err(e))?;

        sqlx::query("DELETE FROM buffer WHERE timestamp = ?")
            .bind(PENDING_SENTINEL)
            .execute(&mut *tx)
            .await
            .map_err(|e| self.persist_err(e))?;

        sqlx::query("INSERT INTO buffer (data, timestamp, sent) VALUES (?, ?, 0)")
            .bind(bytes)
            .bind(PENDING_SENTINEL)
            .execute(&mut *tx)
            .await
            .map_err(|e| self.persist_err(e))?;

        tx.commit().await.map_err(|e| self.persist_err(e))
    }

    pub async fn clear_pending(&self) -> Result<()> {
        sqlx::query("DELETE FROM buffer WHERE timestamp = ?")
            .bind(PENDING_SENTINEL)
            .execute(&self.pool)
            .await
            .map_err(|e| self.persist_err(e))?;
        Ok(())
    }

    /// Force a WAL checkpoint, used during orderly shutdown (spec.md §4.6,
    /// step 6) — ordinary writes are already durable per-transaction, this
    /// just folds the WAL back into the main database file.
    pub async fn checkpoint(&self) -> Result<()> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .map_err(|e| self.persist_err(e))?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn load_pending(&self) -> Result<Option<Vec<u8>>> {
        let row = sqlx::query("SELECT data FROM buffer WHERE timestamp = ? LIMIT 1")
            .bind(PENDING_SENTINEL)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| self.persist_err(e))?;
        Ok(row.map(|r| r.get::<Vec<u8>, _>("data")))
    }

    fn row_to_message(&self, row: sqlx::sqlite::SqliteRow) -> Result<BufferedMessage> {
        let id: i64 = row.get("id");
        let data: Vec<u8> = row.get("data");
        let timestamp_str: String = row.get("timestamp");
        let sent: i64 = row.get("sent");
        let sent_timestamp: Option<String> = row.get("sent_timestamp");

        let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| ForwarderError::Persist {
                port: self.port_name.clone(),
                reason: format!("corrupt timestamp for message {}: {}", id, e),
            })?;

        let sent_at = sent_timestamp
            .map(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| ForwarderError::Persist {
                        port: self.port_name.clone(),
                        reason: format!("corrupt sent_timestamp for message {}: {}", id, e),
                    })
            })
            .transpose()?;

        Ok(BufferedMessage {
            id,
            data,
            timestamp,
            sent: sent != 0,
            sent_at,
        })
    }

    fn persist_err(&self, e: sqlx::Error) -> ForwarderError {
        persist_err(&self.port_name, e)
    }
}

fn persist_err(port: &str, e: sqlx::Error) -> ForwarderError {
    ForwarderError::Persist {
        port: port.to_string(),
        reason: e.to_string(),
    }
}
