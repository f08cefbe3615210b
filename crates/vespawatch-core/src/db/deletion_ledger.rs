//! Pending-deletion ledger repository
//!
//! Decouples local deletion from the next sync pass: remote ids are queued
//! here and only removed after the remote delete call succeeds.

use async_trait::async_trait;
use chrono::Utc;
use libsql::{params, Connection};

use crate::error::Result;
use crate::models::PendingDeletion;

/// Trait for pending-deletion ledger operations
#[async_trait]
pub trait DeletionLedgerRepository {
    /// Queue a remote id for deletion on the remote platform
    async fn enqueue(&self, remote_id: i64) -> Result<()>;

    /// List queued entries, oldest first
    async fn list(&self) -> Result<Vec<PendingDeletion>>;

    /// Remove an entry after the remote delete succeeded
    async fn remove(&self, remote_id: i64) -> Result<()>;
}

/// libSQL implementation of `DeletionLedgerRepository`
pub struct LibSqlDeletionLedgerRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlDeletionLedgerRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl DeletionLedgerRepository for LibSqlDeletionLedgerRepository<'_> {
    async fn enqueue(&self, remote_id: i64) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO pending_deletions (remote_id, created_at) VALUES (?, ?)",
                params![remote_id, Utc::now().timestamp_millis()],
            )
            .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<PendingDeletion>> {
        let mut rows = self
            .conn
            .query(
                "SELECT remote_id, created_at FROM pending_deletions ORDER BY created_at",
                (),
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(PendingDeletion {
                remote_id: row.get(0)?,
                created_at: row.get(1)?,
            });
        }
        Ok(entries)
    }

    async fn remove(&self, remote_id: i64) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM pending_deletions WHERE remote_id = ?",
                params![remote_id],
            )
            .await?;
        Ok(())
    }
}
