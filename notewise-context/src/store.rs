//! Summary persistence.
//!
//! The condensed summary of a document's conversation is stored per document
//! so it survives reloads. [`SqliteSummaryStore`] is the durable backend;
//! [`InMemorySummaryStore`] serves tests and throwaway sessions.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

// ============================================================================
// Traits
// ============================================================================

/// Per-document summary storage.
#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Stored summary for a document, if any.
    async fn read(&self, document_id: &str) -> anyhow::Result<Option<String>>;

    /// Store (or replace) a document's summary.
    async fn write(&self, document_id: &str, summary: &str) -> anyhow::Result<()>;

    /// Remove a document's summary. Missing entries are not an error.
    async fn clear(&self, document_id: &str) -> anyhow::Result<()>;
}

/// Callback invoked by the context manager after each successful compaction.
#[async_trait]
pub trait SummaryPersister: Send + Sync {
    async fn persist(&self, summary: &str) -> anyhow::Result<()>;
}

/// Persists summaries of one document into a [`SummaryStore`].
pub struct DocumentSummaryPersister {
    store: Arc<dyn SummaryStore>,
    document_id: String,
}

impl DocumentSummaryPersister {
    pub fn new(store: Arc<dyn SummaryStore>, document_id: impl Into<String>) -> Self {
        Self {
            store,
            document_id: document_id.into(),
        }
    }
}

#[async_trait]
impl SummaryPersister for DocumentSummaryPersister {
    async fn persist(&self, summary: &str) -> anyhow::Result<()> {
        self.store.write(&self.document_id, summary).await
    }
}

// ============================================================================
// SQLite
// ============================================================================

/// SQLite-backed summary store.
pub struct SqliteSummaryStore {
    db_path: PathBuf,
}

impl SqliteSummaryStore {
    /// Open (creating if needed) the database at `db_path`.
    pub fn open(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS context_summaries (
                document_id TEXT PRIMARY KEY,
                summary TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;

        tracing::debug!(path = %db_path.display(), "Opened summary store");

        Ok(Self {
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Last update time (RFC 3339) of a document's summary.
    pub async fn updated_at(&self, document_id: &str) -> anyhow::Result<Option<String>> {
        let db_path = self.db_path.clone();
        let document_id = document_id.to_string();

        tokio::task::spawn_blocking(move || -> anyhow::Result<Option<String>> {
            let conn = Connection::open(&db_path)?;
            let updated = conn
                .query_row(
                    "SELECT updated_at FROM context_summaries WHERE document_id = ?1",
                    params![document_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(updated)
        })
        .await?
    }
}

#[async_trait]
impl SummaryStore for SqliteSummaryStore {
    async fn read(&self, document_id: &str) -> anyhow::Result<Option<String>> {
        let db_path = self.db_path.clone();
        let document_id = document_id.to_string();

        tokio::task::spawn_blocking(move || -> anyhow::Result<Option<String>> {
            let conn = Connection::open(&db_path)?;
            let summary = conn
                .query_row(
                    "SELECT summary FROM context_summaries WHERE document_id = ?1",
                    params![document_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(summary)
        })
        .await?
    }

    async fn write(&self, document_id: &str, summary: &str) -> anyhow::Result<()> {
        let db_path = self.db_path.clone();
        let document_id = document_id.to_string();
        let summary = summary.to_string();

        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let conn = Connection::open(&db_path)?;
            let now = chrono::Utc::now().to_rfc3339();
            conn.execute(
                "INSERT OR REPLACE INTO context_summaries (document_id, summary, updated_at) VALUES (?1, ?2, ?3)",
                params![document_id, summary, now],
            )?;
            Ok(())
        })
        .await??;

        Ok(())
    }

    async fn clear(&self, document_id: &str) -> anyhow::Result<()> {
        let db_path = self.db_path.clone();
        let document_id = document_id.to_string();

        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let conn = Connection::open(&db_path)?;
            conn.execute(
                "DELETE FROM context_summaries WHERE document_id = ?1",
                params![document_id],
            )?;
            Ok(())
        })
        .await??;

        Ok(())
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Volatile summary store.
#[derive(Default)]
pub struct InMemorySummaryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemorySummaryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SummaryStore for InMemorySummaryStore {
    async fn read(&self, document_id: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.read().await.get(document_id).cloned())
    }

    async fn write(&self, document_id: &str, summary: &str) -> anyhow::Result<()> {
        self.entries
            .write()
            .await
            .insert(document_id.to_string(), summary.to_string());
        Ok(())
    }

    async fn clear(&self, document_id: &str) -> anyhow::Result<()> {
        self.entries.write().await.remove(document_id);
        Ok(())
    }
}
