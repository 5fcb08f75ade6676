//! src/services/paste_store.rs
//!
//! PasteStore — durable paste records in SQLite. The store knows nothing about
//! clocks or id generation; it persists what it is given and owns the one
//! conditional update that makes view-limited reads safe under concurrency.

use crate::models::paste::{Paste, PasteRow};
use chrono::{DateTime, Utc};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
};
use std::{future::Future, str::FromStr, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("paste `{0}` already exists")]
    DuplicateKey(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("paste `{0}` not found")]
    NotFound(String),
    #[error("paste `{0}` has no views left")]
    Exhausted(String),
    #[error("store operation `{0}` timed out")]
    Timeout(&'static str),
    #[error("paste `{id}` has an invalid stored record: {reason}")]
    CorruptRecord { id: String, reason: String },
    #[error("store task failed: {0}")]
    Task(#[from] JoinError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Everything needed to persist a new paste.
#[derive(Debug, Clone, Copy)]
pub struct NewPaste<'a> {
    pub id: &'a str,
    pub content: &'a str,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_views: Option<u32>,
}

/// SQLite-backed paste storage.
///
/// Every public operation is bounded by `op_timeout`; when it elapses the
/// caller gets `StoreError::Timeout`, which says nothing about whether the
/// paste still exists.
#[derive(Clone)]
pub struct PasteStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,

    op_timeout: Duration,
}

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

/// How long a connection waits on SQLite's write lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

impl PasteStore {
    /// Wrap an existing pool.
    pub fn new(db: Arc<SqlitePool>, op_timeout: Duration) -> Self {
        Self { db, op_timeout }
    }

    /// Open (creating if missing) the database at `database_url`.
    ///
    /// WAL mode plus a busy timeout lets concurrent writers queue on the
    /// write lock instead of failing with "database is locked".
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        op_timeout: Duration,
    ) -> StoreResult<Self> {
        let opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(op_timeout)
            .connect_with(opts)
            .await?;

        Ok(Self::new(Arc::new(pool), op_timeout))
    }

    /// Create the `pastes` table and its expiry index.
    ///
    /// Idempotent. Run once at startup, before the store serves requests.
    pub async fn init_schema(&self) -> StoreResult<()> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        info!("Running {} schema statements...", statements.len());

        for stmt in statements {
            debug!("Executing schema SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }

        Ok(())
    }

    /// Run `fut`, failing with `Timeout` if it outlives `op_timeout`.
    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    op,
                    timeout_ms = self.op_timeout.as_millis() as u64,
                    "store operation timed out"
                );
                Err(StoreError::Timeout(op))
            }
        }
    }

    /// Persist a new paste with its full view budget.
    ///
    /// Fails with `DuplicateKey` if the id is taken and `InvalidArgument` if
    /// `max_views` is zero. The insert runs as its own task. If it outlives
    /// `op_timeout` the caller gets `Timeout` and the row is deleted once the
    /// insert lands, so a timed-out put never leaves a paste behind.
    pub async fn put(&self, new: NewPaste<'_>) -> StoreResult<Paste> {
        if new.max_views == Some(0) {
            return Err(StoreError::InvalidArgument(
                "max_views must be at least 1".into(),
            ));
        }

        let mut insert = tokio::spawn(insert_paste(self.db.clone(), OwnedPaste::from(new)));
        match tokio::time::timeout(self.op_timeout, &mut insert).await {
            Ok(joined) => joined?,
            Err(_) => {
                warn!(
                    id = %new.id,
                    timeout_ms = self.op_timeout.as_millis() as u64,
                    "insert timed out, rolling back once it settles"
                );
                tokio::spawn(roll_back_late_insert(
                    self.db.clone(),
                    new.id.to_string(),
                    insert,
                ));
                Err(StoreError::Timeout("put"))
            }
        }
    }

    /// Fetch the raw record. No expiry policy is applied.
    pub async fn get(&self, id: &str) -> StoreResult<Paste> {
        self.bounded("get", async {
            self.fetch(id)
                .await?
                .ok_or_else(|| StoreError::NotFound(id.to_string()))
        })
        .await
    }

    /// Spend one view of the paste and return the record after the spend.
    ///
    /// The decrement is one conditional `UPDATE`, so SQLite serializes racing
    /// callers: of N callers contending for the last view exactly one sees
    /// the record, the rest see `Exhausted`. Pastes without a view limit are
    /// returned unchanged. Absent pastes yield `NotFound`.
    pub async fn consume_view(&self, id: &str) -> StoreResult<Paste> {
        self.bounded("consume_view", async {
            let updated = sqlx::query_as::<_, PasteRow>(
                r#"
                UPDATE pastes
                SET remaining_views = remaining_views - 1
                WHERE id = ?
                  AND remaining_views IS NOT NULL
                  AND remaining_views > 0
                RETURNING id, content, created_at, expires_at, max_views, remaining_views
                "#,
            )
            .bind(id)
            .fetch_optional(&*self.db)
            .await?;

            if let Some(row) = updated {
                return into_paste(row);
            }

            // Nothing was decremented. Both unlimited and zero-view records
            // are fixed states, so reading now classifies the miss correctly.
            match self.fetch(id).await? {
                Some(paste) if paste.views.max().is_none() => Ok(paste),
                Some(_) => Err(StoreError::Exhausted(id.to_string())),
                None => Err(StoreError::NotFound(id.to_string())),
            }
        })
        .await
    }

    /// Remove a paste. Deleting an absent paste is not an error.
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        self.bounded("delete", async {
            let result = sqlx::query("DELETE FROM pastes WHERE id = ?")
                .bind(id)
                .execute(&*self.db)
                .await?;
            debug!(%id, removed = result.rows_affected(), "deleted paste");
            Ok::<_, StoreError>(())
        })
        .await
    }

    /// Delete every paste whose expiry is at or before `now`.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        self.bounded("purge_expired", async {
            let result = sqlx::query(
                "DELETE FROM pastes WHERE expires_at IS NOT NULL AND expires_at <= ?",
            )
            .bind(now.timestamp_millis())
            .execute(&*self.db)
            .await?;
            Ok::<_, StoreError>(result.rows_affected())
        })
        .await
    }

    /// Delete every paste whose view budget has run out.
    pub async fn purge_exhausted(&self) -> StoreResult<u64> {
        self.bounded("purge_exhausted", async {
            let result = sqlx::query("DELETE FROM pastes WHERE remaining_views = 0")
                .execute(&*self.db)
                .await?;
            Ok::<_, StoreError>(result.rows_affected())
        })
        .await
    }

    /// True when the database answers a trivial query in time.
    pub async fn ping(&self) -> bool {
        let probe = self.bounded("ping", async {
            let v = sqlx::query_scalar::<_, i64>("SELECT 1")
                .fetch_one(&*self.db)
                .await?;
            Ok::<_, StoreError>(v == 1)
        });

        match probe.await {
            Ok(ok) => ok,
            Err(err) => {
                warn!("storage ping failed: {}", err);
                false
            }
        }
    }

    async fn fetch(&self, id: &str) -> StoreResult<Option<Paste>> {
        let row = sqlx::query_as::<_, PasteRow>(
            "SELECT id, content, created_at, expires_at, max_views, remaining_views
             FROM pastes WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;

        row.map(into_paste).transpose()
    }
}

/// `NewPaste` detached from the caller's borrows, for the insert task.
struct OwnedPaste {
    id: String,
    content: String,
    created_at: i64,
    expires_at: Option<i64>,
    max_views: Option<i64>,
}

impl From<NewPaste<'_>> for OwnedPaste {
    fn from(new: NewPaste<'_>) -> Self {
        Self {
            id: new.id.to_string(),
            content: new.content.to_string(),
            created_at: new.created_at.timestamp_millis(),
            expires_at: new.expires_at.map(|t| t.timestamp_millis()),
            max_views: new.max_views.map(i64::from),
        }
    }
}

async fn insert_paste(db: Arc<SqlitePool>, new: OwnedPaste) -> StoreResult<Paste> {
    let inserted = sqlx::query_as::<_, PasteRow>(
        r#"
        INSERT INTO pastes (id, content, created_at, expires_at, max_views, remaining_views)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id, content, created_at, expires_at, max_views, remaining_views
        "#,
    )
    .bind(&new.id)
    .bind(&new.content)
    .bind(new.created_at)
    .bind(new.expires_at)
    .bind(new.max_views)
    .bind(new.max_views)
    .fetch_one(&*db)
    .await;

    match inserted {
        Ok(row) => into_paste(row),
        Err(err) if is_unique_violation(&err) => Err(StoreError::DuplicateKey(new.id)),
        Err(err) => Err(StoreError::Sqlx(err)),
    }
}

/// Wait for an abandoned insert and delete the row if it committed.
///
/// Only a successful insert is undone; a failed one wrote nothing, and a
/// duplicate key belongs to someone else.
async fn roll_back_late_insert(
    db: Arc<SqlitePool>,
    id: String,
    insert: JoinHandle<StoreResult<Paste>>,
) {
    match insert.await {
        Ok(Ok(_)) => {
            match sqlx::query("DELETE FROM pastes WHERE id = ?")
                .bind(&id)
                .execute(&*db)
                .await
            {
                Ok(_) => info!(%id, "rolled back paste inserted after its timeout"),
                Err(err) => error!(%id, "failed to roll back late insert: {}", err),
            }
        }
        Ok(Err(err)) => debug!(%id, "abandoned insert did not land: {}", err),
        Err(err) => warn!(%id, "abandoned insert task failed: {}", err),
    }
}

fn into_paste(row: PasteRow) -> StoreResult<Paste> {
    let id = row.id.clone();
    Paste::try_from(row).map_err(|reason| StoreError::CorruptRecord { id, reason })
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}
