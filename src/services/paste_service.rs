//! src/services/paste_service.rs
//!
//! PasteService — the lifecycle rules on top of `PasteStore`: id allocation,
//! expiry computation, and the two-dimensional (time × views) expiry check on
//! every read. Store errors never leave this module untranslated.

use crate::{
    models::paste::Paste,
    services::{
        clock::Clock,
        paste_store::{NewPaste, PasteStore, StoreError},
    },
};
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Length of generated paste ids.
pub const ID_LEN: usize = 12;

/// Ids longer than this are rejected before touching storage.
const MAX_LOOKUP_ID_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum PasteError {
    /// Caller-fixable input problem; the message is safe to show verbatim.
    #[error("{0}")]
    InvalidArgument(String),
    #[error("could not allocate a unique paste id")]
    CreationFailed,
    /// Never existed, expired, out of views, or deleted. Deliberately
    /// indistinguishable.
    #[error("paste unavailable")]
    Unavailable,
    /// Storage did not answer properly. Safe to retry; says nothing about
    /// whether the paste exists.
    #[error("storage temporarily unavailable")]
    Transient(#[source] StoreError),
}

pub type PasteResult<T> = Result<T, PasteError>;

impl From<StoreError> for PasteError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) | StoreError::Exhausted(_) => PasteError::Unavailable,
            StoreError::InvalidArgument(msg) => PasteError::InvalidArgument(msg),
            other => PasteError::Transient(other),
        }
    }
}

/// Translate a store error, logging the ones that point at a storage fault.
fn store_failure(err: StoreError) -> PasteError {
    let err = PasteError::from(err);
    if let PasteError::Transient(source) = &err {
        error!("storage failure: {}", source);
    }
    err
}

/// What a successful read hands back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasteContent {
    pub content: String,
    /// Views left after this read; `None` when unlimited.
    pub remaining_views: Option<u32>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Input limits enforced on creation.
#[derive(Debug, Clone, Copy)]
pub struct PasteLimits {
    /// Largest accepted content, in bytes.
    pub max_content_bytes: usize,
    /// Id generation attempts before giving up with `CreationFailed`.
    pub id_attempts: usize,
}

impl Default for PasteLimits {
    fn default() -> Self {
        Self {
            max_content_bytes: 512 * 1024,
            id_attempts: 8,
        }
    }
}

/// Creates and consumes pastes.
#[derive(Clone)]
pub struct PasteService {
    store: PasteStore,
    clock: Arc<dyn Clock>,
    limits: PasteLimits,
}

impl PasteService {
    pub fn new(store: PasteStore, clock: Arc<dyn Clock>, limits: PasteLimits) -> Self {
        Self {
            store,
            clock,
            limits,
        }
    }

    /// Validate the request, allocate an id and persist the paste.
    ///
    /// `ttl_seconds` and `max_views`, when present, must be at least 1.
    /// Id collisions are retried with a fresh id; storage failures are not.
    /// A timed-out insert is rolled back by the store once it lands, so a
    /// failed create leaves no paste behind.
    pub async fn create(
        &self,
        content: String,
        ttl_seconds: Option<i64>,
        max_views: Option<i64>,
    ) -> PasteResult<String> {
        self.validate_content(&content)?;
        let max_views = validate_max_views(max_views)?;
        let created_at = self.clock.now();
        let expires_at = ttl_seconds
            .map(|ttl| expiry_after(created_at, ttl))
            .transpose()?;

        for attempt in 1..=self.limits.id_attempts {
            let id = generate_id();
            let new = NewPaste {
                id: &id,
                content: &content,
                created_at,
                expires_at,
                max_views,
            };

            match self.store.put(new).await {
                Ok(paste) => {
                    info!(
                        id = %paste.id,
                        bytes = paste.content.len(),
                        expires_at = ?paste.expires_at,
                        max_views = ?paste.views.max(),
                        "created paste"
                    );
                    return Ok(paste.id);
                }
                Err(StoreError::DuplicateKey(taken)) => {
                    debug!(attempt, id = %taken, "paste id collision, retrying");
                }
                Err(err) => return Err(store_failure(err)),
            }
        }

        error!(
            attempts = self.limits.id_attempts,
            "failed to generate a unique paste id"
        );
        Err(PasteError::CreationFailed)
    }

    /// Read a paste, spending one of its views.
    ///
    /// The time limit is checked before the view is spent, so an expired
    /// paste never loses a view, and again on the record the store returns,
    /// in case the deadline passed while the decrement was in flight. Once the
    /// decrement has committed the view is spent, even if the caller goes
    /// away before seeing the result.
    pub async fn read_and_consume(&self, id: &str) -> PasteResult<PasteContent> {
        if id.is_empty() || id.len() > MAX_LOOKUP_ID_LEN {
            return Err(PasteError::Unavailable);
        }

        let current = self.store.get(id).await.map_err(store_failure)?;
        let now = self.clock.now();
        if !current.is_consumable_at(now) {
            if current.is_expired_at(now) {
                self.discard(id).await;
            }
            return Err(PasteError::Unavailable);
        }

        let consumed = self.store.consume_view(id).await.map_err(store_failure)?;
        if consumed.is_expired_at(self.clock.now()) {
            debug!(%id, "paste expired while its view was being consumed");
            return Err(PasteError::Unavailable);
        }

        debug!(%id, remaining = ?consumed.views.remaining(), "served paste");
        Ok(into_content(consumed))
    }

    /// Whether storage is reachable.
    pub async fn ping(&self) -> bool {
        self.store.ping().await
    }

    /// Best-effort delete of a paste already known to be dead.
    async fn discard(&self, id: &str) {
        if let Err(err) = self.store.delete(id).await {
            warn!(%id, "failed to delete expired paste: {}", err);
        }
    }

    fn validate_content(&self, content: &str) -> PasteResult<()> {
        if content.trim().is_empty() {
            return Err(PasteError::InvalidArgument(
                "content must be a non-empty string".into(),
            ));
        }
        if content.len() > self.limits.max_content_bytes {
            return Err(PasteError::InvalidArgument(format!(
                "content must be at most {} bytes",
                self.limits.max_content_bytes
            )));
        }
        Ok(())
    }
}

fn validate_max_views(max_views: Option<i64>) -> PasteResult<Option<u32>> {
    match max_views {
        None => Ok(None),
        Some(v) if v < 1 => Err(PasteError::InvalidArgument(
            "max_views must be an integer >= 1".into(),
        )),
        Some(v) => u32::try_from(v).map(Some).map_err(|_| {
            PasteError::InvalidArgument(format!("max_views must be at most {}", u32::MAX))
        }),
    }
}

fn expiry_after(created_at: DateTime<Utc>, ttl_seconds: i64) -> PasteResult<DateTime<Utc>> {
    if ttl_seconds < 1 {
        return Err(PasteError::InvalidArgument(
            "ttl_seconds must be an integer >= 1".into(),
        ));
    }
    Duration::try_seconds(ttl_seconds)
        .and_then(|ttl| created_at.checked_add_signed(ttl))
        .ok_or_else(|| PasteError::InvalidArgument("ttl_seconds is too large".into()))
}

/// 72 random bits from a v4 UUID, rendered as 12 URL-safe characters.
///
/// Bytes 6 and 8 of a v4 UUID carry version and variant bits, so they are
/// skipped.
fn generate_id() -> String {
    let bytes = Uuid::new_v4().into_bytes();
    let mut raw = [0u8; ID_LEN / 4 * 3];
    raw[..6].copy_from_slice(&bytes[..6]);
    raw[6..].copy_from_slice(&bytes[9..12]);
    general_purpose::URL_SAFE_NO_PAD.encode(raw)
}

fn into_content(paste: Paste) -> PasteContent {
    PasteContent {
        remaining_views: paste.views.remaining(),
        expires_at: paste.expires_at,
        content: paste.content,
    }
}
