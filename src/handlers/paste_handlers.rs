//! HTTP handlers for creating and reading pastes.
//!
//! Every way a paste can be missing (never existed, expired, out of views,
//! deleted) produces the same 404 body.

use crate::{errors::AppError, services::paste_service::PasteContent, state::AppState};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/pastes`.
#[derive(Debug, Deserialize)]
pub struct CreatePasteReq {
    pub content: String,
    pub ttl_seconds: Option<i64>,
    pub max_views: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CreatePasteResp {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct PasteResp {
    pub content: String,
    pub remaining_views: Option<u32>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<PasteContent> for PasteResp {
    fn from(read: PasteContent) -> Self {
        Self {
            content: read.content,
            remaining_views: read.remaining_views,
            expires_at: read.expires_at,
        }
    }
}

/// `POST /api/pastes` — create a paste.
pub async fn create_paste(
    State(state): State<AppState>,
    payload: Result<Json<CreatePasteReq>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) =
        payload.map_err(|rejection| AppError::new(StatusCode::BAD_REQUEST, rejection.body_text()))?;

    let id = state
        .pastes
        .create(req.content, req.ttl_seconds, req.max_views)
        .await?;
    let url = state.paste_url(&id);

    Ok((StatusCode::CREATED, Json(CreatePasteResp { id, url })))
}

/// `GET /api/pastes/{id}` — read a paste, spending one view.
///
/// Responses are marked `no-store`: a cached copy would hand out views the
/// store never counted.
pub async fn get_paste(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let read = state.pastes.read_and_consume(&id).await?;
    Ok((
        [(header::CACHE_CONTROL, "no-store")],
        Json(PasteResp::from(read)),
    ))
}
