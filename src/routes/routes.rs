//! Defines routes for the paste API.
//!
//! ## Structure
//! - `POST /api/pastes`       — create a paste
//! - `GET  /api/pastes/{id}`  — read a paste, spending one view
//! - `GET  /api/healthz`      — storage readiness
//! - `GET  /healthz`          — liveness

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        paste_handlers::{create_paste, get_paste},
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, post},
};

/// Build and return the router for the paste API.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/healthz", get(readyz))
        .route("/api/pastes", post(create_paste))
        .route("/api/pastes/{id}", get(get_paste))
}
