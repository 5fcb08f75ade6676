//! Core data model for the paste service.
//!
//! `Paste` is the domain view; `PasteRow` is its `sqlx::FromRow` image in the
//! `pastes` table.

pub mod paste;
