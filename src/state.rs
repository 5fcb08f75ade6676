//! Shared state handed to every handler.

use crate::services::paste_service::PasteService;

#[derive(Clone)]
pub struct AppState {
    pub pastes: PasteService,

    /// Origin used to build shareable paste links, without trailing slash.
    pub public_base_url: String,
}

impl AppState {
    pub fn new(pastes: PasteService, public_base_url: impl Into<String>) -> Self {
        let public_base_url = public_base_url.into().trim_end_matches('/').to_string();
        Self {
            pastes,
            public_base_url,
        }
    }

    pub fn paste_url(&self, id: &str) -> String {
        format!("{}/p/{}", self.public_base_url, id)
    }
}
