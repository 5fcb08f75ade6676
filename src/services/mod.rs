pub mod clock;
pub mod paste_service;
pub mod paste_store;
pub mod reaper;
