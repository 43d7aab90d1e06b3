//! Application state for the API server

use crate::MediaDownloader;
use std::sync::Arc;

/// Shared state handed to every route handler (cheap Arc clone per request)
///
/// Handlers read configuration through the downloader, so the library root
/// they resolve against is always the one the queue writes into.
#[derive(Clone)]
pub struct AppState {
    /// The downloader backing the queue
    pub downloader: Arc<MediaDownloader>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(downloader: Arc<MediaDownloader>) -> Self {
        Self { downloader }
    }
}
