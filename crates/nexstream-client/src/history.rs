//! Session-local watch history.

use tracing::debug;

use nexstream_shared::constants::WATCH_HISTORY_CAPACITY;
use nexstream_store::VideoRecord;

/// Most-recent-first list of watched videos, deduplicated by id and
/// bounded in length. Lives only for the client session; the store never
/// sees it.
pub struct WatchHistory {
    entries: Vec<VideoRecord>,
    capacity: usize,
}

impl WatchHistory {
    pub fn new() -> Self {
        Self::with_capacity(WATCH_HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
        }
    }

    /// Record a watch. A re-watch moves the existing entry to the front;
    /// the oldest entry falls off when the list is full.
    pub fn record(&mut self, video: VideoRecord) {
        self.entries.retain(|v| v.id != video.id);
        debug!(video = %video.id, "Watch recorded");
        self.entries.insert(0, video);
        self.entries.truncate(self.capacity);
    }

    /// The history, most recent first.
    pub fn videos(&self) -> &[VideoRecord] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for WatchHistory {
    fn default() -> Self {
        Self::new()
    }
}
