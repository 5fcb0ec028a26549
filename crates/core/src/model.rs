use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Image {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Album {
    pub name: String,
    pub images: Vec<Image>,
}

/// A playable item as reported by the playback API. Identity is `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub artists: Vec<String>,
    pub album: Album,
    pub duration_ms: u64,
    pub external_url: String,
}

/// Raw playback state for one poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackSnapshot {
    pub is_playing: bool,
    pub item: Option<Track>,
    pub progress_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix epoch milliseconds.
    pub expires_at: Option<u64>,
}

/// Normalized now-playing record. This is the shape handed to the overlay and
/// persisted under the snapshot key for the chat bridge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NowPlaying {
    pub id: String,
    pub name: String,
    pub artists: Vec<String>,
    pub album: String,
    pub artwork_url: Option<String>,
    pub url: String,
    pub playing: bool,
    pub progress: String,
    pub duration: String,
    pub raw_progress_ms: u64,
    pub raw_duration_ms: u64,
    #[serde(default)]
    pub updated_at_ms: u64,
}

impl NowPlaying {
    pub fn stamped(mut self, updated_at_ms: u64) -> Self {
        self.updated_at_ms = updated_at_ms;
        self
    }

    pub fn artist_line(&self) -> String {
        self.artists.join(", ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueEntry {
    pub id: String,
    pub name: String,
    pub artists: Vec<String>,
    pub duration: String,
    pub url: String,
}

impl QueueEntry {
    pub fn artist_line(&self) -> String {
        self.artists.join(", ")
    }
}
