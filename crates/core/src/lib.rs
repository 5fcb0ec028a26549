pub mod config;
pub mod model;
pub mod normalize;
pub mod store;
pub mod urls;

pub use config::{AppConfig, ChatConfig, ConfigIntervals, OverlayConfig, SpotifyConfig};
pub use model::{Album, CredentialPair, Image, NowPlaying, PlaybackSnapshot, QueueEntry, Track};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError, StoreEvent, TypedStore};

use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
