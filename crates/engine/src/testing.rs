//! In-crate fakes for the provider seams.

use async_trait::async_trait;
use overlay_bridge_core::store::keys;
use overlay_bridge_core::{Album, PlaybackSnapshot, Track, TypedStore};
use overlay_bridge_providers::{ApiError, PlaybackApi, TokenEndpoint, TokenGrant};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub(crate) fn track(id: &str) -> Track {
    Track {
        id: id.to_string(),
        name: format!("Song {id}"),
        artists: vec!["Artist".to_string()],
        album: Album {
            name: "Album".to_string(),
            images: Vec::new(),
        },
        duration_ms: 180_000,
        external_url: format!("https://open.spotify.com/track/{id}"),
    }
}

pub(crate) fn playing(id: &str, is_playing: bool) -> Result<Option<PlaybackSnapshot>, ApiError> {
    Ok(Some(PlaybackSnapshot {
        is_playing,
        item: Some(track(id)),
        progress_ms: 42_000,
    }))
}

pub(crate) fn grant(access: &str, refresh: Option<&str>) -> TokenGrant {
    TokenGrant {
        access_token: access.to_string(),
        refresh_token: refresh.map(str::to_string),
        expires_in: Some(3_600),
    }
}

pub(crate) fn seeded_store(access: &str, refresh: &str) -> TypedStore {
    let store = TypedStore::in_memory();
    store.set_string(keys::ACCESS_TOKEN, access).unwrap();
    store.set_string(keys::REFRESH_TOKEN, refresh).unwrap();
    store
}

pub(crate) struct FakeEndpoint {
    pub calls: AtomicUsize,
    result: Mutex<Result<TokenGrant, ApiError>>,
    seen: Mutex<Vec<String>>,
    delay: Duration,
}

impl FakeEndpoint {
    pub fn granting(grant: TokenGrant) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            result: Mutex::new(Ok(grant)),
            seen: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    pub fn failing(err: ApiError) -> Self {
        let me = Self::granting(grant("unused", None));
        *me.result.lock().unwrap() = Err(err);
        me
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn seen_refresh_tokens(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenEndpoint for FakeEndpoint {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(refresh_token.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result.lock().unwrap().clone()
    }

    async fn exchange(&self, _code: &str) -> Result<TokenGrant, ApiError> {
        self.result.lock().unwrap().clone()
    }
}

/// Scripted playback API. Tokens listed in `expired` always get the
/// token-expired signal; everything else pops the next scripted response
/// (or "no content" once the script runs dry).
pub(crate) struct FakeApi {
    script: Mutex<VecDeque<Result<Option<PlaybackSnapshot>, ApiError>>>,
    expired: Mutex<HashSet<String>>,
    tokens_seen: Mutex<Vec<String>>,
    pub queue_calls: AtomicUsize,
    queue_tracks: Mutex<Vec<Track>>,
    pub queue_fails: AtomicBool,
    playback_delay: Duration,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            expired: Mutex::new(HashSet::new()),
            tokens_seen: Mutex::new(Vec::new()),
            queue_calls: AtomicUsize::new(0),
            queue_tracks: Mutex::new(vec![track("next-1"), track("next-2")]),
            queue_fails: AtomicBool::new(false),
            playback_delay: Duration::ZERO,
        }
    }

    pub fn with_playback_delay(mut self, delay: Duration) -> Self {
        self.playback_delay = delay;
        self
    }

    pub fn push(&self, response: Result<Option<PlaybackSnapshot>, ApiError>) {
        self.script.lock().unwrap().push_back(response);
    }

    pub fn expire(&self, token: &str) {
        self.expired.lock().unwrap().insert(token.to_string());
    }

    pub fn set_queue(&self, tracks: Vec<Track>) {
        *self.queue_tracks.lock().unwrap() = tracks;
    }

    pub fn tokens_seen(&self) -> Vec<String> {
        self.tokens_seen.lock().unwrap().clone()
    }

    fn is_expired(&self, token: &str) -> bool {
        self.expired.lock().unwrap().contains(token)
    }
}

#[async_trait]
impl PlaybackApi for FakeApi {
    async fn currently_playing(&self, token: &str) -> Result<Option<PlaybackSnapshot>, ApiError> {
        self.tokens_seen.lock().unwrap().push(token.to_string());
        if !self.playback_delay.is_zero() {
            tokio::time::sleep(self.playback_delay).await;
        }
        if self.is_expired(token) {
            return Err(ApiError::TokenExpired);
        }
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }

    async fn queue(&self, token: &str) -> Result<Vec<Track>, ApiError> {
        self.queue_calls.fetch_add(1, Ordering::SeqCst);
        if self.is_expired(token) {
            return Err(ApiError::TokenExpired);
        }
        if self.queue_fails.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 502,
                message: "bad gateway".to_string(),
            });
        }
        Ok(self.queue_tracks.lock().unwrap().clone())
    }

    async fn add_to_queue(&self, _token: &str, _track_id: &str) -> Result<(), ApiError> {
        Ok(())
    }

    async fn track(&self, _token: &str, track_id: &str) -> Result<Track, ApiError> {
        Ok(track(track_id))
    }
}
