//! Chat command bridge. Reads the state the poller persisted and answers
//! `!` commands; the only network call it makes is for song requests.

use async_trait::async_trait;
use overlay_bridge_core::store::keys;
use overlay_bridge_core::urls::{parse_track_link, TrackLinkError};
use overlay_bridge_core::{ChatConfig, NowPlaying, QueueEntry, TypedStore};
use overlay_bridge_providers::PlaybackApi;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const COMMANDS_REPLY: &str = "🎮 Commands: !song, !queue, !sr <Spotify link>, !spotify";
const NOT_CONNECTED: &str = "❌ Spotify is not connected.";

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, message: &str) -> anyhow::Result<()>;
}

pub struct ChatBridge {
    store: TypedStore,
    api: Arc<dyn PlaybackApi>,
    cfg: ChatConfig,
}

impl ChatBridge {
    pub fn new(store: TypedStore, api: Arc<dyn PlaybackApi>, cfg: ChatConfig) -> Self {
        Self { store, api, cfg }
    }

    /// Returns the reply for `message`, or `None` when the bot stays quiet.
    pub async fn handle(&self, message: &str) -> Option<String> {
        let mut words = message.split_whitespace();
        let command = words.next()?.to_lowercase();
        if !command.starts_with('!') {
            return None;
        }
        debug!(command = %command, "chat command");

        match command.as_str() {
            "!ping" => Some("✅ Bot is online!".to_string()),
            "!commands" => Some(COMMANDS_REPLY.to_string()),
            "!spotify" => Some(if self.access_token().is_some() {
                "✅ Spotify is connected.".to_string()
            } else {
                NOT_CONNECTED.to_string()
            }),
            "!song" => Some(self.song_reply()),
            "!queue" => Some(self.queue_reply()),
            "!sr" if self.cfg.song_requests => self.song_request(words.next()).await,
            _ => None,
        }
    }

    /// Handles `message` and forwards any reply to `transport`.
    pub async fn serve(&self, transport: &dyn ChatTransport, message: &str) -> anyhow::Result<()> {
        if let Some(reply) = self.handle(message).await {
            transport.send(&reply).await?;
        }
        Ok(())
    }

    fn access_token(&self) -> Option<String> {
        self.store.get_string(keys::ACCESS_TOKEN).ok().flatten()
    }

    fn song_reply(&self) -> String {
        match read_now_playing(&self.store) {
            Some(np) if np.playing => {
                format!("🎵 Now Playing: {} by {} | 🔗 {}", np.name, np.artist_line(), np.url)
            }
            Some(np) => {
                format!("⏸ Last Played: {} by {} | 🔗 {}", np.name, np.artist_line(), np.url)
            }
            None => "I can't see a song right now 😢".to_string(),
        }
    }

    fn queue_reply(&self) -> String {
        if self.access_token().is_none() {
            return NOT_CONNECTED.to_string();
        }
        let queue: Vec<QueueEntry> = match self.store.get_json(keys::QUEUE) {
            Ok(queue) => queue.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "failed to read stored queue");
                Vec::new()
            }
        };
        if queue.is_empty() {
            return "🎵 The queue is currently empty.".to_string();
        }
        let formatted = queue
            .iter()
            .take(self.cfg.queue_preview)
            .enumerate()
            .map(|(i, e)| format!("{}. {} – {}", i + 1, e.name, e.artist_line()))
            .collect::<Vec<_>>()
            .join(" | ");
        format!("🎶 Up Next: {formatted}")
    }

    async fn song_request(&self, link: Option<&str>) -> Option<String> {
        let Some(token) = self.access_token() else {
            return Some(NOT_CONNECTED.to_string());
        };
        let Some(link) = link else {
            return Some("Usage: !sr <Spotify track URL>".to_string());
        };
        let id = match parse_track_link(link) {
            Ok(id) => id,
            Err(TrackLinkError::NotATrack) => {
                return Some("❌ Please provide a Spotify track link.".to_string())
            }
            Err(TrackLinkError::Invalid) => return Some("❌ Invalid Spotify URL.".to_string()),
        };

        if let Err(err) = self.api.add_to_queue(&token, &id).await {
            warn!(error = %err, track = %id, "song request rejected");
            return None;
        }
        match self.api.track(&token, &id).await {
            Ok(track) => {
                info!(track = %id, "song request queued");
                Some(format!("✅ Added: {} by {}", track.name, track.artists.join(", ")))
            }
            Err(err) => {
                warn!(error = %err, track = %id, "queued track lookup failed");
                None
            }
        }
    }
}

fn read_now_playing(store: &TypedStore) -> Option<NowPlaying> {
    match store.get_json(keys::NOW_PLAYING) {
        Ok(np) => np,
        Err(err) => {
            warn!(error = %err, "failed to read now playing");
            None
        }
    }
}

/// Announces each new track once. The last announced id lives only in
/// memory, so a restart announces the current track again.
pub struct Announcer {
    store: TypedStore,
    last_announced_id: Option<String>,
}

impl Announcer {
    pub fn new(store: TypedStore) -> Self {
        Self {
            store,
            last_announced_id: None,
        }
    }

    pub fn check(&mut self) -> Option<String> {
        let np = read_now_playing(&self.store)?;
        if !np.playing || np.id.is_empty() || self.last_announced_id.as_deref() == Some(&np.id) {
            return None;
        }
        let message = format!(
            "🎶 Now Playing: {} by {} | 🔗 {}",
            np.name,
            np.artist_line(),
            np.url
        );
        self.last_announced_id = Some(np.id);
        Some(message)
    }
}

#[cfg(test)]
mod tests {
    use super::{Announcer, ChatBridge, ChatTransport, COMMANDS_REPLY};
    use async_trait::async_trait;
    use overlay_bridge_core::store::keys;
    use overlay_bridge_core::{
        Album, ChatConfig, NowPlaying, PlaybackSnapshot, QueueEntry, Track, TypedStore,
    };
    use overlay_bridge_providers::{ApiError, PlaybackApi};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeApi {
        queued: Mutex<Vec<String>>,
        reject: bool,
    }

    #[async_trait]
    impl PlaybackApi for FakeApi {
        async fn currently_playing(
            &self,
            _token: &str,
        ) -> Result<Option<PlaybackSnapshot>, ApiError> {
            Ok(None)
        }

        async fn queue(&self, _token: &str) -> Result<Vec<Track>, ApiError> {
            panic!("the bridge reads the queue from the store");
        }

        async fn add_to_queue(&self, _token: &str, track_id: &str) -> Result<(), ApiError> {
            if self.reject {
                return Err(ApiError::Status {
                    status: 404,
                    message: "no active device".to_string(),
                });
            }
            self.queued.lock().unwrap().push(track_id.to_string());
            Ok(())
        }

        async fn track(&self, _token: &str, track_id: &str) -> Result<Track, ApiError> {
            Ok(Track {
                id: track_id.to_string(),
                name: "Requested".to_string(),
                artists: vec!["A".to_string(), "B".to_string()],
                album: Album::default(),
                duration_ms: 1_000,
                external_url: String::new(),
            })
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    #[async_trait]
    impl ChatTransport for Recorder {
        async fn send(&self, message: &str) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    fn now_playing(id: &str, playing: bool) -> NowPlaying {
        NowPlaying {
            id: id.to_string(),
            name: "Song".to_string(),
            artists: vec!["One".to_string(), "Two".to_string()],
            album: "Album".to_string(),
            artwork_url: None,
            url: format!("https://open.spotify.com/track/{id}"),
            playing,
            progress: "0:42".to_string(),
            duration: "3:00".to_string(),
            raw_progress_ms: 42_000,
            raw_duration_ms: 180_000,
            updated_at_ms: 0,
        }
    }

    fn bridge(song_requests: bool) -> (ChatBridge, TypedStore, Arc<FakeApi>) {
        let store = TypedStore::in_memory();
        let api = Arc::new(FakeApi::default());
        let cfg = ChatConfig {
            song_requests,
            ..ChatConfig::default()
        };
        (ChatBridge::new(store.clone(), api.clone(), cfg), store, api)
    }

    #[tokio::test]
    async fn simple_commands() {
        let (bridge, store, _) = bridge(false);
        assert_eq!(bridge.handle("!ping").await.as_deref(), Some("✅ Bot is online!"));
        assert_eq!(bridge.handle("  !COMMANDS extra").await.as_deref(), Some(COMMANDS_REPLY));
        assert_eq!(
            bridge.handle("!spotify").await.as_deref(),
            Some("❌ Spotify is not connected.")
        );
        store.set_string(keys::ACCESS_TOKEN, "tok").unwrap();
        assert_eq!(
            bridge.handle("!Spotify").await.as_deref(),
            Some("✅ Spotify is connected.")
        );
        assert_eq!(bridge.handle("hello there").await, None);
        assert_eq!(bridge.handle("!dance").await, None);
        assert_eq!(bridge.handle("").await, None);
    }

    #[tokio::test]
    async fn song_reports_now_playing_or_last_played() {
        let (bridge, store, _) = bridge(false);
        assert_eq!(
            bridge.handle("!song").await.as_deref(),
            Some("I can't see a song right now 😢")
        );

        store.set_json(keys::NOW_PLAYING, &now_playing("a", true)).unwrap();
        assert_eq!(
            bridge.handle("!song").await.as_deref(),
            Some("🎵 Now Playing: Song by One, Two | 🔗 https://open.spotify.com/track/a")
        );

        store.set_json(keys::NOW_PLAYING, &now_playing("a", false)).unwrap();
        assert_eq!(
            bridge.handle("!song").await.as_deref(),
            Some("⏸ Last Played: Song by One, Two | 🔗 https://open.spotify.com/track/a")
        );
    }

    #[tokio::test]
    async fn queue_is_read_from_the_store() {
        let (bridge, store, _) = bridge(false);
        store.set_string(keys::ACCESS_TOKEN, "tok").unwrap();
        assert_eq!(
            bridge.handle("!queue").await.as_deref(),
            Some("🎵 The queue is currently empty.")
        );

        let entries: Vec<QueueEntry> = (1..=7)
            .map(|i| QueueEntry {
                id: format!("q{i}"),
                name: format!("Next {i}"),
                artists: vec!["Band".to_string()],
                duration: "3:00".to_string(),
                url: String::new(),
            })
            .collect();
        store.set_json(keys::QUEUE, &entries).unwrap();

        let reply = bridge.handle("!queue").await.unwrap();
        assert!(reply.starts_with("🎶 Up Next: 1. Next 1 – Band | 2. Next 2 – Band"));
        assert!(reply.ends_with("5. Next 5 – Band"));
    }

    #[tokio::test]
    async fn song_requests_validate_and_queue() {
        let (bridge, store, api) = bridge(true);
        assert_eq!(
            bridge.handle("!sr https://open.spotify.com/track/abc").await.as_deref(),
            Some("❌ Spotify is not connected.")
        );

        store.set_string(keys::ACCESS_TOKEN, "tok").unwrap();
        assert_eq!(
            bridge.handle("!sr").await.as_deref(),
            Some("Usage: !sr <Spotify track URL>")
        );
        assert_eq!(
            bridge.handle("!sr https://open.spotify.com/album/abc").await.as_deref(),
            Some("❌ Please provide a Spotify track link.")
        );
        assert_eq!(
            bridge.handle("!sr nonsense").await.as_deref(),
            Some("❌ Invalid Spotify URL.")
        );
        assert_eq!(
            bridge.handle("!sr https://open.spotify.com/track/abc123?si=x").await.as_deref(),
            Some("✅ Added: Requested by A, B")
        );
        assert_eq!(*api.queued.lock().unwrap(), vec!["abc123".to_string()]);
    }

    #[tokio::test]
    async fn song_requests_are_ignored_when_disabled() {
        let (bridge, store, api) = bridge(false);
        store.set_string(keys::ACCESS_TOKEN, "tok").unwrap();
        assert_eq!(bridge.handle("!sr https://open.spotify.com/track/abc").await, None);
        assert!(api.queued.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejected_song_request_stays_quiet() {
        let store = TypedStore::in_memory();
        store.set_string(keys::ACCESS_TOKEN, "tok").unwrap();
        let api = Arc::new(FakeApi {
            reject: true,
            ..FakeApi::default()
        });
        let cfg = ChatConfig {
            song_requests: true,
            ..ChatConfig::default()
        };
        let bridge = ChatBridge::new(store, api, cfg);
        assert_eq!(bridge.handle("!sr https://open.spotify.com/track/abc").await, None);
    }

    #[tokio::test]
    async fn serve_forwards_replies_only() {
        let (bridge, _, _) = bridge(false);
        let transport = Recorder::default();
        bridge.serve(&transport, "!ping").await.unwrap();
        bridge.serve(&transport, "just chatting").await.unwrap();
        assert_eq!(*transport.0.lock().unwrap(), vec!["✅ Bot is online!".to_string()]);
    }

    #[test]
    fn announcer_announces_each_track_once() {
        let store = TypedStore::in_memory();
        let mut announcer = Announcer::new(store.clone());
        assert_eq!(announcer.check(), None);

        store.set_json(keys::NOW_PLAYING, &now_playing("a", true)).unwrap();
        assert_eq!(
            announcer.check().as_deref(),
            Some("🎶 Now Playing: Song by One, Two | 🔗 https://open.spotify.com/track/a")
        );
        assert_eq!(announcer.check(), None);

        store.set_json(keys::NOW_PLAYING, &now_playing("a", false)).unwrap();
        assert_eq!(announcer.check(), None);
        store.set_json(keys::NOW_PLAYING, &now_playing("b", true)).unwrap();
        assert!(announcer.check().is_some());

        // a fresh announcer has no memory of earlier announcements
        let mut restarted = Announcer::new(store);
        assert!(restarted.check().is_some());
    }
}
