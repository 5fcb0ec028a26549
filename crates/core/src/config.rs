use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_schema_version() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigIntervals {
    pub poll_ms: u64,
    pub request_timeout_ms: u64,
    pub announce_poll_ms: u64,
}

impl Default for ConfigIntervals {
    fn default() -> Self {
        Self {
            poll_ms: 5_000,
            request_timeout_ms: 10_000,
            announce_poll_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub redirect_uri: String,
    pub api_base: String,
    pub accounts_base: String,
    /// Local proxy that injects the client secret and forwards to the
    /// provider's token endpoint with `grant_type=refresh_token`.
    pub refresh_url: String,
    /// Local proxy for the authorization-code exchange.
    pub exchange_url: String,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: "YOUR_SPOTIFY_CLIENT_ID".to_string(),
            redirect_uri: "http://127.0.0.1:3000/connect/spotify/callback".to_string(),
            api_base: "https://api.spotify.com/v1".to_string(),
            accounts_base: "https://accounts.spotify.com".to_string(),
            refresh_url: "http://127.0.0.1:3000/connect/spotify/refresh".to_string(),
            exchange_url: "http://127.0.0.1:3000/connect/spotify/code".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub style: String,
    pub theme: String,
    pub position: String,
    pub show_timestamp: bool,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            style: "standard".to_string(),
            theme: "default".to_string(),
            position: "bottom-right".to_string(),
            show_timestamp: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub channel: Option<String>,
    pub auto_announce: bool,
    pub song_requests: bool,
    pub queue_preview: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            channel: None,
            auto_announce: false,
            song_requests: false,
            queue_preview: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub spotify: SpotifyConfig,
    pub intervals: ConfigIntervals,
    pub queue_limit: usize,
    pub store_dir: Option<PathBuf>,
    pub log_level: String,
    pub overlay: OverlayConfig,
    pub chat: ChatConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            spotify: SpotifyConfig::default(),
            intervals: ConfigIntervals::default(),
            queue_limit: 10,
            store_dir: None,
            log_level: "info".to_string(),
            overlay: OverlayConfig::default(),
            chat: ChatConfig::default(),
        }
    }
}
