use async_trait::async_trait;
use overlay_bridge_core::{PlaybackSnapshot, Track};
use serde::Deserialize;
use thiserror::Error;

mod spotify;
mod token_proxy;
mod wire;

pub use spotify::SpotifyClient;
pub use token_proxy::TokenProxyClient;
pub use wire::{decode_currently_playing, decode_grant, decode_queue, decode_track};

/// The only signal the playback API gives for "refresh and retry" is this
/// exact message on a 401.
pub const TOKEN_EXPIRED_MESSAGE: &str = "The access token expired";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("access token expired")]
    TokenExpired,
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("http {status}: {message}")]
    Status { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::TokenExpired | ApiError::Unauthorized(_) => Some(401),
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(_) | ApiError::Malformed(_) => None,
        }
    }

    pub fn is_token_expired(&self) -> bool {
        matches!(self, ApiError::TokenExpired)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[async_trait]
pub trait PlaybackApi: Send + Sync {
    /// `Ok(None)` means no active playback session.
    async fn currently_playing(&self, token: &str) -> Result<Option<PlaybackSnapshot>, ApiError>;
    async fn queue(&self, token: &str) -> Result<Vec<Track>, ApiError>;
    async fn add_to_queue(&self, token: &str, track_id: &str) -> Result<(), ApiError>;
    async fn track(&self, token: &str, track_id: &str) -> Result<Track, ApiError>;
}

#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ApiError>;
    async fn exchange(&self, code: &str) -> Result<TokenGrant, ApiError>;
}
