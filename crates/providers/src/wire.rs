use crate::{ApiError, TokenGrant, TOKEN_EXPIRED_MESSAGE};
use overlay_bridge_core::{urls, Album, PlaybackSnapshot, Track};
use serde::de::DeserializeOwned;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RawArtist {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTrack {
    id: Option<String>,
    uri: Option<String>,
    name: String,
    #[serde(default)]
    artists: Vec<RawArtist>,
    #[serde(default)]
    album: Option<Album>,
    #[serde(default)]
    duration_ms: u64,
    #[serde(default)]
    external_urls: Option<RawExternalUrls>,
}

impl RawTrack {
    fn into_track(self) -> Track {
        // local files carry no id, only a uri
        let id = self.id.or(self.uri).unwrap_or_default();
        let external_url = self
            .external_urls
            .and_then(|u| u.spotify)
            .unwrap_or_else(|| urls::track_url(&id));
        Track {
            id,
            name: self.name,
            artists: self.artists.into_iter().map(|a| a.name).collect(),
            album: self.album.unwrap_or_default(),
            duration_ms: self.duration_ms,
            external_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawCurrentlyPlaying {
    #[serde(default)]
    is_playing: bool,
    item: Option<RawTrack>,
    progress_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawQueue {
    #[serde(default)]
    queue: Vec<RawTrack>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawErrorDetail {
    Object { message: String },
    Text(String),
}

#[derive(Debug, Deserialize)]
struct RawErrorEnvelope {
    error: RawErrorDetail,
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<RawErrorEnvelope>(body) {
        Ok(RawErrorEnvelope {
            error: RawErrorDetail::Object { message },
        })
        | Ok(RawErrorEnvelope {
            error: RawErrorDetail::Text(message),
        }) => message,
        Err(_) => body.trim().to_string(),
    }
}

/// Maps a non-success response onto [`ApiError`]. Only a 401 whose message
/// matches [`TOKEN_EXPIRED_MESSAGE`] exactly is reported as expiry.
pub(crate) fn classify_error(status: u16, body: &str) -> ApiError {
    let message = error_message(body);
    if status == 401 {
        if message == TOKEN_EXPIRED_MESSAGE {
            ApiError::TokenExpired
        } else {
            ApiError::Unauthorized(message)
        }
    } else {
        ApiError::Status { status, message }
    }
}

fn parse<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|err| ApiError::Malformed(err.to_string()))
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

pub fn decode_currently_playing(
    status: u16,
    body: &str,
) -> Result<Option<PlaybackSnapshot>, ApiError> {
    if status == 204 || (is_success(status) && body.trim().is_empty()) {
        return Ok(None);
    }
    if !is_success(status) {
        return Err(classify_error(status, body));
    }
    let raw: RawCurrentlyPlaying = parse(body)?;
    Ok(Some(PlaybackSnapshot {
        is_playing: raw.is_playing,
        item: raw.item.map(RawTrack::into_track),
        progress_ms: raw.progress_ms.unwrap_or(0),
    }))
}

pub fn decode_queue(status: u16, body: &str) -> Result<Vec<Track>, ApiError> {
    if status == 204 {
        return Ok(Vec::new());
    }
    if !is_success(status) {
        return Err(classify_error(status, body));
    }
    let raw: RawQueue = parse(body)?;
    Ok(raw.queue.into_iter().map(RawTrack::into_track).collect())
}

pub fn decode_track(status: u16, body: &str) -> Result<Track, ApiError> {
    if !is_success(status) {
        return Err(classify_error(status, body));
    }
    parse::<RawTrack>(body).map(RawTrack::into_track)
}

pub fn decode_grant(status: u16, body: &str) -> Result<TokenGrant, ApiError> {
    if !is_success(status) {
        return Err(classify_error(status, body));
    }
    let grant: TokenGrant = parse(body)?;
    if grant.access_token.trim().is_empty() {
        return Err(ApiError::Malformed("grant without access_token".to_string()));
    }
    Ok(grant)
}
