use crate::wire::{classify_error, decode_currently_playing, decode_queue, decode_track};
use crate::{ApiError, PlaybackApi};
use async_trait::async_trait;
use overlay_bridge_core::{PlaybackSnapshot, Track};
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Client, RequestBuilder};
use std::time::Duration;
use tracing::debug;

pub(crate) fn transport(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Transport(format!("request timed out: {err}"))
    } else {
        ApiError::Transport(err.to_string())
    }
}

pub(crate) fn build_http(timeout: Duration) -> Result<Client, ApiError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(transport)
}

pub(crate) async fn send(req: RequestBuilder) -> Result<(u16, String), ApiError> {
    let resp = req.send().await.map_err(transport)?;
    let status = resp.status().as_u16();
    let body = resp.text().await.map_err(transport)?;
    Ok((status, body))
}

/// Web API client. One instance (and one connection pool) is shared by the
/// poller, the queue fetcher and the chat bridge.
pub struct SpotifyClient {
    http: Client,
    api_base: String,
}

impl SpotifyClient {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        Ok(Self::with_client(build_http(timeout)?, api_base))
    }

    pub fn with_client(http: Client, api_base: impl Into<String>) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }
}

#[async_trait]
impl PlaybackApi for SpotifyClient {
    async fn currently_playing(&self, token: &str) -> Result<Option<PlaybackSnapshot>, ApiError> {
        let req = self
            .http
            .get(self.url("/me/player/currently-playing"))
            .bearer_auth(token);
        let (status, body) = send(req).await?;
        debug!(status, "currently-playing response");
        decode_currently_playing(status, &body)
    }

    async fn queue(&self, token: &str) -> Result<Vec<Track>, ApiError> {
        let req = self.http.get(self.url("/me/player/queue")).bearer_auth(token);
        let (status, body) = send(req).await?;
        debug!(status, "queue response");
        decode_queue(status, &body)
    }

    async fn add_to_queue(&self, token: &str, track_id: &str) -> Result<(), ApiError> {
        let uri = format!("spotify:track:{track_id}");
        let req = self
            .http
            .post(self.url("/me/player/queue"))
            .query(&[("uri", uri.as_str())])
            .header(CONTENT_LENGTH, 0)
            .bearer_auth(token);
        let (status, body) = send(req).await?;
        match status {
            200 | 204 => Ok(()),
            _ => Err(classify_error(status, &body)),
        }
    }

    async fn track(&self, token: &str, track_id: &str) -> Result<Track, ApiError> {
        let req = self
            .http
            .get(self.url(&format!("/tracks/{track_id}")))
            .bearer_auth(token);
        let (status, body) = send(req).await?;
        decode_track(status, &body)
    }
}
