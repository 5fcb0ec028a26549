use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use url::Url;

pub const READ_SCOPES: [&str; 2] = ["user-read-playback-state", "user-read-currently-playing"];
pub const MODIFY_SCOPE: &str = "user-modify-playback-state";

pub fn authorize_url(
    accounts_base: &str,
    client_id: &str,
    redirect_uri: &str,
    scopes: &[&str],
    state: &str,
) -> Result<String, url::ParseError> {
    let mut url = Url::parse(accounts_base)?.join("authorize")?;
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", client_id)
        .append_pair("scope", &scopes.join(" "))
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("state", state);
    Ok(url.to_string())
}

pub fn track_url(id: &str) -> String {
    let encoded = utf8_percent_encode(id, NON_ALPHANUMERIC).to_string();
    format!("https://open.spotify.com/track/{encoded}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackLinkError {
    /// Not a URL at all.
    Invalid,
    /// A URL, but not one pointing at a track.
    NotATrack,
}

/// Extracts the track id from an `open.spotify.com/track/<id>` link.
pub fn parse_track_link(link: &str) -> Result<String, TrackLinkError> {
    let url = Url::parse(link.trim()).map_err(|_| TrackLinkError::Invalid)?;
    let mut segments: Vec<&str> = url
        .path_segments()
        .ok_or(TrackLinkError::NotATrack)?
        .filter(|s| !s.is_empty())
        .collect();
    let id = segments.pop().ok_or(TrackLinkError::NotATrack)?;
    let kind = segments.pop().ok_or(TrackLinkError::NotATrack)?;
    if kind != "track" || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(TrackLinkError::NotATrack);
    }
    Ok(id.to_string())
}
