//! Pure transforms from raw playback payloads to the render/consumption shape.
//!
//! Nothing in here divides by a duration; percentage math belongs to the
//! overlay renderers, which must handle a zero duration themselves.

use crate::model::{NowPlaying, QueueEntry, Track};

/// Formats milliseconds as `m:ss`. Minutes are not wrapped into hours.
pub fn format_time(ms: u64) -> String {
    let minutes = ms / 60_000;
    let seconds = (ms % 60_000) / 1_000;
    format!("{minutes}:{seconds:02}")
}

pub fn normalize(track: &Track, progress_ms: u64, is_playing: bool) -> NowPlaying {
    NowPlaying {
        id: track.id.clone(),
        name: track.name.clone(),
        artists: track.artists.clone(),
        album: track.album.name.clone(),
        artwork_url: track.album.images.first().map(|img| img.url.clone()),
        url: track.external_url.clone(),
        playing: is_playing,
        progress: format_time(progress_ms),
        duration: format_time(track.duration_ms),
        raw_progress_ms: progress_ms,
        raw_duration_ms: track.duration_ms,
        updated_at_ms: 0,
    }
}

pub fn queue_entry(track: &Track) -> QueueEntry {
    QueueEntry {
        id: track.id.clone(),
        name: track.name.clone(),
        artists: track.artists.clone(),
        duration: format_time(track.duration_ms),
        url: track.external_url.clone(),
    }
}
