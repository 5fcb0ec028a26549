//! Overlay presentation: picks a visual variant and turns the normalized
//! snapshot into a declarative [`View`].
//!
//! Unknown style, theme or position names fall back to the default variant
//! and log a warning. That fallback is part of the contract, not an error.

use crate::poller::RenderState;
use overlay_bridge_core::{NowPlaying, OverlayConfig, QueueEntry};
use serde::Serialize;
use std::fmt;
use tracing::warn;

const BAR_WIDTH: usize = 20;

fn canonical(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| !matches!(c, '-' | '_' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OverlayStyle {
    Standard,
    MinimalBar,
    Animated,
    Fade,
    Queue,
    Dynamic,
    MediaStack,
    Ai,
}

impl OverlayStyle {
    pub const ALL: [OverlayStyle; 8] = [
        OverlayStyle::Standard,
        OverlayStyle::MinimalBar,
        OverlayStyle::Animated,
        OverlayStyle::Fade,
        OverlayStyle::Queue,
        OverlayStyle::Dynamic,
        OverlayStyle::MediaStack,
        OverlayStyle::Ai,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OverlayStyle::Standard => "standard",
            OverlayStyle::MinimalBar => "minimalBar",
            OverlayStyle::Animated => "animated",
            OverlayStyle::Fade => "fade",
            OverlayStyle::Queue => "queue",
            OverlayStyle::Dynamic => "dynamic",
            OverlayStyle::MediaStack => "mediaStack",
            OverlayStyle::Ai => "ai",
        }
    }

    pub fn parse_or_default(raw: &str) -> Self {
        let key = canonical(raw);
        if key.is_empty() || key == "default" {
            return OverlayStyle::Standard;
        }
        match Self::ALL.into_iter().find(|s| canonical(s.name()) == key) {
            Some(style) => style,
            None => {
                warn!(style = raw, "unknown overlay style; using standard");
                OverlayStyle::Standard
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Default,
    Gray,
    Amber,
    Blue,
    Pink,
}

impl Theme {
    pub const ALL: [Theme; 5] = [
        Theme::Default,
        Theme::Gray,
        Theme::Amber,
        Theme::Blue,
        Theme::Pink,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Theme::Default => "default",
            Theme::Gray => "gray",
            Theme::Amber => "amber",
            Theme::Blue => "blue",
            Theme::Pink => "pink",
        }
    }

    /// Gradient endpoints used for progress bars and highlights.
    pub fn accent(self) -> [&'static str; 2] {
        match self {
            Theme::Default => ["#00ffe7", "#ff00c8"],
            Theme::Gray => ["#b0b0b0", "#888888"],
            Theme::Amber => ["#fcd34d", "#f97316"],
            Theme::Blue => ["#3b82f6", "#06b6d4"],
            Theme::Pink => ["#ec4899", "#a855f7"],
        }
    }

    pub fn parse_or_default(raw: &str) -> Self {
        let key = canonical(raw);
        if key.is_empty() {
            return Theme::Default;
        }
        match Self::ALL.into_iter().find(|t| t.name() == key) {
            Some(theme) => theme,
            None => {
                warn!(theme = raw, "theme not found; using default");
                Theme::Default
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    TopLeft,
    TopCenter,
    TopRight,
    MiddleLeft,
    Center,
    MiddleRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

impl Position {
    pub const ALL: [Position; 9] = [
        Position::TopLeft,
        Position::TopCenter,
        Position::TopRight,
        Position::MiddleLeft,
        Position::Center,
        Position::MiddleRight,
        Position::BottomLeft,
        Position::BottomCenter,
        Position::BottomRight,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Position::TopLeft => "top-left",
            Position::TopCenter => "top-center",
            Position::TopRight => "top-right",
            Position::MiddleLeft => "middle-left",
            Position::Center => "center",
            Position::MiddleRight => "middle-right",
            Position::BottomLeft => "bottom-left",
            Position::BottomCenter => "bottom-center",
            Position::BottomRight => "bottom-right",
        }
    }

    pub fn parse_or_default(raw: &str) -> Self {
        let key = canonical(raw);
        if key.is_empty() {
            return Position::BottomRight;
        }
        match Self::ALL.into_iter().find(|p| canonical(p.name()) == key) {
            Some(pos) => pos,
            None => {
                warn!(position = raw, "unknown overlay position; using bottom-right");
                Position::BottomRight
            }
        }
    }
}

/// Declarative overlay description handed to whatever draws it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct View {
    pub style: OverlayStyle,
    pub theme: Theme,
    pub position: Position,
    pub title: String,
    pub subtitle: String,
    pub lines: Vec<String>,
    pub artwork_url: Option<String>,
    /// Fraction of the track played, `0.0..=1.0`.
    pub progress: Option<f64>,
    pub timestamp: Option<String>,
    pub accent: [&'static str; 2],
    pub playing: bool,
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.playing { "▶" } else { "⏸" };
        writeln!(f, "{marker} {}", self.title)?;
        if !self.subtitle.is_empty() {
            writeln!(f, "  {}", self.subtitle)?;
        }
        for line in &self.lines {
            writeln!(f, "  {line}")?;
        }
        if let Some(ratio) = self.progress {
            let filled = ((ratio * BAR_WIDTH as f64).round() as usize).min(BAR_WIDTH);
            write!(f, "  [{}{}]", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled))?;
            if let Some(ts) = &self.timestamp {
                write!(f, " {ts}")?;
            }
            writeln!(f)?;
        } else if let Some(ts) = &self.timestamp {
            writeln!(f, "  {ts}")?;
        }
        Ok(())
    }
}

pub struct RenderContext<'a> {
    pub theme: Theme,
    pub position: Position,
    pub show_timestamp: bool,
    pub queue: &'a [QueueEntry],
}

pub trait OverlayRenderer: Send + Sync {
    fn render(&self, now_playing: &NowPlaying, ctx: &RenderContext<'_>) -> View;
}

/// Played fraction for progress bars. A zero duration renders as empty.
pub fn progress_ratio(now_playing: &NowPlaying) -> f64 {
    if now_playing.raw_duration_ms == 0 {
        return 0.0;
    }
    (now_playing.raw_progress_ms as f64 / now_playing.raw_duration_ms as f64).clamp(0.0, 1.0)
}

fn timestamp(now_playing: &NowPlaying) -> String {
    format!("{} / {}", now_playing.progress, now_playing.duration)
}

fn base_view(style: OverlayStyle, now_playing: &NowPlaying, ctx: &RenderContext<'_>) -> View {
    View {
        style,
        theme: ctx.theme,
        position: ctx.position,
        title: now_playing.name.clone(),
        subtitle: now_playing.artist_line(),
        lines: Vec::new(),
        artwork_url: now_playing.artwork_url.clone(),
        progress: Some(progress_ratio(now_playing)),
        timestamp: ctx.show_timestamp.then(|| timestamp(now_playing)),
        accent: ctx.theme.accent(),
        playing: now_playing.playing,
    }
}

fn up_next(queue: &[QueueEntry], take: usize) -> Vec<String> {
    queue
        .iter()
        .take(take)
        .enumerate()
        .map(|(i, e)| format!("{}. {} – {}", i + 1, e.name, e.artist_line()))
        .collect()
}

struct StandardRenderer;

impl OverlayRenderer for StandardRenderer {
    fn render(&self, now_playing: &NowPlaying, ctx: &RenderContext<'_>) -> View {
        let mut view = base_view(OverlayStyle::Standard, now_playing, ctx);
        if !now_playing.album.is_empty() {
            view.lines.push(now_playing.album.clone());
        }
        view
    }
}

struct MinimalBarRenderer;

impl OverlayRenderer for MinimalBarRenderer {
    fn render(&self, now_playing: &NowPlaying, ctx: &RenderContext<'_>) -> View {
        let mut view = base_view(OverlayStyle::MinimalBar, now_playing, ctx);
        view.title = format!("{} · {}", now_playing.name, now_playing.artist_line());
        view.subtitle.clear();
        view.artwork_url = None;
        view
    }
}

struct AnimatedRenderer;

impl OverlayRenderer for AnimatedRenderer {
    fn render(&self, now_playing: &NowPlaying, ctx: &RenderContext<'_>) -> View {
        let mut view = base_view(OverlayStyle::Animated, now_playing, ctx);
        view.lines.push(if now_playing.playing {
            "Now Playing".to_string()
        } else {
            "Paused".to_string()
        });
        view
    }
}

struct FadeRenderer;

impl OverlayRenderer for FadeRenderer {
    fn render(&self, now_playing: &NowPlaying, ctx: &RenderContext<'_>) -> View {
        let mut view = base_view(OverlayStyle::Fade, now_playing, ctx);
        view.progress = None;
        view
    }
}

struct QueueRenderer;

impl OverlayRenderer for QueueRenderer {
    fn render(&self, now_playing: &NowPlaying, ctx: &RenderContext<'_>) -> View {
        let mut view = base_view(OverlayStyle::Queue, now_playing, ctx);
        let next = up_next(ctx.queue, 3);
        if next.is_empty() {
            view.lines.push("Queue is empty".to_string());
        } else {
            view.lines.push("Up next:".to_string());
            view.lines.extend(next);
        }
        view
    }
}

/// Full card while playing, collapses to the bar when paused.
struct DynamicRenderer;

impl OverlayRenderer for DynamicRenderer {
    fn render(&self, now_playing: &NowPlaying, ctx: &RenderContext<'_>) -> View {
        let mut view = if now_playing.playing {
            StandardRenderer.render(now_playing, ctx)
        } else {
            MinimalBarRenderer.render(now_playing, ctx)
        };
        view.style = OverlayStyle::Dynamic;
        view
    }
}

struct MediaStackRenderer;

impl OverlayRenderer for MediaStackRenderer {
    fn render(&self, now_playing: &NowPlaying, ctx: &RenderContext<'_>) -> View {
        let mut view = base_view(OverlayStyle::MediaStack, now_playing, ctx);
        view.timestamp = Some(timestamp(now_playing));
        if !now_playing.album.is_empty() {
            view.lines.push(now_playing.album.clone());
        }
        if let Some(next) = ctx.queue.first() {
            view.lines.push(format!("Next: {} – {}", next.name, next.artist_line()));
        }
        view
    }
}

struct AiRenderer;

impl OverlayRenderer for AiRenderer {
    fn render(&self, now_playing: &NowPlaying, ctx: &RenderContext<'_>) -> View {
        let mut view = base_view(OverlayStyle::Ai, now_playing, ctx);
        view.timestamp = Some(timestamp(now_playing));
        view.lines.extend(up_next(ctx.queue, 5));
        view
    }
}

pub fn renderer_for(style: OverlayStyle) -> &'static dyn OverlayRenderer {
    match style {
        OverlayStyle::Standard => &StandardRenderer,
        OverlayStyle::MinimalBar => &MinimalBarRenderer,
        OverlayStyle::Animated => &AnimatedRenderer,
        OverlayStyle::Fade => &FadeRenderer,
        OverlayStyle::Queue => &QueueRenderer,
        OverlayStyle::Dynamic => &DynamicRenderer,
        OverlayStyle::MediaStack => &MediaStackRenderer,
        OverlayStyle::Ai => &AiRenderer,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlaySelector {
    pub style: OverlayStyle,
    pub theme: Theme,
    pub position: Position,
    pub show_timestamp: bool,
}

impl OverlaySelector {
    pub fn from_config(cfg: &OverlayConfig) -> Self {
        Self {
            style: OverlayStyle::parse_or_default(&cfg.style),
            theme: Theme::parse_or_default(&cfg.theme),
            position: Position::parse_or_default(&cfg.position),
            show_timestamp: cfg.show_timestamp,
        }
    }

    pub fn render(&self, now_playing: &NowPlaying, queue: &[QueueEntry]) -> View {
        let ctx = RenderContext {
            theme: self.theme,
            position: self.position,
            show_timestamp: self.show_timestamp,
            queue,
        };
        renderer_for(self.style).render(now_playing, &ctx)
    }

    /// `None` means nothing should be drawn.
    pub fn present(&self, state: &RenderState, queue: &[QueueEntry]) -> Option<View> {
        match state {
            RenderState::Playing(now_playing) => Some(self.render(now_playing, queue)),
            RenderState::Idle => None,
            RenderState::Connect => Some(View {
                style: self.style,
                theme: self.theme,
                position: self.position,
                title: "Spotify is not connected".to_string(),
                subtitle: String::new(),
                lines: vec![
                    "Run `overlay-bridge auth url`, then `overlay-bridge auth exchange <code>`"
                        .to_string(),
                ],
                artwork_url: None,
                progress: None,
                timestamp: None,
                accent: self.theme.accent(),
                playing: false,
            }),
        }
    }
}
