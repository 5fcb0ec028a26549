use crate::queue::{QueueFetcher, QueueOutcome};
use crate::token::TokenManager;
use overlay_bridge_core::normalize::normalize;
use overlay_bridge_core::store::keys;
use overlay_bridge_core::{now_ms, AppConfig, NowPlaying, PlaybackSnapshot, Track, TypedStore};
use overlay_bridge_providers::{ApiError, PlaybackApi};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
}

impl PollerConfig {
    pub fn from_app_config(cfg: &AppConfig) -> Self {
        Self {
            interval: Duration::from_millis(cfg.intervals.poll_ms.max(250)),
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5_000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerStatus {
    Unauthenticated,
    Polling,
    AuthExpired,
    Stopped,
}

/// What the overlay should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderState {
    /// No usable credentials: prompt the user to connect.
    Connect,
    /// Authenticated, nothing playing.
    Idle,
    Playing(NowPlaying),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Updated { edge: bool },
    Quiescent,
    Refreshed,
    RefreshFailed,
    Skipped,
    Unauthenticated,
}

pub struct NowPlayingPoller {
    cfg: PollerConfig,
    api: Arc<dyn PlaybackApi>,
    tokens: Arc<TokenManager>,
    queue: Arc<QueueFetcher>,
    store: TypedStore,
    status_tx: watch::Sender<PollerStatus>,
    render_tx: watch::Sender<RenderState>,
    last_track_id: Option<String>,
    rejected_token: Option<String>,
    expired_token: Option<String>,
    cancel: CancellationToken,
    queue_tasks: JoinSet<QueueOutcome>,
}

impl NowPlayingPoller {
    pub fn new(
        cfg: PollerConfig,
        api: Arc<dyn PlaybackApi>,
        tokens: Arc<TokenManager>,
        queue: Arc<QueueFetcher>,
        store: TypedStore,
    ) -> Self {
        let (status, render) = match tokens.access_token() {
            Some(_) => (PollerStatus::Polling, RenderState::Idle),
            None => (PollerStatus::Unauthenticated, RenderState::Connect),
        };
        let (status_tx, _) = watch::channel(status);
        let (render_tx, _) = watch::channel(render);
        Self {
            cfg,
            api,
            tokens,
            queue,
            store,
            status_tx,
            render_tx,
            last_track_id: None,
            rejected_token: None,
            expired_token: None,
            cancel: CancellationToken::new(),
            queue_tasks: JoinSet::new(),
        }
    }

    pub fn status(&self) -> PollerStatus {
        *self.status_tx.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<PollerStatus> {
        self.status_tx.subscribe()
    }

    pub fn subscribe_render(&self) -> watch::Receiver<RenderState> {
        self.render_tx.subscribe()
    }

    /// Runs one poll cycle.
    pub async fn tick(&mut self) -> TickOutcome {
        self.reap_queue_tasks();

        let status = self.status();
        if status == PollerStatus::Stopped {
            return TickOutcome::Skipped;
        }

        let Some(token) = self.usable_token() else {
            self.enter_unauthenticated();
            return TickOutcome::Unauthenticated;
        };

        match status {
            PollerStatus::AuthExpired
                if self.expired_token.as_deref() == Some(token.as_str()) =>
            {
                return self.recover(token).await;
            }
            PollerStatus::AuthExpired => {
                info!("new access token found; polling resumed");
                self.expired_token = None;
                self.set_status(PollerStatus::Polling);
            }
            PollerStatus::Unauthenticated => {
                info!("access token available; polling resumed");
                self.rejected_token = None;
                self.set_status(PollerStatus::Polling);
            }
            PollerStatus::Polling | PollerStatus::Stopped => {}
        }

        match self.api.currently_playing(&token).await {
            Ok(Some(PlaybackSnapshot {
                is_playing,
                item: Some(track),
                progress_ms,
            })) => self.publish(&track, progress_ms, is_playing, token),
            Ok(_) => self.quiesce(),
            Err(ApiError::TokenExpired) => {
                info!("access token expired");
                self.recover(token).await
            }
            Err(err) => {
                warn!(error = %err, "now-playing poll failed; keeping previous state");
                TickOutcome::Skipped
            }
        }
    }

    /// Starts the periodic task. At most one playback request is in flight:
    /// each tick is awaited before the next one can start, and ticks missed
    /// while a request was slow are skipped rather than bunched up.
    pub fn spawn(self) -> PollerHandle {
        let cancel = self.cancel.clone();
        let status = self.subscribe_status();
        let render = self.subscribe_render();
        let join = tokio::spawn(self.run());
        PollerHandle {
            cancel,
            join,
            status,
            render,
        }
    }

    async fn run(mut self) {
        info!(interval_ms = self.cfg.interval.as_millis() as u64, "now-playing poller started");
        let mut ticker = tokio::time::interval(self.cfg.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let cancel = self.cancel.clone();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            // dropping an in-flight tick on cancel means its response can
            // never reach the render state or the store
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = self.tick() => debug!(?outcome, "tick complete"),
            }
        }

        self.queue_tasks.abort_all();
        self.status_tx.send_replace(PollerStatus::Stopped);
        info!("now-playing poller stopped");
    }

    fn usable_token(&self) -> Option<String> {
        self.tokens
            .access_token()
            .filter(|t| self.rejected_token.as_deref() != Some(t.as_str()))
    }

    fn publish(
        &mut self,
        track: &Track,
        progress_ms: u64,
        is_playing: bool,
        token: String,
    ) -> TickOutcome {
        let now_playing = normalize(track, progress_ms, is_playing).stamped(now_ms());

        // an absent snapshot (first run, disconnect) always counts as a change
        let previous_id = match self.store.get_json::<NowPlaying>(keys::NOW_PLAYING) {
            Ok(previous) => previous.map(|p| p.id),
            Err(err) => {
                warn!(error = %err, "failed to read previous snapshot; using last seen track");
                self.last_track_id.clone()
            }
        };
        let edge = previous_id.as_deref() != Some(now_playing.id.as_str());
        if edge {
            debug!(track_id = %now_playing.id, "track changed");
            self.last_track_id = Some(now_playing.id.clone());
            let queue = Arc::clone(&self.queue);
            let cancel = self.cancel.clone();
            self.queue_tasks
                .spawn(async move { queue.refresh_queue(token, &cancel).await });
        }

        if let Err(err) = self.store.set_json(keys::NOW_PLAYING, &now_playing) {
            warn!(error = %err, "failed to persist now-playing snapshot");
        }
        self.render_tx.send_replace(RenderState::Playing(now_playing));
        TickOutcome::Updated { edge }
    }

    /// No active session: keep the last track around, marked not playing, so
    /// consumers can still answer "last played".
    fn quiesce(&mut self) -> TickOutcome {
        self.render_tx.send_if_modified(|state| {
            if *state == RenderState::Idle {
                false
            } else {
                *state = RenderState::Idle;
                true
            }
        });

        match self.store.get_json::<NowPlaying>(keys::NOW_PLAYING) {
            Ok(Some(mut last)) if last.playing => {
                last.playing = false;
                last.updated_at_ms = now_ms();
                if let Err(err) = self.store.set_json(keys::NOW_PLAYING, &last) {
                    warn!(error = %err, "failed to mark snapshot as not playing");
                }
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "failed to read now-playing snapshot"),
        }
        TickOutcome::Quiescent
    }

    async fn recover(&mut self, expired: String) -> TickOutcome {
        self.expired_token = Some(expired);
        self.set_status(PollerStatus::AuthExpired);
        match self.tokens.refresh().await {
            Ok(_) => {
                info!("access token refreshed");
                self.expired_token = None;
                self.set_status(PollerStatus::Polling);
                TickOutcome::Refreshed
            }
            Err(err) if err.requires_reauthorization() => {
                warn!(error = %err, "token refresh rejected; re-authorization required");
                self.rejected_token = self.tokens.access_token();
                self.expired_token = None;
                self.enter_unauthenticated();
                TickOutcome::RefreshFailed
            }
            Err(err) => {
                warn!(error = %err, "token refresh failed; retrying next tick");
                TickOutcome::RefreshFailed
            }
        }
    }

    fn enter_unauthenticated(&mut self) {
        if self.status() != PollerStatus::Unauthenticated {
            info!("no usable access token; waiting for authorization");
        }
        self.set_status(PollerStatus::Unauthenticated);
        self.render_tx.send_if_modified(|state| {
            if *state == RenderState::Connect {
                false
            } else {
                *state = RenderState::Connect;
                true
            }
        });
    }

    fn set_status(&self, status: PollerStatus) {
        self.status_tx.send_if_modified(|cur| {
            if *cur == status {
                false
            } else {
                *cur = status;
                true
            }
        });
    }

    fn reap_queue_tasks(&mut self) {
        while let Some(res) = self.queue_tasks.try_join_next() {
            if let Err(err) = res {
                warn!(error = %err, "queue task ended abnormally");
            }
        }
    }

    #[cfg(test)]
    async fn settle_queue(&mut self) {
        while self.queue_tasks.join_next().await.is_some() {}
    }
}

pub struct PollerHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
    status: watch::Receiver<PollerStatus>,
    render: watch::Receiver<RenderState>,
}

impl PollerHandle {
    pub fn status(&self) -> watch::Receiver<PollerStatus> {
        self.status.clone()
    }

    pub fn render(&self) -> watch::Receiver<RenderState> {
        self.render.clone()
    }

    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(err) = self.join.await {
            warn!(error = %err, "poller task ended abnormally");
        }
    }
}
