use crate::token::TokenManager;
use overlay_bridge_core::normalize::queue_entry;
use overlay_bridge_core::store::keys;
use overlay_bridge_core::{QueueEntry, Track, TypedStore};
use overlay_bridge_providers::{ApiError, PlaybackApi};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOutcome {
    Stored(usize),
    /// A newer fetch started after this one; its result wins.
    Superseded,
    Cancelled,
    Failed,
}

/// Fetches the upcoming tracks on track-change edges. Failures here never
/// touch the poller; the previous queue simply stays in place.
pub struct QueueFetcher {
    api: Arc<dyn PlaybackApi>,
    tokens: Arc<TokenManager>,
    store: TypedStore,
    limit: usize,
    generation: AtomicU64,
    write_lock: Mutex<()>,
    queue_tx: watch::Sender<Vec<QueueEntry>>,
}

impl QueueFetcher {
    pub fn new(
        api: Arc<dyn PlaybackApi>,
        tokens: Arc<TokenManager>,
        store: TypedStore,
        limit: usize,
    ) -> Self {
        let initial = store
            .get_json::<Vec<QueueEntry>>(keys::QUEUE)
            .ok()
            .flatten()
            .unwrap_or_default();
        let (queue_tx, _) = watch::channel(initial);
        Self {
            api,
            tokens,
            store,
            limit,
            generation: AtomicU64::new(0),
            write_lock: Mutex::new(()),
            queue_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<QueueEntry>> {
        self.queue_tx.subscribe()
    }

    pub async fn fetch(&self, token: &str) -> Result<Vec<Track>, ApiError> {
        self.api.queue(token).await
    }

    pub async fn refresh_queue(&self, token: String, cancel: &CancellationToken) -> QueueOutcome {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let tracks = match self.fetch(&token).await {
            Ok(tracks) => tracks,
            Err(err) if err.is_token_expired() => match self.tokens.refresh().await {
                Ok(new_token) => match self.fetch(&new_token).await {
                    Ok(tracks) => tracks,
                    Err(err) => {
                        warn!(error = %err, "queue fetch failed after token refresh");
                        return QueueOutcome::Failed;
                    }
                },
                Err(err) => {
                    warn!(error = %err, "queue fetch could not refresh token");
                    return QueueOutcome::Failed;
                }
            },
            Err(err) => {
                warn!(error = %err, "queue fetch failed; keeping previous queue");
                return QueueOutcome::Failed;
            }
        };

        let entries: Vec<QueueEntry> = tracks.iter().take(self.limit).map(queue_entry).collect();

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if cancel.is_cancelled() {
            return QueueOutcome::Cancelled;
        }
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "discarding superseded queue result");
            return QueueOutcome::Superseded;
        }
        if let Err(err) = self.store.set_json(keys::QUEUE, &entries) {
            warn!(error = %err, "failed to persist queue");
            return QueueOutcome::Failed;
        }
        let count = entries.len();
        self.queue_tx.send_replace(entries);
        debug!(count, "queue updated");
        QueueOutcome::Stored(count)
    }
}
