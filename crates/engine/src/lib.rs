pub mod overlay;
pub mod poller;
pub mod queue;
pub mod token;

#[cfg(test)]
mod testing;

pub use overlay::{
    OverlayRenderer, OverlaySelector, OverlayStyle, Position, RenderContext, Theme, View,
};
pub use poller::{
    NowPlayingPoller, PollerConfig, PollerHandle, PollerStatus, RenderState, TickOutcome,
};
pub use queue::{QueueFetcher, QueueOutcome};
pub use token::{RefreshError, TokenManager};
