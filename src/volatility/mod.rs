//! Margin-ratio feeds
//!
//! A feed streams the margin ratio of the tracked position into a room's
//! runner: 0 is safe, 1.0 is liquidation. Blitz rooms run on a synthetic
//! random walk, Alpha rooms follow a live oracle position, and tests replay
//! fixed scripts.

pub mod live;
pub mod scripted;
pub mod synthetic;

use tokio::sync::{mpsc, watch};

/// Channel capacity for feed updates. Feeds drop updates when the consumer
/// lags instead of blocking.
pub const FEED_BUFFER: usize = 32;

/// One margin-ratio observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Update {
    pub margin_ratio: f64,
    pub price: f64,
}

/// Margin ratio source for a game room.
pub trait Feed: Send + 'static {
    /// Spawns the feed task. Updates arrive on the returned channel; the
    /// feed terminates when `stop` flips to true. A closed channel means
    /// the feed has ended on its own (scripted feeds run out of script).
    fn start(self: Box<Self>, stop: watch::Receiver<bool>) -> mpsc::Receiver<Update>;
}
