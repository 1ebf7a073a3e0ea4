use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::volatility::{Feed, Update, FEED_BUFFER};

/// Replays a fixed sequence of margin ratios at a fixed tick rate. The same
/// script always produces the same stream; used to drive the live runner in
/// integration tests. The channel closes when the script runs out.
pub struct ScriptedFeed {
    pub script: Vec<f64>,
    pub tick_rate: Duration,
}

impl ScriptedFeed {
    pub fn new(script: Vec<f64>) -> Self {
        Self {
            script,
            tick_rate: Duration::from_millis(250),
        }
    }
}

impl Feed for ScriptedFeed {
    fn start(self: Box<Self>, mut stop: watch::Receiver<bool>) -> mpsc::Receiver<Update> {
        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.tick_rate);
            for &mr in &self.script {
                tokio::select! {
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            return;
                        }
                    }
                    _ = ticker.tick() => {
                        let price = 100.0 * (1.0 - mr * 0.5);
                        let _ = tx.try_send(Update { margin_ratio: mr, price });
                    }
                }
            }
        });
        rx
    }
}
