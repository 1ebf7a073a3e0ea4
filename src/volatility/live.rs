use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tracing::warn;

use crate::volatility::{Feed, Update, FEED_BUFFER};

/// Tracks a real whale position through a price oracle. Polls the pricing
/// endpoint and converts each price into a margin ratio from the position's
/// entry and liquidation levels. Used for Alpha rooms.
pub struct LiveFeed {
    pub oracle_url: String,
    pub position_id: String,
    pub tick_rate: Duration,
    /// Position's liquidation price.
    pub liquid_price: f64,
    /// Position's entry price.
    pub entry_price: f64,
    pub is_long: bool,
}

#[derive(Debug, Deserialize)]
struct OracleResponse {
    price: f64,
    #[allow(dead_code)]
    timestamp: i64,
}

impl LiveFeed {
    pub fn new(
        oracle_url: String,
        position_id: String,
        liquid_price: f64,
        entry_price: f64,
        is_long: bool,
    ) -> Self {
        Self {
            oracle_url,
            position_id,
            tick_rate: Duration::from_millis(500),
            liquid_price,
            entry_price,
            is_long,
        }
    }

    async fn fetch_price(&self, client: &reqwest::Client) -> anyhow::Result<f64> {
        if self.oracle_url.is_empty() {
            anyhow::bail!("no oracle URL configured");
        }
        let url = format!("{}/price/{}", self.oracle_url, self.position_id);
        let resp: OracleResponse = client.get(&url).send().await?.json().await?;
        Ok(resp.price)
    }

    /// Converts the current price to a 0..1 margin ratio: the fraction of
    /// the entry-to-liquidation range already consumed.
    pub fn compute_margin_ratio(&self, current_price: f64) -> f64 {
        if self.entry_price == self.liquid_price {
            return 0.0;
        }
        let ratio = if self.is_long {
            // Long: liquidation when price drops to liquid_price
            let total_range = self.entry_price - self.liquid_price;
            let dist_to_liquid = current_price - self.liquid_price;
            1.0 - dist_to_liquid / total_range
        } else {
            // Short: liquidation when price rises to liquid_price
            let total_range = self.liquid_price - self.entry_price;
            let dist_to_liquid = self.liquid_price - current_price;
            1.0 - dist_to_liquid / total_range
        };
        ratio.clamp(0.0, 1.0)
    }

    async fn run(self, mut stop: watch::Receiver<bool>, tx: mpsc::Sender<Update>) {
        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
        {
            Ok(c) => c,
            Err(e) => {
                warn!(err = %e, "oracle client build failed, feed disabled");
                return;
            }
        };

        let mut ticker = tokio::time::interval(self.tick_rate);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = stop.changed() => {
                    // A dropped stop sender means the owner is gone
                    if changed.is_err() || *stop.borrow() {
                        return;
                    }
                }
                _ = ticker.tick() => {
                    // Failed fetches skip the tick; values are never forged.
                    let price = match self.fetch_price(&client).await {
                        Ok(p) => p,
                        Err(e) => {
                            warn!(err = %e, "oracle fetch failed, skipping tick");
                            continue;
                        }
                    };
                    let ratio = self.compute_margin_ratio(price);
                    let _ = tx.try_send(Update { margin_ratio: ratio, price });
                }
            }
        }
    }
}

impl Feed for LiveFeed {
    fn start(self: Box<Self>, stop: watch::Receiver<bool>) -> mpsc::Receiver<Update> {
        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        tokio::spawn(self.run(stop, tx));
        rx
    }
}
