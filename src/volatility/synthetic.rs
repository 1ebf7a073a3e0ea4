use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use tokio::sync::{mpsc, watch};

use crate::volatility::{Feed, Update, FEED_BUFFER};

/// Simulates a whale position margin ratio with a random walk that
/// mean-reverts toward liquidation as the session progresses. Used for
/// Blitz rooms.
pub struct SyntheticFeed {
    /// Target session duration; drives the reversion target.
    pub duration: Duration,
    pub tick_rate: Duration,
    /// Noise step scaling.
    pub volatility: f64,
    /// Upward drift toward liquidation.
    pub drift: f64,
    /// Fixed seed for reproducible walks; None draws from entropy.
    pub seed: Option<u64>,
}

impl SyntheticFeed {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            tick_rate: Duration::from_millis(250),
            volatility: 0.02,
            drift: 0.005,
            seed: None,
        }
    }

    pub fn seeded(duration: Duration, seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::new(duration)
        }
    }

    /// Advances the walk by one tick. Pure in (ratio, progress, rng), so the
    /// walk shape is testable without a running task.
    fn step(&self, ratio: f64, progress: f64, rng: &mut StdRng) -> f64 {
        let noise: f64 = rng.sample::<f64, _>(StandardNormal) * self.volatility;

        // Mean-reversion toward a target that rises over the session
        let target = 0.3 + 0.7 * progress.powf(1.5);
        let reversion = (target - ratio) * 0.05;

        // Occasional spike injection
        let spike = if rng.gen::<f64>() < 0.03 {
            (rng.gen::<f64>() - 0.3) * 0.15
        } else {
            0.0
        };

        (ratio + self.drift + noise + reversion + spike).clamp(0.01, 1.0)
    }

    async fn run(self, mut stop: watch::Receiver<bool>, tx: mpsc::Sender<Update>) {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut ratio = 0.1 + rng.gen::<f64>() * 0.2;

        let mut ticker = tokio::time::interval(self.tick_rate);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut elapsed = Duration::ZERO;

        loop {
            tokio::select! {
                changed = stop.changed() => {
                    // A dropped stop sender means the owner is gone
                    if changed.is_err() || *stop.borrow() {
                        return;
                    }
                }
                _ = ticker.tick() => {
                    elapsed += self.tick_rate;
                    let progress = elapsed.as_secs_f64() / self.duration.as_secs_f64();
                    ratio = self.step(ratio, progress, &mut rng);

                    // Simulated price off an arbitrary base
                    let price = 100.0 * (1.0 - ratio * 0.5);
                    let _ = tx.try_send(Update { margin_ratio: ratio, price });
                }
            }
        }
    }
}

impl Feed for SyntheticFeed {
    fn start(self: Box<Self>, stop: watch::Receiver<bool>) -> mpsc::Receiver<Update> {
        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        tokio::spawn(self.run(stop, tx));
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_stays_in_bounds() {
        let feed = SyntheticFeed::new(Duration::from_secs(120));
        let mut rng = StdRng::seed_from_u64(7);
        let mut ratio = 0.2;
        for tick in 0..2000 {
            let progress = tick as f64 / 480.0;
            ratio = feed.step(ratio, progress, &mut rng);
            assert!((0.01..=1.0).contains(&ratio), "ratio {ratio} out of bounds");
        }
    }

    #[test]
    fn test_walk_trends_toward_liquidation() {
        // Late-session reversion target approaches 1.0, so the mean ratio
        // over many seeds must climb.
        let feed = SyntheticFeed::new(Duration::from_secs(120));
        let mut early_sum = 0.0;
        let mut late_sum = 0.0;
        for seed in 0..50u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut ratio = 0.1 + rng.gen::<f64>() * 0.2;
            for tick in 1..=480 {
                let progress = tick as f64 / 480.0;
                ratio = feed.step(ratio, progress, &mut rng);
                if tick == 60 {
                    early_sum += ratio;
                }
            }
            late_sum += ratio;
        }
        assert!(
            late_sum > early_sum,
            "late mean {:.3} should exceed early mean {:.3}",
            late_sum / 50.0,
            early_sum / 50.0
        );
    }

    #[test]
    fn test_seeded_walk_reproducible() {
        let feed = SyntheticFeed::seeded(Duration::from_secs(120), 42);
        let walk = |feed: &SyntheticFeed| {
            let mut rng = StdRng::seed_from_u64(feed.seed.unwrap());
            let mut ratio = 0.1 + rng.gen::<f64>() * 0.2;
            (0..100)
                .map(|t| {
                    ratio = feed.step(ratio, t as f64 / 480.0, &mut rng);
                    ratio
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(walk(&feed), walk(&feed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_feed_emits_and_stops() {
        let feed = Box::new(SyntheticFeed::seeded(Duration::from_secs(120), 1));
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut rx = feed.start(stop_rx);

        let update = rx.recv().await.expect("feed should emit");
        assert!((0.01..=1.0).contains(&update.margin_ratio));

        stop_tx.send(true).unwrap();
        // Drain until the task notices the stop and drops the sender
        while rx.recv().await.is_some() {}
    }
}
