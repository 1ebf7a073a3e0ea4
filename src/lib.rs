//! Last-pulse elimination game server
//!
//! Many rooms run concurrently; inside each, players issue periodic pulses
//! to stay alive while a shared global timer drains faster as the tracked
//! position's margin ratio drifts toward liquidation. The last survivor
//! (or survivors, when the timer or a liquidation ends the round first)
//! takes the pot.
//!
//! The crate splits into the deterministic core (`room`, `game::scoring`,
//! `game::sim`) used by tests and the Monte Carlo driver, and the live
//! stack (`game::runner`, `net`, `volatility`, `economy`) that runs the
//! same rules under real clients.

pub mod auth;
pub mod config;
pub mod economy;
pub mod game;
pub mod net;
pub mod room;
pub mod volatility;
