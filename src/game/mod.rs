pub mod anticheat;
pub mod runner;
pub mod scoring;
pub mod sim;

/// Extra ticks added to the pulse window before elimination, absorbing
/// single-tick network jitter. The simulator applies the same grace so the
/// two paths eliminate on the same tick.
pub const LATENCY_GRACE_TICKS: u32 = 1;
