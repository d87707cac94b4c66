//! Monotonic kernel time
//!
//! The timer interrupt lives outside this crate; it advances the global
//! tick counter, which everything here consumes for timestamps (signal
//! enqueue times, exit times, delivery-time statistics).

use core::sync::atomic::{AtomicU64, Ordering};

/// Global monotonic tick counter, advanced by the platform timer.
static TICKS: AtomicU64 = AtomicU64::new(0);

/// Get the current tick count
pub fn get_ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

/// Advance the tick counter, returning the new value
///
/// Called from the timer interrupt path of the embedding kernel.
pub fn advance_ticks(n: u64) -> u64 {
    TICKS.fetch_add(n, Ordering::Relaxed) + n
}
