/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Tick sources for the scheduler.
//!
//! These are trait objects rather than a concrete type so the dispatch loop
//! can run against the real monotonic counter or a hand-driven clock in tests.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Monotonic radio tick counter.
pub trait Clock: Send + Sync {
    /// Current time in radio ticks.
    fn now(&self) -> u64;
}

// ── RadioClock ────────────────────────────────────────────────────────────────

/// Tick counter derived from [`Instant`], with a signed correction offset.
///
/// The radio layer reports its own counter value in completion events; the
/// owner can feed the observed difference into [`adjust_offset`] so the two
/// timelines stay aligned.
///
/// [`adjust_offset`]: RadioClock::adjust_offset
#[derive(Debug)]
pub struct RadioClock {
    origin: Instant,
    tick_rate_khz: u64,
    offset: AtomicI64,
}

impl RadioClock {
    pub fn new(tick_rate_khz: u64) -> Self {
        Self {
            origin: Instant::now(),
            tick_rate_khz,
            offset: AtomicI64::new(0),
        }
    }

    /// Replace the correction offset.
    pub fn set_offset(&self, offset_ticks: i64) {
        self.offset.store(offset_ticks, Ordering::Relaxed);
    }

    /// Add `diff_ticks` to the correction offset.
    pub fn adjust_offset(&self, diff_ticks: i64) {
        self.offset.fetch_add(diff_ticks, Ordering::Relaxed);
    }

    pub fn offset(&self) -> i64 {
        self.offset.load(Ordering::Relaxed)
    }

    fn raw_ticks(&self) -> u64 {
        let nanos = self.origin.elapsed().as_nanos();
        let ticks = nanos * self.tick_rate_khz as u128 / 1_000_000;
        ticks.min(u64::MAX as u128) as u64
    }
}

impl Clock for RadioClock {
    fn now(&self) -> u64 {
        let raw = self.raw_ticks();
        let offset = self.offset();
        if offset >= 0 {
            raw.saturating_add(offset as u64)
        } else {
            raw.saturating_sub(offset.unsigned_abs())
        }
    }
}

// ── ManualClock ───────────────────────────────────────────────────────────────

/// Hand-driven clock.  Clones share the same counter.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    ticks: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ticks: u64) -> Self {
        Self {
            ticks: Arc::new(AtomicU64::new(start_ticks)),
        }
    }

    pub fn set(&self, ticks: u64) {
        self.ticks.store(ticks, Ordering::SeqCst);
    }

    pub fn advance(&self, ticks: u64) {
        self.ticks.fetch_add(ticks, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_counter() {
        let a = ManualClock::new(100);
        let b = a.clone();
        a.advance(50);
        assert_eq!(b.now(), 150);
        b.set(7);
        assert_eq!(a.now(), 7);
    }

    #[test]
    fn radio_clock_is_monotonic() {
        let clock = RadioClock::new(69_120);
        let t0 = clock.now();
        let t1 = clock.now();
        assert!(t1 >= t0);
    }

    #[test]
    fn radio_clock_offset_shifts_time() {
        let clock = RadioClock::new(1_000);
        clock.set_offset(1_000_000);
        assert!(clock.now() >= 1_000_000);

        clock.adjust_offset(-2_000_000);
        assert_eq!(clock.offset(), -1_000_000);
        // Negative correction larger than elapsed time saturates at zero
        assert!(clock.now() < 1_000_000);
    }
}
