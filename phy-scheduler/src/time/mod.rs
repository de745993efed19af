/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Radio time base: tick counter ↔ frame / slot / subslot coordinates.
//!
//! All scheduling arithmetic is done in **radio ticks**, the unit of the
//! hardware counter that the radio layer uses for `start_time`.  A frame is
//! the base unit of the timeline; it is divided into slots, and every slot
//! into subslots:
//!
//! ```text
//! |<------------------------------ frame (10 ms) ------------------------------>|
//! | slot 0 | slot 1 | slot 2 |  ...                                  | slot 23 |
//! |ss0|ss1 |
//! ```
//!
//! With the default 69.12 MHz counter a frame is 691 200 ticks, a slot is
//! 28 800 ticks and a subslot 14 400 ticks.

pub mod clock;

pub use clock::{Clock, ManualClock, RadioClock};

use std::time::Duration;

use crate::config::TimeBaseConfig;
use crate::record::{Length, StartOffset};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Default radio tick counter rate (69.12 MHz).
pub const DEFAULT_TICK_RATE_KHZ: u64 = 69_120;

/// Default frame duration in microseconds.
pub const DEFAULT_FRAME_DURATION_US: u64 = 10_000;

/// Default number of slots in one frame.
pub const DEFAULT_SLOTS_PER_FRAME: u64 = 24;

/// Default number of subslots in one slot.
pub const DEFAULT_SUBSLOTS_PER_SLOT: u64 = 2;

// ── TimeBase ──────────────────────────────────────────────────────────────────

/// Resolved frame geometry in radio ticks.
///
/// Cheap to copy; every component that needs time conversions holds its own
/// copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    tick_rate_khz: u64,
    frame_ticks: u64,
    slot_ticks: u64,
    subslot_ticks: u64,
}

impl TimeBase {
    /// Build the geometry from raw parameters.
    ///
    /// Zero slot / subslot counts are clamped to one so the divisions below
    /// are always defined; [`SchedulerConfig::validate`] rejects them earlier
    /// for configuration files.
    ///
    /// [`SchedulerConfig::validate`]: crate::config::SchedulerConfig::validate
    pub fn new(
        tick_rate_khz: u64,
        frame_duration_us: u64,
        slots_per_frame: u64,
        subslots_per_slot: u64,
    ) -> Self {
        let frame_ticks = frame_duration_us.saturating_mul(tick_rate_khz) / 1_000;
        let slot_ticks = frame_ticks / slots_per_frame.max(1);
        let subslot_ticks = slot_ticks / subslots_per_slot.max(1);
        Self {
            tick_rate_khz,
            frame_ticks,
            slot_ticks,
            subslot_ticks,
        }
    }

    pub fn from_config(cfg: &TimeBaseConfig) -> Self {
        Self::new(
            cfg.tick_rate_khz,
            cfg.frame_duration_us,
            cfg.slots_per_frame,
            cfg.subslots_per_slot,
        )
    }

    pub fn tick_rate_khz(&self) -> u64 {
        self.tick_rate_khz
    }

    pub fn frame_ticks(&self) -> u64 {
        self.frame_ticks
    }

    pub fn slot_ticks(&self) -> u64 {
        self.slot_ticks
    }

    pub fn subslot_ticks(&self) -> u64 {
        self.subslot_ticks
    }

    // ── Unit conversions ──────────────────────────────────────────────────────

    pub fn ms_to_ticks(&self, ms: u64) -> u64 {
        ms.saturating_mul(self.tick_rate_khz)
    }

    pub fn us_to_ticks(&self, us: u64) -> u64 {
        us.saturating_mul(self.tick_rate_khz) / 1_000
    }

    /// Whole milliseconds contained in `ticks` (truncating).
    pub fn ticks_to_ms(&self, ticks: u64) -> u64 {
        ticks / self.tick_rate_khz.max(1)
    }

    /// Wall-clock duration of `ticks`, used to arm tokio timers.
    pub fn ticks_to_duration(&self, ticks: u64) -> Duration {
        let nanos = (ticks as u128 * 1_000_000) / self.tick_rate_khz.max(1) as u128;
        Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
    }

    // ── Frame coordinates ─────────────────────────────────────────────────────

    /// Offset of an operation's start from the beginning of its frame.
    pub fn offset_ticks(&self, offset: StartOffset) -> u64 {
        match offset {
            StartOffset::Slot(n) => n as u64 * self.slot_ticks,
            StartOffset::Subslot(n) => n as u64 * self.subslot_ticks,
        }
    }

    /// Length of an operation expressed in slots or subslots.
    pub fn length_ticks(&self, length: Length) -> u64 {
        match length {
            Length::Slots(n) => n as u64 * self.slot_ticks,
            Length::Subslots(n) => n as u64 * self.subslot_ticks,
        }
    }

    /// First tick of the frame following the frame that starts at `frame_time`.
    pub fn next_frame_boundary(&self, frame_time: u64) -> u64 {
        frame_time.saturating_add(self.frame_ticks)
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new(
            DEFAULT_TICK_RATE_KHZ,
            DEFAULT_FRAME_DURATION_US,
            DEFAULT_SLOTS_PER_FRAME,
            DEFAULT_SUBSLOTS_PER_SLOT,
        )
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
