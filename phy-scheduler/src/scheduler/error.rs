/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for the radio operation scheduler.
//!
//! Two error enums model the two failure layers:
//!
//! * [`RejectReason`]: why the Pending Queue refused a single record
//!   (low-level, carries the exact conflicting times).
//! * [`SchedulerError`]: what the public API returns synchronously.
//!
//! Per-operation outcomes that happen later (missed deadline, radio refusal,
//! suspension) are **not** errors here; they travel through the record's
//! callbacks as [`OpStatus`](crate::record::OpStatus).

use thiserror::Error;

use crate::record::{OpKind, Priority};

// ── Insertion rejection ───────────────────────────────────────────────────────

/// Detailed reason why a record was not accepted into the Pending Queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Resolved duration is zero.
    ZeroDuration,

    /// The operation would run into the next frame and its kind is not
    /// allowed to.
    ExceedsFrame { end_time: u64, next_frame_time: u64 },

    /// The time window overlaps an already queued record whose priority is
    /// equal or higher.
    Conflict {
        start_time: u64,
        end_time: u64,
        existing_handle: u32,
        existing_priority: Priority,
        existing_start: u64,
        existing_end: u64,
    },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::ZeroDuration => write!(f, "operation duration resolves to zero ticks"),

            RejectReason::ExceedsFrame {
                end_time,
                next_frame_time,
            } => write!(
                f,
                "end_time {} does not fit into the frame (next frame starts at {})",
                end_time, next_frame_time
            ),

            RejectReason::Conflict {
                start_time,
                end_time,
                existing_handle,
                existing_priority,
                existing_start,
                existing_end,
            } => write!(
                f,
                "window {}..{} overlaps handle {} ({:?}, {}..{})",
                start_time, end_time, existing_handle, existing_priority, existing_start, existing_end
            ),
        }
    }
}

// ── Top-level scheduler errors ────────────────────────────────────────────────

/// Error type returned by the [`Scheduler`](super::Scheduler) API.
///
/// | Variant | Recovery |
/// |---|---|
/// | `InsertRejected` | retry at a different time or with a higher priority |
/// | `AllocationFailed` | fatal to that request only |
/// | `InboxFull` | resource exhaustion; retry later |
/// | `Stopped` | the worker is gone; rebuild the scheduler |
/// | `HandleNotFound` / `NotTransmit` / `PayloadTooLarge` | caller bug |
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("record with handle {handle} rejected: {reason}")]
    InsertRejected { handle: u32, reason: RejectReason },

    #[error("cannot allocate {kind} record ({requested} payload bytes)")]
    AllocationFailed { kind: OpKind, requested: usize },

    /// The Event Intake channel is full.
    #[error("scheduler inbox is full")]
    InboxFull,

    /// The dispatch worker has exited and no longer accepts events.
    #[error("scheduler worker is not running")]
    Stopped,

    #[error("no pending record with handle {0}")]
    HandleNotFound(u32),

    #[error("pending record {handle} is not a transmit operation")]
    NotTransmit { handle: u32 },

    #[error("payload of {size} bytes for handle {handle} exceeds maximum of {max}")]
    PayloadTooLarge { handle: u32, size: usize, max: usize },
}

// ── Tests ─────────────────────────────────────────────────────────────────────
