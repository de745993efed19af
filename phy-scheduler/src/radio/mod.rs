/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Radio Control Interface consumed by the dispatch loop.
//!
//! Every `submit_*` call is non-blocking: it only hands the request to the
//! radio.  The outcome arrives later through the scheduler's event intake
//! ([`Scheduler::op_completed`] / [`Scheduler::data_received`]), never as a
//! direct callback from inside `submit_*`.
//!
//! [`Scheduler::op_completed`]: crate::scheduler::Scheduler::op_completed
//! [`Scheduler::data_received`]: crate::scheduler::Scheduler::data_received

pub mod loopback;

pub use loopback::{LoopbackLink, LoopbackRadio};

use thiserror::Error;

use crate::record::{Lbt, PhyHeader, RxFilter, RxMode};

/// Error returned by the radio when it refuses a submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("radio error {code}: {reason}")]
pub struct RadioError {
    pub code: i32,
    pub reason: String,
}

impl RadioError {
    pub fn new(code: i32, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

// ── Requests ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxRequest<'a> {
    pub handle: u32,
    /// Absolute radio tick at which transmission starts.
    pub start_time: u64,
    /// Air time in ticks.
    pub duration: u64,
    pub channel: u16,
    pub network_id: u32,
    pub header: PhyHeader,
    pub payload: &'a [u8],
    pub lbt: Option<Lbt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxRequest {
    pub handle: u32,
    pub start_time: u64,
    pub duration: u64,
    pub channel: u16,
    pub network_id: u32,
    pub filter: RxFilter,
    pub mode: RxMode,
    pub expected_rssi_level_dbm: i8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RssiRequest {
    pub handle: u32,
    pub start_time: u64,
    pub duration: u64,
    pub channel: u16,
    pub reporting_interval_slots: u32,
}

// ── RadioControl ──────────────────────────────────────────────────────────────

/// Lower radio layer that actually executes operations.
pub trait RadioControl: Send {
    fn submit_transmit(&mut self, req: TxRequest<'_>) -> Result<(), RadioError>;

    fn submit_receive(&mut self, req: RxRequest) -> Result<(), RadioError>;

    fn submit_energy_scan(&mut self, req: RssiRequest) -> Result<(), RadioError>;
}

impl<R: RadioControl + ?Sized> RadioControl for Box<R> {
    fn submit_transmit(&mut self, req: TxRequest<'_>) -> Result<(), RadioError> {
        (**self).submit_transmit(req)
    }

    fn submit_receive(&mut self, req: RxRequest) -> Result<(), RadioError> {
        (**self).submit_receive(req)
    }

    fn submit_energy_scan(&mut self, req: RssiRequest) -> Result<(), RadioError> {
        (**self).submit_energy_scan(req)
    }
}

// ── Test double ───────────────────────────────────────────────────────────────


// ── Tests ─────────────────────────────────────────────────────────────────────
