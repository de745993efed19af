/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Messages flowing into and out of the dispatch worker.

use std::time::Duration;

use tokio::sync::oneshot;

use crate::record::{OpCompletion, OpStatus, ReceivedData};

/// Event Intake message.  Processed strictly in arrival order.
#[derive(Debug)]
pub enum Event {
    /// Scan the Pending Queue now.
    NextFrameTick,
    /// Re-arm the tick timer to fire after the given delay.
    WakeAfter(Duration),
    OperationCompleted(OpCompletion),
    DataReceived(ReceivedData),
    /// Clear the Pending Queue and the In-Flight Table.
    Purge,
    RemoveByHandle(u32),
    Suspend,
    Resume,
    Status(oneshot::Sender<SchedulerStatus>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerState {
    #[default]
    Normal,
    /// Operations are retired without being handed to the radio.
    Suspended,
}

/// Snapshot returned by [`Scheduler::status`](super::Scheduler::status).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    pub pending: usize,
    pub in_flight: usize,
}

/// Outbound notification for the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    SchedulerSuspended,
    SchedulerResumed,
    OperationSubmitFailed {
        handle: u32,
        status: OpStatus,
        time: u64,
    },
}
