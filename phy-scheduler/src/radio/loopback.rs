/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! In-process radio that "executes" operations by waiting for their air time.
//!
//! [`LoopbackRadio`] is the [`RadioControl`] half handed to the scheduler; it
//! only forwards requests over a channel.  [`LoopbackLink`] is the air half:
//! it waits until each operation would have finished, reports the completion
//! back through the scheduler's event intake, and echoes every transmitted
//! payload to the receive windows that are open at that moment.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{RadioControl, RadioError, RssiRequest, RxRequest, TxRequest};
use crate::record::{OpCompletion, OpStatus, ReceivedData};
use crate::scheduler::Scheduler;
use crate::time::{Clock, TimeBase};

/// Error code returned once the air half has gone away.
pub const LOOPBACK_CLOSED: i32 = -32;

#[derive(Debug)]
enum LoopbackOp {
    Tx {
        handle: u32,
        end_time: u64,
        payload: Vec<u8>,
    },
    Rx {
        handle: u32,
        end_time: u64,
    },
    Rssi {
        handle: u32,
        end_time: u64,
    },
}

/// Scheduler-facing half.
#[derive(Debug, Clone)]
pub struct LoopbackRadio {
    ops: mpsc::UnboundedSender<LoopbackOp>,
}

/// Air-facing half; drive it with [`LoopbackLink::run`].
#[derive(Debug)]
pub struct LoopbackLink {
    ops: mpsc::UnboundedReceiver<LoopbackOp>,
    time_base: TimeBase,
}

impl LoopbackRadio {
    pub fn new(time_base: TimeBase) -> (LoopbackRadio, LoopbackLink) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            LoopbackRadio { ops: tx },
            LoopbackLink { ops: rx, time_base },
        )
    }

    fn forward(&self, op: LoopbackOp) -> Result<(), RadioError> {
        self.ops
            .send(op)
            .map_err(|_| RadioError::new(LOOPBACK_CLOSED, "loopback link closed"))
    }
}

impl RadioControl for LoopbackRadio {
    fn submit_transmit(&mut self, req: TxRequest<'_>) -> Result<(), RadioError> {
        self.forward(LoopbackOp::Tx {
            handle: req.handle,
            end_time: req.start_time.saturating_add(req.duration),
            payload: req.payload.to_vec(),
        })
    }

    fn submit_receive(&mut self, req: RxRequest) -> Result<(), RadioError> {
        self.forward(LoopbackOp::Rx {
            handle: req.handle,
            end_time: req.start_time.saturating_add(req.duration),
        })
    }

    fn submit_energy_scan(&mut self, req: RssiRequest) -> Result<(), RadioError> {
        self.forward(LoopbackOp::Rssi {
            handle: req.handle,
            end_time: req.start_time.saturating_add(req.duration),
        })
    }
}

impl LoopbackLink {
    /// Complete operations as their air time elapses.  Returns when the
    /// [`LoopbackRadio`] half is dropped.
    pub async fn run(mut self, scheduler: Scheduler, clock: Arc<dyn Clock>) {
        while let Some(op) = self.ops.recv().await {
            let (handle, end_time, echo) = match op {
                LoopbackOp::Tx {
                    handle,
                    end_time,
                    payload,
                } => (handle, end_time, Some(payload)),
                LoopbackOp::Rx { handle, end_time } | LoopbackOp::Rssi { handle, end_time } => {
                    (handle, end_time, None)
                }
            };

            let wait = self
                .time_base
                .ticks_to_duration(end_time.saturating_sub(clock.now()));
            let scheduler = scheduler.clone();
            let clock = Arc::clone(&clock);

            tokio::spawn(async move {
                tokio::time::sleep(wait).await;
                let now = clock.now();

                if let Some(data) = echo {
                    let rx = ReceivedData {
                        time: now,
                        data,
                        rssi_dbm: -60,
                        power_dbm: -20,
                    };
                    if let Err(e) = scheduler.data_received(rx) {
                        warn!(handle, "loopback echo dropped: {e}");
                    }
                }

                debug!(handle, time = now, "loopback operation complete");
                let done = OpCompletion {
                    handle,
                    status: OpStatus::Radio(0),
                    time: now,
                    temperature: Some(25),
                };
                if let Err(e) = scheduler.op_completed(done) {
                    warn!(handle, "loopback completion dropped: {e}");
                }
            });
        }
        debug!("loopback radio detached");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
