//! Radio operation scheduler.
//!
//! [`Scheduler`] is the cloneable front door used by the upper layers and by
//! the radio glue; [`Dispatcher`] is the single worker that owns the radio.
//! They talk over a bounded channel (the Event Intake) and share only the
//! Pending Queue.
//!
//! # Design decisions
//!
//! | Topic | Choice |
//! |---|---|
//! | Scheduler state | Explicit value built by [`Scheduler::new`]; no global instance |
//! | Queue container | `Vec` kept in dispatch order, position decided at insertion |
//! | Worker | tokio task with a bounded `mpsc` inbox and one restartable timer |
//! | Callbacks | `Option<Arc<dyn Fn ..>>` slots, shared between record copies |
//! | Outcomes | Synchronous API errors are [`SchedulerError`]; per-operation results go through callbacks as [`OpStatus`](crate::record::OpStatus) |
//!
//! # Example
//! ```rust,ignore
//! let clock: Arc<dyn Clock> = Arc::new(RadioClock::new(69_120));
//! let (scheduler, worker) = Scheduler::new(&config, radio, Arc::clone(&clock));
//! tokio::spawn(worker.run());
//!
//! let mut beacon = scheduler.allocate_transmit(32)?;
//! beacon.frame_time = clock.now() + scheduler.time_base().ms_to_ticks(100);
//! scheduler.insert(beacon)?;
//! ```

pub mod dispatch;
pub mod error;
pub mod event;
pub mod inflight;
pub mod queue;

pub use dispatch::Dispatcher;
pub use error::{RejectReason, SchedulerError};
pub use event::{Notification, SchedulerState, SchedulerStatus};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::{DispatchConfig, SchedulerConfig};
use crate::radio::RadioControl;
use crate::record::{
    OpCompletion, OpKind, OpParams, OperationRecord, PhyHeader, Priority, ReceivedData, RssiParams,
    RxConfig, RxParams, TxConfig, TxParams,
};
use crate::time::{Clock, TimeBase};

use event::Event;
use queue::PendingQueue;

/// Lock the shared queue.  A panic inside a callback must not take the
/// scheduler down with it, so poisoning is ignored.
pub(crate) fn lock_queue(queue: &Mutex<PendingQueue>) -> MutexGuard<'_, PendingQueue> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Scheduler ─────────────────────────────────────────────────────────────────

/// Handle to a running scheduler.  Cheap to clone; every clone feeds the same
/// worker.
#[derive(Debug, Clone)]
pub struct Scheduler {
    queue: Arc<Mutex<PendingQueue>>,
    inbox: mpsc::Sender<Event>,
    time_base: TimeBase,
    config: DispatchConfig,
    suspended: Arc<AtomicBool>,
}

impl Scheduler {
    /// Build a scheduler and its (not yet running) worker.
    pub fn new<R>(
        config: &SchedulerConfig,
        radio: R,
        clock: Arc<dyn Clock>,
    ) -> (Scheduler, Dispatcher)
    where
        R: RadioControl + 'static,
    {
        let time_base = TimeBase::from_config(&config.time_base);
        let margin_ticks = time_base.us_to_ticks(config.dispatch.scheduling_margin_us);
        let queue = Arc::new(Mutex::new(PendingQueue::new(time_base, margin_ticks)));
        let suspended = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel(config.dispatch.inbox_capacity.max(1));

        let dispatcher = Dispatcher::new(
            Arc::clone(&queue),
            Box::new(radio),
            clock,
            time_base,
            config.dispatch.clone(),
            Arc::clone(&suspended),
            rx,
        );
        let scheduler = Scheduler {
            queue,
            inbox: tx,
            time_base,
            config: config.dispatch.clone(),
            suspended,
        };
        (scheduler, dispatcher)
    }

    /// Build a scheduler and run its worker on the current tokio runtime.
    pub fn spawn<R>(
        config: &SchedulerConfig,
        radio: R,
        clock: Arc<dyn Clock>,
    ) -> (Scheduler, JoinHandle<()>)
    where
        R: RadioControl + 'static,
    {
        let (scheduler, dispatcher) = Self::new(config, radio, clock);
        (scheduler, tokio::spawn(dispatcher.run()))
    }

    pub fn time_base(&self) -> TimeBase {
        self.time_base
    }

    fn queue(&self) -> MutexGuard<'_, PendingQueue> {
        lock_queue(&self.queue)
    }

    fn send(&self, event: Event) -> Result<(), SchedulerError> {
        self.inbox.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SchedulerError::InboxFull,
            mpsc::error::TrySendError::Closed(_) => SchedulerError::Stopped,
        })
    }

    // ── Allocation ────────────────────────────────────────────────────────────

    /// New Transmit record with a zeroed payload of `payload_len` bytes.
    ///
    /// # Errors
    /// [`SchedulerError::AllocationFailed`] if the length exceeds the
    /// configured maximum or the buffer cannot be reserved.
    pub fn allocate_transmit(&self, payload_len: usize) -> Result<OperationRecord, SchedulerError> {
        let failed = SchedulerError::AllocationFailed {
            kind: OpKind::Transmit,
            requested: payload_len,
        };
        if payload_len > self.config.max_payload_len {
            return Err(failed);
        }
        let mut payload = Vec::new();
        if payload.try_reserve_exact(payload_len).is_err() {
            return Err(failed);
        }
        payload.resize(payload_len, 0);

        Ok(OperationRecord::new(
            Priority::HighTx,
            OpParams::Tx(TxParams {
                payload,
                ..Default::default()
            }),
        ))
    }

    pub fn allocate_receive(&self) -> OperationRecord {
        OperationRecord::new(Priority::LowestRx, OpParams::Rx(RxParams::default()))
    }

    pub fn allocate_rssi(&self) -> OperationRecord {
        OperationRecord::new(Priority::HighRssi, OpParams::Rssi(RssiParams::default()))
    }

    // ── Queue operations ──────────────────────────────────────────────────────

    /// Queue `rec` for dispatch.
    ///
    /// The first record in an empty queue wakes the worker at once; later
    /// insertions arm a short timer so that a burst is scanned together.
    ///
    /// # Errors
    /// [`SchedulerError::InboxFull`] or [`SchedulerError::Stopped`] if the
    /// worker cannot be woken for a record that went into an empty queue.
    /// The record is not queued in that case.
    pub fn insert(&self, mut rec: OperationRecord) -> Result<(), SchedulerError> {
        let handle = rec.handle;
        if rec.interval.is_some_and(|i| i.period_ticks == 0) {
            rec.interval = None;
        }
        if let Some(tx) = rec.tx() {
            if tx.payload.len() > self.config.max_payload_len {
                return Err(SchedulerError::PayloadTooLarge {
                    handle,
                    size: tx.payload.len(),
                    max: self.config.max_payload_len,
                });
            }
        }

        // Held across the wake-up so a failed one can be undone in place
        let mut queue = self.queue();
        let inserted = queue
            .insert(rec)
            .map_err(|reason| SchedulerError::InsertRejected { handle, reason })?;

        if inserted.was_empty {
            // Nothing else would ever scan this record
            if let Err(e) = self.send(Event::NextFrameTick) {
                queue.remove_at(inserted.position);
                warn!(handle, "cannot wake worker, insert undone: {e}");
                return Err(e);
            }
            return Ok(());
        }
        drop(queue);

        match self.send(Event::WakeAfter(self.config.insert_batch_delay())) {
            Ok(()) => Ok(()),
            // The queue was not empty, so a scan is already pending or armed
            Err(SchedulerError::InboxFull) => {
                debug!(handle, "inbox full, batch wake-up skipped");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Remove a pending record.  Records already handed to the radio are not
    /// affected.  Returns whether a record was removed.
    pub fn remove_by_handle(&self, handle: u32) -> bool {
        let removed = self.queue().remove_by_handle(handle).is_some();
        debug!(handle, removed, "remove by handle");
        removed
    }

    /// Remove every pending record with a handle in `start..=end`.
    pub fn remove_by_handle_range(&self, start: u32, end: u32) -> usize {
        let removed = self.queue().remove_by_handle_range(start, end);
        debug!(start, end, removed, "remove by handle range");
        removed
    }

    /// Like [`remove_by_handle`](Self::remove_by_handle), but ordered after
    /// every event already posted to the worker.
    pub fn remove_by_handle_deferred(&self, handle: u32) -> Result<(), SchedulerError> {
        self.send(Event::RemoveByHandle(handle))
    }

    pub fn update_payload(&self, handle: u32, bytes: &[u8]) -> Result<(), SchedulerError> {
        self.queue()
            .update_payload(handle, bytes, self.config.max_payload_len)
    }

    pub fn update_tx_header(&self, handle: u32, header: PhyHeader) -> Result<(), SchedulerError> {
        self.queue().update_tx_header(handle, header)
    }

    /// Move a pending record by a signed number of ticks.
    pub fn shift_frame_time(&self, handle: u32, diff_ticks: i64) -> Result<(), SchedulerError> {
        self.queue().shift_frame_time(handle, diff_ticks)
    }

    /// Change channel, timing, repetition, header or listen-before-talk of
    /// a pending Transmit record.  The record keeps its old settings if the
    /// new ones conflict.
    pub fn update_tx_config<F>(&self, handle: u32, update: F) -> Result<(), SchedulerError>
    where
        F: FnOnce(&mut TxConfig),
    {
        self.queue().update_tx_config(handle, update)
    }

    /// Apply `update` to every pending Receive record in `start..=end`.
    /// Either every matching record is updated or none is.
    pub fn update_rx_config_by_handle_range<F>(
        &self,
        start: u32,
        end: u32,
        update: F,
    ) -> Result<usize, SchedulerError>
    where
        F: FnMut(&mut RxConfig),
    {
        self.queue().update_rx_by_handle_range(start, end, update)
    }

    pub fn is_pending(&self, handle: u32) -> bool {
        self.queue().contains(handle)
    }

    pub fn is_pending_empty(&self) -> bool {
        self.queue().is_empty()
    }

    /// Frame time of the last queued record, or 0 when suspended or empty.
    pub fn last_scheduled_frame_time(&self) -> u64 {
        if self.suspended.load(Ordering::Acquire) {
            return 0;
        }
        self.queue().last_frame_time().unwrap_or(0)
    }

    // ── Control ───────────────────────────────────────────────────────────────

    pub fn suspend(&self) -> Result<(), SchedulerError> {
        self.send(Event::Suspend)
    }

    pub fn resume(&self) -> Result<(), SchedulerError> {
        self.send(Event::Resume)
    }

    /// Drop every pending and in-flight record.
    pub fn purge_all(&self) -> Result<(), SchedulerError> {
        self.send(Event::Purge)
    }

    /// Ask the worker to scan the Pending Queue now.
    pub fn next_frame(&self) -> Result<(), SchedulerError> {
        self.send(Event::NextFrameTick)
    }

    // ── Radio glue ────────────────────────────────────────────────────────────

    pub fn op_completed(&self, done: OpCompletion) -> Result<(), SchedulerError> {
        self.send(Event::OperationCompleted(done))
    }

    pub fn data_received(&self, data: ReceivedData) -> Result<(), SchedulerError> {
        self.send(Event::DataReceived(data))
    }

    /// Worker state, answered after every event posted before this call.
    pub async fn status(&self) -> Result<SchedulerStatus, SchedulerError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::Status(tx))?;
        rx.await.map_err(|_| SchedulerError::Stopped)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
