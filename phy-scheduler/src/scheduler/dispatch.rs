/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Dispatch worker: the single task that submits queued records to the radio
//! and correlates their completions.
//!
//! The worker owns the In-Flight Table and the radio.  It shares only the
//! Pending Queue (behind a mutex) with the [`Scheduler`](super::Scheduler)
//! handles.  The lock is never held while a callback runs, so callbacks are
//! free to call back into the scheduler.
//!
//! ```text
//!            ┌──────────── inbox (bounded mpsc) ────────────┐
//! Scheduler ─┤ NextFrameTick / WakeAfter / Completed / ...  ├─► Dispatcher
//!            └──────────────────────────────────────────────┘       │
//!                                        tick timer (sleep_until) ──┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::event::{Event, Notification, SchedulerState, SchedulerStatus};
use super::inflight::InFlightTable;
use super::lock_queue;
use super::queue::PendingQueue;
use crate::config::DispatchConfig;
use crate::radio::{RadioControl, RadioError, RssiRequest, RxRequest, TxRequest};
use crate::record::{HarqTxPayload, OpCompletion, OpParams, OpStatus, OperationRecord, ReceivedData};
use crate::time::{Clock, TimeBase};

/// What the tick timer should do after an event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerCmd {
    /// Leave the current deadline untouched.
    Keep,
    /// Replace the deadline.
    Arm(Duration),
    /// Nothing left to wait for.
    Stop,
}

/// Head-of-queue decision taken under the queue lock.
enum Step {
    Late(OperationRecord),
    Ready(OperationRecord),
}

pub struct Dispatcher {
    queue: Arc<Mutex<PendingQueue>>,
    in_flight: InFlightTable,
    radio: Box<dyn RadioControl>,
    clock: Arc<dyn Clock>,
    time_base: TimeBase,
    config: DispatchConfig,
    state: SchedulerState,
    suspended: Arc<AtomicBool>,
    notifications: Option<mpsc::UnboundedSender<Notification>>,
    inbox: mpsc::Receiver<Event>,
}

impl Dispatcher {
    pub(super) fn new(
        queue: Arc<Mutex<PendingQueue>>,
        radio: Box<dyn RadioControl>,
        clock: Arc<dyn Clock>,
        time_base: TimeBase,
        config: DispatchConfig,
        suspended: Arc<AtomicBool>,
        inbox: mpsc::Receiver<Event>,
    ) -> Self {
        Self {
            queue,
            in_flight: InFlightTable::new(),
            radio,
            clock,
            time_base,
            config,
            state: SchedulerState::Normal,
            suspended,
            notifications: None,
            inbox,
        }
    }

    /// Deliver [`Notification`]s to `tx`.
    pub fn with_notifications(mut self, tx: mpsc::UnboundedSender<Notification>) -> Self {
        self.notifications = Some(tx);
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn snapshot(&self) -> SchedulerStatus {
        SchedulerStatus {
            state: self.state,
            pending: lock_queue(&self.queue).len(),
            in_flight: self.in_flight.len(),
        }
    }

    // ── Driving ───────────────────────────────────────────────────────────────

    /// Run until every [`Scheduler`](super::Scheduler) handle is dropped.
    pub async fn run(mut self) {
        info!("dispatch worker started");
        let mut deadline: Option<Instant> = None;

        loop {
            let event = match deadline {
                Some(at) => tokio::select! {
                    ev = self.inbox.recv() => ev,
                    _ = tokio::time::sleep_until(at) => {
                        deadline = None;
                        Some(Event::NextFrameTick)
                    }
                },
                None => self.inbox.recv().await,
            };
            let Some(event) = event else {
                break;
            };

            match self.handle_event(event) {
                TimerCmd::Keep => {}
                TimerCmd::Arm(delay) => deadline = Some(Instant::now() + delay),
                TimerCmd::Stop => deadline = None,
            }
        }
        info!("dispatch worker stopped");
    }

    /// Handle every event already sitting in the inbox, without timers.
    ///
    /// Returns the number of events processed.
    pub fn process_pending(&mut self) -> usize {
        let mut n = 0;
        while let Ok(event) = self.inbox.try_recv() {
            self.handle_event(event);
            n += 1;
        }
        n
    }

    fn handle_event(&mut self, event: Event) -> TimerCmd {
        match event {
            Event::NextFrameTick => self.tick(),
            Event::WakeAfter(delay) => TimerCmd::Arm(delay),
            Event::OperationCompleted(done) => {
                self.on_completed(done);
                TimerCmd::Keep
            }
            Event::DataReceived(data) => {
                self.on_data(&data);
                TimerCmd::Keep
            }
            Event::Purge => {
                let pending = lock_queue(&self.queue).purge();
                let in_flight = self.in_flight.clear();
                info!(pending, in_flight, "scheduler purged");
                TimerCmd::Stop
            }
            Event::RemoveByHandle(handle) => {
                if lock_queue(&self.queue).remove_by_handle(handle).is_some() {
                    debug!(handle, "pending record removed");
                } else {
                    debug!(handle, "no pending record to remove");
                }
                TimerCmd::Keep
            }
            Event::Suspend => {
                self.set_state(SchedulerState::Suspended);
                TimerCmd::Keep
            }
            Event::Resume => {
                self.set_state(SchedulerState::Normal);
                TimerCmd::Keep
            }
            Event::Status(reply) => {
                let _ = reply.send(self.snapshot());
                TimerCmd::Keep
            }
        }
    }

    fn set_state(&mut self, state: SchedulerState) {
        self.state = state;
        let suspended = state == SchedulerState::Suspended;
        self.suspended.store(suspended, Ordering::Release);
        if suspended {
            info!("scheduler suspended");
            self.notify(Notification::SchedulerSuspended);
        } else {
            info!("scheduler resumed");
            self.notify(Notification::SchedulerResumed);
        }
    }

    fn notify(&self, n: Notification) {
        if let Some(tx) = &self.notifications {
            if tx.send(n).is_err() {
                debug!("notification receiver dropped");
            }
        }
    }

    // ── Tick ──────────────────────────────────────────────────────────────────

    /// Scan the queue head and submit everything that is due.
    fn tick(&mut self) -> TimerCmd {
        let mut submitted = 0u32;

        loop {
            let now = self.clock.now();
            let step = {
                let mut queue = lock_queue(&self.queue);
                let Some(head) = queue.front() else {
                    return TimerCmd::Stop;
                };

                if head.frame_time < now {
                    queue.pop_front().map(Step::Late)
                } else {
                    if submitted >= self.config.max_ops_per_tick {
                        return TimerCmd::Arm(self.config.budget_retry_delay());
                    }
                    let time_to_frame = head.frame_time - now;
                    if self.time_base.ticks_to_ms(time_to_frame) > self.config.look_ahead_window_ms {
                        return TimerCmd::Arm(self.config.look_ahead_recheck_delay());
                    }
                    queue.pop_front().map(Step::Ready)
                }
            };

            match step {
                Some(Step::Late(rec)) => {
                    let status = if self.state == SchedulerState::Suspended {
                        OpStatus::SchedulerSuspended
                    } else {
                        warn!(
                            handle = rec.handle,
                            frame_time = rec.frame_time,
                            now,
                            "frame time passed before submission"
                        );
                        OpStatus::SubmissionDelayed
                    };
                    self.fire_submit(&rec, status);
                    self.conclude_unsubmitted(rec, status, now);
                }
                Some(Step::Ready(rec)) => {
                    if self.submit(rec, now) {
                        submitted += 1;
                    } else {
                        // Back off until the retry timer
                        submitted = self.config.max_ops_per_tick;
                    }
                }
                None => return TimerCmd::Stop,
            }
        }
    }

    /// Hand `rec` to the radio.  Returns `false` if it was not submitted.
    fn submit(&mut self, mut rec: OperationRecord, now: u64) -> bool {
        let start_time = rec.start_time(&self.time_base);
        let duration = rec.duration(&self.time_base);

        let result = if self.state == SchedulerState::Suspended {
            None
        } else {
            Some(self.submit_to_radio(&rec, start_time, duration))
        };

        let status = match &result {
            Some(Ok(())) => OpStatus::Success,
            Some(Err(e)) => OpStatus::from(e),
            None => OpStatus::SchedulerSuspended,
        };
        self.fire_submit(&rec, status);

        match result {
            Some(Ok(())) => {
                debug!(
                    handle = rec.handle,
                    kind = %rec.kind(),
                    start_time,
                    duration,
                    "operation submitted"
                );
                if rec.consume_repetition() {
                    fire_count_completed(&rec);
                }
                let next = rec.interval.map(|interval| {
                    let mut next = rec.clone();
                    next.frame_time = next.frame_time.saturating_add(interval.period_ticks);
                    next.advance_handle();
                    next
                });
                if rec.needs_tracking() {
                    let keep_payload = rec.wants_harq_store();
                    self.in_flight.add(rec.in_flight_copy(keep_payload));
                }
                if let Some(next) = next {
                    self.requeue(next);
                }
                true
            }
            Some(Err(e)) => {
                error!(handle = rec.handle, kind = %rec.kind(), "radio refused operation: {e}");
                self.conclude_unsubmitted(rec, status, now);
                false
            }
            None => {
                debug!(handle = rec.handle, "suspended, operation not submitted");
                self.conclude_unsubmitted(rec, status, now);
                false
            }
        }
    }

    fn submit_to_radio(
        &mut self,
        rec: &OperationRecord,
        start_time: u64,
        duration: u64,
    ) -> Result<(), RadioError> {
        match &rec.params {
            OpParams::Tx(tx) => self.radio.submit_transmit(TxRequest {
                handle: rec.handle,
                start_time,
                duration,
                channel: rec.channel,
                network_id: rec.network_id,
                header: tx.header,
                payload: &tx.payload,
                lbt: tx.lbt,
            }),
            OpParams::Rx(rx) => self.radio.submit_receive(RxRequest {
                handle: rec.handle,
                start_time,
                duration,
                channel: rec.channel,
                network_id: rec.network_id,
                filter: rx.filter,
                mode: rx.mode,
                expected_rssi_level_dbm: rx.expected_rssi_level_dbm,
            }),
            OpParams::Rssi(rssi) => self.radio.submit_energy_scan(RssiRequest {
                handle: rec.handle,
                start_time,
                duration,
                channel: rec.channel,
                reporting_interval_slots: rssi.reporting_interval_slots,
            }),
        }
    }

    fn fire_submit(&self, rec: &OperationRecord, status: OpStatus) {
        if let Some(cb) = &rec.callbacks.on_submit {
            let report = OpCompletion {
                handle: rec.handle,
                status,
                time: rec.start_time(&self.time_base),
                temperature: None,
            };
            cb(&report, rec.frame_time);
        }
    }

    /// Retire a record that never reached the radio and, if it repeats, queue
    /// its next instance at the first interval boundary not in the past.
    fn conclude_unsubmitted(&mut self, mut rec: OperationRecord, status: OpStatus, now: u64) {
        let report = OpCompletion {
            handle: rec.handle,
            status,
            time: now,
            temperature: None,
        };
        if let Some(cb) = &rec.callbacks.on_completion {
            cb(&report, rec.frame_time);
        }
        self.notify(Notification::OperationSubmitFailed {
            handle: rec.handle,
            status,
            time: now,
        });

        if rec.consume_repetition() {
            fire_count_completed(&rec);
        }
        match rec.interval {
            Some(interval) => {
                let period = interval.period_ticks.max(1);
                let behind = now.saturating_sub(rec.frame_time);
                let periods = behind.div_ceil(period).max(1);
                rec.frame_time = rec.frame_time.saturating_add(periods.saturating_mul(period));
                rec.advance_handle();
                self.requeue(rec);
            }
            None => {
                if let Some(cb) = &rec.callbacks.on_completion_final {
                    cb(rec.handle);
                }
            }
        }
    }

    /// Put the next instance of a repeating record back into the queue.
    fn requeue(&mut self, rec: OperationRecord) {
        let handle = rec.handle;
        let frame_time = rec.frame_time;
        let on_count = rec.callbacks.on_interval_count_completed.clone();
        let on_final = rec.callbacks.on_completion_final.clone();

        let result = lock_queue(&self.queue).insert(rec);
        if let Err(reason) = result {
            error!(handle, frame_time, "cannot reschedule repeating operation: {reason}");
            self.notify(Notification::OperationSubmitFailed {
                handle,
                status: OpStatus::RescheduleFailed,
                time: self.clock.now(),
            });
            if let Some(cb) = on_count {
                cb(handle);
            }
            if let Some(cb) = on_final {
                cb(handle);
            }
        }
    }

    // ── Completion correlation ────────────────────────────────────────────────

    fn on_completed(&mut self, done: OpCompletion) {
        let Some(rec) = self.in_flight.take(done.handle) else {
            debug!(handle = done.handle, "completion for untracked operation");
            return;
        };
        if done.status.is_success() {
            debug!(handle = done.handle, "operation completed");
        } else {
            warn!(handle = done.handle, status = ?done.status, "operation completed with error");
        }

        if rec.wants_harq_store() {
            if let (Some(cb), Some(tx)) = (&rec.callbacks.on_harq_store, rec.tx()) {
                cb(HarqTxPayload {
                    harq_user: tx.harq_user,
                    record: rec.clone(),
                });
            }
        }
        if let Some(cb) = &rec.callbacks.on_completion {
            cb(&done, rec.frame_time);
        }
        if rec.is_final_instance() {
            if let Some(cb) = &rec.callbacks.on_completion_final {
                cb(rec.handle);
            }
        }
    }

    fn on_data(&self, data: &ReceivedData) {
        let mut delivered = 0usize;
        for rec in self.in_flight.iter() {
            if let Some(cb) = &rec.callbacks.on_data_received {
                cb(data);
                delivered += 1;
            }
        }
        if delivered == 0 {
            debug!(len = data.data.len(), "received data with no open receive window");
        }
    }
}

fn fire_count_completed(rec: &OperationRecord) {
    if let Some(cb) = &rec.callbacks.on_interval_count_completed {
        cb(rec.handle);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::radio::mock::RecordingRadio;
    use crate::record::{
        FinalCallback, Interval, Priority, RxParams, StartOffset, StatusCallback, TxParams,
    };
    use crate::scheduler::Scheduler;
    use crate::time::ManualClock;

    const NOW: u64 = 1_000 * 691_200;

    fn setup() -> (Scheduler, Dispatcher, RecordingRadio, ManualClock) {
        let clock = ManualClock::new(NOW);
        let radio = RecordingRadio::default();
        let (scheduler, dispatcher) =
            Scheduler::new(&SchedulerConfig::default(), radio.clone(), Arc::new(clock.clone()));
        (scheduler, dispatcher, radio, clock)
    }

    fn tx_at(handle: u32, frame_time: u64) -> OperationRecord {
        let mut r = OperationRecord::new(
            Priority::HighTx,
            OpParams::Tx(TxParams {
                payload: vec![1, 2, 3],
                ..Default::default()
            }),
        );
        r.handle = handle;
        r.frame_time = frame_time;
        r
    }

    type Log<T> = Arc<Mutex<Vec<T>>>;

    fn status_log() -> (Log<OpStatus>, StatusCallback) {
        let log: Log<OpStatus> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let cb: StatusCallback = Arc::new(move |c: &OpCompletion, _: u64| {
            sink.lock().unwrap().push(c.status);
        });
        (log, cb)
    }

    fn handle_log() -> (Log<u32>, FinalCallback) {
        let log: Log<u32> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let cb: FinalCallback = Arc::new(move |h: u32| sink.lock().unwrap().push(h));
        (log, cb)
    }

    #[test]
    fn tick_on_empty_queue_stops_timer() {
        let (_s, mut d, radio, _clock) = setup();
        assert_eq!(d.tick(), TimerCmd::Stop);
        assert!(radio.submissions().is_empty());
    }

    #[test]
    fn head_beyond_look_ahead_window_rearms() {
        let (s, mut d, radio, _clock) = setup();
        let tb = s.time_base();
        s.insert(tx_at(1, NOW + tb.ms_to_ticks(1_500))).unwrap();

        assert_eq!(d.tick(), TimerCmd::Arm(Duration::from_millis(200)));
        assert!(radio.submissions().is_empty());
        assert!(s.is_pending(1));
    }

    #[test]
    fn submission_budget_limits_one_tick() {
        let (s, mut d, radio, _clock) = setup();
        let frame = s.time_base().frame_ticks();
        for h in 0..8 {
            s.insert(tx_at(h, NOW + (h as u64 + 1) * frame)).unwrap();
        }

        assert_eq!(d.tick(), TimerCmd::Arm(Duration::from_millis(10)));
        assert_eq!(radio.submissions().len(), 6);
        assert_eq!(d.snapshot().pending, 2);

        assert_eq!(d.tick(), TimerCmd::Stop);
        assert_eq!(radio.submissions().len(), 8);
    }

    #[test]
    fn submission_uses_resolved_start_time() {
        let (s, mut d, radio, _clock) = setup();
        let tb = s.time_base();
        let mut rec = tx_at(4, NOW + tb.frame_ticks());
        rec.start = StartOffset::Subslot(3);
        s.insert(rec).unwrap();
        d.tick();

        let sub = &radio.submissions()[0];
        assert_eq!(sub.start_time, NOW + tb.frame_ticks() + 3 * tb.subslot_ticks());
        assert_eq!(sub.duration, tb.slot_ticks());
        assert_eq!(sub.payload, vec![1, 2, 3]);
    }

    #[test]
    fn radio_failure_reports_status_and_backs_off() {
        let (s, mut d, radio, _clock) = setup();
        radio.fail_all(RadioError::new(-5, "busy"));
        let frame = s.time_base().frame_ticks();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut rec = tx_at(1, NOW + frame);
        rec.callbacks.on_completion = Some(Arc::new(move |c: &OpCompletion, _: u64| {
            sink.lock().unwrap().push(c.status);
        }));
        s.insert(rec).unwrap();
        s.insert(tx_at(2, NOW + 4 * frame)).unwrap();

        // Second record waits for the retry timer
        assert_eq!(d.tick(), TimerCmd::Arm(Duration::from_millis(10)));
        assert_eq!(*seen.lock().unwrap(), vec![OpStatus::SubmissionFailed(-5)]);
        assert!(s.is_pending(2));
        assert!(!s.is_pending(1));
    }

    #[test]
    fn late_repeating_record_skips_to_next_future_boundary() {
        let (s, mut d, radio, clock) = setup();
        let tb = s.time_base();
        let period = tb.ms_to_ticks(2_000);
        let mut rec = tx_at(1, NOW + tb.frame_ticks());
        rec.interval = Some(Interval::unbounded(period));
        s.insert(rec).unwrap();

        // Just over two periods late; the next boundary is outside the window
        clock.set(NOW + tb.frame_ticks() + 2 * period + period / 4);
        d.tick();

        assert!(radio.submissions().is_empty());
        let next = lock_queue(&d.queue).front().unwrap().frame_time;
        assert_eq!(next, NOW + tb.frame_ticks() + 3 * period);
    }

    #[test]
    fn data_is_broadcast_to_every_open_receive_window() {
        let (s, mut d, _radio, _clock) = setup();
        let frame = s.time_base().frame_ticks();
        let hits = Arc::new(Mutex::new(Vec::new()));

        for (h, slot) in [(1u32, 0u32), (2, 8)] {
            let mut rec = OperationRecord::new(Priority::LowestRx, OpParams::Rx(RxParams::default()));
            rec.handle = h;
            rec.frame_time = NOW + frame;
            rec.start = StartOffset::Slot(slot);
            let sink = Arc::clone(&hits);
            rec.callbacks.on_data_received = Some(Arc::new(move |data: &ReceivedData| {
                sink.lock().unwrap().push((h, data.data.clone()));
            }));
            s.insert(rec).unwrap();
        }
        d.tick();
        assert_eq!(d.snapshot().in_flight, 2);

        s.data_received(ReceivedData {
            time: NOW,
            data: vec![0xAB],
            rssi_dbm: -70,
            power_dbm: -30,
        })
        .unwrap();
        d.process_pending();

        let mut got = hits.lock().unwrap().clone();
        got.sort();
        assert_eq!(got, vec![(1, vec![0xAB]), (2, vec![0xAB])]);
    }

    #[test]
    fn harq_store_receives_payload_before_completion() {
        let (s, mut d, _radio, _clock) = setup();
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut rec = tx_at(9, NOW + s.time_base().frame_ticks());
        rec.tx_mut().unwrap().harq_user = 77;
        let o = Arc::clone(&order);
        rec.callbacks.on_harq_store = Some(Arc::new(move |p: HarqTxPayload| {
            let payload = p.record.tx().unwrap().payload.clone();
            o.lock().unwrap().push(format!("harq {} {:?}", p.harq_user, payload));
        }));
        let o = Arc::clone(&order);
        rec.callbacks.on_completion = Some(Arc::new(move |c: &OpCompletion, _: u64| {
            o.lock().unwrap().push(format!("done {}", c.handle));
        }));
        s.insert(rec).unwrap();
        d.tick();

        s.op_completed(OpCompletion {
            handle: 9,
            status: OpStatus::Radio(0),
            time: NOW,
            temperature: None,
        })
        .unwrap();
        d.process_pending();

        assert_eq!(
            *order.lock().unwrap(),
            vec!["harq 77 [1, 2, 3]".to_string(), "done 9".to_string()]
        );
    }

    #[test]
    fn untracked_submission_leaves_in_flight_table_empty() {
        let (s, mut d, radio, _clock) = setup();
        s.insert(tx_at(1, NOW + s.time_base().frame_ticks())).unwrap();
        d.tick();
        assert_eq!(radio.submissions().len(), 1);
        assert_eq!(d.snapshot().in_flight, 0);
    }

    #[test]
    fn late_one_shot_reports_delay_to_submit_and_completion() {
        let (s, mut d, radio, clock) = setup();
        let frame = s.time_base().frame_ticks();
        let (submits, on_submit) = status_log();
        let (completions, on_completion) = status_log();
        let (finals, on_final) = handle_log();

        let mut rec = tx_at(3, NOW + frame);
        rec.callbacks.on_submit = Some(on_submit);
        rec.callbacks.on_completion = Some(on_completion);
        rec.callbacks.on_completion_final = Some(on_final);
        s.insert(rec).unwrap();

        clock.set(NOW + 2 * frame);
        assert_eq!(d.tick(), TimerCmd::Stop);

        assert!(radio.submissions().is_empty());
        assert_eq!(*submits.lock().unwrap(), vec![OpStatus::SubmissionDelayed]);
        assert_eq!(*completions.lock().unwrap(), vec![OpStatus::SubmissionDelayed]);
        assert_eq!(*finals.lock().unwrap(), vec![3]);
        assert!(s.is_pending_empty());
        assert_eq!(d.snapshot().in_flight, 0);
    }

    #[test]
    fn blocked_next_instance_reports_reschedule_failure_once() {
        let (s, d, radio, _clock) = setup();
        let (tx, mut notes) = mpsc::unbounded_channel();
        let mut d = d.with_notifications(tx);
        let tb = s.time_base();
        let period = tb.ms_to_ticks(2_000);
        let f0 = NOW + tb.frame_ticks();
        let (completions, on_completion) = status_log();
        let (finals, on_final) = handle_log();
        let (counts, on_count) = handle_log();

        let mut beacon = tx_at(10, f0);
        beacon.interval = Some(Interval::unbounded(period));
        beacon.callbacks.on_completion = Some(on_completion);
        beacon.callbacks.on_completion_final = Some(on_final);
        beacon.callbacks.on_interval_count_completed = Some(on_count);
        s.insert(beacon).unwrap();

        // Occupies the slot of the beacon's next instance
        let mut blocker = tx_at(20, f0 + period);
        blocker.priority = Priority::ForceTx;
        s.insert(blocker).unwrap();

        d.tick();
        assert_eq!(radio.submissions().len(), 1);
        assert!(!s.is_pending(10));
        assert!(s.is_pending(20));
        assert!(matches!(
            notes.try_recv().unwrap(),
            Notification::OperationSubmitFailed {
                handle: 10,
                status: OpStatus::RescheduleFailed,
                ..
            }
        ));
        assert_eq!(*finals.lock().unwrap(), vec![10]);
        assert_eq!(*counts.lock().unwrap(), vec![10]);

        // The instance already on air completes without a second final
        s.op_completed(OpCompletion {
            handle: 10,
            status: OpStatus::Radio(0),
            time: f0,
            temperature: None,
        })
        .unwrap();
        d.process_pending();
        assert_eq!(*completions.lock().unwrap(), vec![OpStatus::Radio(0)]);
        assert_eq!(*finals.lock().unwrap(), vec![10]);
        assert!(notes.try_recv().is_err());
    }

    #[test]
    fn count_completed_fires_when_last_repetition_is_submitted() {
        let (s, mut d, radio, clock) = setup();
        let tb = s.time_base();
        let period = tb.ms_to_ticks(2_000);
        let (counts, on_count) = handle_log();

        let mut rec = tx_at(5, NOW + tb.frame_ticks());
        rec.interval = Some(Interval::times(period, 2));
        rec.callbacks.on_interval_count_completed = Some(on_count);
        s.insert(rec).unwrap();

        d.tick();
        assert!(counts.lock().unwrap().is_empty());

        clock.set(NOW + period);
        d.tick();
        assert_eq!(radio.submissions().len(), 2);
        assert_eq!(*counts.lock().unwrap(), vec![5]);
        assert!(s.is_pending_empty());
    }

    #[test]
    fn count_completed_fires_for_last_repetition_retired_late() {
        let (s, mut d, radio, clock) = setup();
        let tb = s.time_base();
        let (counts, on_count) = handle_log();

        let mut rec = tx_at(6, NOW + tb.frame_ticks());
        rec.interval = Some(Interval::times(tb.ms_to_ticks(2_000), 1));
        rec.callbacks.on_interval_count_completed = Some(on_count);
        s.insert(rec).unwrap();

        clock.set(NOW + 3 * tb.frame_ticks());
        d.tick();
        assert!(radio.submissions().is_empty());
        assert_eq!(*counts.lock().unwrap(), vec![6]);
        assert!(s.is_pending_empty());
    }
}
