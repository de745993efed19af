/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Operation records: one requested radio action each.
//!
//! ```text
//! caller ──(allocate_*)──► OperationRecord ──(insert)──► Pending Queue
//!                                                          │ tick
//!                                                          ▼
//!                              In-Flight Table ◄──(copy)── submit to radio
//! ```
//!
//! # Ownership model
//! A record is **owned** by exactly one container at a time.  The caller
//! moves it into the scheduler with `insert`; from then on the Pending Queue
//! owns it.  On submission the record leaves the queue; a trimmed copy may be
//! stored in the In-Flight Table and, for repeating operations, a fresh copy
//! for the next interval goes back into the queue.  Payload buffers are plain
//! `Vec<u8>`s, so every copy owns its bytes and nothing is aliased.

use std::fmt;
use std::sync::Arc;

use crate::radio::RadioError;
use crate::time::TimeBase;

// ── Priority ──────────────────────────────────────────────────────────────────

/// Scheduling priority.  Lower numeric value wins a conflict.
///
/// The derived `Ord` follows declaration order, so `ForceTx < HighTx` reads
/// as "ForceTx is the higher priority".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Transmit that may straddle a frame boundary (contention access).
    ForceTx = 0,
    ForceRx,
    HighTx,
    HighRx,
    HighRssi,
    NormalTx,
    NormalRx,
    LowestTx,
    LowestRx,
}

impl Priority {
    pub fn is_force(self) -> bool {
        matches!(self, Priority::ForceTx | Priority::ForceRx)
    }

    pub fn is_tx(self) -> bool {
        matches!(
            self,
            Priority::ForceTx | Priority::HighTx | Priority::NormalTx | Priority::LowestTx
        )
    }
}

// ── Frame position & length ───────────────────────────────────────────────────

/// Start of an operation relative to its frame.  `Slot(0)` is the frame start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOffset {
    Slot(u32),
    Subslot(u32),
}

impl Default for StartOffset {
    fn default() -> Self {
        StartOffset::Slot(0)
    }
}

/// Length of an operation in frame units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Length {
    Slots(u32),
    Subslots(u32),
}

impl Default for Length {
    fn default() -> Self {
        Length::Slots(1)
    }
}

// ── Repetition ────────────────────────────────────────────────────────────────

/// How many more instances a periodic operation produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    Unbounded,
    /// Remaining instances, including the one currently pending.
    Times(u32),
}

/// Repeat period plus counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub period_ticks: u64,
    pub repeat: Repeat,
}

impl Interval {
    pub fn unbounded(period_ticks: u64) -> Self {
        Self {
            period_ticks,
            repeat: Repeat::Unbounded,
        }
    }

    pub fn times(period_ticks: u64, count: u32) -> Self {
        Self {
            period_ticks,
            repeat: Repeat::Times(count),
        }
    }

    /// Map the classic signed counter onto an interval:
    /// `-1` (or any negative) = unbounded, `0` = one-shot (`None`),
    /// `N` = exactly `N` instances.  A zero period is always one-shot.
    pub fn from_count(period_ticks: u64, count: i32) -> Option<Self> {
        if period_ticks == 0 {
            return None;
        }
        match count {
            c if c < 0 => Some(Self::unbounded(period_ticks)),
            0 => None,
            c => Some(Self::times(period_ticks, c as u32)),
        }
    }
}

/// Inclusive handle range a repeating record cycles through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleRange {
    pub start: u32,
    pub end: u32,
}

impl HandleRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, handle: u32) -> bool {
        (self.start..=self.end).contains(&handle)
    }

    /// Handle following `handle`, wrapping to `start` past `end`.
    pub fn next(&self, handle: u32) -> u32 {
        match handle.checked_add(1) {
            Some(n) if n <= self.end && n >= self.start => n,
            _ => self.start,
        }
    }
}

// ── Kind-specific parameters ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Transmit,
    Receive,
    EnergyScan,
}

impl OpKind {
    /// Only receive windows may run past the end of their frame.
    pub fn may_span_frames(self) -> bool {
        matches!(self, OpKind::Receive)
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Transmit => write!(f, "tx"),
            OpKind::Receive => write!(f, "rx"),
            OpKind::EnergyScan => write!(f, "rssi"),
        }
    }
}

/// Physical layer control header sent ahead of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhyHeader {
    /// 40-bit header.
    Type1([u8; 5]),
    /// 80-bit header.
    Type2([u8; 10]),
}

impl Default for PhyHeader {
    fn default() -> Self {
        PhyHeader::Type1([0; 5])
    }
}

/// Listen-before-talk parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lbt {
    pub period_ticks: u64,
    pub rssi_threshold_max_dbm: i8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxParams {
    pub payload: Vec<u8>,
    pub header: PhyHeader,
    pub lbt: Option<Lbt>,
    /// Opaque tag handed back with the retransmission copy.
    pub harq_user: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RxFilter {
    pub short_network_id: Option<u8>,
    pub receiver_identity: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RxMode {
    #[default]
    SingleShot,
    Continuous,
    Semicontinuous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RxParams {
    pub filter: RxFilter,
    pub mode: RxMode,
    pub expected_rssi_level_dbm: i8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RssiParams {
    /// Reporting interval of the measurement, in slots.
    pub reporting_interval_slots: u32,
}

/// Per-kind parameters.  Exactly one variant is present and it determines
/// [`OpKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpParams {
    Tx(TxParams),
    Rx(RxParams),
    Rssi(RssiParams),
}

impl OpParams {
    pub fn kind(&self) -> OpKind {
        match self {
            OpParams::Tx(_) => OpKind::Transmit,
            OpParams::Rx(_) => OpKind::Receive,
            OpParams::Rssi(_) => OpKind::EnergyScan,
        }
    }
}

// ── Pending updates ───────────────────────────────────────────────────────────

/// Placement fields of a record that may change while it is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub channel: u16,
    pub start: StartOffset,
    pub length: Length,
    /// `None` (or a zero period) turns the record into a one-shot.
    pub interval: Option<Interval>,
}

/// Editable settings of a pending Transmit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxConfig {
    pub placement: Placement,
    pub header: PhyHeader,
    pub lbt: Option<Lbt>,
}

/// Editable settings of a pending Receive record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxConfig {
    pub placement: Placement,
    pub params: RxParams,
}

// ── Outcomes ──────────────────────────────────────────────────────────────────

/// Outcome reported to `on_submit` / `on_completion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpStatus {
    Success,
    /// The frame time had already passed when the dispatch loop reached it.
    SubmissionDelayed,
    /// The radio rejected the submission with this code.
    SubmissionFailed(i32),
    /// Not submitted because the scheduler is suspended.
    SchedulerSuspended,
    /// The next instance of a repeating record could not be re-queued.
    RescheduleFailed,
    /// Completion status reported by the radio (non-zero = radio-side error).
    Radio(i32),
}

impl OpStatus {
    pub fn is_success(self) -> bool {
        matches!(self, OpStatus::Success | OpStatus::Radio(0))
    }
}

impl From<&RadioError> for OpStatus {
    fn from(err: &RadioError) -> Self {
        OpStatus::SubmissionFailed(err.code)
    }
}

/// Parameters of a finished (or synthetically concluded) operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpCompletion {
    pub handle: u32,
    pub status: OpStatus,
    /// Radio time of the event.
    pub time: u64,
    /// Radio temperature in °C, when measured.
    pub temperature: Option<i16>,
}

/// Payload delivered by the radio for an open receive window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedData {
    pub time: u64,
    pub data: Vec<u8>,
    pub rssi_dbm: i16,
    pub power_dbm: i16,
}

/// Owned copy of a completed transmission, kept for a possible retransmission.
#[derive(Debug, Clone)]
pub struct HarqTxPayload {
    pub harq_user: u32,
    pub record: OperationRecord,
}

// ── Callbacks ─────────────────────────────────────────────────────────────────

pub type StatusCallback = Arc<dyn Fn(&OpCompletion, u64) + Send + Sync>;
pub type FinalCallback = Arc<dyn Fn(u32) + Send + Sync>;
pub type DataCallback = Arc<dyn Fn(&ReceivedData) + Send + Sync>;
pub type HarqStoreCallback = Arc<dyn Fn(HarqTxPayload) + Send + Sync>;

/// Caller-supplied notification slots.  Shared (not duplicated) between a
/// record and its copies.
#[derive(Clone, Default)]
pub struct Callbacks {
    /// Fired synchronously when the record is handed to the radio (or fails
    /// to be).  Second argument is the record's frame time.
    pub on_submit: Option<StatusCallback>,
    /// Fired when the radio reports the operation finished.
    pub on_completion: Option<StatusCallback>,
    /// Fired once no further instances of the record remain.
    pub on_completion_final: Option<FinalCallback>,
    /// Fired when the last counted repetition is handed out (submitted or
    /// retired), or when the next instance cannot be re-queued.
    pub on_interval_count_completed: Option<FinalCallback>,
    /// Receive only.
    pub on_data_received: Option<DataCallback>,
    /// Transmit only; receives an owned copy including the payload.
    pub on_harq_store: Option<HarqStoreCallback>,
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_submit", &self.on_submit.is_some())
            .field("on_completion", &self.on_completion.is_some())
            .field("on_completion_final", &self.on_completion_final.is_some())
            .field(
                "on_interval_count_completed",
                &self.on_interval_count_completed.is_some(),
            )
            .field("on_data_received", &self.on_data_received.is_some())
            .field("on_harq_store", &self.on_harq_store.is_some())
            .finish()
    }
}

// ── OperationRecord ───────────────────────────────────────────────────────────

/// One scheduled radio action.
#[derive(Debug, Clone)]
pub struct OperationRecord {
    // ── Identity ──────────────────────────────────────────────────────────────
    pub handle: u32,
    pub priority: Priority,
    /// Suppress conflict warnings for this record.
    pub silent: bool,

    // ── Timing ────────────────────────────────────────────────────────────────
    /// Absolute tick at which the containing frame begins.
    pub frame_time: u64,
    pub start: StartOffset,
    pub length: Length,
    /// Explicit duration in ticks; overrides `length` when set.
    pub duration_override: Option<u64>,
    pub interval: Option<Interval>,
    pub handle_range: Option<HandleRange>,

    // ── Radio parameters ──────────────────────────────────────────────────────
    pub channel: u16,
    pub network_id: u32,
    pub params: OpParams,

    pub callbacks: Callbacks,
}

impl OperationRecord {
    /// A one-shot record with default timing around `params`.
    pub fn new(priority: Priority, params: OpParams) -> Self {
        Self {
            handle: 0,
            priority,
            silent: false,
            frame_time: 0,
            start: StartOffset::default(),
            length: Length::default(),
            duration_override: None,
            interval: None,
            handle_range: None,
            channel: 0,
            network_id: 0,
            params,
            callbacks: Callbacks::default(),
        }
    }

    pub fn kind(&self) -> OpKind {
        self.params.kind()
    }

    // ── Resolved timing ───────────────────────────────────────────────────────

    /// Absolute start tick: `frame_time + offset`.
    pub fn start_time(&self, tb: &TimeBase) -> u64 {
        self.frame_time.saturating_add(tb.offset_ticks(self.start))
    }

    /// Duration in ticks: the override if present, otherwise `length`.
    pub fn duration(&self, tb: &TimeBase) -> u64 {
        match self.duration_override {
            Some(d) if d > 0 => d,
            _ => tb.length_ticks(self.length),
        }
    }

    /// `start_time + duration + margin`.
    pub fn end_time(&self, tb: &TimeBase, margin_ticks: u64) -> u64 {
        self.start_time(tb)
            .saturating_add(self.duration(tb))
            .saturating_add(margin_ticks)
    }

    // ── Kind accessors ────────────────────────────────────────────────────────

    pub fn tx(&self) -> Option<&TxParams> {
        match &self.params {
            OpParams::Tx(tx) => Some(tx),
            _ => None,
        }
    }

    pub fn tx_mut(&mut self) -> Option<&mut TxParams> {
        match &mut self.params {
            OpParams::Tx(tx) => Some(tx),
            _ => None,
        }
    }

    pub fn rx(&self) -> Option<&RxParams> {
        match &self.params {
            OpParams::Rx(rx) => Some(rx),
            _ => None,
        }
    }

    pub fn rx_mut(&mut self) -> Option<&mut RxParams> {
        match &mut self.params {
            OpParams::Rx(rx) => Some(rx),
            _ => None,
        }
    }

    pub fn placement(&self) -> Placement {
        Placement {
            channel: self.channel,
            start: self.start,
            length: self.length,
            interval: self.interval,
        }
    }

    pub fn set_placement(&mut self, placement: Placement) {
        self.channel = placement.channel;
        self.start = placement.start;
        self.length = placement.length;
        self.interval = placement.interval.filter(|i| i.period_ticks > 0);
    }

    pub fn tx_config(&self) -> Option<TxConfig> {
        self.tx().map(|tx| TxConfig {
            placement: self.placement(),
            header: tx.header,
            lbt: tx.lbt,
        })
    }

    pub fn apply_tx_config(&mut self, config: TxConfig) {
        self.set_placement(config.placement);
        if let Some(tx) = self.tx_mut() {
            tx.header = config.header;
            tx.lbt = config.lbt;
        }
    }

    pub fn rx_config(&self) -> Option<RxConfig> {
        self.rx().map(|rx| RxConfig {
            placement: self.placement(),
            params: *rx,
        })
    }

    pub fn apply_rx_config(&mut self, config: RxConfig) {
        self.set_placement(config.placement);
        if let Some(rx) = self.rx_mut() {
            *rx = config.params;
        }
    }

    // ── Lifecycle helpers ─────────────────────────────────────────────────────

    /// Whether this instance has no further repetitions queued after it.
    pub fn is_final_instance(&self) -> bool {
        self.interval.is_none()
    }

    /// Whether a submitted copy must stay in the In-Flight Table to be
    /// correlated with its completion later.
    pub fn needs_tracking(&self) -> bool {
        let cb = &self.callbacks;
        cb.on_completion.is_some()
            || cb.on_data_received.is_some()
            || self.priority.is_force()
            || self.wants_harq_store()
            || (self.is_final_instance() && cb.on_completion_final.is_some())
    }

    pub fn wants_harq_store(&self) -> bool {
        self.priority.is_tx()
            && self.kind() == OpKind::Transmit
            && self.callbacks.on_harq_store.is_some()
    }

    /// Copy for the In-Flight Table.  The payload is only carried along when
    /// `keep_payload` is set.
    pub fn in_flight_copy(&self, keep_payload: bool) -> Self {
        let mut copy = self.clone();
        if !keep_payload {
            if let Some(tx) = copy.tx_mut() {
                tx.payload = Vec::new();
            }
        }
        copy
    }

    /// Consume one instance from the repeat counter.
    ///
    /// Returns `true` if the counter just reached zero; the interval is then
    /// cleared so the record becomes its own final instance.
    pub fn consume_repetition(&mut self) -> bool {
        let Some(interval) = self.interval.as_mut() else {
            return false;
        };
        if let Repeat::Times(left) = &mut interval.repeat {
            *left = left.saturating_sub(1);
            if *left == 0 {
                self.interval = None;
                return true;
            }
        }
        false
    }

    /// Move to the next handle of `handle_range`, if one is configured.
    pub fn advance_handle(&mut self) {
        if let Some(range) = self.handle_range {
            self.handle = range.next(self.handle);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn tx_record() -> OperationRecord {
        OperationRecord::new(
            Priority::HighTx,
            OpParams::Tx(TxParams {
                payload: vec![1, 2, 3],
                ..Default::default()
            }),
        )
    }

    // ── Priority ──────────────────────────────────────────────────────────────

    #[test]
    fn priority_lower_value_is_higher_priority() {
        assert!(Priority::ForceTx < Priority::HighTx);
        assert!(Priority::HighTx < Priority::LowestRx);
        assert_eq!(Priority::ForceTx as u8, 0);
    }

    #[test]
    fn priority_classification() {
        assert!(Priority::ForceTx.is_force());
        assert!(Priority::ForceRx.is_force());
        assert!(!Priority::HighTx.is_force());
        assert!(Priority::LowestTx.is_tx());
        assert!(!Priority::HighRssi.is_tx());
    }

    // ── Interval ──────────────────────────────────────────────────────────────

    #[test]
    fn interval_from_signed_count() {
        assert_eq!(
            Interval::from_count(100, -1),
            Some(Interval::unbounded(100))
        );
        assert_eq!(Interval::from_count(100, 0), None);
        assert_eq!(Interval::from_count(100, 3), Some(Interval::times(100, 3)));
        assert_eq!(Interval::from_count(0, 3), None);
    }

    #[test]
    fn consume_repetition_counts_down_to_final_instance() {
        let mut rec = tx_record();
        rec.interval = Some(Interval::times(1_000, 2));

        assert!(!rec.consume_repetition());
        assert_eq!(rec.interval, Some(Interval::times(1_000, 1)));
        assert!(!rec.is_final_instance());

        assert!(rec.consume_repetition());
        assert!(rec.is_final_instance());

        // Nothing left to consume
        assert!(!rec.consume_repetition());
    }

    #[test]
    fn unbounded_interval_never_finishes() {
        let mut rec = tx_record();
        rec.interval = Some(Interval::unbounded(1_000));
        for _ in 0..100 {
            assert!(!rec.consume_repetition());
        }
        assert!(!rec.is_final_instance());
    }

    // ── HandleRange ───────────────────────────────────────────────────────────

    #[test]
    fn handle_range_wraps() {
        let r = HandleRange::new(10, 12);
        assert_eq!(r.next(10), 11);
        assert_eq!(r.next(11), 12);
        assert_eq!(r.next(12), 10);
        assert_eq!(r.next(u32::MAX), 10);
        // A handle outside the range re-enters at the start
        assert_eq!(r.next(3), 10);
    }

    #[test]
    fn advance_handle_without_range_keeps_handle() {
        let mut rec = tx_record();
        rec.handle = 42;
        rec.advance_handle();
        assert_eq!(rec.handle, 42);

        rec.handle_range = Some(HandleRange::new(42, 43));
        rec.advance_handle();
        assert_eq!(rec.handle, 43);
        rec.advance_handle();
        assert_eq!(rec.handle, 42);
    }

    // ── Timing ────────────────────────────────────────────────────────────────

    #[test]
    fn resolved_times_use_slot_geometry() {
        let tb = TimeBase::default();
        let mut rec = tx_record();
        rec.frame_time = 1_000_000;
        rec.start = StartOffset::Subslot(4);
        rec.length = Length::Subslots(2);

        assert_eq!(rec.start_time(&tb), 1_000_000 + 4 * 14_400);
        assert_eq!(rec.duration(&tb), 2 * 14_400);
        assert_eq!(
            rec.end_time(&tb, 500),
            1_000_000 + 4 * 14_400 + 2 * 14_400 + 500
        );
    }

    #[test]
    fn duration_override_wins_over_length() {
        let tb = TimeBase::default();
        let mut rec = OperationRecord::new(Priority::LowestRx, OpParams::Rx(RxParams::default()));
        rec.length = Length::Slots(2);
        rec.duration_override = Some(5_000_000);
        assert_eq!(rec.duration(&tb), 5_000_000);

        // Zero override means "not set"
        rec.duration_override = Some(0);
        assert_eq!(rec.duration(&tb), 57_600);
    }

    // ── Copies ────────────────────────────────────────────────────────────────

    #[test]
    fn in_flight_copy_drops_payload_unless_requested() {
        let rec = tx_record();
        assert!(rec.in_flight_copy(false).tx().unwrap().payload.is_empty());
        assert_eq!(rec.in_flight_copy(true).tx().unwrap().payload, vec![1, 2, 3]);
        // Original is untouched
        assert_eq!(rec.tx().unwrap().payload, vec![1, 2, 3]);
    }

    #[test]
    fn needs_tracking_follows_registered_callbacks() {
        let mut rec = tx_record();
        assert!(!rec.needs_tracking());

        rec.callbacks.on_completion = Some(Arc::new(|_, _| {}));
        assert!(rec.needs_tracking());

        let mut forced = tx_record();
        forced.priority = Priority::ForceTx;
        assert!(forced.needs_tracking());

        let mut harq = tx_record();
        harq.callbacks.on_harq_store = Some(Arc::new(|_| {}));
        assert!(harq.wants_harq_store());
        assert!(harq.needs_tracking());
    }

    #[test]
    fn harq_store_needs_transmit_priority() {
        let mut rec = tx_record();
        rec.callbacks.on_harq_store = Some(Arc::new(|_| {}));
        rec.priority = Priority::HighRx;
        assert!(!rec.wants_harq_store());
        rec.priority = Priority::NormalTx;
        assert!(rec.wants_harq_store());
    }

    #[test]
    fn tx_config_applies_placement_and_link_settings() {
        let mut rec = tx_record();
        let mut config = rec.tx_config().unwrap();
        assert!(rec.rx_config().is_none());

        config.placement.channel = 1671;
        config.placement.start = StartOffset::Subslot(6);
        config.placement.interval = Some(Interval::times(0, 4));
        config.header = PhyHeader::Type1([1, 2, 3, 4, 5]);
        config.lbt = Some(Lbt {
            period_ticks: 2_000,
            rssi_threshold_max_dbm: -80,
        });
        rec.apply_tx_config(config);

        assert_eq!(rec.channel, 1671);
        assert_eq!(rec.start, StartOffset::Subslot(6));
        // Zero period collapses to a one-shot
        assert_eq!(rec.interval, None);
        assert_eq!(rec.tx().unwrap().header, PhyHeader::Type1([1, 2, 3, 4, 5]));
        assert_eq!(rec.tx().unwrap().payload, vec![1, 2, 3]);
    }

    #[test]
    fn op_status_success_classification() {
        assert!(OpStatus::Success.is_success());
        assert!(OpStatus::Radio(0).is_success());
        assert!(!OpStatus::Radio(5).is_success());
        assert!(!OpStatus::SchedulerSuspended.is_success());
    }
}
