/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Pending Queue: records accepted but not yet handed to the radio.
//!
//! The queue is a `Vec` kept in dispatch order.  Position is decided once, at
//! insertion time, by walking the queue in order:
//!
//! | Candidate frame vs. element | Windows overlap | Action |
//! |---|---|---|
//! | earlier | no | insert before |
//! | earlier | yes | insert before if candidate priority is strictly higher, else reject |
//! | same | no | insert before if candidate starts earlier, else keep scanning |
//! | same | yes | insert before if candidate priority is strictly higher, else reject |
//! | later | no | keep scanning |
//! | later | yes | insert before if candidate priority is strictly higher, else reject |
//!
//! If nothing forces an earlier position the record is appended.  Windows
//! are `[start_time, start_time + duration + margin]`, where the margin is
//! the radio's minimum gap between two operations.
//!
//! A candidate that wins a conflict is still placed next to the record it
//! overlaps; both will be submitted and the radio decides which one runs.

use std::cmp::Ordering;

use tracing::{debug, warn};

use super::error::{RejectReason, SchedulerError};
use crate::record::{OpKind, OperationRecord, PhyHeader, Priority, RxConfig, TxConfig, TxParams};
use crate::time::TimeBase;

/// Result of a successful insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inserted {
    pub position: usize,
    /// The queue was empty before this insertion.
    pub was_empty: bool,
}

/// Ordered collection of pending operation records.
#[derive(Debug)]
pub struct PendingQueue {
    items: Vec<OperationRecord>,
    time_base: TimeBase,
    margin_ticks: u64,
}

impl PendingQueue {
    pub fn new(time_base: TimeBase, margin_ticks: u64) -> Self {
        Self {
            items: Vec::new(),
            time_base,
            margin_ticks,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OperationRecord> {
        self.items.iter()
    }

    pub fn front(&self) -> Option<&OperationRecord> {
        self.items.first()
    }

    pub fn pop_front(&mut self) -> Option<OperationRecord> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.items.remove(0))
        }
    }

    /// Frame time of the last queued record.
    pub fn last_frame_time(&self) -> Option<u64> {
        self.items.last().map(|r| r.frame_time)
    }

    pub fn contains(&self, handle: u32) -> bool {
        self.items.iter().any(|r| r.handle == handle)
    }

    // ── Insertion ─────────────────────────────────────────────────────────────

    /// Validate `rec` and insert it at its resolved position.
    pub fn insert(&mut self, rec: OperationRecord) -> Result<Inserted, RejectReason> {
        let position = self.find_position(&rec)?;
        let was_empty = self.items.is_empty();
        debug!(
            handle = rec.handle,
            frame_time = rec.frame_time,
            position,
            "record queued"
        );
        self.items.insert(position, rec);
        Ok(Inserted {
            position,
            was_empty,
        })
    }

    /// Resolve where `rec` would go without modifying the queue.
    fn find_position(&self, rec: &OperationRecord) -> Result<usize, RejectReason> {
        let tb = &self.time_base;
        if rec.duration(tb) == 0 {
            return Err(RejectReason::ZeroDuration);
        }

        let new_frame = rec.frame_time;
        let new_start = rec.start_time(tb);
        let new_end = rec.end_time(tb, self.margin_ticks);
        let next_frame_time = tb.next_frame_boundary(new_frame);

        // Receive windows are caller-sized and may run for several frames;
        // ForceTx targets contention resources that may straddle a boundary.
        if rec.priority != Priority::ForceTx
            && !rec.kind().may_span_frames()
            && new_end >= next_frame_time
        {
            if !rec.silent {
                warn!(
                    handle = rec.handle,
                    end_time = new_end,
                    next_frame_time,
                    "record does not fit into its frame"
                );
            }
            return Err(RejectReason::ExceedsFrame {
                end_time: new_end,
                next_frame_time,
            });
        }

        for (i, existing) in self.items.iter().enumerate() {
            let list_start = existing.start_time(tb);
            let list_end = existing.end_time(tb, self.margin_ticks);
            let overlaps = list_start <= new_end && list_end >= new_start;

            match new_frame.cmp(&existing.frame_time) {
                Ordering::Less => {
                    if overlaps {
                        check_priority(rec, new_start, new_end, existing, list_start, list_end)?;
                    }
                    return Ok(i);
                }
                Ordering::Equal => {
                    if overlaps {
                        check_priority(rec, new_start, new_end, existing, list_start, list_end)?;
                        return Ok(i);
                    }
                    if new_start < list_start {
                        return Ok(i);
                    }
                }
                Ordering::Greater => {
                    if overlaps {
                        check_priority(rec, new_start, new_end, existing, list_start, list_end)?;
                        return Ok(i);
                    }
                }
            }
        }
        Ok(self.items.len())
    }

    // ── Removal ───────────────────────────────────────────────────────────────

    /// Remove the first record with `handle`.
    pub fn remove_by_handle(&mut self, handle: u32) -> Option<OperationRecord> {
        let idx = self.items.iter().position(|r| r.handle == handle)?;
        Some(self.items.remove(idx))
    }

    /// Remove every record whose handle is in `start..=end`.  Returns the
    /// number of records removed.
    pub fn remove_by_handle_range(&mut self, start: u32, end: u32) -> usize {
        let before = self.items.len();
        self.items.retain(|r| !(start..=end).contains(&r.handle));
        before - self.items.len()
    }

    /// Drop every record (and with it every payload buffer).
    pub fn purge(&mut self) -> usize {
        let n = self.items.len();
        self.items.clear();
        n
    }

    // ── In-place updates ──────────────────────────────────────────────────────

    /// Replace the payload of a pending Transmit record.
    pub fn update_payload(
        &mut self,
        handle: u32,
        bytes: &[u8],
        max_len: usize,
    ) -> Result<(), SchedulerError> {
        if bytes.len() > max_len {
            return Err(SchedulerError::PayloadTooLarge {
                handle,
                size: bytes.len(),
                max: max_len,
            });
        }
        let tx = self.tx_mut(handle)?;
        tx.payload.clear();
        tx.payload.extend_from_slice(bytes);
        Ok(())
    }

    /// Replace the physical layer header of a pending Transmit record.
    pub fn update_tx_header(&mut self, handle: u32, header: PhyHeader) -> Result<(), SchedulerError> {
        self.tx_mut(handle)?.header = header;
        Ok(())
    }

    fn tx_mut(&mut self, handle: u32) -> Result<&mut TxParams, SchedulerError> {
        let rec = self
            .items
            .iter_mut()
            .find(|r| r.handle == handle)
            .ok_or(SchedulerError::HandleNotFound(handle))?;
        rec.tx_mut().ok_or(SchedulerError::NotTransmit { handle })
    }

    /// Apply `update` to the settings of the pending Transmit record
    /// `handle` and re-resolve its position.
    ///
    /// If the updated record conflicts, it is restored unchanged and the
    /// rejection is returned.
    pub fn update_tx_config<F>(&mut self, handle: u32, update: F) -> Result<(), SchedulerError>
    where
        F: FnOnce(&mut TxConfig),
    {
        self.reposition(handle, |rec| {
            let mut config = rec
                .tx_config()
                .ok_or(SchedulerError::NotTransmit { handle })?;
            update(&mut config);
            rec.apply_tx_config(config);
            Ok(())
        })
    }

    /// Apply `update` to every pending Receive record with a handle in
    /// `start..=end` and re-resolve their positions.  Returns the number of
    /// records updated.
    ///
    /// All or nothing: if any updated record conflicts, the queue is left as
    /// it was and the first rejection is returned.
    pub fn update_rx_by_handle_range<F>(
        &mut self,
        start: u32,
        end: u32,
        mut update: F,
    ) -> Result<usize, SchedulerError>
    where
        F: FnMut(&mut RxConfig),
    {
        let in_range = |r: &OperationRecord| {
            (start..=end).contains(&r.handle) && r.kind() == OpKind::Receive
        };
        if !self.items.iter().any(in_range) {
            return Ok(0);
        }

        let previous = self.items.clone();
        let (targets, rest): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.items).into_iter().partition(in_range);
        self.items = rest;

        let n = targets.len();
        for mut rec in targets {
            if let Some(mut config) = rec.rx_config() {
                update(&mut config);
                rec.apply_rx_config(config);
            }
            match self.find_position(&rec) {
                Ok(pos) => self.items.insert(pos, rec),
                Err(reason) => {
                    self.items = previous;
                    return Err(SchedulerError::InsertRejected {
                        handle: rec.handle,
                        reason,
                    });
                }
            }
        }
        debug!(start, end, updated = n, "receive settings updated");
        Ok(n)
    }

    /// Move a pending record by `diff_ticks` and re-resolve its position.
    ///
    /// If the shifted record conflicts, it is restored unchanged and the
    /// rejection is returned.
    pub fn shift_frame_time(&mut self, handle: u32, diff_ticks: i64) -> Result<(), SchedulerError> {
        self.reposition(handle, |rec| {
            rec.frame_time = if diff_ticks >= 0 {
                rec.frame_time.saturating_add(diff_ticks as u64)
            } else {
                rec.frame_time.saturating_sub(diff_ticks.unsigned_abs())
            };
            Ok(())
        })
    }

    /// Take `handle` out, modify it, and put it back where it now belongs.
    /// On any error the record goes back unchanged to its old position.
    fn reposition<F>(&mut self, handle: u32, modify: F) -> Result<(), SchedulerError>
    where
        F: FnOnce(&mut OperationRecord) -> Result<(), SchedulerError>,
    {
        let idx = self
            .items
            .iter()
            .position(|r| r.handle == handle)
            .ok_or(SchedulerError::HandleNotFound(handle))?;
        let previous = self.items.remove(idx);
        let mut rec = previous.clone();

        if let Err(e) = modify(&mut rec) {
            self.items.insert(idx, previous);
            return Err(e);
        }
        match self.find_position(&rec) {
            Ok(pos) => {
                self.items.insert(pos, rec);
                Ok(())
            }
            Err(reason) => {
                self.items.insert(idx, previous);
                Err(SchedulerError::InsertRejected { handle, reason })
            }
        }
    }

    /// Undo an insertion that could not be announced to the worker.
    pub(crate) fn remove_at(&mut self, position: usize) -> Option<OperationRecord> {
        (position < self.items.len()).then(|| self.items.remove(position))
    }
}

/// Conflict rule: the candidate only displaces `existing` if its priority is
/// strictly higher (numerically lower).
fn check_priority(
    rec: &OperationRecord,
    new_start: u64,
    new_end: u64,
    existing: &OperationRecord,
    list_start: u64,
    list_end: u64,
) -> Result<(), RejectReason> {
    if rec.priority >= existing.priority {
        if !rec.silent {
            warn!(
                handle = rec.handle,
                start_time = new_start,
                end_time = new_end,
                existing_handle = existing.handle,
                existing_start = list_start,
                existing_end = list_end,
                "cannot schedule: overlapping with an equal or higher priority record"
            );
        }
        return Err(RejectReason::Conflict {
            start_time: new_start,
            end_time: new_end,
            existing_handle: existing.handle,
            existing_priority: existing.priority,
            existing_start: list_start,
            existing_end: list_end,
        });
    }
    if !rec.silent {
        warn!(
            handle = rec.handle,
            start_time = new_start,
            end_time = new_end,
            existing_handle = existing.handle,
            existing_start = list_start,
            existing_end = list_end,
            "priority insert over an overlapping record"
        );
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
