/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! In-Flight Table: copies of records handed to the radio, kept until the
//! radio reports their completion.

use tracing::warn;

use crate::record::OperationRecord;

#[derive(Debug, Default)]
pub struct InFlightTable {
    entries: Vec<OperationRecord>,
}

impl InFlightTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, handle: u32) -> bool {
        self.entries.iter().any(|r| r.handle == handle)
    }

    /// Track `rec` until its completion arrives.
    ///
    /// Handles are caller-chosen and may collide; the older entry is kept and
    /// matched first.
    pub fn add(&mut self, rec: OperationRecord) {
        if self.contains(rec.handle) {
            warn!(handle = rec.handle, "handle already in flight");
        }
        self.entries.push(rec);
    }

    /// Remove and return the oldest entry for `handle`.
    pub fn take(&mut self, handle: u32) -> Option<OperationRecord> {
        let idx = self.entries.iter().position(|r| r.handle == handle)?;
        Some(self.entries.remove(idx))
    }

    pub fn iter(&self) -> impl Iterator<Item = &OperationRecord> {
        self.entries.iter()
    }

    pub fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{OpParams, Priority, RxParams};

    fn rec(handle: u32, frame_time: u64) -> OperationRecord {
        let mut r = OperationRecord::new(Priority::LowestRx, OpParams::Rx(RxParams::default()));
        r.handle = handle;
        r.frame_time = frame_time;
        r
    }

    #[test]
    fn take_returns_oldest_matching_entry() {
        let mut t = InFlightTable::new();
        t.add(rec(1, 100));
        t.add(rec(2, 200));
        t.add(rec(1, 300));

        assert_eq!(t.take(1).unwrap().frame_time, 100);
        assert_eq!(t.take(1).unwrap().frame_time, 300);
        assert!(t.take(1).is_none());
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn clear_empties_table() {
        let mut t = InFlightTable::new();
        t.add(rec(1, 0));
        t.add(rec(2, 0));
        assert_eq!(t.clear(), 2);
        assert!(t.is_empty());
        assert!(!t.contains(2));
    }
}
