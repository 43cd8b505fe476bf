// Player Record Log
//
// Per-player record state: 30 general slots in the order records were
// taken, one slot reserved for the current timed record, per-slot progress
// and the completion set. The active bitmap is a derived cache of the slot
// contents and is never persisted.
//
// Everything here is pure state manipulation. Policy checks, notifications
// and persistence are layered on top by `RecordSystem`.

pub mod store;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::record::{RecordBitmap, RecordId, MAX_RECORDS};

/// Slots available for records taken by the player.
pub const GENERAL_SLOTS: usize = 30;

/// Index of the slot holding the current timed record.
pub const TIMED_SLOT: usize = 30;

pub const SLOT_COUNT: usize = GENERAL_SLOTS + 1;

/// Durable form of a [`PlayerRecordLog`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordLogSnapshot {
    pub active: Vec<RecordId>,
    pub progress: Vec<u32>,
    /// Completion set, record `id` at byte `id / 8`, bit `id % 8`.
    pub complete: Vec<u8>,
}

impl Default for RecordLogSnapshot {
    fn default() -> Self {
        PlayerRecordLog::new().snapshot()
    }
}

/// Result of placing a record into a general slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeOutcome {
    Taken { slot: usize },
    AlreadyActive,
    Full,
}

/// Result of a progress write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressUpdate {
    Unchanged,
    Changed,
    NotActive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRecordLog {
    active: [RecordId; SLOT_COUNT],
    progress: [u32; SLOT_COUNT],
    completed: RecordBitmap,
    active_map: RecordBitmap,
    last_save: Option<DateTime<Utc>>,
    notify_timed_record: bool,
}

impl Default for PlayerRecordLog {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerRecordLog {
    pub fn new() -> Self {
        Self {
            active: [0; SLOT_COUNT],
            progress: [0; SLOT_COUNT],
            completed: RecordBitmap::new(),
            active_map: RecordBitmap::new(),
            last_save: None,
            notify_timed_record: false,
        }
    }

    /// Restore a log from storage and rebuild the active bitmap.
    ///
    /// Missing slots are empty and surplus ones dropped. Slot values outside
    /// the record space and repeats of a record already placed are discarded
    /// along with their progress, then the general slots are compacted.
    pub fn from_snapshot(snapshot: &RecordLogSnapshot) -> Self {
        let mut log = Self::new();
        let mut placed = RecordBitmap::new();

        for (slot, &record) in snapshot.active.iter().take(SLOT_COUNT).enumerate() {
            if record == 0 {
                continue;
            }
            if usize::from(record) >= MAX_RECORDS {
                tracing::warn!(slot, record, "discarding out-of-range record from stored log");
                continue;
            }
            if placed.test(record) {
                tracing::warn!(slot, record, "discarding duplicate record from stored log");
                continue;
            }
            placed.set(record);
            log.active[slot] = record;
            log.progress[slot] = snapshot.progress.get(slot).copied().unwrap_or(0);
        }
        log.compact_general_slots();

        log.completed = RecordBitmap::from_bytes(&snapshot.complete);
        log.rebuild_active_map();
        log
    }

    /// Log holding exactly `slots`, bypassing hydration cleanup.
    #[cfg(test)]
    pub(crate) fn with_raw_slots(slots: &[RecordId]) -> Self {
        let mut log = Self::new();
        log.active[..slots.len()].copy_from_slice(slots);
        log.rebuild_active_map();
        log
    }

    /// Move held general records to the front, keeping their order.
    fn compact_general_slots(&mut self) {
        let mut next = 0;
        for slot in 0..GENERAL_SLOTS {
            if self.active[slot] == 0 {
                continue;
            }
            if slot != next {
                self.active.swap(next, slot);
                self.progress.swap(next, slot);
            }
            next += 1;
        }
    }

    pub fn snapshot(&self) -> RecordLogSnapshot {
        RecordLogSnapshot {
            active: self.active.to_vec(),
            progress: self.progress.to_vec(),
            complete: self.completed.to_bytes(),
        }
    }

    /// Recompute the active bitmap from slot contents.
    pub fn rebuild_active_map(&mut self) {
        self.active_map = self.active.iter().copied().filter(|&r| r != 0).collect();
    }

    pub fn slots(&self) -> &[RecordId; SLOT_COUNT] {
        &self.active
    }

    pub fn slot_progress(&self) -> &[u32; SLOT_COUNT] {
        &self.progress
    }

    pub fn active_map(&self) -> &RecordBitmap {
        &self.active_map
    }

    pub fn completed(&self) -> &RecordBitmap {
        &self.completed
    }

    pub fn timed_record(&self) -> RecordId {
        self.active[TIMED_SLOT]
    }

    pub fn has(&self, record: RecordId) -> bool {
        self.active_map.test(record)
    }

    fn slot_of(&self, record: RecordId) -> Option<usize> {
        if record == 0 {
            return None;
        }
        self.active.iter().position(|&r| r == record)
    }

    /// Progress of an active record; `0` when the record is not active.
    pub fn progress_of(&self, record: RecordId) -> u32 {
        self.slot_of(record).map_or(0, |slot| self.progress[slot])
    }

    /// Place `record` into the first empty general slot.
    pub fn take(&mut self, record: RecordId) -> TakeOutcome {
        for slot in 0..GENERAL_SLOTS {
            if self.active[slot] == 0 {
                self.active[slot] = record;
                self.progress[slot] = 0;
                self.active_map.set(record);
                return TakeOutcome::Taken { slot };
            }
            if self.active[slot] == record {
                return TakeOutcome::AlreadyActive;
            }
        }
        TakeOutcome::Full
    }

    /// Remove `record` from the general slots, shifting later records up so
    /// the list stays in taken order with no gaps.
    pub fn drop_record(&mut self, record: RecordId) -> bool {
        if record == 0 {
            return false;
        }
        let Some(slot) = self.active[..GENERAL_SLOTS].iter().position(|&r| r == record) else {
            return false;
        };

        self.active[slot] = 0;
        self.progress[slot] = 0;
        self.active_map.reset(record);

        let mut idx = slot;
        while idx + 1 < GENERAL_SLOTS && self.active[idx + 1] != 0 {
            self.active.swap(idx, idx + 1);
            self.progress.swap(idx, idx + 1);
            idx += 1;
        }
        true
    }

    pub fn update_progress(&mut self, record: RecordId, value: u32) -> ProgressUpdate {
        let Some(slot) = self.slot_of(record) else {
            return ProgressUpdate::NotActive;
        };
        if self.progress[slot] == value {
            return ProgressUpdate::Unchanged;
        }
        self.progress[slot] = value;
        ProgressUpdate::Changed
    }

    pub fn is_completed(&self, record: RecordId) -> bool {
        self.completed.test(record)
    }

    pub fn set_completed(&mut self, record: RecordId, completed: bool) {
        if completed {
            self.completed.set(record);
        } else {
            self.completed.reset(record);
        }
    }

    /// Zero the progress of every general slot holding a member of `records`.
    pub fn reset_progress_where(&mut self, records: impl Fn(RecordId) -> bool) {
        for slot in 0..GENERAL_SLOTS {
            let record = self.active[slot];
            if record != 0 && records(record) {
                self.progress[slot] = 0;
            }
        }
    }

    /// Install `record` as the timed record with fresh progress.
    ///
    /// Every member of `timed` loses its active bit, as does the previous
    /// occupant of the timed slot; records still held in general slots keep
    /// theirs.
    pub fn place_timed(&mut self, record: RecordId, timed: &RecordBitmap) {
        let previous = self.active[TIMED_SLOT];

        self.progress[TIMED_SLOT] = 0;
        self.active_map.subtract(timed);
        self.active_map.reset(previous);

        self.active[TIMED_SLOT] = record;
        for &held in &self.active {
            if held != 0 {
                self.active_map.set(held);
            }
        }
    }

    pub fn notify_timed_record(&self) -> bool {
        self.notify_timed_record
    }

    pub fn set_notify_timed_record(&mut self, notify: bool) {
        self.notify_timed_record = notify;
    }

    pub fn last_save(&self) -> Option<DateTime<Utc>> {
        self.last_save
    }

    pub fn mark_saved(&mut self, at: DateTime<Utc>) {
        self.last_save = Some(at);
    }

    /// Forget the last write, e.g. on login.
    pub fn reset_save_clock(&mut self) {
        self.last_save = None;
    }

    /// Whether a throttled save may run at `now`.
    pub fn save_due(&self, now: DateTime<Utc>, interval: Duration) -> bool {
        match self.last_save {
            Some(last) => now - last >= interval,
            None => true,
        }
    }
}
