// Record Catalog
//
// Immutable-after-load description of every record: which records exist,
// their flags, notification thresholds, which gameplay events trigger them,
// and the weekly timed-record schedule. Rebuilt wholesale on reload.

pub mod config;

use serde::{Deserialize, Serialize};

use crate::record::{RecordBitmap, RecordId, MAX_RECORDS};
use self::config::{CatalogConfig, ScheduleConfig};

/// Gameplay events records can subscribe to.
///
/// Discriminants are the configuration trigger indexes; `0` is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum EventType {
    MobKill = 1,
    WeaponskillUse = 2,
    LootItem = 3,
    SynthSuccess = 4,
    DamageTaken = 5,
    DamageDealt = 6,
    ExpGain = 7,
    LevelUp = 8,
    HealAlly = 9,
    BuffAlly = 10,
    Talk = 11,
    Login = 12,
}

/// One past the highest valid trigger index.
pub const EVENT_TYPE_COUNT: usize = 13;

impl EventType {
    pub const ALL: [EventType; EVENT_TYPE_COUNT - 1] = [
        EventType::MobKill,
        EventType::WeaponskillUse,
        EventType::LootItem,
        EventType::SynthSuccess,
        EventType::DamageTaken,
        EventType::DamageDealt,
        EventType::ExpGain,
        EventType::LevelUp,
        EventType::HealAlly,
        EventType::BuffAlly,
        EventType::Talk,
        EventType::Login,
    ];

    /// Map a configuration trigger index to an event type.
    pub fn from_index(index: i64) -> Option<EventType> {
        if index <= 0 {
            return None;
        }
        Self::ALL.get(usize::try_from(index).ok()? - 1).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

pub const DAYS_PER_WEEK: usize = 7;
pub const BLOCKS_PER_DAY: usize = 6;

/// Day × four-hour block → timed record. Day `0` is Sunday.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeeklySchedule {
    table: [[RecordId; BLOCKS_PER_DAY]; DAYS_PER_WEEK],
}

impl WeeklySchedule {
    pub fn get(&self, day: usize, block: usize) -> RecordId {
        self.table
            .get(day)
            .and_then(|blocks| blocks.get(block))
            .copied()
            .unwrap_or(0)
    }

    fn set(&mut self, day: usize, block: usize, record: RecordId) {
        self.table[day][block] = record;
    }
}

/// Flag-derived membership sets and per-record settings.
#[derive(Debug, Clone)]
pub struct RecordCatalog {
    implemented: RecordBitmap,
    repeatable: RecordBitmap,
    retroactive: RecordBitmap,
    daily: RecordBitmap,
    timed: RecordBitmap,
    daily_ids: Vec<RecordId>,
    notify_thresholds: Vec<u32>,
    triggers: Vec<RecordBitmap>,
    schedule: WeeklySchedule,
}

impl Default for RecordCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordCatalog {
    /// Empty catalog: nothing implemented, nothing scheduled.
    pub fn new() -> Self {
        Self {
            implemented: RecordBitmap::new(),
            repeatable: RecordBitmap::new(),
            retroactive: RecordBitmap::new(),
            daily: RecordBitmap::new(),
            timed: RecordBitmap::new(),
            daily_ids: Vec::new(),
            notify_thresholds: vec![1; MAX_RECORDS],
            triggers: vec![RecordBitmap::new(); EVENT_TYPE_COUNT],
            schedule: WeeklySchedule::default(),
        }
    }

    /// Build a fresh catalog from both configuration documents.
    ///
    /// The schedule is parsed first so that `timed` flags from the record
    /// entries survive its reset of the timed set.
    pub fn load(records: &CatalogConfig, schedule: &ScheduleConfig) -> Self {
        let mut catalog = Self::new();
        catalog.parse_schedule(schedule);
        catalog.parse_catalog(records);
        tracing::info!(
            records = catalog.implemented.count(),
            timed = catalog.timed.count(),
            daily = catalog.daily_ids.len(),
            "record catalog loaded"
        );
        catalog
    }

    /// Replace record definitions from `entries`.
    ///
    /// Resets every per-record set except `timed`, which is shared with
    /// [`RecordCatalog::parse_schedule`]. Invalid fields are logged and
    /// skipped; the remaining fields of the entry still apply.
    pub fn parse_catalog(&mut self, entries: &CatalogConfig) {
        self.implemented.clear();
        self.repeatable.clear();
        self.retroactive.clear();
        self.daily.clear();
        self.daily_ids.clear();
        self.notify_thresholds.fill(1);
        self.triggers.iter_mut().for_each(RecordBitmap::clear);

        for (&key, entry) in &entries.records {
            let Some(record) = valid_record_id(key) else {
                tracing::error!(record = key, "record id outside the catalog range");
                continue;
            };

            self.implemented.set(record);

            if let Some(trigger) = entry.trigger {
                match EventType::from_index(trigger) {
                    Some(event) => self.triggers[event.index()].set(record),
                    None => tracing::error!(record, trigger, "unknown record trigger index"),
                }
            }

            if let Some(notify) = entry.notify {
                self.notify_thresholds[usize::from(record)] = notify;
            }

            for flag in entry.flags.iter().flatten() {
                match flag.as_str() {
                    "daily" => {
                        if !self.daily.test(record) {
                            self.daily.set(record);
                            self.daily_ids.push(record);
                        }
                    }
                    "timed" => self.timed.set(record),
                    "repeat" => self.repeatable.set(record),
                    "retro" => self.retroactive.set(record),
                    unknown => tracing::error!(record, flag = unknown, "unknown record flag"),
                }
            }
        }
    }

    /// Replace the weekly schedule. Days and blocks are 1-based.
    ///
    /// Also resets the `timed` set.
    pub fn parse_schedule(&mut self, entries: &ScheduleConfig) {
        self.timed.clear();
        self.schedule = WeeklySchedule::default();

        for (&day, blocks) in &entries.days {
            if !(1..=DAYS_PER_WEEK as u32).contains(&day) {
                tracing::error!(day, "timed schedule day outside 1-7");
                continue;
            }
            for (&block, &record) in blocks {
                if !(1..=BLOCKS_PER_DAY as u32).contains(&block) {
                    tracing::error!(day, block, "timed schedule block outside 1-6");
                    continue;
                }
                let Some(record) = schedule_record_id(record) else {
                    tracing::error!(day, block, record, "timed schedule record out of range");
                    continue;
                };
                self.schedule.set(day as usize - 1, block as usize - 1, record);
            }
        }
    }

    pub fn is_implemented(&self, record: RecordId) -> bool {
        self.implemented.test(record)
    }

    pub fn is_repeatable(&self, record: RecordId) -> bool {
        self.repeatable.test(record)
    }

    pub fn is_retroactive(&self, record: RecordId) -> bool {
        self.retroactive.test(record)
    }

    pub fn is_daily(&self, record: RecordId) -> bool {
        self.daily.test(record)
    }

    pub fn is_timed(&self, record: RecordId) -> bool {
        self.timed.test(record)
    }

    pub fn notify_threshold(&self, record: RecordId) -> u32 {
        self.notify_thresholds
            .get(usize::from(record))
            .copied()
            .unwrap_or(1)
    }

    /// Records subscribed to `event`.
    pub fn trigger_bitmap_for(&self, event: EventType) -> &RecordBitmap {
        &self.triggers[event.index()]
    }

    pub fn timed_bitmap(&self) -> &RecordBitmap {
        &self.timed
    }

    /// Daily records in configuration order.
    pub fn daily_ids(&self) -> &[RecordId] {
        &self.daily_ids
    }

    pub fn schedule(&self) -> &WeeklySchedule {
        &self.schedule
    }
}

fn valid_record_id(raw: u32) -> Option<RecordId> {
    if raw == 0 || raw as usize >= MAX_RECORDS {
        return None;
    }
    RecordId::try_from(raw).ok()
}

/// Like [`valid_record_id`], but `0` marks a block without a timed record.
fn schedule_record_id(raw: u32) -> Option<RecordId> {
    match raw {
        0 => Some(0),
        raw => valid_record_id(raw),
    }
}
