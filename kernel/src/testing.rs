// Shared test fixtures: catalog builders, recording collaborators and a
// harness wiring them into a `RecordSystem`.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::catalog::config::{CatalogConfig, RecordEntry, ScheduleConfig};
use crate::catalog::{EventType, RecordCatalog};
use crate::config::SystemConfig;
use crate::dispatch::{DatagramKind, TriggerError, TriggerParams, TriggerSink};
use crate::log::store::{InMemoryRecordStore, RecordLogStore, StoreError};
use crate::log::RecordLogSnapshot;
use crate::notify::{Notification, NotificationLog};
use crate::player::{Player, PlayerId};
use crate::record::RecordId;
use crate::schedule::clock::Clock;
use crate::system::{Collaborators, RecordSystem};

pub fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
}

/// Tuesday 2024-01-02 05:30 JST.
pub fn start_time() -> DateTime<Utc> {
    utc(2024, 1, 1, 20, 30, 0)
}

pub struct RecordSpec {
    id: u32,
    trigger: Option<EventType>,
    flags: Vec<&'static str>,
}

impl RecordSpec {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            trigger: None,
            flags: Vec::new(),
        }
    }

    pub fn trigger(mut self, event: EventType) -> Self {
        self.trigger = Some(event);
        self
    }

    pub fn flags(mut self, flags: &[&'static str]) -> Self {
        self.flags.extend_from_slice(flags);
        self
    }
}

fn catalog_config(specs: &[RecordSpec]) -> CatalogConfig {
    CatalogConfig {
        records: specs
            .iter()
            .map(|spec| {
                let entry = RecordEntry {
                    trigger: spec.trigger.map(|e| e.index() as i64),
                    notify: None,
                    flags: Some(spec.flags.iter().map(|f| f.to_string()).collect()),
                };
                (spec.id, entry)
            })
            .collect(),
    }
}

pub fn catalog_with(specs: &[RecordSpec]) -> RecordCatalog {
    let mut catalog = RecordCatalog::new();
    catalog.parse_catalog(&catalog_config(specs));
    catalog
}

/// Catalog plus a schedule of 1-based `(day, block, record)` rows.
pub fn catalog_with_schedule(specs: &[RecordSpec], rows: &[(u32, u32, u32)]) -> RecordCatalog {
    let mut schedule = ScheduleConfig::default();
    for &(day, block, record) in rows {
        schedule.days.entry(day).or_default().insert(block, record);
    }
    RecordCatalog::load(&catalog_config(specs), &schedule)
}

pub struct MockClock(Mutex<DateTime<Utc>>);

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

#[derive(Debug, Clone)]
pub struct TriggerCall {
    pub player: PlayerId,
    pub record: RecordId,
    pub params: TriggerParams,
}

#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<TriggerCall>>,
    failing: Mutex<Vec<RecordId>>,
    rejected: Mutex<Vec<DatagramKind>>,
}

impl RecordingSink {
    pub fn calls(&self) -> Vec<TriggerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_for(&self, record: RecordId) {
        self.failing.lock().unwrap().push(record);
    }

    pub fn reject_kind(&self, kind: DatagramKind) {
        self.rejected.lock().unwrap().push(kind);
    }
}

impl TriggerSink for RecordingSink {
    fn supports(&self, kind: DatagramKind) -> bool {
        !self.rejected.lock().unwrap().contains(&kind)
    }

    fn on_record_trigger(
        &self,
        player: &Player,
        record: RecordId,
        params: &TriggerParams,
    ) -> Result<(), TriggerError> {
        self.calls.lock().unwrap().push(TriggerCall {
            player: player.id,
            record,
            params: params.clone(),
        });
        if self.failing.lock().unwrap().contains(&record) {
            return Err(TriggerError::Failed(format!("record {record} script error")));
        }
        Ok(())
    }
}

pub struct FailingStore;

impl RecordLogStore for FailingStore {
    fn save(&self, _player: &PlayerId, _snapshot: &RecordLogSnapshot) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("database offline".into()))
    }

    fn load(&self, _player: &PlayerId) -> Result<Option<RecordLogSnapshot>, StoreError> {
        Err(StoreError::Unavailable("database offline".into()))
    }
}

pub struct Harness {
    pub system: RecordSystem,
    pub notices: Arc<NotificationLog>,
    pub store: Arc<InMemoryRecordStore>,
    pub sink: Arc<RecordingSink>,
    pub clock: Arc<MockClock>,
}

impl Harness {
    pub fn new(catalog: RecordCatalog) -> Self {
        Self::with_config(catalog, SystemConfig::enabled())
    }

    pub fn with_config(catalog: RecordCatalog, config: SystemConfig) -> Self {
        Self::build(catalog, config, None)
    }

    pub fn with_failing_store(catalog: RecordCatalog) -> Self {
        let store: Arc<dyn RecordLogStore> = Arc::new(FailingStore);
        Self::build(catalog, SystemConfig::enabled(), Some(store))
    }

    fn build(
        catalog: RecordCatalog,
        config: SystemConfig,
        store_override: Option<Arc<dyn RecordLogStore>>,
    ) -> Self {
        let notices = Arc::new(NotificationLog::new());
        let store = Arc::new(InMemoryRecordStore::new());
        let sink = Arc::new(RecordingSink::default());
        let clock = Arc::new(MockClock(Mutex::new(start_time())));

        let collaborators = Collaborators {
            notifier: notices.clone(),
            store: store_override.unwrap_or_else(|| store.clone() as Arc<dyn RecordLogStore>),
            sink: sink.clone(),
            clock: clock.clone(),
        };

        Self {
            system: RecordSystem::new(config, catalog, collaborators),
            notices,
            store,
            sink,
            clock,
        }
    }

    /// A player character last seen at the harness's current time.
    pub fn player(&self) -> Player {
        Player::new("Lion", self.now())
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn set_now(&self, now: DateTime<Utc>) {
        *self.clock.0.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        let now = self.now();
        self.set_now(now + by);
    }

    /// Drain notifications pushed so far, dropping player IDs.
    pub fn notifications(&self) -> Vec<Notification> {
        self.notices.take().into_iter().map(|(_, n)| n).collect()
    }
}
