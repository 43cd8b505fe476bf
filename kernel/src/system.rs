// Record System
//
// Owns the loaded catalog and the injected collaborators, and applies
// record policy on top of the pure `PlayerRecordLog` operations: who may
// take what, which client updates to request, and when to persist.
//
// Event dispatch lives in `dispatch`, reset scheduling in `schedule`.

use std::sync::Arc;

use crate::catalog::RecordCatalog;
use crate::config::SystemConfig;
use crate::dispatch::TriggerSink;
use crate::log::store::RecordLogStore;
use crate::log::{ProgressUpdate, TakeOutcome};
use crate::notify::{MessageKind, Notification, Notifier, COMPLETION_PAGES};
use crate::player::Player;
use crate::record::RecordId;
use crate::schedule::clock::Clock;

/// External services the record system talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub notifier: Arc<dyn Notifier>,
    pub store: Arc<dyn RecordLogStore>,
    pub sink: Arc<dyn TriggerSink>,
    pub clock: Arc<dyn Clock>,
}

pub struct RecordSystem {
    pub(crate) config: SystemConfig,
    pub(crate) catalog: Arc<RecordCatalog>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) store: Arc<dyn RecordLogStore>,
    pub(crate) sink: Arc<dyn TriggerSink>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl RecordSystem {
    pub fn new(config: SystemConfig, catalog: RecordCatalog, collaborators: Collaborators) -> Self {
        Self {
            config,
            catalog: Arc::new(catalog),
            notifier: collaborators.notifier,
            store: collaborators.store,
            sink: collaborators.sink,
            clock: collaborators.clock,
        }
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn catalog(&self) -> &RecordCatalog {
        &self.catalog
    }

    /// Swap in a freshly built catalog. Player logs are left untouched.
    pub fn reload_catalog(&mut self, catalog: RecordCatalog) {
        self.catalog = Arc::new(catalog);
        tracing::info!("record catalog reloaded");
    }

    /// Take a record into the first free general slot.
    ///
    /// Unimplemented records are refused with a message to the player.
    /// Completed non-repeatable records, timed records and records already
    /// held are refused silently.
    pub fn add_record(&self, player: &mut Player, record: RecordId) -> bool {
        if !self.catalog.is_implemented(record) {
            self.notifier.notify(
                &player.id,
                Notification::SystemText {
                    text: format!("The record #{record} is not implemented at this time."),
                },
            );
            return false;
        }

        if player.log.is_completed(record) && !self.catalog.is_repeatable(record) {
            return false;
        }

        if self.catalog.is_timed(record) {
            return false;
        }

        match player.log.take(record) {
            TakeOutcome::Taken { slot } => {
                tracing::debug!(player = %player.id, record, slot, "record taken");
                self.notifier.notify(&player.id, Notification::LogUpdate);
                self.notifier.notify(
                    &player.id,
                    Notification::Message {
                        record,
                        kind: MessageKind::Start,
                    },
                );
                self.persist(player);
                true
            }
            TakeOutcome::AlreadyActive | TakeOutcome::Full => false,
        }
    }

    /// Drop a record from the general slots, keeping the list compact.
    pub fn del_record(&self, player: &mut Player, record: RecordId) -> bool {
        if !player.log.drop_record(record) {
            return false;
        }
        tracing::debug!(player = %player.id, record, "record dropped");
        self.notifier.notify(&player.id, Notification::LogUpdate);
        self.persist(player);
        true
    }

    pub fn has_record(&self, player: &Player, record: RecordId) -> bool {
        player.log.has(record)
    }

    /// Progress of an active record; `0` when not active.
    pub fn get_progress(&self, player: &Player, record: RecordId) -> u32 {
        player.log.progress_of(record)
    }

    /// Store progress for an active record.
    ///
    /// Writing the value already stored succeeds without side effects.
    pub fn set_progress(&self, player: &mut Player, record: RecordId, value: u32) -> bool {
        match player.log.update_progress(record, value) {
            ProgressUpdate::NotActive => false,
            ProgressUpdate::Unchanged => true,
            ProgressUpdate::Changed => {
                self.notifier.notify(&player.id, Notification::LogUpdate);
                self.persist_nice(player);
                true
            }
        }
    }

    pub fn get_completion(&self, player: &Player, record: RecordId) -> bool {
        player.log.is_completed(record)
    }

    pub fn set_completion(&self, player: &mut Player, record: RecordId, completed: bool) {
        player.log.set_completed(record, completed);
        self.notify_completion(player);
        self.persist(player);
    }

    /// Final write when the player leaves.
    pub fn on_logout(&self, player: &mut Player) {
        self.persist(player);
    }

    pub(crate) fn notify_completion(&self, player: &Player) {
        for page in 0..COMPLETION_PAGES {
            self.notifier.notify(&player.id, Notification::CompletionPage { page });
        }
    }

    /// Write the player's log now. Storage failures are logged only.
    pub(crate) fn persist(&self, player: &mut Player) {
        let snapshot = player.log.snapshot();
        if let Err(err) = self.store.save(&player.id, &snapshot) {
            tracing::error!(player = %player.id, error = %err, "failed to save record log");
        }
        player.log.mark_saved(self.clock.now());
    }

    /// Write the player's log unless it was written within the save interval.
    pub(crate) fn persist_nice(&self, player: &mut Player) {
        if player.log.save_due(self.clock.now(), self.config.save_interval()) {
            self.persist(player);
        }
    }
}
