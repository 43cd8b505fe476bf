// Event Dispatch
//
// Routes a gameplay event to every record the player holds that subscribes
// to it, handing each one to the external trigger sink. Sink failures are
// logged per record and never stop delivery to the rest.

use serde::{Deserialize, Serialize};

use crate::catalog::EventType;
use crate::player::{EntityRef, Player};
use crate::record::RecordId;
use crate::system::RecordSystem;

/// Kind tag of a datagram value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatagramKind {
    Integer,
    Entity,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatagramValue {
    Integer(u32),
    Entity(EntityRef),
    Text(String),
}

impl DatagramValue {
    pub fn kind(&self) -> DatagramKind {
        match self {
            DatagramValue::Integer(_) => DatagramKind::Integer,
            DatagramValue::Entity(_) => DatagramKind::Entity,
            DatagramValue::Text(_) => DatagramKind::Text,
        }
    }
}

/// One named value of event context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datagram {
    pub key: String,
    pub value: DatagramValue,
}

impl Datagram {
    pub fn integer(key: impl Into<String>, value: u32) -> Self {
        Self {
            key: key.into(),
            value: DatagramValue::Integer(value),
        }
    }

    pub fn entity(key: impl Into<String>, entity: EntityRef) -> Self {
        Self {
            key: key.into(),
            value: DatagramValue::Entity(entity),
        }
    }

    pub fn text(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: DatagramValue::Text(text.into()),
        }
    }
}

/// Arguments of one trigger invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TriggerParams {
    pub progress: u32,
    pub values: Vec<Datagram>,
}

impl TriggerParams {
    pub fn get(&self, key: &str) -> Option<&DatagramValue> {
        self.values.iter().find(|d| d.key == key).map(|d| &d.value)
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TriggerError {
    #[error("trigger handler is not registered")]
    Unavailable,

    #[error("trigger handler failed: {0}")]
    Failed(String),
}

/// External logic run when an active record's event fires.
pub trait TriggerSink: Send + Sync {
    /// Whether values of `kind` can be passed to the handler.
    fn supports(&self, _kind: DatagramKind) -> bool {
        true
    }

    fn on_record_trigger(
        &self,
        player: &Player,
        record: RecordId,
        params: &TriggerParams,
    ) -> Result<(), TriggerError>;
}

/// Sink that accepts every trigger and does nothing.
#[derive(Debug, Default)]
pub struct NullSink;

impl TriggerSink for NullSink {
    fn on_record_trigger(
        &self,
        _player: &Player,
        _record: RecordId,
        _params: &TriggerParams,
    ) -> Result<(), TriggerError> {
        Ok(())
    }
}

impl RecordSystem {
    /// Deliver `event` to every record `player` holds that subscribes to it.
    ///
    /// Returns whether any record matched, regardless of how the sink fared.
    pub fn dispatch(
        &self,
        event: EventType,
        player: Option<&Player>,
        payload: &[Datagram],
    ) -> bool {
        if !self.config.enabled {
            return false;
        }
        let Some(player) = player else {
            return false;
        };
        if !player.is_controllable_character() {
            return false;
        }

        let mut interested = player
            .log
            .active_map()
            .intersection(self.catalog.trigger_bitmap_for(event));
        if interested.none() {
            return false;
        }

        for &record in player.log.slots() {
            if record != 0 && interested.test(record) {
                interested.reset(record);
                self.call_trigger(player, record, payload);
            }
        }
        true
    }

    /// Single-datagram form of [`RecordSystem::dispatch`].
    pub fn dispatch_one(
        &self,
        event: EventType,
        player: Option<&Player>,
        datagram: Datagram,
    ) -> bool {
        self.dispatch(event, player, std::slice::from_ref(&datagram))
    }

    /// Invoke the sink for one record with the player's current progress.
    pub(crate) fn call_trigger(&self, player: &Player, record: RecordId, payload: &[Datagram]) {
        let mut params = TriggerParams {
            progress: player.log.progress_of(record),
            values: Vec::with_capacity(payload.len()),
        };

        for datagram in payload {
            if self.sink.supports(datagram.value.kind()) {
                params.values.push(datagram.clone());
            } else {
                tracing::warn!(
                    record,
                    key = %datagram.key,
                    kind = ?datagram.value.kind(),
                    "unhandled datagram kind for record trigger"
                );
            }
        }

        if let Err(err) = self.sink.on_record_trigger(player, record, &params) {
            tracing::error!(player = %player.id, record, error = %err, "record trigger failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RecordCatalog;
    use crate::config::SystemConfig;
    use crate::player::EntityKind;
    use crate::testing::{catalog_with, Harness, RecordSpec};

    fn catalog() -> RecordCatalog {
        catalog_with(&[
            RecordSpec::new(5).trigger(EventType::MobKill),
            RecordSpec::new(7).trigger(EventType::MobKill),
            RecordSpec::new(9).trigger(EventType::LootItem),
            RecordSpec::new(11),
        ])
    }

    fn mob() -> EntityRef {
        EntityRef {
            id: 17_000_001,
            kind: EntityKind::Mob,
        }
    }

    #[test]
    fn only_active_subscribed_records_fire() {
        let h = Harness::new(catalog());
        let mut player = h.player();
        for record in [5, 9, 11] {
            h.system.add_record(&mut player, record);
        }
        h.system.set_progress(&mut player, 5, 4);

        let payload = [Datagram::entity("mob", mob()), Datagram::integer("count", 2)];
        assert!(h.system.dispatch(EventType::MobKill, Some(&player), &payload));

        let calls = h.sink.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].player, player.id);
        assert_eq!(calls[0].record, 5);
        assert_eq!(calls[0].params.progress, 4);
        assert_eq!(calls[0].params.values, payload.to_vec());
        assert_eq!(calls[0].params.get("count"), Some(&DatagramValue::Integer(2)));
    }

    #[test]
    fn disjoint_sets_return_false() {
        let h = Harness::new(catalog());
        let mut player = h.player();
        h.system.add_record(&mut player, 11);

        assert!(!h.system.dispatch(EventType::MobKill, Some(&player), &[]));
        assert!(!h.system.dispatch(EventType::Talk, Some(&player), &[]));
        assert!(h.sink.calls().is_empty());
    }

    #[test]
    fn fires_in_slot_order() {
        let h = Harness::new(catalog());
        let mut player = h.player();
        h.system.add_record(&mut player, 7);
        h.system.add_record(&mut player, 5);

        assert!(h.system.dispatch_one(
            EventType::MobKill,
            Some(&player),
            Datagram::entity("mob", mob())
        ));

        let fired: Vec<RecordId> = h.sink.calls().iter().map(|c| c.record).collect();
        assert_eq!(fired, vec![7, 5]);
    }

    #[test]
    fn sink_failure_does_not_stop_other_records() {
        let h = Harness::new(catalog());
        let mut player = h.player();
        h.system.add_record(&mut player, 5);
        h.system.add_record(&mut player, 7);
        h.sink.fail_for(5);

        assert!(h.system.dispatch(EventType::MobKill, Some(&player), &[]));

        let fired: Vec<RecordId> = h.sink.calls().iter().map(|c| c.record).collect();
        assert_eq!(fired, vec![5, 7]);
        assert!(h.system.has_record(&player, 5));
    }

    #[test]
    fn unsupported_datagrams_are_skipped() {
        let h = Harness::new(catalog());
        let mut player = h.player();
        h.system.add_record(&mut player, 5);
        h.sink.reject_kind(DatagramKind::Entity);

        let payload = [
            Datagram::entity("mob", mob()),
            Datagram::text("zone", "West Ronfaure"),
        ];
        assert!(h.system.dispatch(EventType::MobKill, Some(&player), &payload));

        let calls = h.sink.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].params.values, vec![Datagram::text("zone", "West Ronfaure")]);
    }

    #[test]
    fn gated_by_player_and_enable_flag() {
        let h = Harness::new(catalog());
        let mut player = h.player();
        h.system.add_record(&mut player, 5);

        assert!(!h.system.dispatch(EventType::MobKill, None, &[]));

        let mut pet = player.clone();
        pet.kind = EntityKind::Pet;
        assert!(!h.system.dispatch(EventType::MobKill, Some(&pet), &[]));

        let disabled = Harness::with_config(catalog(), SystemConfig::default());
        assert!(!disabled.system.dispatch(EventType::MobKill, Some(&player), &[]));

        assert!(h.sink.calls().is_empty());
        assert!(disabled.sink.calls().is_empty());
    }

    #[test]
    fn timed_slot_record_is_dispatched() {
        let catalog = crate::testing::catalog_with_schedule(
            &[RecordSpec::new(4008).trigger(EventType::LevelUp).flags(&["timed"])],
            &[(3, 2, 4008)],
        );
        let h = Harness::new(catalog);
        let mut player = h.player();
        h.system.rotate_timed_record(&mut player);

        assert!(h.system.dispatch(EventType::LevelUp, Some(&player), &[]));
        assert_eq!(h.sink.calls()[0].record, 4008);
    }
}
