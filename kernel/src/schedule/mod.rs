// Reset Scheduling
//
// Daily and four-hour record rotation anchored to the scheduling timezone.
// Applied reactively when a character loads and proactively by periodic
// world ticks over every online player.

pub mod clock;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalog::{BLOCKS_PER_DAY, DAYS_PER_WEEK};
use crate::dispatch::Datagram;
use crate::notify::{MessageKind, Notification};
use crate::player::Player;
use crate::record::RecordId;
use crate::system::RecordSystem;
use clock::local_calendar;

/// Host primitive for visiting online players.
///
/// Implementations guarantee that a visited player is not torn down while
/// the callback runs.
pub trait PlayerRoster {
    fn for_each_player(&mut self, visit: &mut dyn FnMut(&mut Player));
}

impl PlayerRoster for Vec<Player> {
    fn for_each_player(&mut self, visit: &mut dyn FnMut(&mut Player)) {
        self.iter_mut().for_each(|player| visit(player));
    }
}

/// What happened while loading a character.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadOutcome {
    pub daily_reset: bool,
    pub timed_rotated: bool,
    /// The client should be told about a new timed record.
    pub notify_timed_record: bool,
}

impl RecordSystem {
    /// Timed record scheduled for the current local day and block.
    pub fn active_timed_record(&self) -> RecordId {
        self.timed_record_at(self.clock.now())
    }

    pub fn timed_record_at(&self, now: DateTime<Utc>) -> RecordId {
        let cal = local_calendar(now, self.config.utc_offset());
        let day = cal.weekday as usize % DAYS_PER_WEEK;
        let block = cal.block() as usize % BLOCKS_PER_DAY;
        self.catalog.schedule().get(day, block)
    }

    /// Replace the timed slot with the currently scheduled timed record.
    ///
    /// A newly active timed record always starts uncompleted.
    pub fn rotate_timed_record(&self, player: &mut Player) {
        let record = self.active_timed_record();
        player.log.place_timed(record, self.catalog.timed_bitmap());
        self.notifier.notify(&player.id, Notification::LogUpdate);
        tracing::debug!(player = %player.id, record, "timed record rotated");

        if record != 0 {
            self.notifier.notify(
                &player.id,
                Notification::Message {
                    record,
                    kind: MessageKind::TimedNew,
                },
            );
            self.set_completion(player, record, false);
        }
    }

    /// Reset progress and completion of every daily record.
    pub fn clear_daily_records(&self, player: &mut Player) {
        let catalog = &self.catalog;
        player.log.reset_progress_where(|record| catalog.is_daily(record));
        self.notifier.notify(&player.id, Notification::LogUpdate);

        for &record in catalog.daily_ids() {
            player.log.set_completed(record, false);
        }
        self.persist(player);
        self.notify_completion(player);
        tracing::debug!(player = %player.id, "daily records cleared");
    }

    /// Prepare a freshly hydrated character.
    ///
    /// Rebuilds the active bitmap, then applies any daily or timed reset the
    /// player missed while offline. Resets only apply once the unlock record
    /// is complete.
    pub fn on_character_load(&self, player: &mut Player) -> LoadOutcome {
        let mut outcome = LoadOutcome::default();
        if !self.config.enabled {
            return outcome;
        }

        player.log.rebuild_active_map();
        player.log.reset_save_clock();

        if !player.log.is_completed(self.config.unlock_record) {
            return outcome;
        }

        let now = self.clock.now();
        let cal = local_calendar(now, self.config.utc_offset());

        if player.last_online < cal.midnight {
            self.clear_daily_records(player);
            outcome.daily_reset = true;
        }

        let scheduled = self.timed_record_at(now);
        if player.last_online < cal.block_start || player.log.timed_record() != scheduled {
            outcome.notify_timed_record = scheduled != 0;
            player.log.set_notify_timed_record(outcome.notify_timed_record);
            self.rotate_timed_record(player);
            outcome.timed_rotated = true;
        }

        outcome
    }

    /// Fire a retroactive record as soon as it is taken.
    pub fn on_record_taken(&self, player: &Player, record: RecordId) {
        if !self.config.enabled {
            return;
        }
        if self.catalog.is_retroactive(record) {
            self.call_trigger(player, record, &[]);
        }
    }

    /// Player-initiated claim of a held record.
    pub fn on_record_claim(&self, player: &Player, record: RecordId) -> bool {
        if !self.config.enabled || !player.log.has(record) {
            return false;
        }
        self.call_trigger(player, record, &[Datagram::integer("claim", 1)]);
        true
    }

    /// Rotate the timed record for every unlocked online player.
    pub fn cycle_timed_records(&self, roster: &mut dyn PlayerRoster) {
        if !self.config.enabled {
            return;
        }
        let unlock = self.config.unlock_record;
        roster.for_each_player(&mut |player| {
            if player.log.is_completed(unlock) {
                self.rotate_timed_record(player);
            }
        });
    }

    /// Clear daily records for every unlocked online player.
    pub fn cycle_daily_records(&self, roster: &mut dyn PlayerRoster) {
        if !self.config.enabled {
            return;
        }
        let unlock = self.config.unlock_record;
        roster.for_each_player(&mut |player| {
            if player.log.is_completed(unlock) {
                self.clear_daily_records(player);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EventType, RecordCatalog};
    use crate::config::SystemConfig;
    use crate::dispatch::DatagramValue;
    use crate::invariants::InvariantEngine;
    use crate::log::TIMED_SLOT;
    use crate::notify::COMPLETION_PAGES;
    use crate::testing::{catalog_with_schedule, utc, Harness, RecordSpec};
    use chrono::Duration;

    // The harness clock starts on Tuesday 05:30 JST: day 3, block 2.
    fn catalog() -> RecordCatalog {
        catalog_with_schedule(
            &[
                RecordSpec::new(1),
                RecordSpec::new(12).flags(&["daily", "repeat"]),
                RecordSpec::new(13).flags(&["daily"]),
                RecordSpec::new(20).trigger(EventType::MobKill),
                RecordSpec::new(21).flags(&["retro"]),
                RecordSpec::new(77).flags(&["timed"]),
                RecordSpec::new(78).flags(&["timed"]),
            ],
            &[(3, 2, 77), (3, 3, 78)],
        )
    }

    fn unlocked(h: &Harness) -> Player {
        let mut player = h.player();
        player.log.set_completed(1, true);
        player
    }

    #[test]
    fn schedule_lookup_covers_the_whole_block() {
        let h = Harness::new(catalog());

        // Tuesday 04:00-07:59 JST.
        for hour in 4..8 {
            let now = utc(2024, 1, 1, 19, 0, 0) + Duration::hours(hour - 4);
            assert_eq!(h.system.timed_record_at(now), 77, "hour {hour}");
        }
        assert_eq!(h.system.timed_record_at(utc(2024, 1, 1, 18, 59, 59)), 0);
        assert_eq!(h.system.timed_record_at(utc(2024, 1, 1, 23, 0, 0)), 78);
        assert_eq!(h.system.active_timed_record(), 77);
    }

    #[test]
    fn rotation_installs_uncompleted_timed_record() {
        let h = Harness::new(catalog());
        let mut player = unlocked(&h);
        player.log.set_completed(77, true);

        h.system.rotate_timed_record(&mut player);

        assert_eq!(player.log.slots()[TIMED_SLOT], 77);
        assert!(player.log.has(77));
        assert!(!player.log.is_completed(77));
        let notes = h.notifications();
        assert_eq!(notes[0], Notification::LogUpdate);
        assert_eq!(
            notes[1],
            Notification::Message {
                record: 77,
                kind: MessageKind::TimedNew
            }
        );
        assert_eq!(h.store.writes(), 1);
    }

    #[test]
    fn rotation_to_empty_block_clears_timed_slot() {
        let h = Harness::new(catalog());
        let mut player = unlocked(&h);
        h.system.rotate_timed_record(&mut player);
        h.system.set_progress(&mut player, 77, 9);
        h.notifications();

        h.set_now(utc(2024, 1, 1, 15, 0, 0));
        h.system.rotate_timed_record(&mut player);

        assert_eq!(player.log.timed_record(), 0);
        assert_eq!(player.log.slot_progress()[TIMED_SLOT], 0);
        assert!(!player.log.has(77));
        assert_eq!(h.notifications(), vec![Notification::LogUpdate]);
    }

    #[test]
    fn daily_clear_touches_only_daily_records() {
        let h = Harness::new(catalog());
        let mut player = unlocked(&h);
        for record in [12, 20] {
            h.system.add_record(&mut player, record);
            h.system.set_progress(&mut player, record, 5);
        }
        player.log.set_completed(13, true);
        player.log.set_completed(20, true);
        h.notifications();
        let writes = h.store.writes();

        h.system.clear_daily_records(&mut player);

        assert_eq!(h.system.get_progress(&player, 12), 0);
        assert_eq!(h.system.get_progress(&player, 20), 5);
        assert!(!player.log.is_completed(13));
        assert!(player.log.is_completed(20));
        assert!(player.log.is_completed(1));
        assert!(player.log.has(12));

        assert_eq!(h.store.writes(), writes + 1);
        let mut expected = vec![Notification::LogUpdate];
        expected.extend((0..COMPLETION_PAGES).map(|page| Notification::CompletionPage { page }));
        assert_eq!(h.notifications(), expected);
    }

    #[test]
    fn daily_clear_leaves_timed_slot_progress() {
        let catalog = catalog_with_schedule(
            &[RecordSpec::new(1), RecordSpec::new(79).flags(&["daily", "timed"])],
            &[(3, 2, 79)],
        );
        let h = Harness::new(catalog);
        let mut player = unlocked(&h);
        h.system.rotate_timed_record(&mut player);
        h.system.set_progress(&mut player, 79, 6);

        h.system.clear_daily_records(&mut player);

        assert_eq!(player.log.timed_record(), 79);
        assert_eq!(player.log.slot_progress()[TIMED_SLOT], 6);
    }

    #[test]
    fn load_rebuilds_bitmap_without_unlock() {
        let h = Harness::new(catalog());
        let mut stored = h.player();
        stored.log.take(20);
        let mut player = Player::from_snapshot(
            stored.id,
            "Ayame",
            utc(2023, 12, 1, 0, 0, 0),
            &stored.log.snapshot(),
        );

        let outcome = h.system.on_character_load(&mut player);

        assert_eq!(outcome, LoadOutcome::default());
        assert!(player.log.has(20));
        assert_eq!(player.log.timed_record(), 0);
        assert!(h.notifications().is_empty());
    }

    #[test]
    fn load_after_a_day_away_resets_everything() {
        let h = Harness::new(catalog());
        let mut player = unlocked(&h);
        h.system.add_record(&mut player, 12);
        h.system.set_progress(&mut player, 12, 3);
        player.last_online = utc(2023, 12, 30, 0, 0, 0);

        let outcome = h.system.on_character_load(&mut player);

        assert!(outcome.daily_reset);
        assert!(outcome.timed_rotated);
        assert!(outcome.notify_timed_record);
        assert!(player.log.notify_timed_record());
        assert_eq!(h.system.get_progress(&player, 12), 0);
        assert_eq!(player.log.timed_record(), 77);
        InvariantEngine::with_defaults()
            .evaluate(h.system.catalog(), &player.log)
            .unwrap();
    }

    #[test]
    fn load_within_block_keeps_state() {
        let h = Harness::new(catalog());
        let mut player = unlocked(&h);
        h.system.rotate_timed_record(&mut player);
        h.system.set_progress(&mut player, 77, 2);
        player.last_online = h.now() - Duration::minutes(10);
        h.notifications();

        let outcome = h.system.on_character_load(&mut player);

        assert_eq!(outcome, LoadOutcome::default());
        assert_eq!(h.system.get_progress(&player, 77), 2);
        assert!(h.notifications().is_empty());
    }

    #[test]
    fn load_same_day_earlier_block_rotates_only_timed() {
        let h = Harness::new(catalog());
        let mut player = unlocked(&h);
        h.system.add_record(&mut player, 12);
        h.system.set_progress(&mut player, 12, 3);
        // 02:00 JST the same Tuesday.
        player.last_online = utc(2024, 1, 1, 17, 0, 0);

        let outcome = h.system.on_character_load(&mut player);

        assert!(!outcome.daily_reset);
        assert!(outcome.timed_rotated);
        assert_eq!(h.system.get_progress(&player, 12), 3);
    }

    #[test]
    fn load_with_stale_timed_slot_rotates() {
        let h = Harness::new(catalog());
        let mut player = unlocked(&h);
        h.set_now(utc(2024, 1, 1, 23, 0, 0));
        h.system.rotate_timed_record(&mut player);
        assert_eq!(player.log.timed_record(), 78);

        h.set_now(utc(2024, 1, 1, 20, 30, 0));
        player.last_online = h.now();
        let outcome = h.system.on_character_load(&mut player);

        assert!(outcome.timed_rotated);
        assert_eq!(player.log.timed_record(), 77);
        assert!(!player.log.has(78));
    }

    #[test]
    fn load_into_empty_block_does_not_notify() {
        let h = Harness::new(catalog());
        let mut player = unlocked(&h);
        h.set_now(utc(2024, 1, 2, 3, 0, 0));
        player.last_online = utc(2024, 1, 1, 23, 0, 0);

        let outcome = h.system.on_character_load(&mut player);

        assert!(outcome.timed_rotated);
        assert!(!outcome.notify_timed_record);
        assert_eq!(player.log.timed_record(), 0);
    }

    #[test]
    fn load_is_noop_when_disabled() {
        let h = Harness::with_config(catalog(), SystemConfig::default());
        let mut player = unlocked(&h);
        player.log.take(20);
        player.last_online = utc(2020, 1, 1, 0, 0, 0);

        assert_eq!(h.system.on_character_load(&mut player), LoadOutcome::default());
        assert_eq!(player.log.timed_record(), 0);
    }

    #[test]
    fn retroactive_record_fires_on_take() {
        let h = Harness::new(catalog());
        let mut player = unlocked(&h);
        h.system.add_record(&mut player, 21);
        h.system.add_record(&mut player, 20);

        h.system.on_record_taken(&player, 21);
        h.system.on_record_taken(&player, 20);

        let calls = h.sink.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].record, 21);
        assert!(calls[0].params.values.is_empty());
    }

    #[test]
    fn claim_requires_holding_the_record() {
        let h = Harness::new(catalog());
        let mut player = unlocked(&h);

        assert!(!h.system.on_record_claim(&player, 20));

        h.system.add_record(&mut player, 20);
        assert!(h.system.on_record_claim(&player, 20));

        let calls = h.sink.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].params.get("claim"), Some(&DatagramValue::Integer(1)));
    }

    #[test]
    fn cycles_skip_locked_players() {
        let h = Harness::new(catalog());
        let mut online = vec![unlocked(&h), h.player()];
        for player in online.iter_mut() {
            h.system.add_record(player, 12);
            h.system.set_progress(player, 12, 4);
        }

        h.system.cycle_timed_records(&mut online);
        h.system.cycle_daily_records(&mut online);

        assert_eq!(online[0].log.timed_record(), 77);
        assert_eq!(online[0].log.progress_of(12), 0);
        assert_eq!(online[1].log.timed_record(), 0);
        assert_eq!(online[1].log.progress_of(12), 4);
    }

    #[test]
    fn cycles_are_noops_when_disabled() {
        let h = Harness::with_config(catalog(), SystemConfig::default());
        let mut online = vec![unlocked(&h)];

        h.system.cycle_timed_records(&mut online);
        h.system.cycle_daily_records(&mut online);

        assert_eq!(online[0].log.timed_record(), 0);
        assert!(h.notifications().is_empty());
    }
}
