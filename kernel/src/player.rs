// Player Model
//
// The slice of a host character that the record system reads and mutates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::log::{PlayerRecordLog, RecordLogSnapshot};

/// Stable identifier for a player character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// Kind of game entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Player-controlled character.
    Pc,
    Npc,
    Mob,
    Pet,
    Trust,
}

/// Reference to a non-player entity carried in event payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: u32,
    pub kind: EntityKind,
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub kind: EntityKind,
    pub last_online: DateTime<Utc>,
    pub log: PlayerRecordLog,
}

impl Player {
    /// Fresh character with an empty record log.
    pub fn new(name: impl Into<String>, last_online: DateTime<Utc>) -> Self {
        Self {
            id: PlayerId::new(),
            name: name.into(),
            kind: EntityKind::Pc,
            last_online,
            log: PlayerRecordLog::new(),
        }
    }

    /// Hydrate a character from its persisted record log.
    pub fn from_snapshot(
        id: PlayerId,
        name: impl Into<String>,
        last_online: DateTime<Utc>,
        snapshot: &RecordLogSnapshot,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            kind: EntityKind::Pc,
            last_online,
            log: PlayerRecordLog::from_snapshot(snapshot),
        }
    }

    /// Whether this entity can own an active record log.
    pub fn is_controllable_character(&self) -> bool {
        self.kind == EntityKind::Pc
    }
}
