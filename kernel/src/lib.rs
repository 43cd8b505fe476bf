// Records of Eminence Kernel
//
// Per-player objective tracking, event routing to record triggers and
// timezone-anchored daily / four-hour record rotation.

pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod invariants;
pub mod log;
pub mod notify;
pub mod player;
pub mod record;
pub mod schedule;
pub mod system;

#[cfg(test)]
pub(crate) mod testing;

pub use crate::catalog::{EventType, RecordCatalog};
pub use crate::player::{Player, PlayerId};
pub use crate::record::RecordId;
pub use crate::system::{Collaborators, RecordSystem};
