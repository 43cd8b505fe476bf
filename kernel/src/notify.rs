// Client Notifications
//
// Requests for the host to push record state or messages to a player.
// Encoding them into packets is the host's business.

use std::sync::Mutex;

use serde::Serialize;

use crate::player::PlayerId;
use crate::record::RecordId;

/// Number of pages the completion set is pushed in.
pub const COMPLETION_PAGES: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// A record was taken.
    Start,
    /// A new timed record became active.
    TimedNew,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Active slots or progress changed.
    LogUpdate,

    /// One page of the completion set changed.
    CompletionPage { page: u8 },

    /// Basic system message about a record.
    Message { record: RecordId, kind: MessageKind },

    /// Free-form text from the record system.
    SystemText { text: String },
}

pub trait Notifier: Send + Sync {
    fn notify(&self, player: &PlayerId, notification: Notification);
}

/// Discards every notification.
#[derive(Debug, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _player: &PlayerId, _notification: Notification) {}
}

/// Records notifications in memory, in push order.
#[derive(Debug, Default)]
pub struct NotificationLog {
    entries: Mutex<Vec<(PlayerId, Notification)>>,
}

impl NotificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything pushed so far.
    pub fn take(&self) -> Vec<(PlayerId, Notification)> {
        match self.entries.lock() {
            Ok(mut entries) => std::mem::take(&mut *entries),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Notifier for NotificationLog {
    fn notify(&self, player: &PlayerId, notification: Notification) {
        match self.entries.lock() {
            Ok(mut entries) => entries.push((*player, notification)),
            Err(poisoned) => poisoned.into_inner().push((*player, notification)),
        }
    }
}
