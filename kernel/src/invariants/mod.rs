// Invariant Framework
//
// Invariants are pure rules that must hold for every player record log
// between operations. They are evaluated when auditing logs hydrated from
// storage, where corruption would otherwise go unnoticed until a client
// shows a broken objective list.

use crate::catalog::RecordCatalog;
use crate::log::{PlayerRecordLog, GENERAL_SLOTS, SLOT_COUNT};
use crate::record::RecordBitmap;

/// Result of invariant evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantResult {
    Pass,
    Fail(String),
}

/// Trait implemented by all invariants.
///
/// Invariants must be:
/// - Pure
/// - Deterministic
/// - Side-effect free
pub trait Invariant: Send + Sync {
    fn name(&self) -> &'static str;

    fn validate(&self, catalog: &RecordCatalog, log: &PlayerRecordLog) -> InvariantResult;
}

/// Invariant engine that evaluates a set of invariants.
#[derive(Default)]
pub struct InvariantEngine {
    invariants: Vec<Box<dyn Invariant>>,
}

impl InvariantEngine {
    /// Create a new invariant engine.
    pub fn new() -> Self {
        Self {
            invariants: Vec::new(),
        }
    }

    /// Engine preloaded with every built-in record log invariant.
    pub fn with_defaults() -> Self {
        let mut engine = Self::new();
        engine.register(UniqueSlots);
        engine.register(CompactGeneralSlots);
        engine.register(ActiveMapMatchesSlots);
        engine.register(NoTimedInGeneralSlots);
        engine.register(NoProgressOnEmptySlots);
        engine
    }

    /// Register an invariant.
    pub fn register<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Evaluate all invariants.
    ///
    /// Stops at the first failure.
    pub fn evaluate(
        &self,
        catalog: &RecordCatalog,
        log: &PlayerRecordLog,
    ) -> Result<(), InvariantViolation> {
        for invariant in &self.invariants {
            if let InvariantResult::Fail(reason) = invariant.validate(catalog, log) {
                return Err(InvariantViolation {
                    invariant: invariant.name(),
                    reason,
                });
            }
        }
        Ok(())
    }

    /// Evaluate all invariants and collect every failure.
    pub fn audit(&self, catalog: &RecordCatalog, log: &PlayerRecordLog) -> Vec<InvariantViolation> {
        self.invariants
            .iter()
            .filter_map(|invariant| match invariant.validate(catalog, log) {
                InvariantResult::Pass => None,
                InvariantResult::Fail(reason) => Some(InvariantViolation {
                    invariant: invariant.name(),
                    reason,
                }),
            })
            .collect()
    }
}

/// Returned when an invariant is violated.
#[derive(Debug, thiserror::Error)]
#[error("invariant `{invariant}` violated: {reason}")]
pub struct InvariantViolation {
    pub invariant: &'static str,
    pub reason: String,
}

/// A record occupies at most one slot.
pub struct UniqueSlots;

impl Invariant for UniqueSlots {
    fn name(&self) -> &'static str {
        "unique-slots"
    }

    fn validate(&self, _catalog: &RecordCatalog, log: &PlayerRecordLog) -> InvariantResult {
        let mut seen = RecordBitmap::new();
        for (slot, &record) in log.slots().iter().enumerate() {
            if record == 0 {
                continue;
            }
            if seen.test(record) {
                return InvariantResult::Fail(format!("record {record} repeated in slot {slot}"));
            }
            seen.set(record);
        }
        InvariantResult::Pass
    }
}

/// Empty general slots only trail the occupied ones.
pub struct CompactGeneralSlots;

impl Invariant for CompactGeneralSlots {
    fn name(&self) -> &'static str {
        "compact-general-slots"
    }

    fn validate(&self, _catalog: &RecordCatalog, log: &PlayerRecordLog) -> InvariantResult {
        let general = &log.slots()[..GENERAL_SLOTS];
        match general.iter().position(|&r| r == 0) {
            Some(first_empty) => match general[first_empty..].iter().position(|&r| r != 0) {
                Some(offset) => InvariantResult::Fail(format!(
                    "slot {} is occupied after empty slot {first_empty}",
                    first_empty + offset
                )),
                None => InvariantResult::Pass,
            },
            None => InvariantResult::Pass,
        }
    }
}

/// The active bitmap holds exactly the records present in slots.
pub struct ActiveMapMatchesSlots;

impl Invariant for ActiveMapMatchesSlots {
    fn name(&self) -> &'static str {
        "active-map-matches-slots"
    }

    fn validate(&self, _catalog: &RecordCatalog, log: &PlayerRecordLog) -> InvariantResult {
        let expected: RecordBitmap = log.slots().iter().copied().filter(|&r| r != 0).collect();
        if &expected == log.active_map() {
            return InvariantResult::Pass;
        }

        let mut stale = log.active_map().clone();
        stale.subtract(&expected);
        let mut missing = expected;
        missing.subtract(log.active_map());
        InvariantResult::Fail(format!(
            "bitmap has unheld records {:?} and lacks held records {:?}",
            stale.ids().collect::<Vec<_>>(),
            missing.ids().collect::<Vec<_>>()
        ))
    }
}

/// Timed records live only in the timed slot.
pub struct NoTimedInGeneralSlots;

impl Invariant for NoTimedInGeneralSlots {
    fn name(&self) -> &'static str {
        "no-timed-in-general-slots"
    }

    fn validate(&self, catalog: &RecordCatalog, log: &PlayerRecordLog) -> InvariantResult {
        match log.slots()[..GENERAL_SLOTS]
            .iter()
            .position(|&r| r != 0 && catalog.is_timed(r))
        {
            Some(slot) => InvariantResult::Fail(format!(
                "timed record {} held in general slot {slot}",
                log.slots()[slot]
            )),
            None => InvariantResult::Pass,
        }
    }
}

/// Progress is zero wherever a slot is empty.
pub struct NoProgressOnEmptySlots;

impl Invariant for NoProgressOnEmptySlots {
    fn name(&self) -> &'static str {
        "no-progress-on-empty-slots"
    }

    fn validate(&self, _catalog: &RecordCatalog, log: &PlayerRecordLog) -> InvariantResult {
        let carries_progress =
            |slot: &usize| log.slots()[*slot] == 0 && log.slot_progress()[*slot] != 0;
        match (0..SLOT_COUNT).find(carries_progress) {
            Some(slot) => InvariantResult::Fail(format!("empty slot {slot} carries progress")),
            None => InvariantResult::Pass,
        }
    }
}
