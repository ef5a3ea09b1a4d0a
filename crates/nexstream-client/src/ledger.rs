//! Ledger of locally applied, not-yet-confirmed counter mutations.
//!
//! Every user action that changes a counter ahead of store confirmation
//! (like toggle, view bump) lands here first. The ledger guarantees
//! read-your-writes: the visible value is always the freshest
//! authoritative value combined with whatever is still pending, so a slow
//! write round-trip never makes a counter jump backward and forward.
//!
//! At most one pending entry exists per `(entity, field)`. A second
//! increment coalesces into the existing entry by summing deltas; a
//! replacement supersedes whatever was pending. Confirmation is by value:
//! a snapshot carrying a value at or past the pending target retires the
//! entry, which also means increments are never double-counted against
//! the server.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

/// The counters the ledger can mutate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterField {
    Views,
    Likes,
}

impl CounterField {
    /// The document field name the store increments.
    pub fn as_str(&self) -> &'static str {
        match self {
            CounterField::Views => "views",
            CounterField::Likes => "likes",
        }
    }
}

impl std::fmt::Display for CounterField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The local change applied ahead of confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Add a signed delta to the counter.
    Increment(i64),
    /// Pin the counter to an absolute value.
    Replace(i64),
}

/// Outcome of reconciling one `(entity, field)` against a snapshot value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Nothing was pending for this counter.
    Clean,
    /// The snapshot reached the pending target; the entry was retired.
    Confirmed,
    /// The snapshot is still behind the pending target; the entry stays.
    Pending,
}

#[derive(Debug, Clone)]
struct PendingMutation {
    change: Change,
    /// Authoritative value observed when the mutation was first applied.
    base: i64,
    applied_at: DateTime<Utc>,
}

impl PendingMutation {
    /// The authoritative value that confirms this mutation.
    fn target(&self) -> i64 {
        match self.change {
            Change::Increment(delta) => self.base + delta,
            Change::Replace(value) => value,
        }
    }
}

/// Pending optimistic mutations keyed by `(entity, field)`.
pub struct OptimisticMutationLedger {
    pending: HashMap<(Uuid, CounterField), PendingMutation>,
}

impl OptimisticMutationLedger {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    /// Record a local change and return the immediately visible value.
    ///
    /// `authoritative` is the freshest confirmed value for the counter; it
    /// becomes the base of a new entry. An existing pending increment
    /// keeps its original base so the coalesced target stays correct.
    pub fn apply(
        &mut self,
        entity: Uuid,
        field: CounterField,
        change: Change,
        authoritative: i64,
    ) -> i64 {
        let entry = self
            .pending
            .entry((entity, field))
            .and_modify(|pending| {
                pending.change = match (pending.change, change) {
                    (Change::Increment(a), Change::Increment(b)) => Change::Increment(a + b),
                    // A newer replace supersedes anything pending; an
                    // increment after a replace moves the pinned value.
                    (_, Change::Replace(v)) => Change::Replace(v),
                    (Change::Replace(v), Change::Increment(b)) => Change::Replace(v + b),
                };
                pending.applied_at = Utc::now();
            })
            .or_insert_with(|| PendingMutation {
                change,
                base: authoritative,
                applied_at: Utc::now(),
            });

        let visible = match entry.change {
            Change::Increment(delta) => authoritative + delta,
            Change::Replace(value) => value,
        };
        debug!(entity = %entity, field = %field, ?change, visible, "Optimistic mutation applied");
        visible
    }

    /// Compare a freshly arrived authoritative value against the pending
    /// entry for this counter.
    pub fn reconcile(
        &mut self,
        entity: Uuid,
        field: CounterField,
        authoritative: i64,
    ) -> Reconciliation {
        let Some(pending) = self.pending.get(&(entity, field)) else {
            return Reconciliation::Clean;
        };
        if authoritative >= pending.target() {
            self.pending.remove(&(entity, field));
            debug!(entity = %entity, field = %field, authoritative, "Optimistic mutation confirmed");
            Reconciliation::Confirmed
        } else {
            Reconciliation::Pending
        }
    }

    /// Drop a pending entry after its write failed. The displayed value
    /// reverts to the last confirmed snapshot. Returns whether an entry
    /// was actually rolled back.
    pub fn roll_back(&mut self, entity: Uuid, field: CounterField) -> bool {
        let rolled = self.pending.remove(&(entity, field)).is_some();
        if rolled {
            debug!(entity = %entity, field = %field, "Optimistic mutation rolled back");
        }
        rolled
    }

    /// The displayed value for a counter: the authoritative value combined
    /// with the pending change, if any. Pure; used by projection.
    pub fn overlay(&self, entity: Uuid, field: CounterField, authoritative: i64) -> i64 {
        match self.pending.get(&(entity, field)) {
            Some(pending) => match pending.change {
                Change::Increment(delta) => authoritative + delta,
                Change::Replace(value) => value,
            },
            None => authoritative,
        }
    }

    /// The pending change for a counter, if any.
    pub fn pending_change(&self, entity: Uuid, field: CounterField) -> Option<Change> {
        self.pending.get(&(entity, field)).map(|p| p.change)
    }

    /// Number of pending entries across all counters.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Local timestamp of the pending entry, if any.
    pub fn applied_at(&self, entity: Uuid, field: CounterField) -> Option<DateTime<Utc>> {
        self.pending.get(&(entity, field)).map(|p| p.applied_at)
    }
}

impl Default for OptimisticMutationLedger {
    fn default() -> Self {
        Self::new()
    }
}
