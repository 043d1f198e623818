use crate::catalog::TableOid;
use crate::storage::page::RecordId;
use crate::transaction::LockMode;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

pub type TransactionId = u64;
pub const INVALID_TRANSACTION_ID: TransactionId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

/// Five per-mode table lock sets plus per-table row lock sets. Mutated only
/// by the lock manager on grant/release and cleared on commit/abort.
#[derive(Debug, Default)]
pub struct TransactionLockSets {
    pub shared_table: HashSet<TableOid>,
    pub exclusive_table: HashSet<TableOid>,
    pub intention_shared_table: HashSet<TableOid>,
    pub intention_exclusive_table: HashSet<TableOid>,
    pub shared_intention_exclusive_table: HashSet<TableOid>,
    pub shared_rows: HashMap<TableOid, HashSet<RecordId>>,
    pub exclusive_rows: HashMap<TableOid, HashSet<RecordId>>,
}

#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    isolation_level: IsolationLevel,
    state: Mutex<TransactionState>,
    lock_sets: Mutex<TransactionLockSets>,
}

impl Transaction {
    pub fn new(id: TransactionId, isolation_level: IsolationLevel) -> Self {
        Self {
            id,
            isolation_level,
            state: Mutex::new(TransactionState::Growing),
            lock_sets: Mutex::new(TransactionLockSets::default()),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: TransactionState) {
        *self.state.lock() = state;
    }

    /// Mode of the table lock this transaction holds on `oid`, if any.
    pub fn table_lock_mode(&self, oid: TableOid) -> Option<LockMode> {
        let sets = self.lock_sets.lock();
        if sets.exclusive_table.contains(&oid) {
            Some(LockMode::Exclusive)
        } else if sets.shared_intention_exclusive_table.contains(&oid) {
            Some(LockMode::SharedIntentionExclusive)
        } else if sets.shared_table.contains(&oid) {
            Some(LockMode::Shared)
        } else if sets.intention_exclusive_table.contains(&oid) {
            Some(LockMode::IntentionExclusive)
        } else if sets.intention_shared_table.contains(&oid) {
            Some(LockMode::IntentionShared)
        } else {
            None
        }
    }

    pub fn row_lock_mode(&self, oid: TableOid, rid: RecordId) -> Option<LockMode> {
        let sets = self.lock_sets.lock();
        if sets
            .exclusive_rows
            .get(&oid)
            .is_some_and(|rids| rids.contains(&rid))
        {
            Some(LockMode::Exclusive)
        } else if sets
            .shared_rows
            .get(&oid)
            .is_some_and(|rids| rids.contains(&rid))
        {
            Some(LockMode::Shared)
        } else {
            None
        }
    }

    pub fn holds_row_locks_on(&self, oid: TableOid) -> bool {
        let sets = self.lock_sets.lock();
        sets.shared_rows.get(&oid).is_some_and(|rids| !rids.is_empty())
            || sets
                .exclusive_rows
                .get(&oid)
                .is_some_and(|rids| !rids.is_empty())
    }

    pub(crate) fn insert_table_lock(&self, mode: LockMode, oid: TableOid) {
        let mut sets = self.lock_sets.lock();
        match mode {
            LockMode::Shared => sets.shared_table.insert(oid),
            LockMode::Exclusive => sets.exclusive_table.insert(oid),
            LockMode::IntentionShared => sets.intention_shared_table.insert(oid),
            LockMode::IntentionExclusive => sets.intention_exclusive_table.insert(oid),
            LockMode::SharedIntentionExclusive => {
                sets.shared_intention_exclusive_table.insert(oid)
            }
        };
    }

    pub(crate) fn remove_table_lock(&self, mode: LockMode, oid: TableOid) {
        let mut sets = self.lock_sets.lock();
        match mode {
            LockMode::Shared => sets.shared_table.remove(&oid),
            LockMode::Exclusive => sets.exclusive_table.remove(&oid),
            LockMode::IntentionShared => sets.intention_shared_table.remove(&oid),
            LockMode::IntentionExclusive => sets.intention_exclusive_table.remove(&oid),
            LockMode::SharedIntentionExclusive => {
                sets.shared_intention_exclusive_table.remove(&oid)
            }
        };
    }

    pub(crate) fn insert_row_lock(&self, mode: LockMode, oid: TableOid, rid: RecordId) {
        let mut sets = self.lock_sets.lock();
        match mode {
            LockMode::Shared => sets.shared_rows.entry(oid).or_default().insert(rid),
            LockMode::Exclusive => sets.exclusive_rows.entry(oid).or_default().insert(rid),
            _ => unreachable!("intention locks are never recorded on rows"),
        };
    }

    pub(crate) fn remove_row_lock(&self, mode: LockMode, oid: TableOid, rid: RecordId) {
        let mut sets = self.lock_sets.lock();
        let rows = match mode {
            LockMode::Shared => &mut sets.shared_rows,
            LockMode::Exclusive => &mut sets.exclusive_rows,
            _ => unreachable!("intention locks are never recorded on rows"),
        };
        if let Some(rids) = rows.get_mut(&oid) {
            rids.remove(&rid);
            if rids.is_empty() {
                rows.remove(&oid);
            }
        }
    }

    /// Snapshot of held table locks, for bulk release on commit/abort.
    pub(crate) fn table_locks(&self) -> Vec<(LockMode, TableOid)> {
        let sets = self.lock_sets.lock();
        let mut locks = Vec::new();
        locks.extend(sets.shared_table.iter().map(|&o| (LockMode::Shared, o)));
        locks.extend(sets.exclusive_table.iter().map(|&o| (LockMode::Exclusive, o)));
        locks.extend(
            sets.intention_shared_table
                .iter()
                .map(|&o| (LockMode::IntentionShared, o)),
        );
        locks.extend(
            sets.intention_exclusive_table
                .iter()
                .map(|&o| (LockMode::IntentionExclusive, o)),
        );
        locks.extend(
            sets.shared_intention_exclusive_table
                .iter()
                .map(|&o| (LockMode::SharedIntentionExclusive, o)),
        );
        locks
    }

    /// Snapshot of held row locks.
    pub(crate) fn row_locks(&self) -> Vec<(LockMode, TableOid, RecordId)> {
        let sets = self.lock_sets.lock();
        let mut locks = Vec::new();
        for (&oid, rids) in sets.shared_rows.iter() {
            locks.extend(rids.iter().map(|&rid| (LockMode::Shared, oid, rid)));
        }
        for (&oid, rids) in sets.exclusive_rows.iter() {
            locks.extend(rids.iter().map(|&rid| (LockMode::Exclusive, oid, rid)));
        }
        locks
    }
}
