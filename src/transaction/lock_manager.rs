use crate::catalog::TableOid;
use crate::error::{AbortReason, VellumError, VellumResult};
use crate::storage::page::RecordId;
use crate::transaction::{
    IsolationLevel, Transaction, TransactionId, TransactionState, INVALID_TRANSACTION_ID,
};
use log::{debug, trace};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

pub const DEFAULT_CYCLE_DETECTION_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    IntentionShared,
    IntentionExclusive,
    Shared,
    SharedIntentionExclusive,
    Exclusive,
}

impl LockMode {
    fn is_intention(&self) -> bool {
        matches!(
            self,
            LockMode::IntentionShared
                | LockMode::IntentionExclusive
                | LockMode::SharedIntentionExclusive
        )
    }
}

/// Standard multi-granularity compatibility matrix.
fn modes_compatible(a: LockMode, b: LockMode) -> bool {
    match a {
        LockMode::IntentionShared => !matches!(b, LockMode::Exclusive),
        LockMode::IntentionExclusive => {
            matches!(b, LockMode::IntentionShared | LockMode::IntentionExclusive)
        }
        LockMode::Shared => matches!(b, LockMode::IntentionShared | LockMode::Shared),
        LockMode::SharedIntentionExclusive => matches!(b, LockMode::IntentionShared),
        LockMode::Exclusive => false,
    }
}

/// Requesting a mode already covered by the held one is a no-op.
fn mode_subsumes(held: LockMode, requested: LockMode) -> bool {
    if held == requested {
        return true;
    }
    match held {
        LockMode::Exclusive => true,
        LockMode::SharedIntentionExclusive => !matches!(requested, LockMode::Exclusive),
        LockMode::Shared => matches!(requested, LockMode::IntentionShared),
        LockMode::IntentionExclusive => matches!(requested, LockMode::IntentionShared),
        LockMode::IntentionShared => false,
    }
}

/// Legal upgrades: IS -> {S, X, IX, SIX}; S -> {X, SIX}; IX -> {X, SIX};
/// SIX -> {X}.
fn can_upgrade(held: LockMode, requested: LockMode) -> bool {
    matches!(
        (held, requested),
        (LockMode::IntentionShared, LockMode::Shared)
            | (LockMode::IntentionShared, LockMode::Exclusive)
            | (LockMode::IntentionShared, LockMode::IntentionExclusive)
            | (LockMode::IntentionShared, LockMode::SharedIntentionExclusive)
            | (LockMode::Shared, LockMode::Exclusive)
            | (LockMode::Shared, LockMode::SharedIntentionExclusive)
            | (LockMode::IntentionExclusive, LockMode::Exclusive)
            | (LockMode::IntentionExclusive, LockMode::SharedIntentionExclusive)
            | (LockMode::SharedIntentionExclusive, LockMode::Exclusive)
    )
}

#[derive(Debug, Clone, Copy)]
enum Resource {
    Table(TableOid),
    Row(TableOid, RecordId),
}

#[derive(Debug, Clone)]
struct LockRequest {
    txn_id: TransactionId,
    mode: LockMode,
    granted: bool,
}

#[derive(Debug)]
struct QueueInner {
    requests: VecDeque<LockRequest>,
    // transaction currently holding the pending upgrade, if any
    upgrading: TransactionId,
}

#[derive(Debug)]
struct LockRequestQueue {
    inner: Mutex<QueueInner>,
    condvar: Condvar,
}

impl LockRequestQueue {
    fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                requests: VecDeque::new(),
                upgrading: INVALID_TRANSACTION_ID,
            }),
            condvar: Condvar::new(),
        }
    }
}

/// Table- and row-granularity lock request queues implementing
/// multi-granularity two-phase locking.
#[derive(Debug)]
pub struct LockManager {
    table_lock_map: Mutex<HashMap<TableOid, Arc<LockRequestQueue>>>,
    row_lock_map: Mutex<HashMap<RecordId, Arc<LockRequestQueue>>>,
    cycle_detection_interval: Duration,
    cycle_detection_enabled: AtomicBool,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    pub fn new() -> Self {
        Self::with_cycle_detection_interval(DEFAULT_CYCLE_DETECTION_INTERVAL)
    }

    pub fn with_cycle_detection_interval(interval: Duration) -> Self {
        Self {
            table_lock_map: Mutex::new(HashMap::new()),
            row_lock_map: Mutex::new(HashMap::new()),
            cycle_detection_interval: interval,
            cycle_detection_enabled: AtomicBool::new(false),
        }
    }

    /// Acquire a table lock, blocking until it can be granted. Returns false
    /// only when the transaction was aborted while waiting.
    pub fn lock_table(
        &self,
        txn: &Arc<Transaction>,
        mode: LockMode,
        oid: TableOid,
    ) -> VellumResult<bool> {
        // reacquire at or below the held mode is a no-op
        let held = txn.table_lock_mode(oid);
        if let Some(held) = held {
            if mode_subsumes(held, mode) {
                return Ok(true);
            }
        }
        self.check_lock_request(txn, mode, false)?;
        let upgrade = match held {
            None => false,
            Some(held) => {
                if !can_upgrade(held, mode) {
                    return Err(self.abort(txn, AbortReason::IncompatibleUpgrade));
                }
                true
            }
        };
        let queue = self.table_queue(oid);
        self.lock_resource(txn, mode, Resource::Table(oid), queue, upgrade)
    }

    /// Acquire a row lock. Rows take only S and X; the matching table lock
    /// must already be held.
    pub fn lock_row(
        &self,
        txn: &Arc<Transaction>,
        mode: LockMode,
        oid: TableOid,
        rid: RecordId,
    ) -> VellumResult<bool> {
        let held = txn.row_lock_mode(oid, rid);
        if let Some(held) = held {
            if mode_subsumes(held, mode) {
                return Ok(true);
            }
        }
        self.check_lock_request(txn, mode, true)?;

        let table_mode = txn.table_lock_mode(oid);
        let table_lock_ok = match mode {
            LockMode::Exclusive => matches!(
                table_mode,
                Some(LockMode::Exclusive)
                    | Some(LockMode::IntentionExclusive)
                    | Some(LockMode::SharedIntentionExclusive)
            ),
            LockMode::Shared => table_mode.is_some(),
            _ => unreachable!("intention modes rejected above"),
        };
        if !table_lock_ok {
            return Err(self.abort(txn, AbortReason::TableLockNotPresent));
        }

        let upgrade = match held {
            None => false,
            Some(held) => {
                if !can_upgrade(held, mode) {
                    return Err(self.abort(txn, AbortReason::IncompatibleUpgrade));
                }
                true
            }
        };
        let queue = self.row_queue(rid);
        self.lock_resource(txn, mode, Resource::Row(oid, rid), queue, upgrade)
    }

    pub fn unlock_table(&self, txn: &Arc<Transaction>, oid: TableOid) -> VellumResult<bool> {
        let Some(held) = txn.table_lock_mode(oid) else {
            return Err(self.abort(txn, AbortReason::AttemptedUnlockButNoLockHeld));
        };
        if txn.holds_row_locks_on(oid) {
            return Err(self.abort(txn, AbortReason::TableUnlockedBeforeUnlockingRows));
        }

        let queue = self.table_queue(oid);
        self.remove_request(&queue, txn.id());
        txn.remove_table_lock(held, oid);
        self.update_transaction_state(txn, held);
        trace!("txn {} unlocked table {} ({:?})", txn.id(), oid, held);
        Ok(true)
    }

    pub fn unlock_row(
        &self,
        txn: &Arc<Transaction>,
        oid: TableOid,
        rid: RecordId,
    ) -> VellumResult<bool> {
        let Some(held) = txn.row_lock_mode(oid, rid) else {
            return Err(self.abort(txn, AbortReason::AttemptedUnlockButNoLockHeld));
        };

        let queue = self.row_queue(rid);
        self.remove_request(&queue, txn.id());
        txn.remove_row_lock(held, oid, rid);
        self.update_transaction_state(txn, held);
        trace!("txn {} unlocked row {} ({:?})", txn.id(), rid, held);
        Ok(true)
    }

    /// Drop every lock the transaction still holds, rows before tables.
    /// Used by commit/abort; performs no two-phase bookkeeping.
    pub fn release_all(&self, txn: &Arc<Transaction>) {
        for (mode, oid, rid) in txn.row_locks() {
            let queue = self.row_queue(rid);
            self.remove_request(&queue, txn.id());
            txn.remove_row_lock(mode, oid, rid);
        }
        for (mode, oid) in txn.table_locks() {
            let queue = self.table_queue(oid);
            self.remove_request(&queue, txn.id());
            txn.remove_table_lock(mode, oid);
        }
    }

    /// Wake every waiter so aborted transactions can observe their state.
    pub fn notify_all_queues(&self) {
        for queue in self.table_lock_map.lock().values() {
            queue.condvar.notify_all();
        }
        for queue in self.row_lock_map.lock().values() {
            queue.condvar.notify_all();
        }
    }

    /// Scheduled deadlock detection. The background task wakes on the
    /// configured interval; the detector itself is a stub that maintains no
    /// wait-for edges and reports no cycles.
    pub fn start_cycle_detection(self: &Arc<Self>) {
        if self.cycle_detection_enabled.swap(true, Ordering::SeqCst) {
            return;
        }
        let weak: Weak<LockManager> = Arc::downgrade(self);
        let interval = self.cycle_detection_interval;
        std::thread::spawn(move || loop {
            std::thread::sleep(interval);
            let Some(manager) = weak.upgrade() else {
                break;
            };
            if !manager.cycle_detection_enabled.load(Ordering::SeqCst) {
                break;
            }
            if let Some(victim) = manager.find_cycle_victim() {
                debug!("deadlock detected, victim txn {}", victim);
            }
        });
    }

    pub fn stop_cycle_detection(&self) {
        self.cycle_detection_enabled.store(false, Ordering::SeqCst);
    }

    fn find_cycle_victim(&self) -> Option<TransactionId> {
        // no wait-for graph is maintained, so there is never a cycle
        None
    }

    fn table_queue(&self, oid: TableOid) -> Arc<LockRequestQueue> {
        let mut map = self.table_lock_map.lock();
        map.entry(oid)
            .or_insert_with(|| Arc::new(LockRequestQueue::new()))
            .clone()
    }

    fn row_queue(&self, rid: RecordId) -> Arc<LockRequestQueue> {
        let mut map = self.row_lock_map.lock();
        map.entry(rid)
            .or_insert_with(|| Arc::new(LockRequestQueue::new()))
            .clone()
    }

    /// Isolation-level gate for a new lock request.
    fn check_lock_request(
        &self,
        txn: &Arc<Transaction>,
        mode: LockMode,
        is_row: bool,
    ) -> VellumResult<()> {
        if is_row && mode.is_intention() {
            return Err(self.abort(txn, AbortReason::AttemptedIntentionLockOnRow));
        }
        let state = txn.state();
        match txn.isolation_level() {
            IsolationLevel::ReadUncommitted => {
                if matches!(
                    mode,
                    LockMode::Shared
                        | LockMode::IntentionShared
                        | LockMode::SharedIntentionExclusive
                ) {
                    return Err(self.abort(txn, AbortReason::LockSharedOnReadUncommitted));
                }
                if state == TransactionState::Shrinking {
                    return Err(self.abort(txn, AbortReason::LockOnShrinking));
                }
            }
            IsolationLevel::ReadCommitted => {
                if state == TransactionState::Shrinking
                    && !matches!(mode, LockMode::IntentionShared | LockMode::Shared)
                {
                    return Err(self.abort(txn, AbortReason::LockOnShrinking));
                }
            }
            IsolationLevel::RepeatableRead => {
                if state == TransactionState::Shrinking {
                    return Err(self.abort(txn, AbortReason::LockOnShrinking));
                }
            }
        }
        Ok(())
    }

    fn lock_resource(
        &self,
        txn: &Arc<Transaction>,
        mode: LockMode,
        resource: Resource,
        queue: Arc<LockRequestQueue>,
        upgrade: bool,
    ) -> VellumResult<bool> {
        let txn_id = txn.id();
        let mut inner = queue.inner.lock();

        if upgrade {
            if inner.upgrading != INVALID_TRANSACTION_ID {
                drop(inner);
                return Err(self.abort(txn, AbortReason::UpgradeConflict));
            }
            inner.upgrading = txn_id;
            // replace the previously granted request, ahead of every
            // ungranted newcomer
            if let Some(pos) = inner.requests.iter().position(|r| r.txn_id == txn_id) {
                let prev = inner.requests.remove(pos).expect("position just found");
                self.erase_lock_record(txn, prev.mode, resource);
            }
            let insert_pos = inner
                .requests
                .iter()
                .position(|r| !r.granted)
                .unwrap_or(inner.requests.len());
            inner.requests.insert(
                insert_pos,
                LockRequest {
                    txn_id,
                    mode,
                    granted: false,
                },
            );
        } else {
            inner.requests.push_back(LockRequest {
                txn_id,
                mode,
                granted: false,
            });
        }

        loop {
            if can_grant(&inner.requests, txn_id) {
                if let Some(request) = inner.requests.iter_mut().find(|r| r.txn_id == txn_id) {
                    request.granted = true;
                }
                if inner.upgrading == txn_id {
                    inner.upgrading = INVALID_TRANSACTION_ID;
                }
                self.record_lock(txn, mode, resource);
                trace!(
                    "lock granted: txn={} mode={:?} resource={:?}",
                    txn_id,
                    mode,
                    resource
                );
                // a grant may unblock compatible requests behind us
                queue.condvar.notify_all();
                return Ok(true);
            }

            if txn.state() == TransactionState::Aborted {
                if let Some(pos) = inner.requests.iter().position(|r| r.txn_id == txn_id) {
                    inner.requests.remove(pos);
                }
                if inner.upgrading == txn_id {
                    inner.upgrading = INVALID_TRANSACTION_ID;
                }
                queue.condvar.notify_all();
                return Ok(false);
            }

            debug!("txn {} waiting for {:?} on {:?}", txn_id, mode, resource);
            queue.condvar.wait(&mut inner);
        }
    }

    fn remove_request(&self, queue: &Arc<LockRequestQueue>, txn_id: TransactionId) {
        let mut inner = queue.inner.lock();
        if let Some(pos) = inner.requests.iter().position(|r| r.txn_id == txn_id) {
            inner.requests.remove(pos);
        }
        queue.condvar.notify_all();
    }

    fn record_lock(&self, txn: &Arc<Transaction>, mode: LockMode, resource: Resource) {
        match resource {
            Resource::Table(oid) => txn.insert_table_lock(mode, oid),
            Resource::Row(oid, rid) => txn.insert_row_lock(mode, oid, rid),
        }
    }

    fn erase_lock_record(&self, txn: &Arc<Transaction>, mode: LockMode, resource: Resource) {
        match resource {
            Resource::Table(oid) => txn.remove_table_lock(mode, oid),
            Resource::Row(oid, rid) => txn.remove_row_lock(mode, oid, rid),
        }
    }

    /// A transition to shrinking is triggered only by releasing certain
    /// locks: S or X under repeatable read, X otherwise.
    fn update_transaction_state(&self, txn: &Arc<Transaction>, released: LockMode) {
        if txn.state() != TransactionState::Growing {
            return;
        }
        let shrink = match txn.isolation_level() {
            IsolationLevel::RepeatableRead => {
                matches!(released, LockMode::Shared | LockMode::Exclusive)
            }
            IsolationLevel::ReadCommitted | IsolationLevel::ReadUncommitted => {
                released == LockMode::Exclusive
            }
        };
        if shrink {
            txn.set_state(TransactionState::Shrinking);
        }
    }

    fn abort(&self, txn: &Arc<Transaction>, reason: AbortReason) -> VellumError {
        txn.set_state(TransactionState::Aborted);
        VellumError::TransactionAbort {
            txn_id: txn.id(),
            reason,
        }
    }
}

/// A request can be granted when every earlier request in the queue,
/// granted or not, is compatible with it. FIFO is preserved against earlier
/// incompatible waiters; concurrently-compatible requests may overtake.
fn can_grant(requests: &VecDeque<LockRequest>, txn_id: TransactionId) -> bool {
    let Some(position) = requests.iter().position(|r| r.txn_id == txn_id) else {
        return false;
    };
    let mode = requests[position].mode;
    for earlier in requests.iter().take(position) {
        if earlier.txn_id == txn_id {
            continue;
        }
        if !modes_compatible(mode, earlier.mode) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VellumError;
    use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
    use std::thread;
    use std::time::Duration;

    fn new_txn(id: TransactionId, isolation_level: IsolationLevel) -> Arc<Transaction> {
        Arc::new(Transaction::new(id, isolation_level))
    }

    fn abort_reason(result: VellumResult<bool>) -> AbortReason {
        match result {
            Err(VellumError::TransactionAbort { reason, .. }) => reason,
            other => panic!("expected transaction abort, got {:?}", other),
        }
    }

    #[test]
    fn shared_locks_are_compatible() {
        let manager = LockManager::new();
        let txn1 = new_txn(1, IsolationLevel::RepeatableRead);
        let txn2 = new_txn(2, IsolationLevel::RepeatableRead);

        assert!(manager.lock_table(&txn1, LockMode::Shared, 1).unwrap());
        assert!(manager.lock_table(&txn2, LockMode::Shared, 1).unwrap());
        assert!(manager.unlock_table(&txn1, 1).unwrap());
        assert!(manager.unlock_table(&txn2, 1).unwrap());
    }

    #[test]
    fn lock_twice_is_idempotent() {
        let manager = LockManager::new();
        let txn = new_txn(1, IsolationLevel::RepeatableRead);
        assert!(manager.lock_table(&txn, LockMode::Shared, 1).unwrap());
        assert!(manager.lock_table(&txn, LockMode::Shared, 1).unwrap());
        // one queue entry, one unlock
        assert!(manager.unlock_table(&txn, 1).unwrap());
        assert_eq!(
            abort_reason(manager.unlock_table(&txn, 1)),
            AbortReason::AttemptedUnlockButNoLockHeld
        );
    }

    #[test]
    fn exclusive_waits_for_shared() {
        let manager = Arc::new(LockManager::new());
        let txn1 = new_txn(1, IsolationLevel::RepeatableRead);
        let txn2 = new_txn(2, IsolationLevel::RepeatableRead);

        assert!(manager.lock_table(&txn1, LockMode::Shared, 7).unwrap());

        let acquired = Arc::new(AtomicBool::new(false));
        let acquired_clone = acquired.clone();
        let manager_clone = manager.clone();
        let handle = thread::spawn(move || {
            let ok = manager_clone
                .lock_table(&txn2, LockMode::Exclusive, 7)
                .unwrap();
            acquired_clone.store(ok, AtomicOrdering::SeqCst);
        });

        thread::sleep(Duration::from_millis(20));
        assert!(!acquired.load(AtomicOrdering::SeqCst));

        assert!(manager.unlock_table(&txn1, 7).unwrap());
        handle.join().unwrap();
        assert!(acquired.load(AtomicOrdering::SeqCst));
    }

    #[test]
    fn upgrade_takes_priority_over_waiting_request() {
        // T1 holds S; T2 waits for X; T1 upgrades S->X and wins the race.
        let manager = Arc::new(LockManager::new());
        let txn1 = new_txn(1, IsolationLevel::RepeatableRead);
        let txn2 = new_txn(2, IsolationLevel::RepeatableRead);

        assert!(manager.lock_table(&txn1, LockMode::Shared, 3).unwrap());

        let t2_acquired = Arc::new(AtomicBool::new(false));
        let t2_flag = t2_acquired.clone();
        let manager_clone = manager.clone();
        let txn2_clone = txn2.clone();
        let waiter = thread::spawn(move || {
            let ok = manager_clone
                .lock_table(&txn2_clone, LockMode::Exclusive, 3)
                .unwrap();
            t2_flag.store(ok, AtomicOrdering::SeqCst);
        });

        thread::sleep(Duration::from_millis(20));
        assert!(!t2_acquired.load(AtomicOrdering::SeqCst));

        // the upgrade slots ahead of T2's ungranted request
        assert!(manager.lock_table(&txn1, LockMode::Exclusive, 3).unwrap());
        assert_eq!(txn1.table_lock_mode(3), Some(LockMode::Exclusive));
        assert!(!t2_acquired.load(AtomicOrdering::SeqCst));

        assert!(manager.unlock_table(&txn1, 3).unwrap());
        waiter.join().unwrap();
        assert!(t2_acquired.load(AtomicOrdering::SeqCst));
    }

    #[test]
    fn concurrent_upgrades_conflict() {
        let manager = Arc::new(LockManager::new());
        let txn1 = new_txn(1, IsolationLevel::RepeatableRead);
        let txn2 = new_txn(2, IsolationLevel::RepeatableRead);

        assert!(manager.lock_table(&txn1, LockMode::Shared, 5).unwrap());
        assert!(manager.lock_table(&txn2, LockMode::Shared, 5).unwrap());

        let manager_clone = manager.clone();
        let txn1_clone = txn1.clone();
        let first_upgrader = thread::spawn(move || {
            // blocks: txn2 still holds S
            manager_clone.lock_table(&txn1_clone, LockMode::Exclusive, 5)
        });
        thread::sleep(Duration::from_millis(20));

        // a second pending upgrade on the same queue aborts
        assert_eq!(
            abort_reason(manager.lock_table(&txn2, LockMode::Exclusive, 5)),
            AbortReason::UpgradeConflict
        );

        // the aborted holder's locks are torn down, releasing the upgrader
        manager.release_all(&txn2);
        manager.notify_all_queues();
        assert!(first_upgrader.join().unwrap().unwrap());
    }

    #[test]
    fn isolation_gates() {
        let manager = LockManager::new();

        let read_uncommitted = new_txn(1, IsolationLevel::ReadUncommitted);
        assert_eq!(
            abort_reason(manager.lock_table(&read_uncommitted, LockMode::Shared, 1)),
            AbortReason::LockSharedOnReadUncommitted
        );

        let shrinking = new_txn(2, IsolationLevel::RepeatableRead);
        shrinking.set_state(TransactionState::Shrinking);
        assert_eq!(
            abort_reason(manager.lock_table(&shrinking, LockMode::Exclusive, 1)),
            AbortReason::LockOnShrinking
        );

        // read committed may still take IS/S while shrinking
        let rc = new_txn(3, IsolationLevel::ReadCommitted);
        rc.set_state(TransactionState::Shrinking);
        assert!(manager
            .lock_table(&rc, LockMode::IntentionShared, 1)
            .unwrap());
        assert_eq!(
            abort_reason(manager.lock_table(&rc, LockMode::IntentionExclusive, 2)),
            AbortReason::LockOnShrinking
        );
    }

    #[test]
    fn row_locks_require_table_locks() {
        let manager = LockManager::new();
        let rid = RecordId::new(1, 1);

        let txn = new_txn(1, IsolationLevel::RepeatableRead);
        assert_eq!(
            abort_reason(manager.lock_row(&txn, LockMode::Exclusive, 1, rid)),
            AbortReason::TableLockNotPresent
        );

        let txn2 = new_txn(2, IsolationLevel::RepeatableRead);
        assert_eq!(
            abort_reason(manager.lock_row(&txn2, LockMode::IntentionShared, 1, rid)),
            AbortReason::AttemptedIntentionLockOnRow
        );

        // IX on the table admits row X
        let txn3 = new_txn(3, IsolationLevel::RepeatableRead);
        assert!(manager
            .lock_table(&txn3, LockMode::IntentionExclusive, 1)
            .unwrap());
        assert!(manager.lock_row(&txn3, LockMode::Exclusive, 1, rid).unwrap());

        // IX table lock also admits row S (the permissive policy)
        let rid2 = RecordId::new(1, 2);
        assert!(manager.lock_row(&txn3, LockMode::Shared, 1, rid2).unwrap());
    }

    #[test]
    fn unlock_table_with_row_locks_held_aborts() {
        let manager = LockManager::new();
        let txn = new_txn(1, IsolationLevel::RepeatableRead);
        let rid = RecordId::new(1, 1);

        assert!(manager
            .lock_table(&txn, LockMode::IntentionExclusive, 1)
            .unwrap());
        assert!(manager.lock_row(&txn, LockMode::Exclusive, 1, rid).unwrap());
        assert_eq!(
            abort_reason(manager.unlock_table(&txn, 1)),
            AbortReason::TableUnlockedBeforeUnlockingRows
        );
    }

    #[test]
    fn two_phase_transitions() {
        let manager = LockManager::new();

        // repeatable read: releasing S moves to shrinking
        let txn = new_txn(1, IsolationLevel::RepeatableRead);
        assert!(manager.lock_table(&txn, LockMode::Shared, 1).unwrap());
        assert!(manager.unlock_table(&txn, 1).unwrap());
        assert_eq!(txn.state(), TransactionState::Shrinking);

        // read committed: releasing S does not, releasing X does
        let txn2 = new_txn(2, IsolationLevel::ReadCommitted);
        assert!(manager.lock_table(&txn2, LockMode::Shared, 1).unwrap());
        assert!(manager.unlock_table(&txn2, 1).unwrap());
        assert_eq!(txn2.state(), TransactionState::Growing);
        assert!(manager.lock_table(&txn2, LockMode::Exclusive, 2).unwrap());
        assert!(manager.unlock_table(&txn2, 2).unwrap());
        assert_eq!(txn2.state(), TransactionState::Shrinking);

        // releasing an intention lock never shrinks
        let txn3 = new_txn(3, IsolationLevel::RepeatableRead);
        assert!(manager
            .lock_table(&txn3, LockMode::IntentionShared, 1)
            .unwrap());
        assert!(manager.unlock_table(&txn3, 1).unwrap());
        assert_eq!(txn3.state(), TransactionState::Growing);
    }

    #[test]
    fn incompatible_upgrade_aborts() {
        let manager = LockManager::new();
        let txn = new_txn(1, IsolationLevel::RepeatableRead);
        assert!(manager.lock_table(&txn, LockMode::Exclusive, 1).unwrap());
        // X -> SIX is not a legal upgrade
        assert_eq!(
            abort_reason(manager.lock_table(&txn, LockMode::SharedIntentionExclusive, 1)),
            AbortReason::IncompatibleUpgrade
        );
    }

    #[test]
    fn cycle_detection_stub_reports_nothing() {
        let manager = Arc::new(LockManager::with_cycle_detection_interval(
            Duration::from_millis(5),
        ));
        manager.start_cycle_detection();

        let txn = new_txn(1, IsolationLevel::RepeatableRead);
        assert!(manager.lock_table(&txn, LockMode::Exclusive, 1).unwrap());
        thread::sleep(Duration::from_millis(25));
        // the stub maintains no edges, so nothing is ever aborted
        assert_eq!(txn.state(), TransactionState::Growing);
        assert!(manager.unlock_table(&txn, 1).unwrap());
        manager.stop_cycle_detection();
    }

    #[test]
    fn row_lock_conflict_blocks_until_release() {
        let manager = Arc::new(LockManager::new());
        let writer = new_txn(1, IsolationLevel::RepeatableRead);
        let reader = new_txn(2, IsolationLevel::RepeatableRead);
        let rid = RecordId::new(2, 4);

        assert!(manager
            .lock_table(&writer, LockMode::IntentionExclusive, 1)
            .unwrap());
        assert!(manager
            .lock_row(&writer, LockMode::Exclusive, 1, rid)
            .unwrap());

        let proceed = Arc::new(AtomicBool::new(false));
        let proceed_clone = proceed.clone();
        let manager_clone = manager.clone();
        let handle = thread::spawn(move || {
            manager_clone
                .lock_table(&reader, LockMode::IntentionShared, 1)
                .unwrap();
            let ok = manager_clone
                .lock_row(&reader, LockMode::Shared, 1, rid)
                .unwrap();
            proceed_clone.store(ok, AtomicOrdering::SeqCst);
        });

        thread::sleep(Duration::from_millis(20));
        assert!(!proceed.load(AtomicOrdering::SeqCst));

        assert!(manager.unlock_row(&writer, 1, rid).unwrap());
        handle.join().unwrap();
        assert!(proceed.load(AtomicOrdering::SeqCst));
    }
}
