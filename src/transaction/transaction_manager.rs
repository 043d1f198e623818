use crate::transaction::{IsolationLevel, LockManager, Transaction, TransactionState};
use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Hands out transaction ids and drives commit/abort, releasing every lock
/// the transaction still holds.
#[derive(Debug)]
pub struct TransactionManager {
    next_txn_id: AtomicU64,
    lock_manager: Arc<LockManager>,
}

impl TransactionManager {
    pub fn new(lock_manager: Arc<LockManager>) -> Self {
        Self {
            next_txn_id: AtomicU64::new(1),
            lock_manager,
        }
    }

    pub fn lock_manager(&self) -> Arc<LockManager> {
        self.lock_manager.clone()
    }

    pub fn begin(&self, isolation_level: IsolationLevel) -> Arc<Transaction> {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        debug!("begin txn {} at {:?}", txn_id, isolation_level);
        Arc::new(Transaction::new(txn_id, isolation_level))
    }

    pub fn commit(&self, txn: &Arc<Transaction>) {
        self.lock_manager.release_all(txn);
        txn.set_state(TransactionState::Committed);
        debug!("txn {} committed", txn.id());
    }

    pub fn abort(&self, txn: &Arc<Transaction>) {
        txn.set_state(TransactionState::Aborted);
        self.lock_manager.release_all(txn);
        // waiters blocked on this transaction's queues must observe the abort
        self.lock_manager.notify_all_queues();
        debug!("txn {} aborted", txn.id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::LockMode;

    #[test]
    fn commit_releases_locks() {
        let lock_manager = Arc::new(LockManager::new());
        let manager = TransactionManager::new(lock_manager.clone());

        let txn1 = manager.begin(IsolationLevel::RepeatableRead);
        let txn2 = manager.begin(IsolationLevel::RepeatableRead);
        assert!(lock_manager.lock_table(&txn1, LockMode::Shared, 1).unwrap());

        manager.commit(&txn1);
        assert_eq!(txn1.state(), TransactionState::Committed);
        assert_eq!(txn1.table_lock_mode(1), None);

        // the released lock is immediately available
        assert!(lock_manager
            .lock_table(&txn2, LockMode::Exclusive, 1)
            .unwrap());
    }
}
