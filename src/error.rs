use crate::transaction::TransactionId;
use thiserror::Error;

pub type VellumResult<T, E = VellumError> = Result<T, E>;

/// Why the lock manager aborted a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    LockOnShrinking,
    UpgradeConflict,
    IncompatibleUpgrade,
    TableLockNotPresent,
    AttemptedIntentionLockOnRow,
    AttemptedUnlockButNoLockHeld,
    TableUnlockedBeforeUnlockingRows,
    LockSharedOnReadUncommitted,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            AbortReason::LockOnShrinking => "lock on shrinking",
            AbortReason::UpgradeConflict => "upgrade conflict",
            AbortReason::IncompatibleUpgrade => "incompatible upgrade",
            AbortReason::TableLockNotPresent => "table lock not present",
            AbortReason::AttemptedIntentionLockOnRow => "attempted intention lock on row",
            AbortReason::AttemptedUnlockButNoLockHeld => "attempted unlock but no lock held",
            AbortReason::TableUnlockedBeforeUnlockingRows => "table unlocked before unlocking rows",
            AbortReason::LockSharedOnReadUncommitted => "lock shared on read uncommitted",
        };
        write!(f, "{}", msg)
    }
}

#[derive(Debug, Error)]
pub enum VellumError {
    #[error("Not support: {0}")]
    NotSupport(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Transaction {txn_id} aborted: {reason}")]
    TransactionAbort {
        txn_id: TransactionId,
        reason: AbortReason,
    },
}
