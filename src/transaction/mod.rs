mod lock_manager;
mod transaction;
mod transaction_manager;

pub use lock_manager::{LockManager, LockMode};
pub use transaction::{
    IsolationLevel, Transaction, TransactionId, TransactionState, INVALID_TRANSACTION_ID,
};
pub use transaction_manager::TransactionManager;
