use crate::catalog::{SchemaRef, TableOid};
use crate::error::{VellumError, VellumResult};
use crate::execution::{ExecutionContext, VolcanoExecutor};
use crate::storage::page::RecordId;
use crate::storage::table_heap::TableIterator;
use crate::storage::tuple::Tuple;
use crate::transaction::{IsolationLevel, LockMode};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Full scan over a table heap. Above read-uncommitted the scan holds IS on
/// the table; rows take S locks that are released after the read under
/// read-committed and held until commit under repeatable read.
pub struct PhysicalSeqScan {
    pub table_oid: TableOid,
    pub table_schema: SchemaRef,
    iterator: Mutex<Option<TableIterator>>,
    finished: AtomicBool,
}

impl PhysicalSeqScan {
    pub fn new(table_oid: TableOid, table_schema: SchemaRef) -> Self {
        Self {
            table_oid,
            table_schema,
            iterator: Mutex::new(None),
            finished: AtomicBool::new(false),
        }
    }
}

impl VolcanoExecutor for PhysicalSeqScan {
    fn init(&self, context: &mut ExecutionContext) -> VellumResult<()> {
        if context.isolation_level() != IsolationLevel::ReadUncommitted {
            context.lock_table(LockMode::IntentionShared, self.table_oid)?;
        }
        let table_info = context.catalog.table_by_oid(self.table_oid)?;
        *self.iterator.lock() = Some(table_info.table.iter());
        self.finished.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn next(&self, context: &mut ExecutionContext) -> VellumResult<Option<(Tuple, RecordId)>> {
        loop {
            let entry = {
                let mut guard = self.iterator.lock();
                let iterator = guard.as_mut().ok_or_else(|| {
                    VellumError::Execution("sequential scan not initialized".to_string())
                })?;
                iterator.next()?
            };

            let Some((rid, meta, tuple)) = entry else {
                // end of scan: read committed gives the IS lock back
                if !self.finished.swap(true, Ordering::SeqCst)
                    && context.isolation_level() == IsolationLevel::ReadCommitted
                {
                    context.unlock_table(self.table_oid)?;
                }
                return Ok(None);
            };

            if meta.is_deleted {
                continue;
            }

            match context.isolation_level() {
                IsolationLevel::ReadUncommitted => {}
                IsolationLevel::ReadCommitted => {
                    context.lock_row(LockMode::Shared, self.table_oid, rid)?;
                    context.unlock_row(self.table_oid, rid)?;
                }
                IsolationLevel::RepeatableRead => {
                    context.lock_row(LockMode::Shared, self.table_oid, rid)?;
                }
            }
            return Ok(Some((tuple, rid)));
        }
    }

    fn output_schema(&self) -> SchemaRef {
        self.table_schema.clone()
    }
}

impl std::fmt::Display for PhysicalSeqScan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SeqScan")
    }
}

impl std::fmt::Debug for PhysicalSeqScan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalSeqScan")
            .field("table_oid", &self.table_oid)
            .field("table_schema", &self.table_schema)
            .finish()
    }
}
