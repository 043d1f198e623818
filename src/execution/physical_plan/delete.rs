use crate::catalog::{SchemaRef, TableOid, DELETE_OUTPUT_SCHEMA_REF};
use crate::error::VellumResult;
use crate::execution::physical_plan::PhysicalPlan;
use crate::execution::{ExecutionContext, VolcanoExecutor};
use crate::storage::page::{RecordId, INVALID_RID};
use crate::storage::tuple::Tuple;
use crate::transaction::LockMode;
use crate::utils::scalar::ScalarValue;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Drains its child, mark-deleting each produced row under an exclusive row
/// lock and removing its index entries, then emits a single count tuple.
#[derive(Debug)]
pub struct PhysicalDelete {
    pub table_oid: TableOid,
    pub input: Arc<PhysicalPlan>,
    delete_rows: AtomicU32,
    emitted: AtomicBool,
}

impl PhysicalDelete {
    pub fn new(table_oid: TableOid, input: Arc<PhysicalPlan>) -> Self {
        Self {
            table_oid,
            input,
            delete_rows: AtomicU32::new(0),
            emitted: AtomicBool::new(false),
        }
    }
}

impl VolcanoExecutor for PhysicalDelete {
    fn init(&self, context: &mut ExecutionContext) -> VellumResult<()> {
        self.input.init(context)?;
        self.delete_rows.store(0, Ordering::SeqCst);
        self.emitted.store(false, Ordering::SeqCst);
        context.lock_table(LockMode::IntentionExclusive, self.table_oid)?;
        Ok(())
    }

    fn next(&self, context: &mut ExecutionContext) -> VellumResult<Option<(Tuple, RecordId)>> {
        if self.emitted.load(Ordering::SeqCst) {
            return Ok(None);
        }
        loop {
            let Some((tuple, rid)) = self.input.next(context)? else {
                self.emitted.store(true, Ordering::SeqCst);
                let count = self.delete_rows.swap(0, Ordering::SeqCst);
                let out = Tuple::new(
                    self.output_schema(),
                    vec![ScalarValue::Int32(Some(count as i32))],
                );
                return Ok(Some((out, INVALID_RID)));
            };

            // upgrades the child scan's shared lock where one is held
            context.lock_row(LockMode::Exclusive, self.table_oid, rid)?;

            let table_info = context.catalog.table_by_oid(self.table_oid)?;
            table_info.table.mark_delete(rid, context.txn_id())?;

            let tuple = Tuple::new(table_info.schema.clone(), tuple.data);
            for index_info in context.catalog.table_indexes(&table_info.name) {
                let key = tuple.project_with_schema(index_info.key_schema.clone())?;
                index_info.delete_entry(&key, rid, &context.txn)?;
            }
            self.delete_rows.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn output_schema(&self) -> SchemaRef {
        DELETE_OUTPUT_SCHEMA_REF.clone()
    }
}

impl std::fmt::Display for PhysicalDelete {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Delete")
    }
}
