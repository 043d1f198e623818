use crate::catalog::{SchemaRef, TableOid, INSERT_OUTPUT_SCHEMA_REF};
use crate::error::VellumResult;
use crate::execution::physical_plan::PhysicalPlan;
use crate::execution::{ExecutionContext, VolcanoExecutor};
use crate::storage::page::{RecordId, TupleMeta, INVALID_RID};
use crate::storage::tuple::Tuple;
use crate::transaction::LockMode;
use crate::utils::scalar::ScalarValue;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Drains its child, materializing each tuple into the table heap and every
/// index on the table, then emits a single count tuple.
#[derive(Debug)]
pub struct PhysicalInsert {
    pub table_oid: TableOid,
    pub input: Arc<PhysicalPlan>,
    insert_rows: AtomicU32,
    emitted: AtomicBool,
}

impl PhysicalInsert {
    pub fn new(table_oid: TableOid, input: Arc<PhysicalPlan>) -> Self {
        Self {
            table_oid,
            input,
            insert_rows: AtomicU32::new(0),
            emitted: AtomicBool::new(false),
        }
    }
}

impl VolcanoExecutor for PhysicalInsert {
    fn init(&self, context: &mut ExecutionContext) -> VellumResult<()> {
        self.input.init(context)?;
        self.insert_rows.store(0, Ordering::SeqCst);
        self.emitted.store(false, Ordering::SeqCst);
        context.lock_table(LockMode::IntentionExclusive, self.table_oid)?;
        Ok(())
    }

    fn next(&self, context: &mut ExecutionContext) -> VellumResult<Option<(Tuple, RecordId)>> {
        if self.emitted.load(Ordering::SeqCst) {
            return Ok(None);
        }
        loop {
            let Some((tuple, _)) = self.input.next(context)? else {
                self.emitted.store(true, Ordering::SeqCst);
                let count = self.insert_rows.swap(0, Ordering::SeqCst);
                let out = Tuple::new(
                    self.output_schema(),
                    vec![ScalarValue::Int32(Some(count as i32))],
                );
                return Ok(Some((out, INVALID_RID)));
            };

            let table_info = context.catalog.table_by_oid(self.table_oid)?;
            // re-tag the child row with the table schema so key projection
            // resolves by column name
            let tuple = Tuple::new(table_info.schema.clone(), tuple.data);
            let meta = TupleMeta::new(context.txn_id());
            let rid = table_info.table.insert_tuple(&meta, &tuple)?;

            for index_info in context.catalog.table_indexes(&table_info.name) {
                let key = tuple.project_with_schema(index_info.key_schema.clone())?;
                index_info.insert_entry(&key, rid, &context.txn)?;
            }
            self.insert_rows.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn output_schema(&self) -> SchemaRef {
        INSERT_OUTPUT_SCHEMA_REF.clone()
    }
}

impl std::fmt::Display for PhysicalInsert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Insert")
    }
}
