use crate::catalog::{IndexOid, SchemaRef, TableOid};
use crate::error::{VellumError, VellumResult};
use crate::execution::{ExecutionContext, VolcanoExecutor};
use crate::storage::index::TreeIndexIterator;
use crate::storage::page::RecordId;
use crate::storage::tuple::Tuple;
use parking_lot::Mutex;
use std::ops::Bound;

/// Walks the B+ tree iterator for an index, fetching the matching heap
/// tuples; the iterator's own pin and latch discipline protects the leaves.
pub struct PhysicalIndexScan {
    pub index_oid: IndexOid,
    pub table_oid: TableOid,
    pub table_schema: SchemaRef,
    start_bound: Bound<Tuple>,
    end_bound: Bound<Tuple>,
    iterator: Mutex<Option<TreeIndexIterator>>,
}

impl PhysicalIndexScan {
    pub fn new(
        index_oid: IndexOid,
        table_oid: TableOid,
        table_schema: SchemaRef,
        start_bound: Bound<Tuple>,
        end_bound: Bound<Tuple>,
    ) -> Self {
        Self {
            index_oid,
            table_oid,
            table_schema,
            start_bound,
            end_bound,
            iterator: Mutex::new(None),
        }
    }
}

impl VolcanoExecutor for PhysicalIndexScan {
    fn init(&self, context: &mut ExecutionContext) -> VellumResult<()> {
        let index_info = context.catalog.index_by_oid(self.index_oid)?;
        let iterator = TreeIndexIterator::new(
            index_info.index.clone(),
            (self.start_bound.clone(), self.end_bound.clone()),
        );
        *self.iterator.lock() = Some(iterator);
        Ok(())
    }

    fn next(&self, context: &mut ExecutionContext) -> VellumResult<Option<(Tuple, RecordId)>> {
        loop {
            let entry = {
                let mut guard = self.iterator.lock();
                let iterator = guard.as_mut().ok_or_else(|| {
                    VellumError::Execution("index scan not initialized".to_string())
                })?;
                iterator.next()?
            };
            let Some((_, rid)) = entry else {
                return Ok(None);
            };

            let table_info = context.catalog.table_by_oid(self.table_oid)?;
            let (meta, tuple) = table_info.table.full_tuple(rid)?;
            if meta.is_deleted {
                continue;
            }
            return Ok(Some((tuple, rid)));
        }
    }

    fn output_schema(&self) -> SchemaRef {
        self.table_schema.clone()
    }
}

impl std::fmt::Display for PhysicalIndexScan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IndexScan")
    }
}

impl std::fmt::Debug for PhysicalIndexScan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalIndexScan")
            .field("index_oid", &self.index_oid)
            .field("table_oid", &self.table_oid)
            .finish()
    }
}
