use crate::catalog::SchemaRef;
use crate::error::VellumResult;
use crate::execution::{ExecutionContext, VolcanoExecutor};
use crate::storage::page::{RecordId, INVALID_RID};
use crate::storage::tuple::Tuple;
use crate::utils::scalar::ScalarValue;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Emits a fixed list of rows; the canonical child of an insert.
#[derive(Debug)]
pub struct PhysicalValues {
    pub schema: SchemaRef,
    pub rows: Vec<Vec<ScalarValue>>,
    cursor: AtomicUsize,
}

impl PhysicalValues {
    pub fn new(schema: SchemaRef, rows: Vec<Vec<ScalarValue>>) -> Self {
        Self {
            schema,
            rows,
            cursor: AtomicUsize::new(0),
        }
    }
}

impl VolcanoExecutor for PhysicalValues {
    fn init(&self, _context: &mut ExecutionContext) -> VellumResult<()> {
        self.cursor.store(0, Ordering::SeqCst);
        Ok(())
    }

    fn next(&self, _context: &mut ExecutionContext) -> VellumResult<Option<(Tuple, RecordId)>> {
        let cursor = self.cursor.fetch_add(1, Ordering::SeqCst);
        if cursor >= self.rows.len() {
            return Ok(None);
        }
        let tuple = Tuple::new(self.schema.clone(), self.rows[cursor].clone());
        Ok(Some((tuple, INVALID_RID)))
    }

    fn output_schema(&self) -> SchemaRef {
        self.schema.clone()
    }
}

impl std::fmt::Display for PhysicalValues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Values({} rows)", self.rows.len())
    }
}
