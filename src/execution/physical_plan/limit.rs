use crate::catalog::SchemaRef;
use crate::error::VellumResult;
use crate::execution::physical_plan::PhysicalPlan;
use crate::execution::{ExecutionContext, VolcanoExecutor};
use crate::storage::page::RecordId;
use crate::storage::tuple::Tuple;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Forwards at most `limit` child tuples.
#[derive(Debug)]
pub struct PhysicalLimit {
    pub limit: usize,
    pub input: Arc<PhysicalPlan>,
    emitted: AtomicUsize,
}

impl PhysicalLimit {
    pub fn new(limit: usize, input: Arc<PhysicalPlan>) -> Self {
        Self {
            limit,
            input,
            emitted: AtomicUsize::new(0),
        }
    }
}

impl VolcanoExecutor for PhysicalLimit {
    fn init(&self, context: &mut ExecutionContext) -> VellumResult<()> {
        self.emitted.store(0, Ordering::SeqCst);
        self.input.init(context)
    }

    fn next(&self, context: &mut ExecutionContext) -> VellumResult<Option<(Tuple, RecordId)>> {
        if self.emitted.load(Ordering::SeqCst) >= self.limit {
            return Ok(None);
        }
        match self.input.next(context)? {
            Some(entry) => {
                self.emitted.fetch_add(1, Ordering::SeqCst);
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    fn output_schema(&self) -> SchemaRef {
        self.input.output_schema()
    }
}

impl std::fmt::Display for PhysicalLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Limit({})", self.limit)
    }
}
