use crate::catalog::SchemaRef;
use crate::error::VellumResult;
use crate::execution::physical_plan::sort::{compare_keys, evaluate_keys};
use crate::execution::physical_plan::PhysicalPlan;
use crate::execution::{ExecutionContext, VolcanoExecutor};
use crate::expression::OrderByExpr;
use crate::storage::page::RecordId;
use crate::storage::tuple::Tuple;
use crate::utils::scalar::ScalarValue;
use std::cell::RefCell;
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Keeps only the first `n` rows in sort order while draining the child at
/// init, then emits them ordered. Direction and tie-breaking are identical
/// to the sort operator.
#[derive(Debug)]
pub struct PhysicalTopN {
    pub n: usize,
    pub order_bys: Vec<OrderByExpr>,
    pub input: Arc<PhysicalPlan>,
    top: RefCell<Vec<(Vec<ScalarValue>, Tuple, RecordId)>>,
    cursor: AtomicUsize,
}

impl PhysicalTopN {
    pub fn new(n: usize, order_bys: Vec<OrderByExpr>, input: Arc<PhysicalPlan>) -> Self {
        Self {
            n,
            order_bys,
            input,
            top: RefCell::new(Vec::new()),
            cursor: AtomicUsize::new(0),
        }
    }
}

impl VolcanoExecutor for PhysicalTopN {
    fn init(&self, context: &mut ExecutionContext) -> VellumResult<()> {
        self.input.init(context)?;
        self.cursor.store(0, Ordering::SeqCst);

        // bounded: `top` never holds more than n rows, ordered best-first
        let mut top: Vec<(Vec<ScalarValue>, Tuple, RecordId)> = Vec::with_capacity(self.n + 1);
        while let Some((tuple, rid)) = self.input.next(context)? {
            if self.n == 0 {
                continue;
            }
            let keys = evaluate_keys(context, &self.order_bys, &tuple)?;
            if top.len() == self.n {
                let worst = &top[top.len() - 1].0;
                if compare_keys(&self.order_bys, &keys, worst)? != CmpOrdering::Less {
                    continue;
                }
            }
            let mut insert_at = top.len();
            for (idx, (existing_keys, _, _)) in top.iter().enumerate() {
                if compare_keys(&self.order_bys, &keys, existing_keys)? == CmpOrdering::Less {
                    insert_at = idx;
                    break;
                }
            }
            top.insert(insert_at, (keys, tuple, rid));
            top.truncate(self.n);
        }
        *self.top.borrow_mut() = top;
        Ok(())
    }

    fn next(&self, _context: &mut ExecutionContext) -> VellumResult<Option<(Tuple, RecordId)>> {
        let cursor = self.cursor.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .top
            .borrow()
            .get(cursor)
            .map(|(_, tuple, rid)| (tuple.clone(), *rid)))
    }

    fn output_schema(&self) -> SchemaRef {
        self.input.output_schema()
    }
}

impl std::fmt::Display for PhysicalTopN {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TopN({})", self.n)
    }
}
