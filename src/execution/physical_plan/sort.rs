use crate::catalog::SchemaRef;
use crate::error::{VellumError, VellumResult};
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

/// Compare two rows by their evaluated order-by keys; earlier terms
/// dominate, each with its own direction.
pub(crate) fn compare_keys(
    order_bys: &[OrderByExpr],
    left: &[ScalarValue],
    right: &[ScalarValue],
) -> VellumResult<CmpOrdering> {
    for (idx, order) in order_bys.iter().enumerate() {
        let ordering = if order.asc {
            left[idx].partial_cmp(&right[idx])
        } else {
            right[idx].partial_cmp(&left[idx])
        }
        .ok_or_else(|| {
            VellumError::Execution(format!(
                "cannot compare sort keys {:?} and {:?}",
                left[idx], right[idx]
            ))
        })?;
        if ordering != CmpOrdering::Equal {
            return Ok(ordering);
        }
    }
    Ok(CmpOrdering::Equal)
}

pub(crate) fn evaluate_keys(
    context: &ExecutionContext,
    order_bys: &[OrderByExpr],
    tuple: &Tuple,
) -> VellumResult<Vec<ScalarValue>> {
    let mut keys = Vec::with_capacity(order_bys.len());
    for order in order_bys {
        keys.push(context.eval_expr(&order.expr, tuple)?);
    }
    Ok(keys)
}

/// Full in-memory sort: the child is drained and ordered during init.
#[derive(Debug)]
pub struct PhysicalSort {
    pub order_bys: Vec<OrderByExpr>,
    pub input: Arc<PhysicalPlan>,
    sorted: RefCell<Vec<(Tuple, RecordId)>>,
    cursor: AtomicUsize,
}

impl PhysicalSort {
    pub fn new(order_bys: Vec<OrderByExpr>, input: Arc<PhysicalPlan>) -> Self {
        Self {
            order_bys,
            input,
            sorted: RefCell::new(Vec::new()),
            cursor: AtomicUsize::new(0),
        }
    }
}

impl VolcanoExecutor for PhysicalSort {
    fn init(&self, context: &mut ExecutionContext) -> VellumResult<()> {
        self.input.init(context)?;
        self.cursor.store(0, Ordering::SeqCst);

        let mut keyed_rows = Vec::new();
        while let Some((tuple, rid)) = self.input.next(context)? {
            let keys = evaluate_keys(context, &self.order_bys, &tuple)?;
            keyed_rows.push((keys, tuple, rid));
        }

        let mut error = None;
        keyed_rows.sort_by(|(left_keys, _, _), (right_keys, _, _)| {
            match compare_keys(&self.order_bys, left_keys, right_keys) {
                Ok(ordering) => ordering,
                Err(e) => {
                    error = Some(e);
                    CmpOrdering::Equal
                }
            }
        });
        if let Some(error) = error {
            return Err(error);
        }

        *self.sorted.borrow_mut() = keyed_rows
            .into_iter()
            .map(|(_, tuple, rid)| (tuple, rid))
            .collect();
        Ok(())
    }

    fn next(&self, _context: &mut ExecutionContext) -> VellumResult<Option<(Tuple, RecordId)>> {
        let cursor = self.cursor.fetch_add(1, Ordering::SeqCst);
        Ok(self.sorted.borrow().get(cursor).cloned())
    }

    fn output_schema(&self) -> SchemaRef {
        self.input.output_schema()
    }
}

impl std::fmt::Display for PhysicalSort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sort")
    }
}
