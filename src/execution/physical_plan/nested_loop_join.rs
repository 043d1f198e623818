use crate::catalog::SchemaRef;
use crate::error::{VellumError, VellumResult};
use crate::execution::physical_plan::{JoinType, PhysicalPlan};
use crate::execution::{ExecutionContext, VolcanoExecutor};
use crate::expression::Expr;
use crate::storage::page::{RecordId, INVALID_RID};
use crate::storage::tuple::Tuple;
use std::cell::RefCell;
use std::sync::Arc;

/// Nested-loop join with the inner (right) relation materialized during
/// init. Inner and left joins only.
#[derive(Debug)]
pub struct PhysicalNestedLoopJoin {
    pub join_type: JoinType,
    pub condition: Option<Expr>,
    pub left_input: Arc<PhysicalPlan>,
    pub right_input: Arc<PhysicalPlan>,
    pub schema: SchemaRef,

    inner_tuples: RefCell<Vec<Tuple>>,
    state: RefCell<JoinState>,
}

#[derive(Debug, Default)]
struct JoinState {
    current_left: Option<Tuple>,
    inner_cursor: usize,
    left_matched: bool,
}

impl PhysicalNestedLoopJoin {
    pub fn new(
        join_type: JoinType,
        condition: Option<Expr>,
        left_input: Arc<PhysicalPlan>,
        right_input: Arc<PhysicalPlan>,
        schema: SchemaRef,
    ) -> Self {
        Self {
            join_type,
            condition,
            left_input,
            right_input,
            schema,
            inner_tuples: RefCell::new(Vec::new()),
            state: RefCell::new(JoinState::default()),
        }
    }

    fn null_padded(&self, left: &Tuple) -> VellumResult<Tuple> {
        let right_nulls = Tuple::empty(self.right_input.output_schema());
        Tuple::try_merge(vec![left.clone(), right_nulls])
    }
}

impl VolcanoExecutor for PhysicalNestedLoopJoin {
    fn init(&self, context: &mut ExecutionContext) -> VellumResult<()> {
        if !matches!(self.join_type, JoinType::Inner | JoinType::LeftOuter) {
            return Err(VellumError::NotSupport(format!(
                "nested loop join does not implement {:?} joins",
                self.join_type
            )));
        }
        self.left_input.init(context)?;
        self.right_input.init(context)?;

        // materialize the inner relation
        let mut inner = Vec::new();
        while let Some((tuple, _)) = self.right_input.next(context)? {
            inner.push(tuple);
        }
        *self.inner_tuples.borrow_mut() = inner;
        *self.state.borrow_mut() = JoinState::default();
        Ok(())
    }

    fn next(&self, context: &mut ExecutionContext) -> VellumResult<Option<(Tuple, RecordId)>> {
        loop {
            let current_left = {
                let mut state = self.state.borrow_mut();
                if state.current_left.is_none() {
                    match self.left_input.next(context)? {
                        Some((tuple, _)) => {
                            state.current_left = Some(tuple);
                            state.inner_cursor = 0;
                            state.left_matched = false;
                        }
                        None => return Ok(None),
                    }
                }
                state.current_left.clone().expect("left tuple present")
            };

            let inner = self.inner_tuples.borrow();
            loop {
                let cursor = self.state.borrow().inner_cursor;
                if cursor >= inner.len() {
                    break;
                }
                self.state.borrow_mut().inner_cursor += 1;

                let right = &inner[cursor];
                let merged = Tuple::try_merge(vec![current_left.clone(), right.clone()])?;
                let matches = match &self.condition {
                    Some(condition) => context.eval_predicate(condition, &merged)?,
                    None => true,
                };
                if matches {
                    self.state.borrow_mut().left_matched = true;
                    return Ok(Some((merged, INVALID_RID)));
                }
            }
            drop(inner);

            // inner exhausted for this left tuple
            let mut state = self.state.borrow_mut();
            let left_matched = state.left_matched;
            state.current_left = None;
            drop(state);

            if self.join_type == JoinType::LeftOuter && !left_matched {
                return Ok(Some((self.null_padded(&current_left)?, INVALID_RID)));
            }
        }
    }

    fn output_schema(&self) -> SchemaRef {
        self.schema.clone()
    }
}

impl std::fmt::Display for PhysicalNestedLoopJoin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NestedLoopJoin({:?})", self.join_type)
    }
}
