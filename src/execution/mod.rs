pub mod physical_plan;

use crate::catalog::{Catalog, TableOid};
use crate::error::{VellumError, VellumResult};
use crate::expression::Expr;
use crate::storage::page::RecordId;
use crate::storage::tuple::Tuple;
use crate::transaction::{IsolationLevel, LockManager, LockMode, Transaction, TransactionId};
use crate::utils::scalar::ScalarValue;
use crate::catalog::SchemaRef;
use crate::execution::physical_plan::PhysicalPlan;
use std::sync::Arc;

/// Pull-model operator: `init` prepares state, `next` emits tuples until it
/// returns `None`, and keeps returning `None` afterwards.
pub trait VolcanoExecutor {
    fn init(&self, _context: &mut ExecutionContext) -> VellumResult<()> {
        Ok(())
    }

    fn next(&self, context: &mut ExecutionContext) -> VellumResult<Option<(Tuple, RecordId)>>;

    fn output_schema(&self) -> SchemaRef;
}

/// Shared state threaded through every operator: the catalog, the running
/// transaction and the lock manager.
pub struct ExecutionContext<'a> {
    pub catalog: &'a Catalog,
    pub txn: Arc<Transaction>,
    pub lock_manager: Arc<LockManager>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(catalog: &'a Catalog, txn: Arc<Transaction>, lock_manager: Arc<LockManager>) -> Self {
        Self {
            catalog,
            txn,
            lock_manager,
        }
    }

    pub fn txn_id(&self) -> TransactionId {
        self.txn.id()
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.txn.isolation_level()
    }

    /// Evaluate an expression expected to produce a boolean; NULL counts as
    /// false.
    pub fn eval_predicate(&self, expr: &Expr, tuple: &Tuple) -> VellumResult<bool> {
        match expr.evaluate(tuple)? {
            ScalarValue::Boolean(Some(v)) => Ok(v),
            ScalarValue::Boolean(None) => Ok(false),
            other => Err(VellumError::Execution(format!(
                "predicate value must be boolean, got {}",
                other
            ))),
        }
    }

    pub fn eval_expr(&self, expr: &Expr, tuple: &Tuple) -> VellumResult<ScalarValue> {
        expr.evaluate(tuple)
    }

    /// Lock-manager failures abort the transaction; the executor surfaces
    /// them as execution errors.
    pub fn lock_table(&self, mode: LockMode, oid: TableOid) -> VellumResult<()> {
        match self.lock_manager.lock_table(&self.txn, mode, oid) {
            Ok(true) => Ok(()),
            Ok(false) => Err(VellumError::Execution(format!(
                "transaction {} aborted while waiting for table lock",
                self.txn.id()
            ))),
            Err(e) => Err(VellumError::Execution(e.to_string())),
        }
    }

    pub fn unlock_table(&self, oid: TableOid) -> VellumResult<()> {
        self.lock_manager
            .unlock_table(&self.txn, oid)
            .map_err(|e| VellumError::Execution(e.to_string()))?;
        Ok(())
    }

    pub fn lock_row(&self, mode: LockMode, oid: TableOid, rid: RecordId) -> VellumResult<()> {
        match self.lock_manager.lock_row(&self.txn, mode, oid, rid) {
            Ok(true) => Ok(()),
            Ok(false) => Err(VellumError::Execution(format!(
                "transaction {} aborted while waiting for row lock",
                self.txn.id()
            ))),
            Err(e) => Err(VellumError::Execution(e.to_string())),
        }
    }

    pub fn unlock_row(&self, oid: TableOid, rid: RecordId) -> VellumResult<()> {
        self.lock_manager
            .unlock_row(&self.txn, oid, rid)
            .map_err(|e| VellumError::Execution(e.to_string()))?;
        Ok(())
    }
}

/// Drives a plan to completion, collecting the emitted tuples.
pub struct ExecutionEngine<'a> {
    pub context: ExecutionContext<'a>,
}

impl<'a> ExecutionEngine<'a> {
    pub fn new(context: ExecutionContext<'a>) -> Self {
        Self { context }
    }

    pub fn execute(&mut self, plan: &PhysicalPlan) -> VellumResult<Vec<Tuple>> {
        plan.init(&mut self.context)?;
        let mut result = Vec::new();
        while let Some((tuple, _)) = plan.next(&mut self.context)? {
            result.push(tuple);
        }
        Ok(result)
    }
}
