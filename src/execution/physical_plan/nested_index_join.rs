use crate::catalog::{IndexOid, SchemaRef};
use crate::error::{VellumError, VellumResult};
use crate::execution::physical_plan::{JoinType, PhysicalPlan};
use crate::execution::{ExecutionContext, VolcanoExecutor};
use crate::expression::Expr;
use crate::storage::page::{RecordId, INVALID_RID};
use crate::storage::tuple::Tuple;
use std::sync::Arc;

/// For every child tuple, evaluates the key expression and probes the inner
/// table's index for the matching row. Inner and left joins only.
#[derive(Debug)]
pub struct PhysicalNestedIndexJoin {
    pub join_type: JoinType,
    pub key_expr: Expr,
    pub index_oid: IndexOid,
    pub input: Arc<PhysicalPlan>,
    pub inner_schema: SchemaRef,
    pub schema: SchemaRef,
}

impl PhysicalNestedIndexJoin {
    pub fn new(
        join_type: JoinType,
        key_expr: Expr,
        index_oid: IndexOid,
        input: Arc<PhysicalPlan>,
        inner_schema: SchemaRef,
        schema: SchemaRef,
    ) -> Self {
        Self {
            join_type,
            key_expr,
            index_oid,
            input,
            inner_schema,
            schema,
        }
    }
}

impl VolcanoExecutor for PhysicalNestedIndexJoin {
    fn init(&self, context: &mut ExecutionContext) -> VellumResult<()> {
        if !matches!(self.join_type, JoinType::Inner | JoinType::LeftOuter) {
            return Err(VellumError::NotSupport(format!(
                "nested index join does not implement {:?} joins",
                self.join_type
            )));
        }
        self.input.init(context)
    }

    fn next(&self, context: &mut ExecutionContext) -> VellumResult<Option<(Tuple, RecordId)>> {
        loop {
            let Some((outer, _)) = self.input.next(context)? else {
                return Ok(None);
            };

            let index_info = context.catalog.index_by_oid(self.index_oid)?;
            let key_value = context.eval_expr(&self.key_expr, &outer)?;
            let key = Tuple::new(index_info.key_schema.clone(), vec![key_value]);

            let mut rids = Vec::new();
            index_info.scan_key(&key, &mut rids, &context.txn)?;

            let inner_tuple = match rids.first() {
                Some(&rid) => {
                    let table_info = context.catalog.table(&index_info.table_name)?;
                    let (meta, tuple) = table_info.table.full_tuple(rid)?;
                    if meta.is_deleted {
                        None
                    } else {
                        Some(tuple)
                    }
                }
                None => None,
            };

            match inner_tuple {
                Some(inner) => {
                    let merged = Tuple::try_merge(vec![outer, inner])?;
                    return Ok(Some((merged, INVALID_RID)));
                }
                None if self.join_type == JoinType::LeftOuter => {
                    let padded = Tuple::try_merge(vec![
                        outer,
                        Tuple::empty(self.inner_schema.clone()),
                    ])?;
                    return Ok(Some((padded, INVALID_RID)));
                }
                None => continue,
            }
        }
    }

    fn output_schema(&self) -> SchemaRef {
        self.schema.clone()
    }
}

impl std::fmt::Display for PhysicalNestedIndexJoin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NestedIndexJoin({:?})", self.join_type)
    }
}
