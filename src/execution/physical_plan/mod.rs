mod delete;
mod index_scan;
mod insert;
mod limit;
mod nested_index_join;
mod nested_loop_join;
mod seq_scan;
mod sort;
mod topn;
mod values;

pub use delete::PhysicalDelete;
pub use index_scan::PhysicalIndexScan;
pub use insert::PhysicalInsert;
pub use limit::PhysicalLimit;
pub use nested_index_join::PhysicalNestedIndexJoin;
pub use nested_loop_join::PhysicalNestedLoopJoin;
pub use seq_scan::PhysicalSeqScan;
pub use sort::PhysicalSort;
pub use topn::PhysicalTopN;
pub use values::PhysicalValues;

use crate::catalog::SchemaRef;
use crate::error::VellumResult;
use crate::execution::{ExecutionContext, VolcanoExecutor};
use crate::storage::page::RecordId;
use crate::storage::tuple::Tuple;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
}

#[derive(Debug)]
pub enum PhysicalPlan {
    Values(PhysicalValues),
    SeqScan(PhysicalSeqScan),
    IndexScan(PhysicalIndexScan),
    Insert(PhysicalInsert),
    Delete(PhysicalDelete),
    NestedLoopJoin(PhysicalNestedLoopJoin),
    NestedIndexJoin(PhysicalNestedIndexJoin),
    Limit(PhysicalLimit),
    Sort(PhysicalSort),
    TopN(PhysicalTopN),
}

impl VolcanoExecutor for PhysicalPlan {
    fn init(&self, context: &mut ExecutionContext) -> VellumResult<()> {
        match self {
            PhysicalPlan::Values(op) => op.init(context),
            PhysicalPlan::SeqScan(op) => op.init(context),
            PhysicalPlan::IndexScan(op) => op.init(context),
            PhysicalPlan::Insert(op) => op.init(context),
            PhysicalPlan::Delete(op) => op.init(context),
            PhysicalPlan::NestedLoopJoin(op) => op.init(context),
            PhysicalPlan::NestedIndexJoin(op) => op.init(context),
            PhysicalPlan::Limit(op) => op.init(context),
            PhysicalPlan::Sort(op) => op.init(context),
            PhysicalPlan::TopN(op) => op.init(context),
        }
    }

    fn next(&self, context: &mut ExecutionContext) -> VellumResult<Option<(Tuple, RecordId)>> {
        match self {
            PhysicalPlan::Values(op) => op.next(context),
            PhysicalPlan::SeqScan(op) => op.next(context),
            PhysicalPlan::IndexScan(op) => op.next(context),
            PhysicalPlan::Insert(op) => op.next(context),
            PhysicalPlan::Delete(op) => op.next(context),
            PhysicalPlan::NestedLoopJoin(op) => op.next(context),
            PhysicalPlan::NestedIndexJoin(op) => op.next(context),
            PhysicalPlan::Limit(op) => op.next(context),
            PhysicalPlan::Sort(op) => op.next(context),
            PhysicalPlan::TopN(op) => op.next(context),
        }
    }

    fn output_schema(&self) -> SchemaRef {
        match self {
            PhysicalPlan::Values(op) => op.output_schema(),
            PhysicalPlan::SeqScan(op) => op.output_schema(),
            PhysicalPlan::IndexScan(op) => op.output_schema(),
            PhysicalPlan::Insert(op) => op.output_schema(),
            PhysicalPlan::Delete(op) => op.output_schema(),
            PhysicalPlan::NestedLoopJoin(op) => op.output_schema(),
            PhysicalPlan::NestedIndexJoin(op) => op.output_schema(),
            PhysicalPlan::Limit(op) => op.output_schema(),
            PhysicalPlan::Sort(op) => op.output_schema(),
            PhysicalPlan::TopN(op) => op.output_schema(),
        }
    }
}

impl std::fmt::Display for PhysicalPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhysicalPlan::Values(op) => write!(f, "{op}"),
            PhysicalPlan::SeqScan(op) => write!(f, "{op}"),
            PhysicalPlan::IndexScan(op) => write!(f, "{op}"),
            PhysicalPlan::Insert(op) => write!(f, "{op}"),
            PhysicalPlan::Delete(op) => write!(f, "{op}"),
            PhysicalPlan::NestedLoopJoin(op) => write!(f, "{op}"),
            PhysicalPlan::NestedIndexJoin(op) => write!(f, "{op}"),
            PhysicalPlan::Limit(op) => write!(f, "{op}"),
            PhysicalPlan::Sort(op) => write!(f, "{op}"),
            PhysicalPlan::TopN(op) => write!(f, "{op}"),
        }
    }
}
