use crate::catalog::{Schema, SchemaRef};
use crate::error::{VellumError, VellumResult};
use crate::utils::scalar::ScalarValue;
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    pub schema: SchemaRef,
    pub data: Vec<ScalarValue>,
}

impl Tuple {
    pub fn new(schema: SchemaRef, data: Vec<ScalarValue>) -> Self {
        debug_assert_eq!(schema.columns.len(), data.len());
        Self { schema, data }
    }

    pub fn empty(schema: SchemaRef) -> Self {
        let data = schema
            .columns
            .iter()
            .map(|col| ScalarValue::new_empty(col.data_type))
            .collect();
        Self { schema, data }
    }

    pub fn is_null(&self) -> bool {
        self.data.iter().all(|v| v.is_null())
    }

    pub fn value(&self, index: usize) -> VellumResult<&ScalarValue> {
        self.data.get(index).ok_or_else(|| {
            VellumError::Internal(format!("no column data at {} in tuple {:?}", index, self))
        })
    }

    /// Project this tuple onto a schema whose columns are a named subset of
    /// this tuple's schema. Used to build index keys from table rows.
    pub fn project_with_schema(&self, projected_schema: SchemaRef) -> VellumResult<Self> {
        let indices = projected_schema
            .columns
            .iter()
            .map(|col| self.schema.index_of(&col.name))
            .collect::<VellumResult<Vec<usize>>>()?;
        let data = indices
            .iter()
            .map(|idx| self.data[*idx].clone())
            .collect::<Vec<ScalarValue>>();
        Ok(Self::new(projected_schema, data))
    }

    pub fn try_merge(tuples: impl IntoIterator<Item = Self>) -> VellumResult<Self> {
        let mut data = vec![];
        let mut merged_schema = Schema::empty();
        for tuple in tuples {
            data.extend(tuple.data);
            merged_schema =
                Schema::try_merge(vec![merged_schema, tuple.schema.as_ref().clone()])?;
        }
        Ok(Self::new(Arc::new(merged_schema), data))
    }
}

impl Eq for Tuple {}

impl PartialOrd for Tuple {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        for idx in 0..self.schema.column_count() {
            let order = self.value(idx).ok()?.partial_cmp(other.value(idx).ok()?)?;
            if order != Ordering::Equal {
                return Some(order);
            }
        }
        Some(Ordering::Equal)
    }
}

impl Ord for Tuple {
    fn cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other).unwrap_or(Ordering::Equal)
    }
}

impl Display for Tuple {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let values = self
            .data
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<String>>()
            .join(", ");
        write!(f, "({})", values)
    }
}
