use crate::catalog::column::{Column, ColumnRef};
use crate::catalog::DataType;
use crate::error::{VellumError, VellumResult};
use std::sync::{Arc, LazyLock};

pub type SchemaRef = Arc<Schema>;

pub static EMPTY_SCHEMA_REF: LazyLock<SchemaRef> = LazyLock::new(|| Arc::new(Schema::empty()));

pub static INSERT_OUTPUT_SCHEMA_REF: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![Column::new(
        "insert_rows",
        DataType::Int32,
        false,
    )]))
});

pub static DELETE_OUTPUT_SCHEMA_REF: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![Column::new(
        "delete_rows",
        DataType::Int32,
        false,
    )]))
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub columns: Vec<ColumnRef>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns: columns.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn empty() -> Self {
        Self { columns: vec![] }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_with_index(&self, index: usize) -> VellumResult<ColumnRef> {
        self.columns
            .get(index)
            .cloned()
            .ok_or_else(|| VellumError::Internal(format!("no column at index {}", index)))
    }

    pub fn index_of(&self, name: &str) -> VellumResult<usize> {
        self.columns
            .iter()
            .position(|col| col.name == name)
            .ok_or_else(|| VellumError::Internal(format!("no column named {}", name)))
    }

    /// Concatenate schemas, as when joining two inputs.
    pub fn try_merge(schemas: impl IntoIterator<Item = Schema>) -> VellumResult<Self> {
        let mut columns = Vec::new();
        for schema in schemas {
            columns.extend(schema.columns);
        }
        Ok(Self { columns })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_of_by_name() {
        let schema = Schema::new(vec![
            Column::new("a", DataType::Int32, false),
            Column::new("b", DataType::Int64, false),
        ]);
        assert_eq!(schema.index_of("b").unwrap(), 1);
        assert!(schema.index_of("missing").is_err());
    }

    #[test]
    fn merge_concatenates_columns() {
        let left = Schema::new(vec![Column::new("a", DataType::Int32, false)]);
        let right = Schema::new(vec![Column::new("b", DataType::Int32, false)]);
        let merged = Schema::try_merge(vec![left, right]).unwrap();
        assert_eq!(merged.column_count(), 2);
    }
}
