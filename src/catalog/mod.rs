mod catalog;
mod column;
mod data_type;
mod schema;

pub use catalog::{Catalog, IndexInfo, IndexOid, TableInfo, TableOid};
pub use column::{Column, ColumnRef};
pub use data_type::DataType;
pub use schema::{
    Schema, SchemaRef, DELETE_OUTPUT_SCHEMA_REF, EMPTY_SCHEMA_REF, INSERT_OUTPUT_SCHEMA_REF,
};
