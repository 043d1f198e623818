use crate::buffer::BufferPoolManager;
use crate::catalog::{Schema, SchemaRef};
use crate::error::{VellumError, VellumResult};
use crate::storage::index::BPlusTreeIndex;
use crate::storage::page::RecordId;
use crate::storage::table_heap::TableHeap;
use crate::storage::tuple::Tuple;
use crate::transaction::Transaction;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub type TableOid = u32;
pub type IndexOid = u32;

pub const DEFAULT_INTERNAL_MAX_SIZE: u32 = 64;
pub const DEFAULT_LEAF_MAX_SIZE: u32 = 64;

#[derive(Debug)]
pub struct TableInfo {
    pub name: String,
    pub schema: SchemaRef,
    pub table: Arc<TableHeap>,
    pub oid: TableOid,
}

#[derive(Debug)]
pub struct IndexInfo {
    pub name: String,
    pub key_schema: SchemaRef,
    pub index: Arc<BPlusTreeIndex>,
    pub table_name: String,
    pub oid: IndexOid,
}

impl IndexInfo {
    pub fn insert_entry(
        &self,
        key: &Tuple,
        rid: RecordId,
        _txn: &Transaction,
    ) -> VellumResult<bool> {
        self.index.insert(key, rid)
    }

    pub fn delete_entry(
        &self,
        key: &Tuple,
        _rid: RecordId,
        _txn: &Transaction,
    ) -> VellumResult<()> {
        self.index.delete(key)
    }

    /// Collect the record ids matching `key`. The index is unique, so the
    /// result holds at most one entry.
    pub fn scan_key(
        &self,
        key: &Tuple,
        result: &mut Vec<RecordId>,
        _txn: &Transaction,
    ) -> VellumResult<()> {
        if let Some(rid) = self.index.get(key)? {
            result.push(rid);
        }
        Ok(())
    }
}

/// Registry of tables and indexes, looked up by name or oid. Purely
/// in-memory bookkeeping; the heaps and trees it hands out live in the
/// buffer pool.
#[derive(Debug)]
pub struct Catalog {
    pub buffer_pool: Arc<BufferPoolManager>,
    tables: HashMap<TableOid, TableInfo>,
    table_names: HashMap<String, TableOid>,
    indexes: HashMap<IndexOid, IndexInfo>,
    // table name -> index name -> oid
    index_names: HashMap<String, HashMap<String, IndexOid>>,
    next_table_oid: AtomicU32,
    next_index_oid: AtomicU32,
}

impl Catalog {
    pub fn new(buffer_pool: Arc<BufferPoolManager>) -> Self {
        Self {
            buffer_pool,
            tables: HashMap::new(),
            table_names: HashMap::new(),
            indexes: HashMap::new(),
            index_names: HashMap::new(),
            next_table_oid: AtomicU32::new(0),
            next_index_oid: AtomicU32::new(0),
        }
    }

    pub fn create_table(
        &mut self,
        name: impl Into<String>,
        schema: Schema,
    ) -> VellumResult<&TableInfo> {
        let name = name.into();
        if self.table_names.contains_key(&name) {
            return Err(VellumError::Internal(format!(
                "table {} already exists",
                name
            )));
        }
        let schema = Arc::new(schema);
        let table = Arc::new(TableHeap::try_new(
            schema.clone(),
            self.buffer_pool.clone(),
        )?);
        let oid = self.next_table_oid.fetch_add(1, Ordering::SeqCst);
        self.table_names.insert(name.clone(), oid);
        self.index_names.entry(name.clone()).or_default();
        self.tables.insert(
            oid,
            TableInfo {
                name,
                schema,
                table,
                oid,
            },
        );
        Ok(&self.tables[&oid])
    }

    pub fn table(&self, name: &str) -> VellumResult<&TableInfo> {
        let oid = self
            .table_names
            .get(name)
            .ok_or_else(|| VellumError::Internal(format!("table {} not found", name)))?;
        self.table_by_oid(*oid)
    }

    pub fn table_by_oid(&self, oid: TableOid) -> VellumResult<&TableInfo> {
        self.tables
            .get(&oid)
            .ok_or_else(|| VellumError::Internal(format!("table oid {} not found", oid)))
    }

    pub fn create_index(
        &mut self,
        index_name: impl Into<String>,
        table_name: &str,
        key_columns: &[&str],
    ) -> VellumResult<&IndexInfo> {
        self.create_index_with_fanout(
            index_name,
            table_name,
            key_columns,
            DEFAULT_INTERNAL_MAX_SIZE,
            DEFAULT_LEAF_MAX_SIZE,
        )
    }

    pub fn create_index_with_fanout(
        &mut self,
        index_name: impl Into<String>,
        table_name: &str,
        key_columns: &[&str],
        internal_max_size: u32,
        leaf_max_size: u32,
    ) -> VellumResult<&IndexInfo> {
        let index_name = index_name.into();
        let table_info = self.table(table_name)?;
        let table_schema = table_info.schema.clone();

        let known = self
            .index_names
            .get_mut(table_name)
            .ok_or_else(|| VellumError::Internal(format!("table {} not found", table_name)))?;
        if known.contains_key(&index_name) {
            return Err(VellumError::Internal(format!(
                "index {} already exists on table {}",
                index_name, table_name
            )));
        }

        let mut key_schema_columns = Vec::with_capacity(key_columns.len());
        for key_column in key_columns {
            let idx = table_schema.index_of(key_column)?;
            key_schema_columns.push(table_schema.columns[idx].as_ref().clone());
        }
        let key_schema = Arc::new(Schema::new(key_schema_columns));

        let index = Arc::new(BPlusTreeIndex::try_new(
            index_name.clone(),
            key_schema.clone(),
            self.buffer_pool.clone(),
            internal_max_size,
            leaf_max_size,
        )?);
        let oid = self.next_index_oid.fetch_add(1, Ordering::SeqCst);
        known.insert(index_name.clone(), oid);
        self.indexes.insert(
            oid,
            IndexInfo {
                name: index_name,
                key_schema,
                index,
                table_name: table_name.to_string(),
                oid,
            },
        );
        Ok(&self.indexes[&oid])
    }

    pub fn index_by_oid(&self, oid: IndexOid) -> VellumResult<&IndexInfo> {
        self.indexes
            .get(&oid)
            .ok_or_else(|| VellumError::Internal(format!("index oid {} not found", oid)))
    }

    pub fn table_indexes(&self, table_name: &str) -> Vec<&IndexInfo> {
        self.index_names
            .get(table_name)
            .map(|known| {
                known
                    .values()
                    .filter_map(|oid| self.indexes.get(oid))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, DataType};
    use crate::storage::disk_manager::DiskManager;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Catalog) {
        let temp_dir = TempDir::new().unwrap();
        let disk_manager = Arc::new(DiskManager::try_new(temp_dir.path().join("test.db")).unwrap());
        let buffer_pool = Arc::new(BufferPoolManager::new(100, disk_manager));
        (temp_dir, Catalog::new(buffer_pool))
    }

    #[test]
    fn create_and_look_up_tables() {
        let (_temp_dir, mut catalog) = setup();
        let schema = Schema::new(vec![
            Column::new("a", DataType::Int32, false),
            Column::new("b", DataType::Int32, false),
        ]);
        let oid = catalog.create_table("t1", schema).unwrap().oid;
        assert_eq!(catalog.table("t1").unwrap().oid, oid);
        assert!(catalog.table("missing").is_err());
        assert!(catalog
            .create_table("t1", Schema::new(vec![Column::new("x", DataType::Int32, false)]))
            .is_err());
    }

    #[test]
    fn create_index_projects_key_schema() {
        let (_temp_dir, mut catalog) = setup();
        let schema = Schema::new(vec![
            Column::new("a", DataType::Int32, false),
            Column::new("b", DataType::Int64, false),
        ]);
        catalog.create_table("t1", schema).unwrap();
        let index = catalog.create_index("t1_a", "t1", &["a"]).unwrap();
        assert_eq!(index.key_schema.column_count(), 1);
        assert_eq!(index.key_schema.columns[0].name, "a");

        assert_eq!(catalog.table_indexes("t1").len(), 1);
        assert!(catalog.table_indexes("other").is_empty());
    }
}
