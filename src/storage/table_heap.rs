use crate::buffer::{BufferPoolManager, INVALID_PAGE_ID};
use crate::catalog::SchemaRef;
use crate::error::VellumResult;
use crate::storage::codec::TablePageCodec;
use crate::storage::page::{RecordId, TablePage, TupleMeta};
use crate::storage::tuple::Tuple;
use crate::transaction::TransactionId;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Debug)]
pub struct TableHeap {
    pub schema: SchemaRef,
    pub buffer_pool: Arc<BufferPoolManager>,
    pub first_page_id: AtomicU32,
    pub last_page_id: AtomicU32,
}

impl TableHeap {
    /// Creates a table heap with one empty page.
    pub fn try_new(schema: SchemaRef, buffer_pool: Arc<BufferPoolManager>) -> VellumResult<Self> {
        let first_page = buffer_pool.new_page()?;
        let first_page_id = first_page.page_id();
        let table_page = TablePage::new(schema.clone(), INVALID_PAGE_ID);
        first_page.write().set_data(TablePageCodec::encode(&table_page));
        drop(first_page);

        Ok(Self {
            schema,
            buffer_pool,
            first_page_id: AtomicU32::new(first_page_id),
            last_page_id: AtomicU32::new(first_page_id),
        })
    }

    /// Append to the tail page, chaining a fresh page when it runs out of
    /// room.
    pub fn insert_tuple(&self, meta: &TupleMeta, tuple: &Tuple) -> VellumResult<RecordId> {
        let mut current_page_id = self.last_page_id.load(Ordering::SeqCst);
        loop {
            let page_ref = self.buffer_pool.fetch_page(current_page_id)?;
            let mut guard = page_ref.write();
            let (mut table_page, _) = TablePageCodec::decode(guard.data(), self.schema.clone())?;

            if table_page.next_tuple_offset(tuple).is_ok() {
                let slot = table_page.insert_tuple(meta, tuple)?;
                guard.set_data(TablePageCodec::encode(&table_page));
                return Ok(RecordId::new(current_page_id, slot as u32));
            }

            let new_page_ref = self.buffer_pool.new_page()?;
            let new_page_id = new_page_ref.page_id();
            let new_table_page = TablePage::new(self.schema.clone(), INVALID_PAGE_ID);
            new_page_ref
                .write()
                .set_data(TablePageCodec::encode(&new_table_page));

            table_page.header.next_page_id = new_page_id;
            guard.set_data(TablePageCodec::encode(&table_page));
            drop(guard);

            self.last_page_id.store(new_page_id, Ordering::SeqCst);
            current_page_id = new_page_id;
        }
    }

    pub fn full_tuple(&self, rid: RecordId) -> VellumResult<(TupleMeta, Tuple)> {
        let page_ref = self.buffer_pool.fetch_page(rid.page_id)?;
        let guard = page_ref.read();
        let (table_page, _) = TablePageCodec::decode(guard.data(), self.schema.clone())?;
        table_page.tuple(rid.slot_num as u16)
    }

    pub fn tuple(&self, rid: RecordId) -> VellumResult<Tuple> {
        Ok(self.full_tuple(rid)?.1)
    }

    /// Logical removal: flips the deleted flag in the tuple's metadata.
    pub fn mark_delete(&self, rid: RecordId, txn_id: TransactionId) -> VellumResult<()> {
        let page_ref = self.buffer_pool.fetch_page(rid.page_id)?;
        let mut guard = page_ref.write();
        let (mut table_page, _) = TablePageCodec::decode(guard.data(), self.schema.clone())?;
        let (mut meta, _) = table_page.tuple(rid.slot_num as u16)?;
        meta.mark_deleted(txn_id);
        table_page.update_tuple_meta(meta, rid.slot_num as u16)?;
        guard.set_data(TablePageCodec::encode(&table_page));
        Ok(())
    }

    pub fn get_first_rid(&self) -> VellumResult<Option<RecordId>> {
        let first_page_id = self.first_page_id.load(Ordering::SeqCst);
        let page_ref = self.buffer_pool.fetch_page(first_page_id)?;
        let guard = page_ref.read();
        let (table_page, _) = TablePageCodec::decode(guard.data(), self.schema.clone())?;
        if table_page.header.num_tuples == 0 {
            Ok(None)
        } else {
            Ok(Some(RecordId::new(first_page_id, 0)))
        }
    }

    pub fn get_next_rid(&self, rid: RecordId) -> VellumResult<Option<RecordId>> {
        let page_ref = self.buffer_pool.fetch_page(rid.page_id)?;
        let guard = page_ref.read();
        let (table_page, _) = TablePageCodec::decode(guard.data(), self.schema.clone())?;
        if let Some(next_rid) = table_page.get_next_rid(&rid) {
            return Ok(Some(next_rid));
        }

        let next_page_id = table_page.header.next_page_id;
        drop(guard);
        if next_page_id == INVALID_PAGE_ID {
            return Ok(None);
        }
        let next_page_ref = self.buffer_pool.fetch_page(next_page_id)?;
        let next_guard = next_page_ref.read();
        let (next_table_page, _) =
            TablePageCodec::decode(next_guard.data(), self.schema.clone())?;
        if next_table_page.header.num_tuples == 0 {
            Ok(None)
        } else {
            Ok(Some(RecordId::new(next_page_id, 0)))
        }
    }

    pub fn iter(self: &Arc<Self>) -> TableIterator {
        TableIterator::new(self.clone())
    }
}

/// Forward cursor over every slot of the heap, deleted tuples included;
/// callers filter on the metadata. Keeps returning `None` once exhausted.
#[derive(Debug)]
pub struct TableIterator {
    heap: Arc<TableHeap>,
    cursor: Option<RecordId>,
    started: bool,
    ended: bool,
}

impl TableIterator {
    pub fn new(heap: Arc<TableHeap>) -> Self {
        Self {
            heap,
            cursor: None,
            started: false,
            ended: false,
        }
    }

    pub fn next(&mut self) -> VellumResult<Option<(RecordId, TupleMeta, Tuple)>> {
        if self.ended {
            return Ok(None);
        }
        let next_rid = if self.started {
            match self.cursor {
                Some(rid) => self.heap.get_next_rid(rid)?,
                None => None,
            }
        } else {
            self.started = true;
            self.heap.get_first_rid()?
        };

        match next_rid {
            Some(rid) => {
                self.cursor = Some(rid);
                let (meta, tuple) = self.heap.full_tuple(rid)?;
                Ok(Some((rid, meta, tuple)))
            }
            None => {
                self.ended = true;
                Ok(None)
            }
        }
    }
}
