use crate::buffer::{PageId, PAGE_SIZE};
use crate::catalog::SchemaRef;
use crate::error::{VellumError, VellumResult};
use crate::storage::codec::{TablePageHeaderCodec, TupleCodec, TupleInfoCodec};
use crate::storage::page::RecordId;
use crate::storage::tuple::Tuple;
use crate::transaction::TransactionId;

pub static EMPTY_TUPLE_META: TupleMeta = TupleMeta {
    insert_txn_id: 0,
    delete_txn_id: 0,
    is_deleted: false,
};

/**
 * Slotted page format:
 * ```text
 *  ---------------------------------------------------------
 *  | HEADER | ... FREE SPACE ... | ... INSERTED TUPLES ... |
 *  ---------------------------------------------------------
 *                                ^ free space pointer
 * ```
 *
 * The header grows forward (next-page-id, tuple counts, one slot entry per
 * tuple); tuple bytes grow backward from the end of the page.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct TablePage {
    pub schema: SchemaRef,
    pub header: TablePageHeader,
    // raw page image, tuple bytes included
    pub data: [u8; PAGE_SIZE],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePageHeader {
    pub next_page_id: PageId,
    pub num_tuples: u16,
    pub num_deleted_tuples: u16,
    pub tuple_infos: Vec<TupleInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TupleInfo {
    pub offset: u16,
    pub size: u16,
    pub meta: TupleMeta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TupleMeta {
    pub insert_txn_id: TransactionId,
    pub delete_txn_id: TransactionId,
    pub is_deleted: bool,
}

impl TupleMeta {
    pub fn new(insert_txn_id: TransactionId) -> Self {
        Self {
            insert_txn_id,
            delete_txn_id: 0,
            is_deleted: false,
        }
    }

    pub fn mark_deleted(&mut self, txn_id: TransactionId) {
        self.is_deleted = true;
        self.delete_txn_id = txn_id;
    }
}

impl TablePage {
    pub fn new(schema: SchemaRef, next_page_id: PageId) -> Self {
        Self {
            schema,
            header: TablePageHeader {
                next_page_id,
                num_tuples: 0,
                num_deleted_tuples: 0,
                tuple_infos: Vec::new(),
            },
            data: [0; PAGE_SIZE],
        }
    }

    /// Offset where the next tuple would land, or an error when the page is
    /// out of space.
    pub fn next_tuple_offset(&self, tuple: &Tuple) -> VellumResult<usize> {
        let slot_end_offset = if self.header.num_tuples > 0 {
            self.header.tuple_infos[self.header.num_tuples as usize - 1].offset as usize
        } else {
            PAGE_SIZE
        };

        let tuple_len = TupleCodec::encode(tuple).len();
        if slot_end_offset < tuple_len {
            return Err(VellumError::Storage(
                "not enough space to store tuple".to_string(),
            ));
        }
        let tuple_offset = slot_end_offset - tuple_len;

        // header including the slot entry this insert would add
        let min_tuple_offset = TablePageHeaderCodec::encode(&self.header).len()
            + TupleInfoCodec::encode(&TupleInfo {
                offset: 0,
                size: 0,
                meta: EMPTY_TUPLE_META,
            })
            .len();
        if tuple_offset < min_tuple_offset {
            return Err(VellumError::Storage(
                "not enough space to store tuple".to_string(),
            ));
        }
        Ok(tuple_offset)
    }

    pub fn insert_tuple(&mut self, meta: &TupleMeta, tuple: &Tuple) -> VellumResult<u16> {
        let tuple_offset = self.next_tuple_offset(tuple)?;
        let slot = self.header.num_tuples;
        let tuple_bytes = TupleCodec::encode(tuple);
        debug_assert!(tuple_bytes.len() < u16::MAX as usize);

        self.header.tuple_infos.push(TupleInfo {
            offset: tuple_offset as u16,
            size: tuple_bytes.len() as u16,
            meta: *meta,
        });
        self.header.num_tuples += 1;
        self.data[tuple_offset..tuple_offset + tuple_bytes.len()].copy_from_slice(&tuple_bytes);
        Ok(slot)
    }

    pub fn update_tuple_meta(&mut self, meta: TupleMeta, slot: u16) -> VellumResult<()> {
        if slot >= self.header.num_tuples {
            return Err(VellumError::Storage(format!(
                "slot {} out of range in table page",
                slot
            )));
        }
        let info = &mut self.header.tuple_infos[slot as usize];
        if meta.is_deleted && !info.meta.is_deleted {
            self.header.num_deleted_tuples += 1;
        }
        info.meta = meta;
        Ok(())
    }

    pub fn tuple(&self, slot: u16) -> VellumResult<(TupleMeta, Tuple)> {
        if slot >= self.header.num_tuples {
            return Err(VellumError::Storage(format!(
                "slot {} out of range in table page",
                slot
            )));
        }
        let info = &self.header.tuple_infos[slot as usize];
        let start = info.offset as usize;
        let end = start + info.size as usize;
        let (tuple, _) = TupleCodec::decode(&self.data[start..end], self.schema.clone())?;
        Ok((info.meta, tuple))
    }

    pub fn get_next_rid(&self, rid: &RecordId) -> Option<RecordId> {
        let next_slot = rid.slot_num + 1;
        if next_slot < self.header.num_tuples as u32 {
            Some(RecordId::new(rid.page_id, next_slot))
        } else {
            None
        }
    }
}
