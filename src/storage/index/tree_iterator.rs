use crate::buffer::INVALID_PAGE_ID;
use crate::error::VellumResult;
use crate::storage::index::bplus_tree::{BPlusTreeIndex, LeafHold};
use crate::storage::page::RecordId;
use crate::storage::tuple::Tuple;
use std::ops::{Bound, RangeBounds};
use std::sync::Arc;

/// Forward iterator over the leaf chain. Holds a pin plus read latch on the
/// current leaf; advancing to the next leaf latches the successor before the
/// current leaf is released. Dropping the iterator releases both. Not
/// restartable; finite.
pub struct TreeIndexIterator {
    index: Arc<BPlusTreeIndex>,
    start_bound: Bound<Tuple>,
    end_bound: Bound<Tuple>,
    current: Option<LeafHold>,
    cursor: usize,
    started: bool,
}

impl TreeIndexIterator {
    pub fn new<R: RangeBounds<Tuple>>(index: Arc<BPlusTreeIndex>, range: R) -> Self {
        Self {
            index,
            start_bound: range.start_bound().cloned(),
            end_bound: range.end_bound().cloned(),
            current: None,
            cursor: 0,
            started: false,
        }
    }

    pub fn next(&mut self) -> VellumResult<Option<(Tuple, RecordId)>> {
        if !self.started {
            self.started = true;
            self.position_at_start()?;
        } else if self.current.is_some() {
            self.cursor += 1;
        }

        loop {
            let Some(hold) = self.current.as_ref() else {
                return Ok(None);
            };
            if self.cursor < hold.leaf.header.current_size as usize {
                break;
            }
            let next_page_id = hold.leaf.header.next_page_id;
            if next_page_id == INVALID_PAGE_ID {
                self.current = None;
                return Ok(None);
            }
            // latch the successor before releasing the current leaf
            let next_hold = self.index.load_leaf(next_page_id)?;
            self.current = Some(next_hold);
            self.cursor = 0;
        }

        let hold = self.current.as_ref().expect("leaf positioned above");
        let (key, rid) = hold.leaf.kv_at(self.cursor).clone();
        let in_range = match &self.end_bound {
            Bound::Included(end) => &key <= end,
            Bound::Excluded(end) => &key < end,
            Bound::Unbounded => true,
        };
        if in_range {
            Ok(Some((key, rid)))
        } else {
            self.current = None;
            Ok(None)
        }
    }

    fn position_at_start(&mut self) -> VellumResult<()> {
        let start_bound = self.start_bound.clone();
        match start_bound {
            Bound::Unbounded => {
                self.current = self.index.find_leaf(None)?;
                self.cursor = 0;
            }
            Bound::Included(key) => {
                self.current = self.index.find_leaf(Some(&key))?;
                self.seek_within_leaf(&key, true);
            }
            Bound::Excluded(key) => {
                self.current = self.index.find_leaf(Some(&key))?;
                self.seek_within_leaf(&key, false);
            }
        }
        Ok(())
    }

    fn seek_within_leaf(&mut self, key: &Tuple, included: bool) {
        if let Some(hold) = self.current.as_ref() {
            // past-the-end cursor makes the advance loop hop to the next leaf
            self.cursor = hold
                .leaf
                .next_closest(key, included)
                .unwrap_or(hold.leaf.header.current_size as usize);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPoolManager;
    use crate::catalog::{Column, DataType, Schema, SchemaRef};
    use crate::storage::disk_manager::DiskManager;
    use std::ops::Bound;
    use tempfile::TempDir;

    fn build_index() -> (TempDir, Arc<BPlusTreeIndex>, SchemaRef) {
        let temp_dir = TempDir::new().unwrap();
        let disk_manager = Arc::new(DiskManager::try_new(temp_dir.path().join("test.db")).unwrap());
        let buffer_pool = Arc::new(BufferPoolManager::new(1000, disk_manager));
        let key_schema = Arc::new(Schema::new(vec![Column::new("k", DataType::Int32, false)]));
        let index = Arc::new(
            BPlusTreeIndex::try_new("iter_test", key_schema.clone(), buffer_pool, 4, 4).unwrap(),
        );
        for v in 1..=11 {
            index
                .insert(
                    &Tuple::new(key_schema.clone(), vec![v.into()]),
                    RecordId::new(v as u32, v as u32),
                )
                .unwrap();
        }
        (temp_dir, index, key_schema)
    }

    fn key(schema: &SchemaRef, v: i32) -> Tuple {
        Tuple::new(schema.clone(), vec![v.into()])
    }

    #[test]
    fn unbounded_iteration_is_ordered() {
        let (_temp_dir, index, _schema) = build_index();
        let mut iterator = TreeIndexIterator::new(index, ..);
        let mut rids = Vec::new();
        while let Some((_, rid)) = iterator.next().unwrap() {
            rids.push(rid);
        }
        assert_eq!(
            rids,
            (1..=11u32).map(|v| RecordId::new(v, v)).collect::<Vec<_>>()
        );
        // exhausted iterators stay exhausted
        assert!(iterator.next().unwrap().is_none());
    }

    #[test]
    fn bounded_ranges() {
        let (_temp_dir, index, schema) = build_index();

        let mut iterator =
            TreeIndexIterator::new(index.clone(), ..key(&schema, 3));
        assert_eq!(iterator.next().unwrap().unwrap().1, RecordId::new(1, 1));
        assert_eq!(iterator.next().unwrap().unwrap().1, RecordId::new(2, 2));
        assert!(iterator.next().unwrap().is_none());

        let mut iterator =
            TreeIndexIterator::new(index.clone(), key(&schema, 3)..=key(&schema, 5));
        assert_eq!(iterator.next().unwrap().unwrap().1, RecordId::new(3, 3));
        assert_eq!(iterator.next().unwrap().unwrap().1, RecordId::new(4, 4));
        assert_eq!(iterator.next().unwrap().unwrap().1, RecordId::new(5, 5));
        assert!(iterator.next().unwrap().is_none());

        let mut iterator = TreeIndexIterator::new(
            index,
            (Bound::Excluded(key(&schema, 6)), Bound::Excluded(key(&schema, 8))),
        );
        assert_eq!(iterator.next().unwrap().unwrap().1, RecordId::new(7, 7));
        assert!(iterator.next().unwrap().is_none());
    }

    #[test]
    fn start_past_every_key_is_empty() {
        let (_temp_dir, index, schema) = build_index();
        let mut iterator = TreeIndexIterator::new(index, key(&schema, 100)..);
        assert!(iterator.next().unwrap().is_none());
    }
}
