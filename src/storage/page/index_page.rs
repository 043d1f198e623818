use crate::buffer::{PageId, INVALID_PAGE_ID};
use crate::catalog::SchemaRef;
use crate::storage::page::RecordId;
use crate::storage::tuple::Tuple;
use std::cmp::Ordering;

pub type InternalKV = (Tuple, PageId);
pub type LeafKV = (Tuple, RecordId);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BPlusTreePageType {
    LeafPage,
    InternalPage,
}

/// Typed view over a B+ tree page; the page-type header byte discriminates.
#[derive(Debug, Clone, PartialEq)]
pub enum BPlusTreePage {
    Internal(BPlusTreeInternalPage),
    Leaf(BPlusTreeLeafPage),
}

impl BPlusTreePage {
    pub fn page_id(&self) -> PageId {
        match self {
            Self::Internal(page) => page.header.page_id,
            Self::Leaf(page) => page.header.page_id,
        }
    }

    pub fn parent_page_id(&self) -> PageId {
        match self {
            Self::Internal(page) => page.header.parent_page_id,
            Self::Leaf(page) => page.header.parent_page_id,
        }
    }

    pub fn set_parent_page_id(&mut self, parent_page_id: PageId) {
        match self {
            Self::Internal(page) => page.header.parent_page_id = parent_page_id,
            Self::Leaf(page) => page.header.parent_page_id = parent_page_id,
        }
    }

    pub fn current_size(&self) -> u32 {
        match self {
            Self::Internal(page) => page.header.current_size,
            Self::Leaf(page) => page.header.current_size,
        }
    }

    pub fn max_size(&self) -> u32 {
        match self {
            Self::Internal(page) => page.header.max_size,
            Self::Leaf(page) => page.header.max_size,
        }
    }

    pub fn min_size(&self) -> u32 {
        match self {
            Self::Internal(page) => page.min_size(),
            Self::Leaf(page) => page.min_size(),
        }
    }

    /// One past max size: the node must split.
    pub fn is_overflow(&self) -> bool {
        self.current_size() > self.max_size()
    }

    pub fn is_underflow(&self, is_root: bool) -> bool {
        if is_root {
            return false;
        }
        self.current_size() < self.min_size()
    }

    /// Safe for an insert descent: one more entry cannot overflow it.
    pub fn is_insert_safe(&self) -> bool {
        self.current_size() < self.max_size()
    }

    /// Safe for a remove descent: one fewer entry cannot underflow it. The
    /// root is special: a root leaf empties at size 1, and an internal root
    /// collapses at size 2.
    pub fn is_remove_safe(&self, is_root: bool) -> bool {
        if is_root {
            return match self {
                Self::Leaf(page) => page.header.current_size > 1,
                Self::Internal(page) => page.header.current_size > 2,
            };
        }
        self.current_size() > self.min_size()
    }
}

/**
 * Internal page: header followed by a sorted (key, child-page-id) array.
 * Slot 0 holds only a child pointer; its key is an ignored sentinel. For
 * i >= 1, the key at slot i is the smallest key reachable through child i.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct BPlusTreeInternalPage {
    pub key_schema: SchemaRef,
    pub header: BPlusTreeInternalPageHeader,
    pub array: Vec<InternalKV>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BPlusTreeInternalPageHeader {
    pub page_type: BPlusTreePageType,
    pub current_size: u32,
    pub max_size: u32,
    pub parent_page_id: PageId,
    pub page_id: PageId,
}

impl BPlusTreeInternalPage {
    pub fn new(key_schema: SchemaRef, max_size: u32, page_id: PageId) -> Self {
        Self {
            key_schema,
            header: BPlusTreeInternalPageHeader {
                page_type: BPlusTreePageType::InternalPage,
                current_size: 0,
                max_size,
                parent_page_id: INVALID_PAGE_ID,
                page_id,
            },
            array: Vec::with_capacity(max_size as usize + 1),
        }
    }

    pub fn min_size(&self) -> u32 {
        self.header.max_size.div_ceil(2)
    }

    pub fn key_at(&self, index: usize) -> &Tuple {
        &self.array[index].0
    }

    pub fn value_at(&self, index: usize) -> PageId {
        self.array[index].1
    }

    pub fn set_key_at(&mut self, index: usize, key: Tuple) {
        self.array[index].0 = key;
    }

    pub fn sentinel_key(&self) -> Tuple {
        Tuple::empty(self.key_schema.clone())
    }

    pub fn child_index_of(&self, page_id: PageId) -> Option<usize> {
        self.array.iter().position(|kv| kv.1 == page_id)
    }

    /// First slot holds only the leftmost child pointer.
    pub fn init_root(&mut self, left_child: PageId, key: Tuple, right_child: PageId) {
        debug_assert!(self.array.is_empty());
        self.array.push((self.sentinel_key(), left_child));
        self.array.push((key, right_child));
        self.header.current_size = 2;
    }

    /// Insert a key plus the child guarded by it, keeping keys ascending.
    /// Never used for slot 0; the sentinel is installed by `init_root` or a
    /// split.
    pub fn insert(&mut self, key: Tuple, child: PageId) {
        let mut pos = self.array.len();
        for idx in 1..self.array.len() {
            if key < self.array[idx].0 {
                pos = idx;
                break;
            }
        }
        self.array.insert(pos, (key, child));
        self.header.current_size += 1;
    }

    /// Child to descend into: the last child whose guarding key is <= key.
    pub fn look_up(&self, key: &Tuple) -> PageId {
        debug_assert!(self.header.current_size >= 1);
        let mut result = self.array[0].1;
        for idx in 1..self.header.current_size as usize {
            if key >= &self.array[idx].0 {
                result = self.array[idx].1;
            } else {
                break;
            }
        }
        result
    }

    pub fn remove_at(&mut self, index: usize) -> InternalKV {
        let kv = self.array.remove(index);
        self.header.current_size -= 1;
        // never leave a keyed entry at slot 0
        if index == 0 && !self.array.is_empty() {
            self.array[0].0 = self.sentinel_key();
        }
        kv
    }

    pub fn split_off(&mut self, at: usize) -> Vec<InternalKV> {
        let tail = self.array.split_off(at);
        self.header.current_size -= tail.len() as u32;
        tail
    }

    pub fn extend(&mut self, kvs: Vec<InternalKV>) {
        self.header.current_size += kvs.len() as u32;
        self.array.extend(kvs);
    }

    /// Take the leftmost child for a borrow toward the left sibling.
    /// Returns (separating key that guarded child 1, the popped child).
    pub fn pop_front(&mut self) -> InternalKV {
        debug_assert!(self.header.current_size >= 2);
        let (_, child) = self.array.remove(0);
        let sentinel = self.sentinel_key();
        let key = std::mem::replace(&mut self.array[0].0, sentinel);
        self.header.current_size -= 1;
        (key, child)
    }

    pub fn pop_back(&mut self) -> InternalKV {
        let kv = self.array.pop().expect("pop_back on empty internal page");
        self.header.current_size -= 1;
        kv
    }

    /// Prepend a child, giving the previous leftmost child `key` as its
    /// guard. Used when borrowing from the left sibling.
    pub fn push_front(&mut self, key: Tuple, child: PageId) {
        if !self.array.is_empty() {
            self.array[0].0 = key;
            self.array.insert(0, (self.sentinel_key(), child));
        } else {
            self.array.push((self.sentinel_key(), child));
        }
        self.header.current_size += 1;
    }
}

/**
 * Leaf page: header followed by a sorted (key, record-id) array. Leaves are
 * chained left to right through `next_page_id`.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct BPlusTreeLeafPage {
    pub key_schema: SchemaRef,
    pub header: BPlusTreeLeafPageHeader,
    pub array: Vec<LeafKV>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BPlusTreeLeafPageHeader {
    pub page_type: BPlusTreePageType,
    pub current_size: u32,
    pub max_size: u32,
    pub parent_page_id: PageId,
    pub page_id: PageId,
    pub next_page_id: PageId,
}

impl BPlusTreeLeafPage {
    pub fn new(key_schema: SchemaRef, max_size: u32, page_id: PageId) -> Self {
        Self {
            key_schema,
            header: BPlusTreeLeafPageHeader {
                page_type: BPlusTreePageType::LeafPage,
                current_size: 0,
                max_size,
                parent_page_id: INVALID_PAGE_ID,
                page_id,
                next_page_id: INVALID_PAGE_ID,
            },
            array: Vec::with_capacity(max_size as usize + 1),
        }
    }

    pub fn min_size(&self) -> u32 {
        self.header.max_size.div_ceil(2)
    }

    pub fn key_at(&self, index: usize) -> &Tuple {
        &self.array[index].0
    }

    pub fn kv_at(&self, index: usize) -> &LeafKV {
        &self.array[index]
    }

    pub fn look_up(&self, key: &Tuple) -> Option<RecordId> {
        self.array
            .binary_search_by(|(k, _)| k.partial_cmp(key).unwrap_or(Ordering::Less))
            .ok()
            .map(|idx| self.array[idx].1)
    }

    /// Sorted insert; duplicates are rejected.
    pub fn insert(&mut self, key: Tuple, rid: RecordId) -> bool {
        match self
            .array
            .binary_search_by(|(k, _)| k.partial_cmp(&key).unwrap_or(Ordering::Less))
        {
            Ok(_) => false,
            Err(pos) => {
                self.array.insert(pos, (key, rid));
                self.header.current_size += 1;
                true
            }
        }
    }

    pub fn delete(&mut self, key: &Tuple) -> bool {
        match self
            .array
            .binary_search_by(|(k, _)| k.partial_cmp(key).unwrap_or(Ordering::Less))
        {
            Ok(pos) => {
                self.array.remove(pos);
                self.header.current_size -= 1;
                true
            }
            Err(_) => false,
        }
    }

    /// Index of the first entry >= key (> key when `included` is false).
    pub fn next_closest(&self, key: &Tuple, included: bool) -> Option<usize> {
        for (idx, (k, _)) in self.array.iter().enumerate() {
            match k.partial_cmp(key) {
                Some(Ordering::Greater) => return Some(idx),
                Some(Ordering::Equal) if included => return Some(idx),
                _ => continue,
            }
        }
        None
    }

    pub fn split_off(&mut self, at: usize) -> Vec<LeafKV> {
        let tail = self.array.split_off(at);
        self.header.current_size -= tail.len() as u32;
        tail
    }

    pub fn extend(&mut self, kvs: Vec<LeafKV>) {
        self.header.current_size += kvs.len() as u32;
        self.array.extend(kvs);
    }

    pub fn pop_front(&mut self) -> LeafKV {
        let kv = self.array.remove(0);
        self.header.current_size -= 1;
        kv
    }

    pub fn pop_back(&mut self) -> LeafKV {
        let kv = self.array.pop().expect("pop_back on empty leaf page");
        self.header.current_size -= 1;
        kv
    }

    pub fn push_front(&mut self, kv: LeafKV) {
        self.array.insert(0, kv);
        self.header.current_size += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, DataType, Schema};
    use std::sync::Arc;

    fn key_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![Column::new("k", DataType::Int32, false)]))
    }

    fn key(v: i32) -> Tuple {
        Tuple::new(key_schema(), vec![v.into()])
    }

    #[test]
    fn leaf_insert_sorted_and_rejects_duplicates() {
        let mut leaf = BPlusTreeLeafPage::new(key_schema(), 4, 1);
        assert!(leaf.insert(key(3), RecordId::new(1, 3)));
        assert!(leaf.insert(key(1), RecordId::new(1, 1)));
        assert!(leaf.insert(key(2), RecordId::new(1, 2)));
        assert!(!leaf.insert(key(2), RecordId::new(9, 9)));

        assert_eq!(leaf.header.current_size, 3);
        assert_eq!(leaf.key_at(0), &key(1));
        assert_eq!(leaf.key_at(2), &key(3));
        assert_eq!(leaf.look_up(&key(2)), Some(RecordId::new(1, 2)));
        assert_eq!(leaf.look_up(&key(9)), None);
    }

    #[test]
    fn leaf_delete() {
        let mut leaf = BPlusTreeLeafPage::new(key_schema(), 4, 1);
        leaf.insert(key(1), RecordId::new(1, 1));
        leaf.insert(key(2), RecordId::new(1, 2));
        assert!(leaf.delete(&key(1)));
        assert!(!leaf.delete(&key(1)));
        assert_eq!(leaf.header.current_size, 1);
    }

    #[test]
    fn internal_look_up_picks_last_child_at_or_below_key() {
        let mut internal = BPlusTreeInternalPage::new(key_schema(), 4, 10);
        internal.init_root(1, key(5), 2);
        internal.insert(key(8), 3);

        assert_eq!(internal.look_up(&key(1)), 1);
        assert_eq!(internal.look_up(&key(5)), 2);
        assert_eq!(internal.look_up(&key(7)), 2);
        assert_eq!(internal.look_up(&key(8)), 3);
        assert_eq!(internal.look_up(&key(100)), 3);
    }

    #[test]
    fn internal_borrow_rotations() {
        let mut internal = BPlusTreeInternalPage::new(key_schema(), 4, 10);
        internal.init_root(1, key(5), 2);
        internal.insert(key(8), 3);

        let (sep, child) = internal.pop_front();
        assert_eq!(sep, key(5));
        assert_eq!(child, 1);
        assert_eq!(internal.value_at(0), 2);
        assert_eq!(internal.header.current_size, 2);

        internal.push_front(key(4), 7);
        assert_eq!(internal.value_at(0), 7);
        assert_eq!(internal.key_at(1), &key(4));
        assert_eq!(internal.header.current_size, 3);
    }
}
