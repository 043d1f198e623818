use crate::buffer::{
    BufferPoolManager, PageId, PageReadGuard, PageRef, PageWriteGuard, HEADER_PAGE_ID,
    INVALID_PAGE_ID,
};
use crate::catalog::SchemaRef;
use crate::error::{VellumError, VellumResult};
use crate::storage::codec::{
    page_bytes_to_array, BPlusTreeInternalPageCodec, BPlusTreeLeafPageCodec, BPlusTreePageCodec,
    HeaderPageCodec,
};
use crate::storage::page::{
    BPlusTreeInternalPage, BPlusTreeLeafPage, BPlusTreePage, RecordId,
};
use crate::storage::tuple::Tuple;
use log::debug;
use parking_lot::lock_api::ArcRwLockWriteGuard;
use parking_lot::{RawRwLock, RwLock};
use std::sync::Arc;

type RootWriteGuard = ArcRwLockWriteGuard<RawRwLock, PageId>;

/// A page held by a write descent: latch, pin and the decoded view.
/// The latch drops before the pin.
struct LatchedPage {
    guard: PageWriteGuard,
    page: PageRef,
    node: BPlusTreePage,
}

/// A leaf held by a read path: latch plus pin keep the decoded view stable.
pub(crate) struct LeafHold {
    _guard: PageReadGuard,
    _page: PageRef,
    pub(crate) leaf: BPlusTreeLeafPage,
}

/// Latches acquired during a write descent. The tree-level root latch sits
/// at the head of the held list; ancestors are released as a group once a
/// safe child bounds the operation.
struct WriteContext {
    root_guard: Option<RootWriteGuard>,
    path: Vec<LatchedPage>,
    // pages unlinked during rebalancing, deleted after unlatching
    deleted: Vec<PageId>,
}

impl WriteContext {
    fn release_ancestors_of_last(&mut self) {
        if self.path.len() > 1 {
            self.path.drain(0..self.path.len() - 1);
        }
        self.root_guard = None;
    }
}

/// Disk-resident B+ tree with unique integer-like keys, concurrent access
/// via latch crabbing, and a leaf chain for range iteration. The root page
/// id is persisted in the header page under the index name.
#[derive(Debug)]
pub struct BPlusTreeIndex {
    pub name: String,
    pub key_schema: SchemaRef,
    pub buffer_pool: Arc<BufferPoolManager>,
    pub internal_max_size: u32,
    pub leaf_max_size: u32,
    pub(crate) root_latch: Arc<RwLock<PageId>>,
}

impl BPlusTreeIndex {
    pub fn try_new(
        name: impl Into<String>,
        key_schema: SchemaRef,
        buffer_pool: Arc<BufferPoolManager>,
        internal_max_size: u32,
        leaf_max_size: u32,
    ) -> VellumResult<Self> {
        assert!(internal_max_size >= 3, "internal fanout too small");
        assert!(leaf_max_size >= 2, "leaf fanout too small");
        let name = name.into();

        let page = buffer_pool.fetch_page(HEADER_PAGE_ID)?;
        let mut guard = page.write();
        let (mut header, _) = HeaderPageCodec::decode(guard.data())?;
        let root_page_id = match header.get_record(&name) {
            Some(root) => root,
            None => {
                header.insert_record(&name, INVALID_PAGE_ID);
                guard.set_data(page_bytes_to_array(&HeaderPageCodec::encode(&header)));
                INVALID_PAGE_ID
            }
        };
        drop(guard);

        Ok(Self {
            name,
            key_schema,
            buffer_pool,
            internal_max_size,
            leaf_max_size,
            root_latch: Arc::new(RwLock::new(root_page_id)),
        })
    }

    pub fn is_empty(&self) -> bool {
        *self.root_latch.read() == INVALID_PAGE_ID
    }

    /// Point lookup with hand-over-hand read latching.
    pub fn get(&self, key: &Tuple) -> VellumResult<Option<RecordId>> {
        match self.find_leaf(Some(key))? {
            Some(hold) => Ok(hold.leaf.look_up(key)),
            None => Ok(None),
        }
    }

    /// Unique-key insert; false when the key already exists.
    pub fn insert(&self, key: &Tuple, rid: RecordId) -> VellumResult<bool> {
        let mut root_guard = self.root_latch.write_arc();
        if *root_guard == INVALID_PAGE_ID {
            let page = self.buffer_pool.new_page()?;
            let page_id = page.page_id();
            let mut leaf =
                BPlusTreeLeafPage::new(self.key_schema.clone(), self.leaf_max_size, page_id);
            leaf.insert(key.clone(), rid);
            page.write().set_data(page_bytes_to_array(
                &BPlusTreeLeafPageCodec::encode(&leaf),
            ));
            *root_guard = page_id;
            self.persist_root(page_id)?;
            debug!("index {}: started new tree at page {}", self.name, page_id);
            return Ok(true);
        }

        let mut ctx = WriteContext {
            path: Vec::new(),
            deleted: Vec::new(),
            root_guard: None,
        };
        let mut current_page_id = *root_guard;
        ctx.root_guard = Some(root_guard);

        // crab down, keeping ancestors latched until a child is insert-safe
        loop {
            let page = self.buffer_pool.fetch_page(current_page_id)?;
            let guard = page.write_arc();
            let (node, _) = BPlusTreePageCodec::decode(guard.data(), self.key_schema.clone())?;
            let safe = node.is_insert_safe();
            let next = match &node {
                BPlusTreePage::Internal(internal) => Some(internal.look_up(key)),
                BPlusTreePage::Leaf(_) => None,
            };
            ctx.path.push(LatchedPage { guard, page, node });
            if safe {
                ctx.release_ancestors_of_last();
            }
            match next {
                Some(child) => current_page_id = child,
                None => break,
            }
        }

        {
            let entry = ctx.path.last_mut().expect("descent reaches a leaf");
            let BPlusTreePage::Leaf(leaf) = &mut entry.node else {
                return Err(VellumError::Internal(
                    "b+ tree descent ended on an internal page".to_string(),
                ));
            };
            if !leaf.insert(key.clone(), rid) {
                return Ok(false);
            }
        }

        // propagate splits upward along the latched path
        let mut pending: Option<(Tuple, PageId)> = None;
        while let Some(mut entry) = ctx.path.pop() {
            if let Some((promoted_key, new_child_id)) = pending.take() {
                let BPlusTreePage::Internal(internal) = &mut entry.node else {
                    return Err(VellumError::Internal(
                        "split propagated into a leaf page".to_string(),
                    ));
                };
                internal.insert(promoted_key, new_child_id);
            }

            if entry.node.is_overflow() {
                let (promoted_key, new_page_id) = self.split(&mut entry.node)?;
                if ctx.path.is_empty() {
                    // the root itself split; grow the tree by one level
                    let root_guard = ctx
                        .root_guard
                        .as_mut()
                        .expect("root latch retained while the root is unsafe");
                    let new_root_page = self.buffer_pool.new_page()?;
                    let new_root_id = new_root_page.page_id();
                    let mut new_root = BPlusTreeInternalPage::new(
                        self.key_schema.clone(),
                        self.internal_max_size,
                        new_root_id,
                    );
                    new_root.init_root(entry.node.page_id(), promoted_key, new_page_id);
                    new_root_page.write().set_data(page_bytes_to_array(
                        &BPlusTreeInternalPageCodec::encode(&new_root),
                    ));

                    entry.node.set_parent_page_id(new_root_id);
                    Self::write_node(&mut entry.guard, &entry.node);
                    self.set_parent_of(new_page_id, new_root_id)?;

                    **root_guard = new_root_id;
                    self.persist_root(new_root_id)?;
                    debug!("index {}: new root page {}", self.name, new_root_id);
                    pending = None;
                } else {
                    Self::write_node(&mut entry.guard, &entry.node);
                    pending = Some((promoted_key, new_page_id));
                }
            } else {
                Self::write_node(&mut entry.guard, &entry.node);
                pending = None;
            }

            if pending.is_none() {
                break;
            }
        }
        Ok(true)
    }

    /// Remove a key; absent keys are a no-op. Underflowing nodes borrow from
    /// or merge with a sibling, preferring the right one unless the node is
    /// the rightmost child.
    pub fn delete(&self, key: &Tuple) -> VellumResult<()> {
        let root_guard = self.root_latch.write_arc();
        if *root_guard == INVALID_PAGE_ID {
            return Ok(());
        }

        let mut ctx = WriteContext {
            path: Vec::new(),
            deleted: Vec::new(),
            root_guard: None,
        };
        let mut current_page_id = *root_guard;
        ctx.root_guard = Some(root_guard);

        loop {
            let page = self.buffer_pool.fetch_page(current_page_id)?;
            let guard = page.write_arc();
            let (node, _) = BPlusTreePageCodec::decode(guard.data(), self.key_schema.clone())?;
            let is_root = ctx.path.is_empty();
            let safe = node.is_remove_safe(is_root);
            let next = match &node {
                BPlusTreePage::Internal(internal) => Some(internal.look_up(key)),
                BPlusTreePage::Leaf(_) => None,
            };
            ctx.path.push(LatchedPage { guard, page, node });
            if safe {
                ctx.release_ancestors_of_last();
            }
            match next {
                Some(child) => current_page_id = child,
                None => break,
            }
        }

        {
            let entry = ctx.path.last_mut().expect("descent reaches a leaf");
            let BPlusTreePage::Leaf(leaf) = &mut entry.node else {
                return Err(VellumError::Internal(
                    "b+ tree descent ended on an internal page".to_string(),
                ));
            };
            if !leaf.delete(key) {
                return Ok(());
            }
            Self::write_node(&mut entry.guard, &entry.node);
        }

        let mut entry = ctx.path.pop().expect("leaf entry present");
        loop {
            if ctx.path.is_empty() {
                self.adjust_root(&mut ctx, entry)?;
                break;
            }
            if !entry.node.is_underflow(false) {
                break;
            }
            entry = self.rebalance(&mut ctx, entry)?;
        }

        let deleted = std::mem::take(&mut ctx.deleted);
        drop(ctx);
        for page_id in deleted {
            self.buffer_pool.delete_page(page_id)?;
        }
        Ok(())
    }

    /// Collapse the root when it empties: an empty root leaf ends the tree,
    /// an internal root with a single child promotes that child.
    fn adjust_root(&self, ctx: &mut WriteContext, entry: LatchedPage) -> VellumResult<()> {
        let Some(root_guard) = ctx.root_guard.as_mut() else {
            // ancestors were released, so this node was safe and cannot
            // have emptied
            return Ok(());
        };
        match &entry.node {
            BPlusTreePage::Leaf(leaf) if leaf.header.current_size == 0 => {
                **root_guard = INVALID_PAGE_ID;
                self.persist_root(INVALID_PAGE_ID)?;
                ctx.deleted.push(entry.node.page_id());
                debug!("index {}: tree is now empty", self.name);
            }
            BPlusTreePage::Internal(internal) if internal.header.current_size == 1 => {
                let new_root_id = internal.value_at(0);
                **root_guard = new_root_id;
                self.set_parent_of(new_root_id, INVALID_PAGE_ID)?;
                self.persist_root(new_root_id)?;
                ctx.deleted.push(entry.node.page_id());
                debug!("index {}: root collapsed to page {}", self.name, new_root_id);
            }
            _ => {}
        }
        Ok(())
    }

    /// Fix one underflowing node against a sibling under the latched parent.
    /// Returns the parent entry so the caller can keep walking up.
    fn rebalance(
        &self,
        ctx: &mut WriteContext,
        mut entry: LatchedPage,
    ) -> VellumResult<LatchedPage> {
        let parent_entry = ctx.path.last_mut().expect("parent retained for unsafe child");
        let BPlusTreePage::Internal(parent) = &mut parent_entry.node else {
            return Err(VellumError::Internal(
                "b+ tree parent is not an internal page".to_string(),
            ));
        };
        let entry_page_id = entry.node.page_id();
        let idx = parent.child_index_of(entry_page_id).ok_or_else(|| {
            VellumError::Internal(format!(
                "page {} missing from its parent {}",
                entry_page_id,
                parent.header.page_id
            ))
        })?;

        // prefer the right sibling unless this is the rightmost child
        let entry_is_left = idx + 1 < parent.header.current_size as usize;
        let (left_idx, right_idx) = if entry_is_left {
            (idx, idx + 1)
        } else {
            (idx - 1, idx)
        };
        let sibling_page_id = if entry_is_left {
            parent.value_at(right_idx)
        } else {
            parent.value_at(left_idx)
        };
        let separator = parent.key_at(right_idx).clone();

        let sibling_page = self.buffer_pool.fetch_page(sibling_page_id)?;
        let mut sibling_guard = sibling_page.write_arc();
        let (mut sibling_node, _) =
            BPlusTreePageCodec::decode(sibling_guard.data(), self.key_schema.clone())?;

        if sibling_node.current_size() + entry.node.current_size() <= entry.node.max_size() {
            // merge right into left, then drop the separator from the parent
            if entry_is_left {
                self.merge_into(&mut entry.node, sibling_node, separator)?;
                Self::write_node(&mut entry.guard, &entry.node);
                ctx.deleted.push(sibling_page_id);
            } else {
                let right = std::mem::replace(
                    &mut entry.node,
                    BPlusTreePage::Leaf(BPlusTreeLeafPage::new(
                        self.key_schema.clone(),
                        self.leaf_max_size,
                        INVALID_PAGE_ID,
                    )),
                );
                self.merge_into(&mut sibling_node, right, separator)?;
                Self::write_node(&mut sibling_guard, &sibling_node);
                ctx.deleted.push(entry_page_id);
            }
            parent.remove_at(right_idx);
            Self::write_node(&mut parent_entry.guard, &parent_entry.node);
            drop(sibling_guard);
            drop(entry);
            Ok(ctx.path.pop().expect("parent entry present"))
        } else {
            // redistribute: borrow one adjacent entry from the sibling
            match (&mut entry.node, &mut sibling_node) {
                (BPlusTreePage::Leaf(node), BPlusTreePage::Leaf(sibling)) => {
                    if entry_is_left {
                        let kv = sibling.pop_front();
                        node.extend(vec![kv]);
                        parent.set_key_at(right_idx, sibling.key_at(0).clone());
                    } else {
                        let kv = sibling.pop_back();
                        parent.set_key_at(right_idx, kv.0.clone());
                        node.push_front(kv);
                    }
                }
                (BPlusTreePage::Internal(node), BPlusTreePage::Internal(sibling)) => {
                    if entry_is_left {
                        let (next_separator, child) = sibling.pop_front();
                        node.insert(separator, child);
                        parent.set_key_at(right_idx, next_separator);
                        self.set_parent_of(child, entry_page_id)?;
                    } else {
                        let (borrowed_key, child) = sibling.pop_back();
                        node.push_front(separator, child);
                        parent.set_key_at(right_idx, borrowed_key);
                        self.set_parent_of(child, entry_page_id)?;
                    }
                }
                _ => {
                    return Err(VellumError::Internal(
                        "sibling page type mismatch during borrow".to_string(),
                    ))
                }
            }
            Self::write_node(&mut entry.guard, &entry.node);
            Self::write_node(&mut sibling_guard, &sibling_node);
            Self::write_node(&mut parent_entry.guard, &parent_entry.node);
            drop(sibling_guard);
            drop(entry);
            // balanced: hand back the parent, which cannot underflow from a
            // borrow
            Ok(ctx.path.pop().expect("parent entry present"))
        }
    }

    fn merge_into(
        &self,
        left: &mut BPlusTreePage,
        right: BPlusTreePage,
        separator: Tuple,
    ) -> VellumResult<()> {
        match (left, right) {
            (BPlusTreePage::Leaf(left), BPlusTreePage::Leaf(right)) => {
                left.header.next_page_id = right.header.next_page_id;
                left.extend(right.array);
                Ok(())
            }
            (BPlusTreePage::Internal(left), BPlusTreePage::Internal(mut right)) => {
                // the separator keeps guarding the right side's first child
                right.array[0].0 = separator;
                let left_id = left.header.page_id;
                let moved_children: Vec<PageId> =
                    right.array.iter().map(|(_, child)| *child).collect();
                left.extend(right.array);
                for child in moved_children {
                    self.set_parent_of(child, left_id)?;
                }
                Ok(())
            }
            _ => Err(VellumError::Internal(
                "sibling page type mismatch during merge".to_string(),
            )),
        }
    }

    /// Split an overflowing node, returning the promoted key and the new
    /// right sibling's page id.
    fn split(&self, node: &mut BPlusTreePage) -> VellumResult<(Tuple, PageId)> {
        let new_page = self.buffer_pool.new_page()?;
        let new_page_id = new_page.page_id();

        match node {
            BPlusTreePage::Leaf(leaf) => {
                let moved = leaf.split_off(leaf.min_size() as usize);
                let mut new_leaf = BPlusTreeLeafPage::new(
                    self.key_schema.clone(),
                    self.leaf_max_size,
                    new_page_id,
                );
                new_leaf.header.parent_page_id = leaf.header.parent_page_id;
                new_leaf.header.next_page_id = leaf.header.next_page_id;
                leaf.header.next_page_id = new_page_id;
                new_leaf.extend(moved);
                let promoted_key = new_leaf.key_at(0).clone();
                new_page.write().set_data(page_bytes_to_array(
                    &BPlusTreeLeafPageCodec::encode(&new_leaf),
                ));
                Ok((promoted_key, new_page_id))
            }
            BPlusTreePage::Internal(internal) => {
                let split_at = internal.header.current_size as usize / 2;
                let mut moved = internal.split_off(split_at);
                let mut new_internal = BPlusTreeInternalPage::new(
                    self.key_schema.clone(),
                    self.internal_max_size,
                    new_page_id,
                );
                new_internal.header.parent_page_id = internal.header.parent_page_id;
                let promoted_key =
                    std::mem::replace(&mut moved[0].0, new_internal.sentinel_key());
                new_internal.extend(moved);
                new_page.write().set_data(page_bytes_to_array(
                    &BPlusTreeInternalPageCodec::encode(&new_internal),
                ));
                for (_, child) in new_internal.array.iter() {
                    self.set_parent_of(*child, new_page_id)?;
                }
                Ok((promoted_key, new_page_id))
            }
        }
    }

    /// Read-latched descent to the leaf responsible for `key`, or the
    /// leftmost leaf when no key is given.
    pub(crate) fn find_leaf(&self, key: Option<&Tuple>) -> VellumResult<Option<LeafHold>> {
        let root_guard = self.root_latch.read_arc();
        if *root_guard == INVALID_PAGE_ID {
            return Ok(None);
        }
        let mut current_page_id = *root_guard;
        let mut root_hold = Some(root_guard);
        let mut previous: Option<(PageReadGuard, PageRef)> = None;

        loop {
            let page = self.buffer_pool.fetch_page(current_page_id)?;
            let guard = page.read_arc();
            let (node, _) = BPlusTreePageCodec::decode(guard.data(), self.key_schema.clone())?;
            // child latched: the parent (and the root latch) may be released
            previous = Some((guard, page));
            if let Some(root_guard) = root_hold.take() {
                drop(root_guard);
            }

            match node {
                BPlusTreePage::Internal(internal) => {
                    current_page_id = match key {
                        Some(key) => internal.look_up(key),
                        None => internal.value_at(0),
                    };
                }
                BPlusTreePage::Leaf(leaf) => {
                    let (guard, page) = previous.expect("current page is held");
                    return Ok(Some(LeafHold {
                        _guard: guard,
                        _page: page,
                        leaf,
                    }));
                }
            }
        }
    }

    pub(crate) fn load_leaf(&self, page_id: PageId) -> VellumResult<LeafHold> {
        let page = self.buffer_pool.fetch_page(page_id)?;
        let guard = page.read_arc();
        let (leaf, _) = BPlusTreeLeafPageCodec::decode(guard.data(), self.key_schema.clone())?;
        Ok(LeafHold {
            _guard: guard,
            _page: page,
            leaf,
        })
    }

    fn set_parent_of(&self, page_id: PageId, parent_page_id: PageId) -> VellumResult<()> {
        let page = self.buffer_pool.fetch_page(page_id)?;
        let mut guard = page.write();
        let (mut node, _) = BPlusTreePageCodec::decode(guard.data(), self.key_schema.clone())?;
        node.set_parent_page_id(parent_page_id);
        guard.set_data(page_bytes_to_array(&BPlusTreePageCodec::encode(&node)));
        Ok(())
    }

    fn persist_root(&self, root_page_id: PageId) -> VellumResult<()> {
        let page = self.buffer_pool.fetch_page(HEADER_PAGE_ID)?;
        let mut guard = page.write();
        let (mut header, _) = HeaderPageCodec::decode(guard.data())?;
        if !header.update_record(&self.name, root_page_id) {
            header.insert_record(&self.name, root_page_id);
        }
        guard.set_data(page_bytes_to_array(&HeaderPageCodec::encode(&header)));
        Ok(())
    }

    fn write_node(guard: &mut PageWriteGuard, node: &BPlusTreePage) {
        guard.set_data(page_bytes_to_array(&BPlusTreePageCodec::encode(node)));
    }

    /// Walk the whole tree checking the structural invariants: sorted keys,
    /// size bounds, separator bounds, parent pointers and uniform depth.
    /// Intended for tests; takes no latches.
    pub fn verify_integrity(&self) -> VellumResult<()> {
        let root_page_id = *self.root_latch.read();
        if root_page_id == INVALID_PAGE_ID {
            return Ok(());
        }
        self.verify_node(root_page_id, INVALID_PAGE_ID, None, None, true)
            .map(|_| ())
    }

    fn verify_node(
        &self,
        page_id: PageId,
        expected_parent: PageId,
        lower: Option<&Tuple>,
        upper: Option<&Tuple>,
        is_root: bool,
    ) -> VellumResult<usize> {
        let page = self.buffer_pool.fetch_page(page_id)?;
        let (node, _) = {
            let guard = page.read();
            BPlusTreePageCodec::decode(guard.data(), self.key_schema.clone())?
        };

        if node.parent_page_id() != expected_parent {
            return Err(VellumError::Internal(format!(
                "page {} has parent {} but {} expected",
                page_id,
                node.parent_page_id(),
                expected_parent
            )));
        }
        if !is_root && node.current_size() < node.min_size() {
            return Err(VellumError::Internal(format!(
                "page {} under half full: {}/{}",
                page_id,
                node.current_size(),
                node.max_size()
            )));
        }
        if node.current_size() > node.max_size() {
            return Err(VellumError::Internal(format!(
                "page {} overflowed: {}/{}",
                page_id,
                node.current_size(),
                node.max_size()
            )));
        }

        match node {
            BPlusTreePage::Leaf(leaf) => {
                for window in leaf.array.windows(2) {
                    if window[0].0 >= window[1].0 {
                        return Err(VellumError::Internal(format!(
                            "page {} keys out of order",
                            page_id
                        )));
                    }
                }
                if let (Some(lower), Some(first)) = (lower, leaf.array.first()) {
                    if &first.0 < lower {
                        return Err(VellumError::Internal(format!(
                            "page {} violates its lower separator",
                            page_id
                        )));
                    }
                }
                if let (Some(upper), Some(last)) = (upper, leaf.array.last()) {
                    if &last.0 >= upper {
                        return Err(VellumError::Internal(format!(
                            "page {} violates its upper separator",
                            page_id
                        )));
                    }
                }
                Ok(1)
            }
            BPlusTreePage::Internal(internal) => {
                if is_root && internal.header.current_size < 2 {
                    return Err(VellumError::Internal(
                        "non-empty internal root must have at least two children".to_string(),
                    ));
                }
                for idx in 2..internal.header.current_size as usize {
                    if internal.key_at(idx - 1) >= internal.key_at(idx) {
                        return Err(VellumError::Internal(format!(
                            "page {} separator keys out of order",
                            page_id
                        )));
                    }
                }
                let mut depth = None;
                for idx in 0..internal.header.current_size as usize {
                    let child_lower = if idx == 0 {
                        lower
                    } else {
                        Some(internal.key_at(idx))
                    };
                    let child_upper = if idx + 1 < internal.header.current_size as usize {
                        Some(internal.key_at(idx + 1))
                    } else {
                        upper
                    };
                    let child_depth = self.verify_node(
                        internal.value_at(idx),
                        page_id,
                        child_lower,
                        child_upper,
                        false,
                    )?;
                    if let Some(depth) = depth {
                        if depth != child_depth {
                            return Err(VellumError::Internal(format!(
                                "page {} has children at unequal depths",
                                page_id
                            )));
                        }
                    }
                    depth = Some(child_depth);
                }
                Ok(depth.unwrap_or(0) + 1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, DataType, Schema};
    use crate::storage::disk_manager::DiskManager;
    use crate::storage::index::TreeIndexIterator;
    use std::sync::{Arc, Barrier};
    use tempfile::TempDir;

    fn setup(leaf_max: u32, internal_max: u32) -> (TempDir, BPlusTreeIndex, SchemaRef) {
        let temp_dir = TempDir::new().unwrap();
        let disk_manager = Arc::new(DiskManager::try_new(temp_dir.path().join("test.db")).unwrap());
        let buffer_pool = Arc::new(BufferPoolManager::new(1000, disk_manager));
        let key_schema = Arc::new(Schema::new(vec![Column::new("k", DataType::Int32, false)]));
        let index = BPlusTreeIndex::try_new(
            "test_index",
            key_schema.clone(),
            buffer_pool,
            internal_max,
            leaf_max,
        )
        .unwrap();
        (temp_dir, index, key_schema)
    }

    fn key(schema: &SchemaRef, v: i32) -> Tuple {
        Tuple::new(schema.clone(), vec![v.into()])
    }

    #[test]
    fn insert_splits_and_iterates_in_order() {
        let (_temp_dir, index, schema) = setup(4, 4);
        for v in 1..=10 {
            assert!(index.insert(&key(&schema, v), RecordId::new(v as u32, 0)).unwrap());
        }
        index.verify_integrity().unwrap();

        let index = Arc::new(index);
        let mut iterator = TreeIndexIterator::new(index.clone(), ..);
        let mut seen = Vec::new();
        while let Some((k, _)) = iterator.next().unwrap() {
            seen.push(k.data[0].clone());
        }
        assert_eq!(
            seen,
            (1..=10)
                .map(crate::utils::scalar::ScalarValue::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let (_temp_dir, index, schema) = setup(4, 4);
        assert!(index.insert(&key(&schema, 1), RecordId::new(1, 1)).unwrap());
        assert!(!index.insert(&key(&schema, 1), RecordId::new(2, 2)).unwrap());
        // the original value survives
        assert_eq!(
            index.get(&key(&schema, 1)).unwrap(),
            Some(RecordId::new(1, 1))
        );
    }

    #[test]
    fn get_finds_inserted_keys() {
        let (_temp_dir, index, schema) = setup(4, 4);
        for v in 1..=50 {
            index.insert(&key(&schema, v), RecordId::new(v as u32, v as u32)).unwrap();
        }
        for v in 1..=50 {
            assert_eq!(
                index.get(&key(&schema, v)).unwrap(),
                Some(RecordId::new(v as u32, v as u32)),
                "key {} missing",
                v
            );
        }
        assert_eq!(index.get(&key(&schema, 99)).unwrap(), None);
    }

    #[test]
    fn delete_with_borrow_and_merge() {
        let (_temp_dir, index, schema) = setup(4, 4);
        for v in 1..=20 {
            index.insert(&key(&schema, v), RecordId::new(v as u32, 0)).unwrap();
        }
        // remove in a mixed order to exercise both siblings
        for v in [1, 20, 10, 11, 2, 19, 3, 18, 4, 17] {
            index.delete(&key(&schema, v)).unwrap();
            index.verify_integrity().unwrap();
            assert_eq!(index.get(&key(&schema, v)).unwrap(), None);
        }
        // the rest is still reachable
        for v in [5, 6, 7, 8, 9, 12, 13, 14, 15, 16] {
            assert!(index.get(&key(&schema, v)).unwrap().is_some(), "key {}", v);
        }
    }

    #[test]
    fn delete_everything_empties_the_tree() {
        let (_temp_dir, index, schema) = setup(4, 4);
        for v in 1..=30 {
            index.insert(&key(&schema, v), RecordId::new(v as u32, 0)).unwrap();
        }
        for v in 1..=30 {
            index.delete(&key(&schema, v)).unwrap();
            index.verify_integrity().unwrap();
        }
        assert!(index.is_empty());
        assert_eq!(index.get(&key(&schema, 1)).unwrap(), None);

        // and the tree can be rebuilt afterwards
        assert!(index.insert(&key(&schema, 1), RecordId::new(1, 0)).unwrap());
        assert_eq!(index.get(&key(&schema, 1)).unwrap(), Some(RecordId::new(1, 0)));
    }

    #[test]
    fn boundary_split_and_merge() {
        let (_temp_dir, index, schema) = setup(4, 4);
        // exactly max-size keys stay in one leaf
        for v in 1..=4 {
            index.insert(&key(&schema, v), RecordId::new(v as u32, 0)).unwrap();
        }
        index.verify_integrity().unwrap();
        // one more triggers the first split
        index.insert(&key(&schema, 5), RecordId::new(5, 0)).unwrap();
        index.verify_integrity().unwrap();
        // removing back to min-size and below triggers the merge path
        for v in (1..=5).rev() {
            index.delete(&key(&schema, v)).unwrap();
            index.verify_integrity().unwrap();
        }
        assert!(index.is_empty());
    }

    #[test]
    fn root_persisted_in_header_page() {
        let temp_dir = TempDir::new().unwrap();
        let disk_manager = Arc::new(DiskManager::try_new(temp_dir.path().join("test.db")).unwrap());
        let buffer_pool = Arc::new(BufferPoolManager::new(100, disk_manager));
        let key_schema = Arc::new(Schema::new(vec![Column::new("k", DataType::Int32, false)]));

        let index = BPlusTreeIndex::try_new(
            "persisted",
            key_schema.clone(),
            buffer_pool.clone(),
            4,
            4,
        )
        .unwrap();
        index
            .insert(&Tuple::new(key_schema.clone(), vec![1i32.into()]), RecordId::new(1, 0))
            .unwrap();
        let root = *index.root_latch.read();
        drop(index);

        // a second handle on the same pool sees the recorded root
        let reopened =
            BPlusTreeIndex::try_new("persisted", key_schema.clone(), buffer_pool, 4, 4).unwrap();
        assert_eq!(*reopened.root_latch.read(), root);
        assert_eq!(
            reopened
                .get(&Tuple::new(key_schema, vec![1i32.into()]))
                .unwrap(),
            Some(RecordId::new(1, 0))
        );
    }

    #[test]
    fn randomized_insert_delete_round_trip() {
        use rand::seq::SliceRandom;

        let (_temp_dir, index, schema) = setup(6, 6);
        let mut keys: Vec<i32> = (0..200).collect();
        let mut rng = rand::rng();
        keys.shuffle(&mut rng);

        for &v in &keys {
            assert!(index.insert(&key(&schema, v), RecordId::new(v as u32, 0)).unwrap());
        }
        index.verify_integrity().unwrap();

        keys.shuffle(&mut rng);
        let (removed, kept) = keys.split_at(100);
        for &v in removed {
            index.delete(&key(&schema, v)).unwrap();
        }
        index.verify_integrity().unwrap();

        for &v in removed {
            assert_eq!(index.get(&key(&schema, v)).unwrap(), None);
        }
        for &v in kept {
            assert_eq!(
                index.get(&key(&schema, v)).unwrap(),
                Some(RecordId::new(v as u32, 0))
            );
        }
    }

    #[test]
    fn concurrent_inserts_preserve_every_key() {
        const THREADS: usize = 8;
        const KEYS_PER_THREAD: i32 = 250;

        let (_temp_dir, index, schema) = setup(10, 10);
        let index = Arc::new(index);
        let barrier = Arc::new(Barrier::new(THREADS));

        let mut handles = Vec::new();
        for t in 0..THREADS {
            let index = index.clone();
            let schema = schema.clone();
            let barrier = barrier.clone();
            handles.push(std::thread::spawn(move || {
                let start = t as i32 * KEYS_PER_THREAD;
                barrier.wait();
                for v in start..start + KEYS_PER_THREAD {
                    index
                        .insert(&key(&schema, v), RecordId::new(v as u32, v as u32))
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        index.verify_integrity().unwrap();
        for v in 0..(THREADS as i32 * KEYS_PER_THREAD) {
            assert_eq!(
                index.get(&key(&schema, v)).unwrap(),
                Some(RecordId::new(v as u32, v as u32)),
                "key {} lost",
                v
            );
        }
    }

    #[test]
    fn concurrent_duplicate_insert_grants_exactly_one() {
        let (_temp_dir, index, schema) = setup(4, 4);
        let index = Arc::new(index);
        let barrier = Arc::new(Barrier::new(4));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let index = index.clone();
            let schema = schema.clone();
            let barrier = barrier.clone();
            handles.push(std::thread::spawn(move || {
                barrier.wait();
                index.insert(&key(&schema, 42), RecordId::new(42, 0)).unwrap()
            }));
        }
        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(granted, 1);
    }
}
