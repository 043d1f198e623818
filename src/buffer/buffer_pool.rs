use crate::buffer::extendible_hash::ExtendibleHashTable;
use crate::buffer::lru_k::LRUKReplacer;
use crate::buffer::page::{Frame, PageId, PageRef, PAGE_SIZE};
use crate::error::{VellumError, VellumResult};
use crate::storage::disk_manager::DiskManager;
use log::debug;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;

pub type FrameId = usize;

pub const BUFFER_POOL_SIZE: usize = 1000;
const LRU_K: usize = 2;
const PAGE_TABLE_BUCKET_SIZE: usize = 8;

/// Fixed array of frames plus the page table, the replacer and a free list.
/// Frame allocation and page-table installation linearize on the pool latch;
/// unpinning goes through atomics so guards can be dropped anywhere.
#[derive(Debug)]
pub struct BufferPoolManager {
    pool: Vec<Arc<Frame>>,
    pub replacer: Arc<Mutex<LRUKReplacer>>,
    pub disk_manager: Arc<DiskManager>,
    page_table: Arc<ExtendibleHashTable<PageId, FrameId>>,
    free_list: Mutex<VecDeque<FrameId>>,
    latch: Mutex<()>,
}

impl BufferPoolManager {
    pub fn new(num_pages: usize, disk_manager: Arc<DiskManager>) -> Self {
        let mut free_list = VecDeque::with_capacity(num_pages);
        let mut pool = Vec::with_capacity(num_pages);
        for frame_id in 0..num_pages {
            free_list.push_back(frame_id);
            pool.push(Arc::new(Frame::new()));
        }
        Self {
            pool,
            replacer: Arc::new(Mutex::new(LRUKReplacer::with_k(num_pages, LRU_K))),
            disk_manager,
            page_table: Arc::new(ExtendibleHashTable::new(PAGE_TABLE_BUCKET_SIZE)),
            free_list: Mutex::new(free_list),
            latch: Mutex::new(()),
        }
    }

    /// Allocate a fresh page on disk and pin it into a frame, zero-filled.
    pub fn new_page(&self) -> VellumResult<PageRef> {
        let _guard = self.latch.lock();
        let frame_id = self.allocate_frame()?;
        let page_id = self.disk_manager.allocate_page()?;

        self.pool[frame_id].page.write().reset(page_id, [0; PAGE_SIZE]);
        self.pool[frame_id].pin_count.store(1, Ordering::SeqCst);
        self.page_table.insert(page_id, frame_id);
        {
            let mut replacer = self.replacer.lock();
            replacer.record_access(frame_id)?;
            replacer.set_evictable(frame_id, false)?;
        }
        Ok(self.page_ref(frame_id, page_id))
    }

    /// Pin the page, reading it from disk on a page-table miss.
    pub fn fetch_page(&self, page_id: PageId) -> VellumResult<PageRef> {
        let _guard = self.latch.lock();
        if let Some(frame_id) = self.page_table.find(&page_id) {
            self.pool[frame_id].pin_count.fetch_add(1, Ordering::SeqCst);
            let mut replacer = self.replacer.lock();
            replacer.record_access(frame_id)?;
            replacer.set_evictable(frame_id, false)?;
            return Ok(self.page_ref(frame_id, page_id));
        }

        let frame_id = self.allocate_frame()?;
        let data = self.disk_manager.read_page(page_id)?;
        self.pool[frame_id].page.write().reset(page_id, data);
        self.pool[frame_id].pin_count.store(1, Ordering::SeqCst);
        self.page_table.insert(page_id, frame_id);
        {
            let mut replacer = self.replacer.lock();
            replacer.record_access(frame_id)?;
            replacer.set_evictable(frame_id, false)?;
        }
        Ok(self.page_ref(frame_id, page_id))
    }

    /// Drop one pin. Returns false when the pin count is already zero;
    /// unknown pages succeed trivially. The dirty assertion is sticky: only
    /// a flush clears it.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let Some(frame_id) = self.page_table.find(&page_id) else {
            return true;
        };
        let frame = &self.pool[frame_id];
        if is_dirty {
            frame.page.write().is_dirty = true;
        }
        let mut pins = frame.pin_count.load(Ordering::SeqCst);
        loop {
            if pins == 0 {
                return false;
            }
            match frame.pin_count.compare_exchange(
                pins,
                pins - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(actual) => pins = actual,
            }
        }
        if pins == 1 {
            let _ = self.replacer.lock().set_evictable(frame_id, true);
        }
        true
    }

    /// Write the page image back and clear the dirty flag.
    pub fn flush_page(&self, page_id: PageId) -> VellumResult<bool> {
        let Some(frame_id) = self.page_table.find(&page_id) else {
            return Ok(false);
        };
        let mut page = self.pool[frame_id].page.write();
        let mut data = [0u8; PAGE_SIZE];
        data.copy_from_slice(page.data());
        self.disk_manager.write_page(page.page_id, &data)?;
        page.is_dirty = false;
        Ok(true)
    }

    pub fn flush_all_pages(&self) -> VellumResult<()> {
        for page_id in self.page_table.keys() {
            let Some(frame_id) = self.page_table.find(&page_id) else {
                continue;
            };
            if self.pool[frame_id].page.read().is_dirty {
                self.flush_page(page_id)?;
            }
        }
        Ok(())
    }

    /// Evict the page from the pool and deallocate it on disk. Fails while
    /// the page is pinned.
    pub fn delete_page(&self, page_id: PageId) -> VellumResult<bool> {
        let _guard = self.latch.lock();
        let Some(frame_id) = self.page_table.find(&page_id) else {
            self.disk_manager.deallocate_page(page_id)?;
            return Ok(true);
        };
        if self.pool[frame_id].pin_count.load(Ordering::SeqCst) > 0 {
            return Ok(false);
        }

        self.pool[frame_id].page.write().destroy();
        self.page_table.remove(&page_id);
        self.replacer.lock().remove(frame_id);
        self.free_list.lock().push_back(frame_id);
        self.disk_manager.deallocate_page(page_id)?;
        Ok(true)
    }

    /// Free list first, then a replacer victim; a dirty victim is written
    /// back before its page-table entry goes away.
    fn allocate_frame(&self) -> VellumResult<FrameId> {
        if let Some(frame_id) = self.free_list.lock().pop_front() {
            return Ok(frame_id);
        }
        let Some(frame_id) = self.replacer.lock().evict() else {
            return Err(VellumError::Storage(
                "cannot allocate frame: buffer pool is full and every frame is pinned".to_string(),
            ));
        };
        let (evicted_page_id, is_dirty, data) = {
            let page = self.pool[frame_id].page.read();
            let mut data = [0u8; PAGE_SIZE];
            data.copy_from_slice(page.data());
            (page.page_id, page.is_dirty, data)
        };
        if is_dirty {
            debug!("evicting dirty page {}, writing back", evicted_page_id);
            self.disk_manager.write_page(evicted_page_id, &data)?;
            self.pool[frame_id].page.write().is_dirty = false;
        }
        self.page_table.remove(&evicted_page_id);
        Ok(frame_id)
    }

    fn page_ref(&self, frame_id: FrameId, page_id: PageId) -> PageRef {
        PageRef {
            frame: self.pool[frame_id].clone(),
            frame_id,
            page_id,
            replacer: self.replacer.clone(),
        }
    }

    #[cfg(test)]
    fn resident_pages(&self) -> usize {
        self.page_table.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::disk_manager::DiskManager;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn setup(num_pages: usize) -> (TempDir, Arc<BufferPoolManager>) {
        let temp_dir = TempDir::new().unwrap();
        let disk_manager = Arc::new(DiskManager::try_new(temp_dir.path().join("test.db")).unwrap());
        let buffer_pool = Arc::new(BufferPoolManager::new(num_pages, disk_manager));
        (temp_dir, buffer_pool)
    }

    #[test]
    fn new_page_until_pool_is_full() {
        let (_temp_dir, buffer_pool) = setup(3);

        let page1 = buffer_pool.new_page().unwrap();
        let page1_id = page1.page_id();
        let _page2 = buffer_pool.new_page().unwrap();
        let _page3 = buffer_pool.new_page().unwrap();
        assert_eq!(buffer_pool.free_list.lock().len(), 0);
        assert_eq!(buffer_pool.replacer.lock().size(), 0);

        // all frames pinned
        assert!(buffer_pool.new_page().is_err());

        drop(page1);
        let page4 = buffer_pool.new_page().unwrap();
        assert_ne!(page4.page_id(), page1_id);
        assert!(buffer_pool.page_table.find(&page1_id).is_none());
    }

    #[test]
    fn unpin_makes_frame_evictable() {
        let (_temp_dir, buffer_pool) = setup(3);

        let page1 = buffer_pool.new_page().unwrap();
        let _page2 = buffer_pool.new_page().unwrap();
        let _page3 = buffer_pool.new_page().unwrap();
        assert!(buffer_pool.new_page().is_err());

        drop(page1);
        assert_eq!(buffer_pool.replacer.lock().size(), 1);
        assert!(buffer_pool.new_page().is_ok());
        assert_eq!(buffer_pool.replacer.lock().size(), 0);
    }

    #[test]
    fn unpin_page_explicit() {
        let (_temp_dir, buffer_pool) = setup(3);
        let page = buffer_pool.new_page().unwrap();
        let page_id = page.page_id();

        // second pin through fetch, then explicit unpin with dirty assertion
        let fetched = buffer_pool.fetch_page(page_id).unwrap();
        std::mem::forget(fetched);
        assert!(buffer_pool.unpin_page(page_id, true));
        drop(page);
        assert!(!buffer_pool.unpin_page(page_id, false));
        // dirty stays set until flushed
        let frame_id = buffer_pool.page_table.find(&page_id).unwrap();
        assert!(buffer_pool.pool[frame_id].page.read().is_dirty);
        buffer_pool.flush_page(page_id).unwrap();
        assert!(!buffer_pool.pool[frame_id].page.read().is_dirty);

        // unknown page ids succeed trivially
        assert!(buffer_pool.unpin_page(9999, false));
    }

    #[test]
    fn fetch_after_unpin_hits_the_pool() {
        let (_temp_dir, buffer_pool) = setup(3);
        let page = buffer_pool.new_page().unwrap();
        let page_id = page.page_id();
        {
            let mut guard = page.write();
            let mut data = [0u8; PAGE_SIZE];
            data[0] = 42;
            guard.set_data(data);
        }
        drop(page);

        let reads_before = buffer_pool.disk_manager.num_reads();
        let page = buffer_pool.fetch_page(page_id).unwrap();
        assert_eq!(page.read().data()[0], 42);
        // resident page: no extra disk read
        assert_eq!(buffer_pool.disk_manager.num_reads(), reads_before);
    }

    #[test]
    fn evicted_dirty_page_round_trips_through_disk() {
        let (_temp_dir, buffer_pool) = setup(1);
        let page = buffer_pool.new_page().unwrap();
        let page_id = page.page_id();
        {
            let mut data = [0u8; PAGE_SIZE];
            data[100] = 7;
            page.write().set_data(data);
        }
        drop(page);

        // force eviction by filling the single frame with a different page
        let other = buffer_pool.new_page().unwrap();
        drop(other);

        let page = buffer_pool.fetch_page(page_id).unwrap();
        assert_eq!(page.read().data()[100], 7);
    }

    #[test]
    fn delete_page_requires_zero_pins() {
        let (_temp_dir, buffer_pool) = setup(3);
        let page = buffer_pool.new_page().unwrap();
        let page_id = page.page_id();

        assert!(!buffer_pool.delete_page(page_id).unwrap());
        drop(page);
        assert!(buffer_pool.delete_page(page_id).unwrap());
        assert_eq!(buffer_pool.free_list.lock().len(), 3);
        assert_eq!(buffer_pool.resident_pages(), 0);

        // deleting an absent page succeeds
        assert!(buffer_pool.delete_page(page_id).unwrap());
    }
}
