use crate::buffer::buffer_pool::FrameId;
use crate::buffer::lru_k::LRUKReplacer;
use log::error;
use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{Mutex, RawRwLock, RwLock};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub type PageId = u32;

pub const INVALID_PAGE_ID: PageId = u32::MAX;
/// Page 0 holds the index-name -> root-page-id records.
pub const HEADER_PAGE_ID: PageId = 0;
pub const PAGE_SIZE: usize = 4096;

/// Owned latch guards, so a tree traversal can carry its held latches in a
/// context that outlives the borrow of the frame.
pub type PageReadGuard = ArcRwLockReadGuard<RawRwLock, Page>;
pub type PageWriteGuard = ArcRwLockWriteGuard<RawRwLock, Page>;

#[derive(Debug)]
pub struct Page {
    pub page_id: PageId,
    data: [u8; PAGE_SIZE],
    pub is_dirty: bool,
}

impl Page {
    pub fn empty() -> Self {
        Self::new(INVALID_PAGE_ID)
    }

    pub fn new(page_id: PageId) -> Self {
        Self {
            page_id,
            data: [0; PAGE_SIZE],
            is_dirty: false,
        }
    }

    pub fn destroy(&mut self) {
        self.page_id = INVALID_PAGE_ID;
        self.data = [0; PAGE_SIZE];
        self.is_dirty = false;
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn set_data(&mut self, data: [u8; PAGE_SIZE]) {
        self.data = data;
        self.is_dirty = true;
    }

    /// Overwrite the page image without touching the dirty flag. Used when
    /// loading bytes from disk.
    pub fn reset(&mut self, page_id: PageId, data: [u8; PAGE_SIZE]) {
        self.page_id = page_id;
        self.data = data;
        self.is_dirty = false;
    }
}

/// A fixed memory slot of the buffer pool. The page latch protects the
/// bytes and metadata; the pin count lives outside the latch so unpinning
/// never has to wait behind a page latch holder.
#[derive(Debug)]
pub struct Frame {
    pub page: Arc<RwLock<Page>>,
    pub pin_count: AtomicU32,
}

impl Frame {
    pub fn new() -> Self {
        Self {
            page: Arc::new(RwLock::new(Page::empty())),
            pin_count: AtomicU32::new(0),
        }
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

/// Pinned reference to a resident page. Dropping it unpins the frame and,
/// on the last pin, hands the frame back to the replacer.
#[derive(Debug)]
pub struct PageRef {
    pub(crate) frame: Arc<Frame>,
    pub(crate) frame_id: FrameId,
    pub(crate) page_id: PageId,
    pub(crate) replacer: Arc<Mutex<LRUKReplacer>>,
}

impl PageRef {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, Page> {
        self.frame.page.read()
    }

    pub fn write(&self) -> parking_lot::RwLockWriteGuard<'_, Page> {
        self.frame.page.write()
    }

    pub fn read_arc(&self) -> PageReadGuard {
        self.frame.page.read_arc()
    }

    pub fn write_arc(&self) -> PageWriteGuard {
        self.frame.page.write_arc()
    }
}

impl Drop for PageRef {
    fn drop(&mut self) {
        if self.frame.pin_count.fetch_sub(1, Ordering::SeqCst) == 1 {
            if let Err(e) = self.replacer.lock().set_evictable(self.frame_id, true) {
                error!(
                    "failed to mark frame {} evictable on unpin: {:?}",
                    self.frame_id, e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_ref_unpins_on_drop() {
        let frame = Arc::new(Frame::new());
        frame.page.write().page_id = 1;
        frame.pin_count.store(1, Ordering::SeqCst);
        let replacer = Arc::new(Mutex::new(LRUKReplacer::with_k(10, 2)));
        replacer.lock().record_access(0).unwrap();

        let page_ref = PageRef {
            frame: frame.clone(),
            frame_id: 0,
            page_id: 1,
            replacer: replacer.clone(),
        };
        assert_eq!(page_ref.read().page_id, 1);
        drop(page_ref);
        assert_eq!(frame.pin_count.load(Ordering::SeqCst), 0);
        assert_eq!(replacer.lock().size(), 1);
    }
}
