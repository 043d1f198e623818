pub mod buffer_pool;
pub mod extendible_hash;
pub mod lru_k;
pub mod page;

pub use buffer_pool::{BufferPoolManager, FrameId, BUFFER_POOL_SIZE};
pub use extendible_hash::ExtendibleHashTable;
pub use lru_k::LRUKReplacer;
pub use page::{
    Frame, Page, PageId, PageReadGuard, PageRef, PageWriteGuard, HEADER_PAGE_ID, INVALID_PAGE_ID,
    PAGE_SIZE,
};
