use crate::buffer::{PageId, INVALID_PAGE_ID, PAGE_SIZE};
use crate::error::{VellumError, VellumResult};
use log::trace;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Page-granular I/O against a single database file plus a monotonic page
/// allocator. Page 0 is reserved for the header page and is written zeroed
/// when the file is created.
///
/// The read/write counters exist so tests can observe whether an operation
/// was served from the buffer pool or went to disk.
#[derive(Debug)]
pub struct DiskManager {
    db_file: Mutex<File>,
    next_page_id: AtomicU32,
    num_reads: AtomicU64,
    num_writes: AtomicU64,
}

impl DiskManager {
    pub fn try_new(db_path: impl AsRef<Path>) -> VellumResult<Self> {
        let mut db_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(db_path.as_ref())?;

        let file_len = db_file.metadata()?.len() as usize;
        let next_page_id = if file_len == 0 {
            // fresh database: materialize the header page
            db_file.write_all(&[0u8; PAGE_SIZE])?;
            1
        } else {
            (file_len / PAGE_SIZE).max(1) as u32
        };

        Ok(Self {
            db_file: Mutex::new(db_file),
            next_page_id: AtomicU32::new(next_page_id),
            num_reads: AtomicU64::new(0),
            num_writes: AtomicU64::new(0),
        })
    }

    pub fn read_page(&self, page_id: PageId) -> VellumResult<[u8; PAGE_SIZE]> {
        if page_id == INVALID_PAGE_ID {
            return Err(VellumError::Storage(
                "cannot read the invalid page id".to_string(),
            ));
        }
        let mut buf = [0u8; PAGE_SIZE];
        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(page_id as u64 * PAGE_SIZE as u64))?;
        // pages past the materialized end of file read back as zeroes
        let mut read = 0;
        while read < PAGE_SIZE {
            let n = file.read(&mut buf[read..])?;
            if n == 0 {
                break;
            }
            read += n;
        }
        self.num_reads.fetch_add(1, Ordering::SeqCst);
        Ok(buf)
    }

    pub fn write_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> VellumResult<()> {
        if page_id == INVALID_PAGE_ID {
            return Err(VellumError::Storage(
                "cannot write the invalid page id".to_string(),
            ));
        }
        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(page_id as u64 * PAGE_SIZE as u64))?;
        file.write_all(data)?;
        self.num_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Hand out the next page id. Ids are never reused.
    pub fn allocate_page(&self) -> VellumResult<PageId> {
        Ok(self.next_page_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Deallocation is a bookkeeping no-op; the id is simply never handed
    /// out again.
    pub fn deallocate_page(&self, page_id: PageId) -> VellumResult<()> {
        trace!("deallocate page {}", page_id);
        Ok(())
    }

    pub fn num_reads(&self) -> u64 {
        self.num_reads.load(Ordering::SeqCst)
    }

    pub fn num_writes(&self) -> u64 {
        self.num_writes.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_then_read_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let disk_manager = DiskManager::try_new(temp_dir.path().join("test.db")).unwrap();

        let page_id = disk_manager.allocate_page().unwrap();
        assert_eq!(page_id, 1);

        let mut data = [0u8; PAGE_SIZE];
        data[0] = 1;
        data[PAGE_SIZE - 1] = 2;
        disk_manager.write_page(page_id, &data).unwrap();
        assert_eq!(disk_manager.read_page(page_id).unwrap(), data);
        assert_eq!(disk_manager.num_writes(), 1);
        assert_eq!(disk_manager.num_reads(), 1);
    }

    #[test]
    fn unwritten_page_reads_back_zeroed() {
        let temp_dir = TempDir::new().unwrap();
        let disk_manager = DiskManager::try_new(temp_dir.path().join("test.db")).unwrap();
        let page_id = disk_manager.allocate_page().unwrap();
        assert!(disk_manager
            .read_page(page_id)
            .unwrap()
            .iter()
            .all(|&b| b == 0));
    }

    #[test]
    fn allocator_resumes_past_existing_pages() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.db");
        {
            let disk_manager = DiskManager::try_new(&path).unwrap();
            let page_id = disk_manager.allocate_page().unwrap();
            disk_manager.write_page(page_id, &[7u8; PAGE_SIZE]).unwrap();
        }
        let disk_manager = DiskManager::try_new(&path).unwrap();
        assert_eq!(disk_manager.allocate_page().unwrap(), 2);
    }
}
