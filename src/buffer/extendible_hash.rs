use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// In-memory extendible hash table used as the buffer pool's page table.
///
/// A directory of `2^global_depth` slots indexes into buckets whose
/// `local_depth <= global_depth`; the low `global_depth` bits of the key
/// hash select the slot. A single mutex serializes all operations.
#[derive(Debug)]
pub struct ExtendibleHashTable<K, V> {
    inner: Mutex<HashTableInner<K, V>>,
}

#[derive(Debug)]
struct HashTableInner<K, V> {
    global_depth: u32,
    bucket_size: usize,
    num_buckets: usize,
    // Directory slots hold indices into `buckets`. A bucket at local depth d
    // is referenced by exactly 2^(global_depth - d) slots.
    directory: Vec<usize>,
    buckets: Vec<Bucket<K, V>>,
}

#[derive(Debug)]
struct Bucket<K, V> {
    local_depth: u32,
    items: Vec<(K, V)>,
}

impl<K, V> Bucket<K, V> {
    fn new(local_depth: u32) -> Self {
        Self {
            local_depth,
            items: Vec::new(),
        }
    }
}

fn hash_of<K: Hash>(key: &K) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

impl<K, V> ExtendibleHashTable<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(bucket_size: usize) -> Self {
        assert!(bucket_size > 0, "bucket size must be positive");
        Self {
            inner: Mutex::new(HashTableInner {
                global_depth: 0,
                bucket_size,
                num_buckets: 1,
                directory: vec![0],
                buckets: vec![Bucket::new(0)],
            }),
        }
    }

    pub fn find(&self, key: &K) -> Option<V> {
        let inner = self.inner.lock();
        let bucket = &inner.buckets[inner.directory[inner.index_of(key)]];
        bucket
            .items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Insert a key-value pair, overwriting the value if the key exists.
    pub fn insert(&self, key: K, value: V) {
        self.inner.lock().insert(key, value);
    }

    pub fn remove(&self, key: &K) -> bool {
        let mut inner = self.inner.lock();
        let bucket_idx = inner.directory[inner.index_of(key)];
        let bucket = &mut inner.buckets[bucket_idx];
        if let Some(pos) = bucket.items.iter().position(|(k, _)| k == key) {
            bucket.items.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn global_depth(&self) -> u32 {
        self.inner.lock().global_depth
    }

    pub fn local_depth(&self, dir_index: usize) -> u32 {
        let inner = self.inner.lock();
        inner.buckets[inner.directory[dir_index]].local_depth
    }

    pub fn num_buckets(&self) -> usize {
        self.inner.lock().num_buckets
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner.buckets.iter().map(|b| b.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all resident keys, for whole-table sweeps such as
    /// flushing every cached page.
    pub fn keys(&self) -> Vec<K> {
        let inner = self.inner.lock();
        inner
            .buckets
            .iter()
            .flat_map(|b| b.items.iter().map(|(k, _)| k.clone()))
            .collect()
    }
}

impl<K, V> HashTableInner<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn index_of(&self, key: &K) -> usize {
        let mask = (1usize << self.global_depth) - 1;
        (hash_of(key) as usize) & mask
    }

    fn try_insert(&mut self, bucket_idx: usize, key: &K, value: &V) -> bool {
        let bucket_size = self.bucket_size;
        let bucket = &mut self.buckets[bucket_idx];
        if let Some(entry) = bucket.items.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value.clone();
            return true;
        }
        if bucket.items.len() < bucket_size {
            bucket.items.push((key.clone(), value.clone()));
            return true;
        }
        false
    }

    fn insert(&mut self, key: K, value: V) {
        loop {
            let index = self.index_of(&key);
            let bucket_idx = self.directory[index];
            if self.try_insert(bucket_idx, &key, &value) {
                return;
            }

            // Full bucket. Double the directory first if the bucket is
            // already at global depth, duplicating every slot so existing
            // mappings stay valid.
            if self.buckets[bucket_idx].local_depth == self.global_depth {
                self.global_depth += 1;
                let old = self.directory.clone();
                self.directory.extend(old);
            }

            // Split the bucket: bump its local depth, allocate the sibling,
            // repoint every slot whose low local-depth bits carry the split
            // bit, and redistribute the entries by the new mask.
            self.buckets[bucket_idx].local_depth += 1;
            let new_local_depth = self.buckets[bucket_idx].local_depth;
            let new_bucket_idx = self.buckets.len();
            self.buckets.push(Bucket::new(new_local_depth));
            self.num_buckets += 1;

            let mask = (1usize << new_local_depth) - 1;
            let index = self.index_of(&key);
            for slot in 0..self.directory.len() {
                if (slot & mask) == (index & mask) {
                    self.directory[slot] = new_bucket_idx;
                }
            }

            let items = std::mem::take(&mut self.buckets[bucket_idx].items);
            for (k, v) in items {
                let item_index = self.index_of(&k);
                if (item_index & mask) == (index & mask) {
                    self.buckets[new_bucket_idx].items.push((k, v));
                } else {
                    self.buckets[bucket_idx].items.push((k, v));
                }
            }
            // Retry; the target bucket may still be full after the split.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ExtendibleHashTable;

    #[test]
    fn insert_find_remove() {
        let table = ExtendibleHashTable::new(4);
        for i in 0..16 {
            table.insert(i, i * 10);
        }
        for i in 0..16 {
            assert_eq!(table.find(&i), Some(i * 10));
        }
        assert_eq!(table.find(&100), None);

        assert!(table.remove(&3));
        assert!(!table.remove(&3));
        assert_eq!(table.find(&3), None);
        assert_eq!(table.len(), 15);
    }

    #[test]
    fn insert_overwrites_existing_key() {
        let table = ExtendibleHashTable::new(2);
        table.insert("a", 1);
        table.insert("a", 2);
        assert_eq!(table.find(&"a"), Some(2));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn directory_grows_under_pressure() {
        let table: ExtendibleHashTable<u64, u64> = ExtendibleHashTable::new(2);
        for i in 0..64 {
            table.insert(i, i);
        }
        assert!(table.global_depth() >= 1);
        assert!(table.num_buckets() > 1);
        for i in 0..64 {
            assert_eq!(table.find(&i), Some(i));
        }
    }

    #[test]
    fn local_depth_never_exceeds_global_depth() {
        let table: ExtendibleHashTable<u64, u64> = ExtendibleHashTable::new(2);
        for i in 0..128 {
            table.insert(i, i);
        }
        let global_depth = table.global_depth();
        for slot in 0..(1usize << global_depth) {
            assert!(table.local_depth(slot) <= global_depth);
        }
        assert_eq!(table.len(), 128);
    }

    #[test]
    fn concurrent_inserts() {
        use std::sync::Arc;
        let table = Arc::new(ExtendibleHashTable::new(4));
        let mut handles = vec![];
        for t in 0..4u64 {
            let table = table.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..256u64 {
                    table.insert(t * 1000 + i, i);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(table.len(), 4 * 256);
        for t in 0..4u64 {
            for i in 0..256u64 {
                assert_eq!(table.find(&(t * 1000 + i)), Some(i));
            }
        }
    }
}
