use crate::buffer::buffer_pool::FrameId;
use crate::error::{VellumError, VellumResult};
use std::collections::{HashMap, VecDeque};

#[derive(Debug)]
struct LRUKNode {
    k: usize,
    // the last k access timestamps, oldest first
    history: VecDeque<u64>,
    is_evictable: bool,
}

impl LRUKNode {
    fn new(k: usize) -> Self {
        Self {
            k,
            history: VecDeque::new(),
            is_evictable: false,
        }
    }

    fn record_access(&mut self, timestamp: u64) {
        self.history.push_back(timestamp);
        if self.history.len() > self.k {
            self.history.pop_front();
        }
    }
}

/// Evictable-frame tracker ordered by backward k-distance.
///
/// Frames with fewer than k recorded accesses have infinite distance and are
/// victimized before any frame with a full history, tie-broken by the
/// earliest recorded access.
#[derive(Debug)]
pub struct LRUKReplacer {
    current_size: usize,
    replacer_size: usize,
    k: usize,
    node_store: HashMap<FrameId, LRUKNode>,
    current_timestamp: u64,
}

impl LRUKReplacer {
    pub fn with_k(num_frames: usize, k: usize) -> Self {
        assert!(k > 0, "k must be positive");
        Self {
            current_size: 0,
            replacer_size: num_frames,
            k,
            node_store: HashMap::with_capacity(num_frames),
            current_timestamp: 0,
        }
    }

    /// Evict the evictable frame with the largest backward k-distance,
    /// removing its history.
    pub fn evict(&mut self) -> Option<FrameId> {
        let mut victim: Option<(u64, FrameId)> = None;
        for (frame_id, node) in self.node_store.iter() {
            if !node.is_evictable {
                continue;
            }
            let Some(&first_access) = node.history.front() else {
                continue;
            };
            let k_distance = if node.history.len() < self.k {
                // +inf distance, larger for earlier first access
                u64::MAX - first_access
            } else {
                self.current_timestamp - first_access
            };
            if victim.map_or(true, |(best, _)| k_distance > best) {
                victim = Some((k_distance, *frame_id));
            }
        }
        let (_, frame_id) = victim?;
        self.remove(frame_id);
        Some(frame_id)
    }

    pub fn record_access(&mut self, frame_id: FrameId) -> VellumResult<()> {
        if let Some(node) = self.node_store.get_mut(&frame_id) {
            node.record_access(self.current_timestamp);
        } else {
            if self.node_store.len() >= self.replacer_size {
                return Err(VellumError::Internal(format!(
                    "replacer cannot track frame {}: capacity {} exceeded",
                    frame_id, self.replacer_size
                )));
            }
            let mut node = LRUKNode::new(self.k);
            node.record_access(self.current_timestamp);
            self.node_store.insert(frame_id, node);
        }
        self.current_timestamp += 1;
        Ok(())
    }

    pub fn set_evictable(&mut self, frame_id: FrameId, set_evictable: bool) -> VellumResult<()> {
        let Some(node) = self.node_store.get_mut(&frame_id) else {
            return Err(VellumError::Internal(format!(
                "frame {} not tracked by replacer",
                frame_id
            )));
        };
        let evictable = node.is_evictable;
        node.is_evictable = set_evictable;
        if set_evictable && !evictable {
            self.current_size += 1;
        } else if !set_evictable && evictable {
            self.current_size -= 1;
        }
        Ok(())
    }

    /// Drop a frame's history. Must not be called while the frame is
    /// non-evictable; unknown frames are ignored.
    pub fn remove(&mut self, frame_id: FrameId) {
        if let Some(node) = self.node_store.get(&frame_id) {
            assert!(node.is_evictable, "frame {} is not evictable", frame_id);
            self.node_store.remove(&frame_id);
            self.current_size -= 1;
        }
    }

    /// Number of evictable frames.
    pub fn size(&self) -> usize {
        self.current_size
    }
}
