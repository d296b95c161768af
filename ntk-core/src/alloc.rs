//! First-free-slot id allocation.
//!
//! Ids are handed out lowest-first, and released ids are reused before the
//! allocator grows. Timer ids and the headless backend's window handles
//! are assigned this way.

use std::collections::BTreeSet;

/// Allocates small integer ids starting at `base`, always reusing the lowest free id.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    base: u64,
    next: u64,
    free: BTreeSet<u64>,
    limit: Option<usize>,
}

impl IdAllocator {
    /// Create an allocator whose first id is `base`.
    pub fn new(base: u64) -> Self {
        Self {
            base,
            next: base,
            free: BTreeSet::new(),
            limit: None,
        }
    }

    /// Create an allocator that refuses to hand out more than `limit` live ids.
    pub fn with_limit(base: u64, limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::new(base)
        }
    }

    /// Allocate the lowest free id, or `None` if the limit is reached.
    pub fn allocate(&mut self) -> Option<u64> {
        if let Some(id) = self.free.pop_first() {
            return Some(id);
        }
        if let Some(limit) = self.limit {
            if self.live() >= limit {
                return None;
            }
        }
        let id = self.next;
        self.next += 1;
        Some(id)
    }

    /// Return `id` to the pool. Releasing an id that is not live is ignored.
    pub fn release(&mut self, id: u64) {
        if id < self.base || id >= self.next || self.free.contains(&id) {
            return;
        }
        if id + 1 == self.next {
            self.next -= 1;
            // Collapse any trailing free ids so the high-water mark shrinks.
            while self.next > self.base && self.free.remove(&(self.next - 1)) {
                self.next -= 1;
            }
        } else {
            self.free.insert(id);
        }
    }

    /// Returns `true` if `id` is currently allocated.
    pub fn is_live(&self, id: u64) -> bool {
        id >= self.base && id < self.next && !self.free.contains(&id)
    }

    /// Number of ids currently allocated.
    pub fn live(&self) -> usize {
        (self.next - self.base) as usize - self.free.len()
    }

    /// Release every id.
    pub fn clear(&mut self) {
        self.next = self.base;
        self.free.clear();
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new(1)
    }
}
