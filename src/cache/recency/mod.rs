//! Recency index for LRU eviction
//!
//! An ordered associative structure over cache entries: hash lookup by key
//! plus an explicit doubly-linked recency order held in an arena of slots,
//! so move-to-front, tail lookup, and tail removal are all O(1) with no
//! reference cycles. Running count and cost totals are updated atomically
//! with every structural change.
//!
//! The index has no filesystem knowledge and is not independently
//! thread-safe; each store serializes access through its own lock.

use std::collections::HashMap;
use std::time::SystemTime;

/// Snapshot of one live cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Cache key; unique within an index
    pub key: String,
    /// Byte-size weight used for cost-based eviction
    pub cost: u64,
    /// Last time the entry was inserted, overwritten, or read
    pub last_access: SystemTime,
}

#[derive(Debug)]
struct Node {
    key: String,
    cost: u64,
    last_access: SystemTime,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug)]
enum Slot {
    Occupied(Node),
    Vacant { next_free: Option<usize> },
}

/// Ordered index of cache entries with running count/cost totals.
///
/// Head is the most recently touched entry, tail the least. Ties are broken
/// by touch order alone; keys never influence eviction order.
#[derive(Debug, Default)]
pub struct RecencyIndex {
    slots: Vec<Slot>,
    free_head: Option<usize>,
    map: HashMap<String, usize>,
    head: Option<usize>,
    tail: Option<usize>,
    total_cost: u64,
}

impl RecencyIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    #[inline]
    pub fn count(&self) -> usize {
        self.map.len()
    }

    /// Sum of all live entries' costs.
    #[inline]
    pub fn total_cost(&self) -> u64 {
        self.total_cost
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Check if a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Insert or overwrite an entry and move it to the head.
    ///
    /// An existing key keeps its slot; its cost delta is folded into the
    /// running total before the entry is relinked at the front.
    pub fn upsert(&mut self, key: &str, cost: u64, time: SystemTime) {
        if let Some(&idx) = self.map.get(key) {
            {
                let node = self.node_mut(idx);
                let old_cost = node.cost;
                node.cost = cost;
                node.last_access = time;
                self.total_cost = self.total_cost - old_cost + cost;
            }
            self.move_to_front(idx);
        } else {
            let idx = self.alloc(Node {
                key: key.to_string(),
                cost,
                last_access: time,
                prev: None,
                next: None,
            });
            self.map.insert(key.to_string(), idx);
            self.push_front(idx);
            self.total_cost += cost;
        }
    }

    /// Refresh an entry's access time and move it to the head.
    ///
    /// Returns the updated entry, or `None` if the key is absent.
    pub fn touch(&mut self, key: &str, time: SystemTime) -> Option<CacheEntry> {
        let idx = *self.map.get(key)?;
        self.node_mut(idx).last_access = time;
        self.move_to_front(idx);
        Some(self.snapshot(idx))
    }

    /// Least-recently-used entry, without removing it.
    pub fn tail_entry(&self) -> Option<CacheEntry> {
        self.tail.map(|idx| self.snapshot(idx))
    }

    /// Remove and return the least-recently-used entry.
    pub fn remove_tail(&mut self) -> Option<CacheEntry> {
        let idx = self.tail?;
        let key = self.node(idx).key.clone();
        self.remove(&key)
    }

    /// Remove an entry by key.
    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let idx = self.map.remove(key)?;
        self.unlink(idx);
        let node = self.free(idx);
        self.total_cost -= node.cost;
        Some(CacheEntry {
            key: node.key,
            cost: node.cost,
            last_access: node.last_access,
        })
    }

    /// Drop all entries and reset the totals.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free_head = None;
        self.map.clear();
        self.head = None;
        self.tail = None;
        self.total_cost = 0;
    }

    /// Keys in LRU order, oldest first. Inspection helper for diagnostics
    /// and tests.
    pub fn keys_lru_order(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.map.len());
        let mut cursor = self.tail;
        while let Some(idx) = cursor {
            let node = self.node(idx);
            keys.push(node.key.clone());
            cursor = node.prev;
        }
        keys
    }

    fn snapshot(&self, idx: usize) -> CacheEntry {
        let node = self.node(idx);
        CacheEntry {
            key: node.key.clone(),
            cost: node.cost,
            last_access: node.last_access,
        }
    }

    #[inline]
    fn node(&self, idx: usize) -> &Node {
        match &self.slots[idx] {
            Slot::Occupied(node) => node,
            Slot::Vacant { .. } => unreachable!("index points at vacant slot"),
        }
    }

    #[inline]
    fn node_mut(&mut self, idx: usize) -> &mut Node {
        match &mut self.slots[idx] {
            Slot::Occupied(node) => node,
            Slot::Vacant { .. } => unreachable!("index points at vacant slot"),
        }
    }

    fn alloc(&mut self, node: Node) -> usize {
        match self.free_head {
            Some(idx) => {
                self.free_head = match self.slots[idx] {
                    Slot::Vacant { next_free } => next_free,
                    Slot::Occupied(_) => unreachable!("free list points at occupied slot"),
                };
                self.slots[idx] = Slot::Occupied(node);
                idx
            }
            None => {
                self.slots.push(Slot::Occupied(node));
                self.slots.len() - 1
            }
        }
    }

    fn free(&mut self, idx: usize) -> Node {
        let slot = std::mem::replace(
            &mut self.slots[idx],
            Slot::Vacant {
                next_free: self.free_head,
            },
        );
        self.free_head = Some(idx);
        match slot {
            Slot::Occupied(node) => node,
            Slot::Vacant { .. } => unreachable!("freeing vacant slot"),
        }
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let node = self.node_mut(idx);
            node.prev = None;
            node.next = old_head;
        }
        if let Some(head_idx) = old_head {
            self.node_mut(head_idx).prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.node(idx);
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.node_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev = prev,
            None => self.tail = prev,
        }
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.push_front(idx);
    }
}
