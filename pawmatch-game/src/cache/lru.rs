use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone)]
struct Slot<H> {
    handle: H,
    last_used: u64,
}

/// Strict LRU index. Recency comes from a monotonic access counter, so two
/// entries never share a `last_used` value.
#[derive(Debug, Clone)]
pub(crate) struct LruIndex<H> {
    slots: HashMap<String, Slot<H>>,
    order: BTreeMap<u64, String>,
    clock: u64,
    capacity: usize,
}

impl<H: Clone> LruIndex<H> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            slots: HashMap::new(),
            order: BTreeMap::new(),
            clock: 0,
            capacity: capacity.max(1),
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    /// Refresh recency and return the handle.
    pub(crate) fn touch(&mut self, key: &str) -> Option<H> {
        let stamp = self.tick();
        let slot = self.slots.get_mut(key)?;
        self.order.remove(&slot.last_used);
        slot.last_used = stamp;
        self.order.insert(stamp, key.to_string());
        Some(slot.handle.clone())
    }

    /// Insert or replace `key`. Returns the keys evicted to stay in capacity.
    pub(crate) fn insert(&mut self, key: &str, handle: H) -> Vec<String> {
        let stamp = self.tick();
        if let Some(slot) = self.slots.get_mut(key) {
            self.order.remove(&slot.last_used);
            slot.handle = handle;
            slot.last_used = stamp;
        } else {
            self.slots.insert(
                key.to_string(),
                Slot {
                    handle,
                    last_used: stamp,
                },
            );
        }
        self.order.insert(stamp, key.to_string());
        let overflow = self.slots.len().saturating_sub(self.capacity);
        self.evict_oldest(overflow)
    }

    pub(crate) fn evict_oldest(&mut self, count: usize) -> Vec<String> {
        let mut evicted = Vec::with_capacity(count);
        while evicted.len() < count {
            let Some((_, key)) = self.order.pop_first() else {
                break;
            };
            self.slots.remove(&key);
            evicted.push(key);
        }
        evicted
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Keys from least to most recently used.
    pub(crate) fn keys_by_recency(&self) -> Vec<String> {
        self.order.values().cloned().collect()
    }
}
