use std::collections::{HashSet, VecDeque};

/// Number of recent inbound message ids remembered for deduplication.
pub const PROCESSED_ID_CAPACITY: usize = 1000;

/// Bounded FIFO of recently processed inbound message ids.
///
/// The gateway may redeliver an event after a reconnect; ids seen within the
/// last `capacity` messages are reported as duplicates.
#[derive(Debug)]
pub struct ProcessedIdBuffer {
    order: VecDeque<String>,
    seen: HashSet<String>,
    capacity: usize,
}

impl ProcessedIdBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Record `id`. Returns `false` if it was already in the buffer.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(id.to_string());
        self.seen.insert(id.to_string());
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for ProcessedIdBuffer {
    fn default() -> Self {
        Self::new(PROCESSED_ID_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_insert_is_duplicate() {
        let mut buf = ProcessedIdBuffer::default();
        assert!(buf.insert("a"));
        assert!(!buf.insert("a"));
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn duplicates_detected_in_any_order() {
        let mut buf = ProcessedIdBuffer::default();
        for id in ["c", "a", "b"] {
            assert!(buf.insert(id));
        }
        for id in ["b", "c", "a", "a"] {
            assert!(!buf.insert(id), "{id} should be a duplicate");
        }
    }

    #[test]
    fn oldest_id_is_forgotten_past_capacity() {
        let mut buf = ProcessedIdBuffer::new(3);
        for id in ["1", "2", "3", "4"] {
            buf.insert(id);
        }
        assert_eq!(buf.len(), 3);
        assert!(!buf.contains("1"));
        assert!(buf.contains("4"));
        // "1" is new again once evicted.
        assert!(buf.insert("1"));
        assert!(!buf.contains("2"));
    }

    #[test]
    fn default_capacity_holds_a_thousand() {
        let mut buf = ProcessedIdBuffer::default();
        for i in 0..PROCESSED_ID_CAPACITY {
            buf.insert(&i.to_string());
        }
        assert!(buf.contains("0"));
        buf.insert("overflow");
        assert!(!buf.contains("0"));
        assert_eq!(buf.len(), PROCESSED_ID_CAPACITY);
    }
}
