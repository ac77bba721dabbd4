//! Per-message `msg_seq` bookkeeping for passive replies.
//!
//! The platform rejects a reply whose `(msg_id, msg_seq)` pair was already
//! used, so every reply post takes the next number for its original message.
//! Entries idle for longer than the TTL are dropped.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Minimum time between two eviction sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct SeqEntry {
    last: u64,
    touched: Instant,
}

#[derive(Debug)]
pub struct ReplySequenceTable {
    entries: HashMap<String, SeqEntry>,
    ttl: Duration,
    last_sweep: Instant,
}

impl ReplySequenceTable {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            last_sweep: Instant::now(),
        }
    }

    /// Take the next sequence number for `msg_id`, starting at 1.
    pub fn next(&mut self, msg_id: &str) -> u64 {
        self.next_at(msg_id, Instant::now())
    }

    fn next_at(&mut self, msg_id: &str, now: Instant) -> u64 {
        if now.saturating_duration_since(self.last_sweep) >= SWEEP_INTERVAL {
            self.evict_idle(now);
        }
        let entry = self.entries.entry(msg_id.to_string()).or_insert(SeqEntry {
            last: 0,
            touched: now,
        });
        // An entry that outlived the TTL is stale even if no sweep ran yet.
        if now.saturating_duration_since(entry.touched) > self.ttl {
            entry.last = 0;
        }
        entry.last += 1;
        entry.touched = now;
        entry.last
    }

    /// Drop entries not touched within the TTL.
    pub fn evict_idle(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries
            .retain(|_, e| now.saturating_duration_since(e.touched) <= ttl);
        self.last_sweep = now;
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
