//! Inbound event deduplication.
//!
//! The mesh delivers at-least-once: the same logical event can arrive via
//! several redundant paths. Every inbound event is reduced to a stable key
//! and checked against a bounded TTL cache before any state mutation. The
//! cache uses a monotonic clock throughout, so wall-clock skew between
//! peers can never reopen the window.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use rallypoint_shared::constants::{
    AI_DEBOUNCE_BUCKET_SECS, CONNECTION_BUCKET_SECS, DEDUP_MAX_ENTRIES, DEDUP_RETENTION_SECS,
};
use rallypoint_shared::types::PeerId;

/// Duplicate filter over derived event keys.
///
/// Pure filter: never fails, never blocks. Memory is bounded two ways, a
/// periodic sweep that drops entries older than the retention window and a
/// hard entry cap that evicts oldest insertions first.
pub struct EventDeduplicator {
    seen: HashMap<String, Instant>,
    /// Insertion order, paired with the insertion instant so a re-inserted
    /// key is not evicted by its own stale queue entry.
    order: VecDeque<(String, Instant)>,
    retention: Duration,
    max_entries: usize,
    epoch: Instant,
}

impl EventDeduplicator {
    pub fn new() -> Self {
        Self::with_settings(
            Duration::from_secs(DEDUP_RETENTION_SECS),
            DEDUP_MAX_ENTRIES,
        )
    }

    pub fn with_settings(retention: Duration, max_entries: usize) -> Self {
        Self {
            seen: HashMap::new(),
            order: VecDeque::new(),
            retention,
            max_entries,
            epoch: Instant::now(),
        }
    }

    /// Returns `true` and records the key on first sight within the
    /// retention window; `false` for a duplicate.
    pub fn should_process(&mut self, key: &str) -> bool {
        let now = Instant::now();
        if let Some(seen_at) = self.seen.get(key) {
            if now.duration_since(*seen_at) < self.retention {
                return false;
            }
        }
        self.seen.insert(key.to_string(), now);
        self.order.push_back((key.to_string(), now));
        self.enforce_cap();
        true
    }

    /// Drop entries older than the retention window. Called periodically by
    /// the engine loop.
    pub fn sweep(&mut self) {
        let now = Instant::now();
        let retention = self.retention;
        self.seen
            .retain(|_, seen_at| now.duration_since(*seen_at) < retention);
        while let Some((key, inserted)) = self.order.front() {
            // A queue entry is stale once it expired, was evicted, or was
            // superseded by a fresher insertion of the same key.
            let stale = now.duration_since(*inserted) >= retention
                || self.seen.get(key) != Some(inserted);
            if !stale {
                break;
            }
            self.order.pop_front();
        }
    }

    fn enforce_cap(&mut self) {
        while self.seen.len() > self.max_entries {
            match self.order.pop_front() {
                Some((key, inserted)) => {
                    if self.seen.get(&key) == Some(&inserted) {
                        self.seen.remove(&key);
                    }
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Key for an inbound chat message: sender identity plus a content hash.
    pub fn message_key(&self, sender: &str, content: &str) -> String {
        let digest = blake3::hash(content.as_bytes());
        format!("msg:{sender}:{}", &digest.to_hex()[..16])
    }

    /// Key for a connect/disconnect notification. A coarse time bucket
    /// collapses the rapid duplicate notifications some links produce.
    pub fn connection_key(&self, connected: bool, peer: &PeerId) -> String {
        let kind = if connected { "up" } else { "down" };
        format!("conn:{kind}:{peer}:{}", self.bucket(CONNECTION_BUCKET_SECS))
    }

    /// Debounce key for the AI trigger: message identity in a multi-second
    /// window, so two near-simultaneous deliveries fire one inference.
    pub fn ai_trigger_key(&self, message_id: &str) -> String {
        format!("ai:{message_id}:{}", self.bucket(AI_DEBOUNCE_BUCKET_SECS))
    }

    fn bucket(&self, width_secs: u64) -> u64 {
        self.epoch.elapsed().as_secs() / width_secs.max(1)
    }
}

impl Default for EventDeduplicator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_seen_processes_repeat_drops() {
        let mut dedup = EventDeduplicator::new();
        assert!(dedup.should_process("msg:P1:abc"));
        assert!(!dedup.should_process("msg:P1:abc"));
        assert!(dedup.should_process("msg:P1:def"));
    }

    #[test]
    fn test_expired_entry_processes_again() {
        let mut dedup = EventDeduplicator::with_settings(Duration::from_millis(20), 100);
        assert!(dedup.should_process("k"));
        assert!(!dedup.should_process("k"));
        std::thread::sleep(Duration::from_millis(30));
        assert!(dedup.should_process("k"));
    }

    #[test]
    fn test_sweep_bounds_memory() {
        let mut dedup = EventDeduplicator::with_settings(Duration::from_millis(10), 100);
        for i in 0..10 {
            dedup.should_process(&format!("k{i}"));
        }
        assert_eq!(dedup.len(), 10);
        std::thread::sleep(Duration::from_millis(20));
        dedup.sweep();
        assert!(dedup.is_empty());
    }

    #[test]
    fn test_cap_evicts_oldest_first() {
        let mut dedup = EventDeduplicator::with_settings(Duration::from_secs(60), 3);
        for i in 0..4 {
            assert!(dedup.should_process(&format!("k{i}")));
        }
        assert_eq!(dedup.len(), 3);
        // k0 was evicted, the rest survived
        assert!(dedup.should_process("k0"));
        assert!(!dedup.should_process("k3"));
    }

    #[test]
    fn test_connection_key_collapses_within_bucket() {
        let dedup = EventDeduplicator::new();
        let peer = PeerId::from("P1");
        assert_eq!(
            dedup.connection_key(true, &peer),
            dedup.connection_key(true, &peer)
        );
        assert_ne!(
            dedup.connection_key(true, &peer),
            dedup.connection_key(false, &peer)
        );
    }

    #[test]
    fn test_message_key_differs_by_content_and_sender() {
        let dedup = EventDeduplicator::new();
        let a = dedup.message_key("P1", "hello");
        assert_eq!(a, dedup.message_key("P1", "hello"));
        assert_ne!(a, dedup.message_key("P1", "hello!"));
        assert_ne!(a, dedup.message_key("P2", "hello"));
    }
}
