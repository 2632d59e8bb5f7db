use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use mediadex_model::{PendingMove, StorageProtocol};

/// Bounded in-memory table of deletes awaiting their matching create.
///
/// A single reader-writer lock guards the map; every mutation takes the
/// write lock, statistics take the read lock. Capacity is hard: inserting
/// into a full table first evicts the oldest slice by `deleted_at`.
#[derive(Debug)]
pub struct PendingMoveTable {
    entries: RwLock<HashMap<String, PendingMove>>,
    capacity: usize,
    eviction_fraction: f64,
}

impl PendingMoveTable {
    pub fn new(capacity: usize, eviction_fraction: f64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            eviction_fraction: eviction_fraction.clamp(0.0, 1.0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("pending-move lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a pending move, evicting the oldest entries when full.
    pub fn insert(&self, key: String, mv: PendingMove) {
        let mut entries = self.entries.write().expect("pending-move lock poisoned");

        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            let evict = ((self.capacity as f64 * self.eviction_fraction) as usize).max(1);
            let mut by_age: Vec<(String, DateTime<Utc>)> = entries
                .iter()
                .map(|(k, v)| (k.clone(), v.deleted_at))
                .collect();
            by_age.sort_by_key(|(_, deleted_at)| *deleted_at);

            for (victim, _) in by_age.into_iter().take(evict) {
                entries.remove(&victim);
            }
            debug!("pending-move table full, evicted {} oldest entries", evict);
        }

        entries.insert(key, mv);
    }

    /// Atomic take-and-remove: the entry is consumed only if it is still
    /// within `window` of its deletion. Expired entries are left for the
    /// reaper so the statistics stay honest about what timed out.
    pub fn take_if_fresh(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Option<PendingMove> {
        let mut entries = self.entries.write().expect("pending-move lock poisoned");

        let fresh = entries.get(key).is_some_and(|mv| {
            let age = now.signed_duration_since(mv.deleted_at);
            age >= chrono::Duration::zero()
                && age.to_std().is_ok_and(|age| age <= window)
        });

        if fresh { entries.remove(key) } else { None }
    }

    /// Drop every entry older than its protocol's window. Returns how many
    /// were removed.
    pub fn purge_expired<F>(&self, now: DateTime<Utc>, window_of: F) -> usize
    where
        F: Fn(StorageProtocol) -> Duration,
    {
        let mut entries = self.entries.write().expect("pending-move lock poisoned");
        let before = entries.len();

        entries.retain(|_, mv| {
            let window = window_of(mv.protocol);
            now.signed_duration_since(mv.deleted_at)
                .to_std()
                .is_ok_and(|age| age <= window)
        });

        before - entries.len()
    }

    /// (count, per-protocol counts, oldest entry age in seconds).
    pub fn snapshot(
        &self,
        now: DateTime<Utc>,
    ) -> (usize, BTreeMap<String, usize>, Option<i64>) {
        let entries = self.entries.read().expect("pending-move lock poisoned");

        let mut by_protocol: BTreeMap<String, usize> = BTreeMap::new();
        let mut oldest: Option<i64> = None;
        for mv in entries.values() {
            *by_protocol.entry(mv.protocol.as_str().to_string()).or_default() += 1;
            let age = now.signed_duration_since(mv.deleted_at).num_seconds();
            oldest = Some(oldest.map_or(age, |o| o.max(age)));
        }

        (entries.len(), by_protocol, oldest)
    }
}
