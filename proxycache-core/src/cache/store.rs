//! Fixed-capacity object cache
//!
//! `ObjectCache` is an array of N slots created once and shared by every
//! connection for the life of the process. There is no lock over the whole
//! array: each operation walks the slots in index order and holds at most one
//! slot's admission at a time, so traffic on slot `i` never waits for slot `j`.
//!
//! Recency is approximate. A freshly written slot gets [`RANK_SENTINEL`] and
//! every other occupied slot loses one rank point per insert; the victim is the
//! lowest rank. Reads do not refresh rank.

use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};

use super::slot::SlotLock;
use super::stats::{CacheStats, StatsRecorder};
use crate::config::CacheConfig;
use crate::error::{ProxyError, ProxyResult};

/// Rank given to the slot written by the most recent insert
pub const RANK_SENTINEL: i64 = 9999;

#[derive(Debug, Default)]
struct Slot {
    url: String,
    object: Bytes,
    occupied: bool,
    rank: i64,
    /// Insert sequence number, used to settle duplicate urls from racing inserts
    generation: u64,
}

impl Slot {
    fn holds(&self, url: &str) -> bool {
        self.occupied && self.url == url
    }

    fn vacate(&mut self) {
        self.url.clear();
        self.object = Bytes::new();
        self.occupied = false;
        self.rank = 0;
    }
}

/// Read-only view of one slot, for diagnostics and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSnapshot {
    pub index: usize,
    pub url: String,
    pub size: usize,
    pub rank: i64,
}

/// Concurrent bounded cache of response objects keyed by request target
#[derive(Debug)]
pub struct ObjectCache {
    slots: Box<[SlotLock<Slot>]>,
    max_object_size: usize,
    generation: AtomicU64,
    stats: StatsRecorder,
}

impl ObjectCache {
    /// Create a cache with `slots` empty slots
    ///
    /// # Panics
    ///
    /// Panics if `slots` is zero.
    pub fn new(slots: usize, max_object_size: usize) -> Self {
        assert!(slots > 0, "Cache must have at least one slot");

        Self {
            slots: (0..slots).map(|_| SlotLock::default()).collect(),
            max_object_size,
            generation: AtomicU64::new(0),
            stats: StatsRecorder::default(),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.slots, config.max_object_size)
    }

    /// Number of slots (N)
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn max_object_size(&self) -> usize {
        self.max_object_size
    }

    /// Index of the first occupied slot whose url equals `url` exactly
    pub fn find(&self, url: &str) -> Option<usize> {
        self.slots.iter().position(|lock| lock.read().holds(url))
    }

    /// Copy out the object cached for `url`
    ///
    /// The match and the copy happen under the same read admission, so the
    /// returned bytes always belong to `url` even if the slot is overwritten
    /// right afterwards.
    pub fn get(&self, url: &str) -> Option<Bytes> {
        let object = self.slots.iter().find_map(|lock| {
            let slot = lock.read();
            slot.holds(url).then(|| slot.object.clone())
        });

        match object {
            Some(_) => {
                self.stats.record_hit();
                log::debug!("cache hit: {}", url);
            }
            None => {
                self.stats.record_miss();
                log::debug!("cache miss: {}", url);
            }
        }
        object
    }

    /// Store `object` under `url`, returning the slot index written
    ///
    /// A url that is already resident is refreshed in place; otherwise the
    /// victim from [`select_victim`](Self::select_victim) is overwritten. The
    /// cache never refuses an insert for lack of room.
    ///
    /// # Errors
    ///
    /// `ObjectTooLarge` if `object` exceeds the configured maximum. Objects are
    /// never truncated.
    pub fn insert(&self, url: &str, object: Bytes) -> ProxyResult<usize> {
        if object.len() > self.max_object_size {
            return Err(ProxyError::ObjectTooLarge {
                size: object.len(),
                limit: self.max_object_size,
            });
        }

        let index = self.find(url).unwrap_or_else(|| self.select_victim());
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;

        let evicted = {
            let mut slot = self.slots[index].write();
            let evicted = slot.occupied && slot.url != url;
            if evicted {
                log::debug!("evicting {} (rank {}) from slot {}", slot.url, slot.rank, index);
            }
            slot.url.clear();
            slot.url.push_str(url);
            slot.object = object;
            slot.occupied = true;
            slot.rank = RANK_SENTINEL;
            slot.generation = generation;
            evicted
        };

        if self.age_others(index, url, generation) {
            // A newer insert of the same url landed elsewhere; ours is the stale copy
            let mut slot = self.slots[index].write();
            if slot.generation == generation {
                slot.vacate();
            }
        }

        self.stats.record_insertion(evicted);
        Ok(index)
    }

    /// Decrement the rank of every occupied slot except `index`, one slot at a time
    ///
    /// Older copies of `url` met on the way are vacated. Returns true when a newer
    /// copy was found, meaning the slot at `index` is the one to drop.
    fn age_others(&self, index: usize, url: &str, generation: u64) -> bool {
        let mut superseded = false;

        for (i, lock) in self.slots.iter().enumerate() {
            if i == index {
                continue;
            }

            let mut slot = lock.write();
            if !slot.occupied {
                continue;
            }
            if slot.url == url {
                if slot.generation < generation {
                    slot.vacate();
                    continue;
                }
                superseded = true;
            }
            slot.rank -= 1;
        }

        superseded
    }

    /// Slot the next insert of a new url would overwrite
    ///
    /// The first empty slot wins outright. With every slot occupied the lowest
    /// rank wins, and on equal ranks the lowest index seen first is kept.
    pub fn select_victim(&self) -> usize {
        let mut victim: Option<(usize, i64)> = None;

        for (i, lock) in self.slots.iter().enumerate() {
            let slot = lock.read();
            if !slot.occupied {
                return i;
            }
            match victim {
                Some((_, rank)) if slot.rank >= rank => {}
                _ => victim = Some((i, slot.rank)),
            }
        }

        victim.map_or(0, |(i, _)| i)
    }

    /// Occupied slots in index order
    pub fn snapshot(&self) -> Vec<SlotSnapshot> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, lock)| {
                let slot = lock.read();
                slot.occupied.then(|| SlotSnapshot {
                    index,
                    url: slot.url.clone(),
                    size: slot.object.len(),
                    rank: slot.rank,
                })
            })
            .collect()
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|lock| lock.read().occupied).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot(self.len())
    }
}

#[cfg(test)]
impl ObjectCache {
    /// Keep slot `index` under read admission until the returned guard drops
    pub(crate) fn hold_for_read(&self, index: usize) -> impl Sized + '_ {
        self.slots[index].read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn urls(cache: &ObjectCache) -> Vec<String> {
        cache.snapshot().into_iter().map(|s| s.url).collect()
    }

    #[test]
    fn test_insert_then_get() {
        let cache = ObjectCache::new(4, 1024);
        assert!(cache.is_empty());
        assert_eq!(cache.get("/a.html"), None);

        cache.insert("/a.html", Bytes::from_static(b"hi")).unwrap();

        assert_eq!(cache.find("/a.html"), Some(0));
        assert_eq!(cache.get("/a.html"), Some(Bytes::from_static(b"hi")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_key_is_exact_string() {
        let cache = ObjectCache::new(4, 1024);
        cache.insert("http://example.com/a", Bytes::from_static(b"x")).unwrap();

        assert_eq!(cache.find("http://example.com/a/"), None);
        assert_eq!(cache.find("HTTP://example.com/a"), None);
        assert_eq!(cache.find("/a"), None);
    }

    #[test]
    fn test_oversized_object_rejected_not_truncated() {
        let cache = ObjectCache::new(2, 4);
        let err = cache.insert("/big", Bytes::from_static(b"12345")).unwrap_err();
        assert!(matches!(err, ProxyError::ObjectTooLarge { size: 5, limit: 4 }));
        assert!(cache.is_empty());

        // Exactly at the limit is fine
        cache.insert("/fits", Bytes::from_static(b"1234")).unwrap();
        assert_eq!(cache.get("/fits").unwrap().len(), 4);
    }

    #[test]
    fn test_empty_slot_preferred_over_occupied() {
        let cache = ObjectCache::new(3, 1024);
        cache.insert("/a", Bytes::from_static(b"a")).unwrap();
        assert_eq!(cache.select_victim(), 1);
        cache.insert("/b", Bytes::from_static(b"b")).unwrap();
        assert_eq!(cache.select_victim(), 2);
    }

    #[test]
    fn test_insert_ages_other_slots() {
        let cache = ObjectCache::new(3, 1024);
        cache.insert("/a", Bytes::from_static(b"a")).unwrap();
        cache.insert("/b", Bytes::from_static(b"b")).unwrap();
        cache.insert("/c", Bytes::from_static(b"c")).unwrap();

        let ranks: Vec<i64> = cache.snapshot().iter().map(|s| s.rank).collect();
        assert_eq!(ranks, vec![RANK_SENTINEL - 2, RANK_SENTINEL - 1, RANK_SENTINEL]);
    }

    #[test]
    fn test_full_cache_evicts_least_recently_inserted() {
        let cache = ObjectCache::new(2, 1024);
        cache.insert("/first", Bytes::from_static(b"1")).unwrap();
        cache.insert("/second", Bytes::from_static(b"2")).unwrap();
        let index = cache.insert("/third", Bytes::from_static(b"3")).unwrap();

        assert_eq!(index, 0);
        assert_eq!(urls(&cache), vec!["/third", "/second"]);
        assert_eq!(cache.get("/first"), None);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_reads_do_not_refresh_rank() {
        let cache = ObjectCache::new(2, 1024);
        cache.insert("/first", Bytes::from_static(b"1")).unwrap();
        cache.insert("/second", Bytes::from_static(b"2")).unwrap();

        // Not an LRU: a hit on /first does not save it
        assert!(cache.get("/first").is_some());
        cache.insert("/third", Bytes::from_static(b"3")).unwrap();

        assert_eq!(cache.find("/first"), None);
        assert!(cache.find("/second").is_some());
    }

    #[test]
    fn test_rank_ties_go_to_lowest_index() {
        let cache = ObjectCache::new(3, 1024);
        cache.insert("/a", Bytes::from_static(b"a")).unwrap();
        cache.insert("/b", Bytes::from_static(b"b")).unwrap();
        cache.insert("/c", Bytes::from_static(b"c")).unwrap();

        // Force a tie between slots 1 and 2 below slot 0
        for index in [1, 2] {
            cache.slots[index].write().rank = 5;
        }
        cache.slots[0].write().rank = 100;

        assert_eq!(cache.select_victim(), 1);
    }

    #[test]
    fn test_reinsert_refreshes_in_place() {
        let cache = ObjectCache::new(3, 1024);
        cache.insert("/a", Bytes::from_static(b"old")).unwrap();
        cache.insert("/b", Bytes::from_static(b"b")).unwrap();
        let index = cache.insert("/a", Bytes::from_static(b"new")).unwrap();

        assert_eq!(index, 0);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("/a"), Some(Bytes::from_static(b"new")));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_stale_duplicate_vacated_during_aging() {
        let cache = ObjectCache::new(3, 1024);
        // Simulate the losing half of a race: an older copy of /dup sits in slot 2
        {
            let mut slot = cache.slots[2].write();
            slot.url = "/dup".to_string();
            slot.object = Bytes::from_static(b"old");
            slot.occupied = true;
            slot.rank = RANK_SENTINEL;
            slot.generation = 0;
        }
        cache.generation.store(10, Ordering::Relaxed);

        // find() hits slot 2 so write a fresh copy into slot 0 directly
        let generation = cache.generation.fetch_add(1, Ordering::Relaxed) + 1;
        {
            let mut slot = cache.slots[0].write();
            slot.url = "/dup".to_string();
            slot.object = Bytes::from_static(b"new");
            slot.occupied = true;
            slot.rank = RANK_SENTINEL;
            slot.generation = generation;
        }
        assert!(!cache.age_others(0, "/dup", generation));

        assert_eq!(urls(&cache), vec!["/dup"]);
        assert_eq!(cache.get("/dup"), Some(Bytes::from_static(b"new")));
    }

    #[test]
    fn test_never_more_than_capacity_entries() {
        let cache = ObjectCache::new(4, 1024);
        for i in 0..50 {
            cache.insert(&format!("/item/{}", i), Bytes::from(format!("body {}", i))).unwrap();
            assert!(cache.len() <= 4);
        }
        assert_eq!(cache.len(), 4);
        assert_eq!(cache.stats().insertions, 50);
        assert_eq!(cache.stats().evictions, 46);
    }

    #[test]
    fn test_reader_on_slot_admits_finds_but_holds_off_inserts() {
        use std::sync::atomic::AtomicBool;
        use std::time::Duration;

        let cache = Arc::new(ObjectCache::new(1, 1024));
        cache.insert("/a", Bytes::from_static(b"a")).unwrap();
        let held = cache.slots[0].read();

        // A concurrent find on the same slot goes straight through
        let finder = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.find("/a"))
        };
        assert_eq!(finder.join().unwrap(), Some(0));

        // An insert needs exclusive admission and waits for the reader
        let done = Arc::new(AtomicBool::new(false));
        let inserter = {
            let cache = Arc::clone(&cache);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                cache.insert("/b", Bytes::from_static(b"b")).unwrap();
                done.store(true, Ordering::SeqCst);
            })
        };
        thread::sleep(Duration::from_millis(100));
        assert!(!done.load(Ordering::SeqCst));

        drop(held);
        inserter.join().unwrap();
        assert_eq!(urls(&cache), vec!["/b"]);
    }

    #[test]
    fn test_concurrent_inserts_and_reads() {
        let cache = Arc::new(ObjectCache::new(8, 64));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..200 {
                        let url = format!("/t{}/{}", t, i % 5);
                        let body = Bytes::from(url.clone());
                        if i % 3 == 0 {
                            cache.insert(&url, body).unwrap();
                        } else if let Some(found) = cache.get(&url) {
                            // Whatever is served belongs to the url asked for
                            assert_eq!(found, body);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = cache.snapshot();
        assert!(snapshot.len() <= 8);
        let mut seen: Vec<&str> = snapshot.iter().map(|s| s.url.as_str()).collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), snapshot.len(), "duplicate urls resident: {:?}", snapshot);
    }
}
