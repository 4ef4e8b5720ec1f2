// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Concurrent cache of index deltas, keyed by vote distributions up to a
//! permutation of the players.
//!
//! The table has twice as many buckets as its entry capacity. Each bucket is
//! a chain of entries guarded by its own lock, and a single global list
//! guarded by another lock tracks the recency of entries. Locks are always
//! taken in the order bucket, then recency list. The free list lock can be
//! taken while holding a bucket lock.
//!
//! Entries live in slots that are allocated by chunks on demand, and recycled
//! through a free list once evicted. Links between slots are slot indices.

use crate::random::Pcg32;
use log::debug;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

/// Default number of bits of the entry capacity.
pub const DEFAULT_CACHE_BITS: u32 = 20;

/// Number of promotions after which a hit entry is moved again to the front
/// of the recency list.
const MAX_PROMOTIONS: u64 = 1 << 23;

/// Maximal number of bits of the entry capacity.
pub const MAX_CACHE_BITS: u32 = 24;

/// Number of slots that are kept ready in the free list.
const FREE_RESERVE: usize = 16;

/// Number of bits of the number of slots per chunk.
const CHUNK_BITS: u32 = 12;
const CHUNK_SIZE: usize = 1 << CHUNK_BITS;

/// Null slot index.
const NIL: u32 = u32::MAX;

/// Index deltas of one player, found in the cache.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedDelta {
    /// Change of the Shapley-Shubik index.
    pub shapley: f64,
    /// Change of the Banzhaf index.
    pub banzhaf: f64,
}

/// Content of an entry.
struct Payload {
    votes: Box<[u32]>,
    shapley: Box<[f64]>,
    banzhaf: Box<[f64]>,
}

/// Storage for one entry. The links are only modified while holding the
/// lock that guards them: the bucket lock for `next`/`prev`, the recency
/// list lock for `newer`/`older`/`in_lru`.
struct Slot {
    hash: AtomicU32,
    /// Value of the promotion counter when this entry was last moved to the
    /// front of the recency list.
    seen_promotions: AtomicU64,
    next: AtomicU32,
    /// Previous entry in the chain, or `NIL` for the first entry.
    prev: AtomicU32,
    newer: AtomicU32,
    older: AtomicU32,
    in_lru: AtomicBool,
    payload: Mutex<Payload>,
}

impl Slot {
    fn new(n: usize) -> Self {
        Slot {
            hash: AtomicU32::new(0),
            seen_promotions: AtomicU64::new(0),
            next: AtomicU32::new(NIL),
            prev: AtomicU32::new(NIL),
            newer: AtomicU32::new(NIL),
            older: AtomicU32::new(NIL),
            in_lru: AtomicBool::new(false),
            payload: Mutex::new(Payload {
                votes: vec![0; n].into_boxed_slice(),
                shapley: vec![0.0; n].into_boxed_slice(),
                banzhaf: vec![0.0; n].into_boxed_slice(),
            }),
        }
    }
}

/// Ends of the recency list.
struct LruState {
    newest: u32,
    oldest: u32,
}

/// A fixed-capacity concurrent cache from vote distributions to index
/// deltas.
///
/// Two distributions that are permutations of each other share an entry:
/// the lookup returns the deltas stored for a player with the same number of
/// votes as the tracked one. Recency is approximate: a hit only moves the
/// entry to the front if many insertions happened since it was last moved,
/// which keeps the recency lock out of the hit path most of the time.
pub struct SimulationCache {
    /// Number of players.
    n: usize,
    /// Maximal number of entries.
    capacity: usize,
    /// Mask applied to hashes to obtain a bucket index.
    mask: u32,
    /// Number of promotions between two moves of the same entry.
    promotion_threshold: u64,
    /// Random tags of the vote values, for Zobrist hashing.
    tags: Arc<[u32]>,
    /// First entry of each chain.
    buckets: Box<[Mutex<u32>]>,
    /// Slot storage, allocated on demand.
    chunks: Box<[OnceLock<Box<[Slot]>>]>,
    /// Number of slot indices handed out.
    allocated: AtomicUsize,
    lru: Mutex<LruState>,
    free: Mutex<Vec<u32>>,
    promotions: AtomicU64,
    size: AtomicUsize,
    hits: AtomicU64,
    stores: AtomicU64,
}

impl SimulationCache {
    /// Creates a cache for distributions of `n` players, whose vote values
    /// are in `[1, max_vote]`, with room for `2^bits` entries.
    pub fn new(n: usize, max_vote: u32, bits: u32) -> Self {
        Self::with_promotion_threshold(n, max_vote, bits, MAX_PROMOTIONS)
    }

    fn with_promotion_threshold(n: usize, max_vote: u32, bits: u32, threshold: u64) -> Self {
        assert!(
            bits <= MAX_CACHE_BITS,
            "cache capacity too large: 2^{bits}"
        );
        let capacity = 1usize << bits;
        let num_buckets = capacity << 1;
        let num_slots = capacity + FREE_RESERVE;
        let num_chunks = num_slots.div_ceil(CHUNK_SIZE);

        let cache = SimulationCache {
            n,
            capacity,
            mask: (num_buckets - 1) as u32,
            promotion_threshold: threshold,
            tags: zobrist_tags(max_vote).into(),
            buckets: (0..num_buckets).map(|_| Mutex::new(NIL)).collect(),
            chunks: (0..num_chunks).map(|_| OnceLock::new()).collect(),
            allocated: AtomicUsize::new(0),
            lru: Mutex::new(LruState {
                newest: NIL,
                oldest: NIL,
            }),
            free: Mutex::new(Vec::with_capacity(FREE_RESERVE)),
            promotions: AtomicU64::new(0),
            size: AtomicUsize::new(0),
            hits: AtomicU64::new(0),
            stores: AtomicU64::new(0),
        };

        {
            let mut free = cache.free.lock().unwrap();
            for _ in 0..FREE_RESERVE {
                free.push(cache.allocate_slot());
            }
        }

        debug!(
            "Created a cache of {capacity} entries for {n} players and votes up to {max_vote}"
        );
        cache
    }

    /// Creates a checker to look up and store distributions in this cache.
    /// Each thread should own one.
    pub fn checker(&self) -> EntryChecker {
        EntryChecker {
            tags: self.tags.clone(),
            table: vec![0; self.tags.len()],
            votes: Vec::with_capacity(self.n),
            value: 0,
            hash: 0,
        }
    }

    /// Maximal number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of entries.
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Number of successful lookups so far.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of entries inserted so far.
    pub fn stores(&self) -> u64 {
        self.stores.load(Ordering::Relaxed)
    }

    /// Looks up the distribution of the checker, and returns the deltas of a
    /// player holding the tracked vote value.
    pub fn get(&self, checker: &mut EntryChecker) -> Option<CachedDelta> {
        let hash = checker.hash;
        let head = self.bucket(hash).lock().unwrap();

        let mut index = *head;
        while index != NIL {
            let slot = self.slot(index);
            if slot.hash.load(Ordering::Relaxed) == hash {
                let found = {
                    let payload = slot.payload.lock().unwrap();
                    checker
                        .find_equal(&payload.votes)
                        .map(|position| CachedDelta {
                            shapley: payload.shapley[position],
                            banzhaf: payload.banzhaf[position],
                        })
                };
                if found.is_some() {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    self.maybe_promote(index, slot);
                    return found;
                }
            }
            index = slot.next.load(Ordering::Relaxed);
        }
        None
    }

    /// Inserts the distribution of the checker with the deltas of all its
    /// players. If an equal distribution is already present, nothing
    /// happens.
    pub fn store(&self, checker: &mut EntryChecker, shapley: &[f64], banzhaf: &[f64]) {
        assert_eq!(checker.votes.len(), self.n);
        assert_eq!(shapley.len(), self.n);
        assert_eq!(banzhaf.len(), self.n);

        let hash = checker.hash;
        // Taken before the bucket lock: slots return to the free list only
        // after their storer locked the victim's bucket.
        let index = self.get_free_slot();
        let slot = self.slot(index);
        let victim;
        {
            let mut head = self.bucket(hash).lock().unwrap();

            let mut other = *head;
            while other != NIL {
                let other_slot = self.slot(other);
                if other_slot.hash.load(Ordering::Relaxed) == hash
                    && checker
                        .find_equal(&other_slot.payload.lock().unwrap().votes)
                        .is_some()
                {
                    // Inserted concurrently.
                    drop(head);
                    self.free.lock().unwrap().push(index);
                    return;
                }
                other = other_slot.next.load(Ordering::Relaxed);
            }

            {
                let mut payload = slot.payload.lock().unwrap();
                payload.votes.copy_from_slice(&checker.votes);
                payload.shapley.copy_from_slice(shapley);
                payload.banzhaf.copy_from_slice(banzhaf);
            }

            slot.hash.store(hash, Ordering::Relaxed);
            slot.prev.store(NIL, Ordering::Relaxed);
            slot.next.store(*head, Ordering::Relaxed);
            if *head != NIL {
                self.slot(*head).prev.store(index, Ordering::Relaxed);
            }
            *head = index;

            // The entry must be in its chain before it becomes evictable.
            let mut lru = self.lru.lock().unwrap();
            if self.size.load(Ordering::Relaxed) >= self.capacity {
                let oldest = lru.oldest;
                self.unlink_lru(&mut lru, oldest);
                victim = Some(oldest);
            } else {
                self.size.fetch_add(1, Ordering::Relaxed);
                victim = None;
            }
            self.link_newest(&mut lru, index);
            slot.seen_promotions.store(
                self.promotions.fetch_add(1, Ordering::Relaxed),
                Ordering::Relaxed,
            );
        }
        self.stores.fetch_add(1, Ordering::Relaxed);

        let recycled = match victim {
            Some(victim) => {
                self.unlink_chain(victim);
                victim
            }
            None => self.allocate_slot(),
        };
        self.free.lock().unwrap().push(recycled);
    }

    fn bucket(&self, hash: u32) -> &Mutex<u32> {
        &self.buckets[(hash & self.mask) as usize]
    }

    fn slot(&self, index: u32) -> &Slot {
        let index = index as usize;
        let chunk = self.chunks[index >> CHUNK_BITS].get_or_init(|| {
            (0..CHUNK_SIZE)
                .map(|_| Slot::new(self.n))
                .collect::<Vec<_>>()
                .into_boxed_slice()
        });
        &chunk[index & (CHUNK_SIZE - 1)]
    }

    /// Hands out a never used slot. At most `capacity + FREE_RESERVE` slots
    /// are ever handed out, because only insertions that don't evict
    /// anything allocate.
    fn allocate_slot(&self) -> u32 {
        let index = self.allocated.fetch_add(1, Ordering::Relaxed);
        assert!(index < self.capacity + FREE_RESERVE);
        let index = index as u32;
        // Initialize the chunk.
        self.slot(index);
        index
    }

    /// Takes a slot from the free list, spinning until one is available.
    /// Must not be called while holding a bucket lock.
    fn get_free_slot(&self) -> u32 {
        loop {
            if let Some(index) = self.free.lock().unwrap().pop() {
                return index;
            }
            std::hint::spin_loop();
        }
    }

    /// Moves a hit entry to the front of the recency list if it wasn't
    /// moved for a while.
    fn maybe_promote(&self, index: u32, slot: &Slot) {
        let promotions = self.promotions.load(Ordering::Relaxed);
        let seen = slot.seen_promotions.load(Ordering::Relaxed);
        if promotions < seen || promotions - seen > self.promotion_threshold {
            let mut lru = self.lru.lock().unwrap();
            if lru.newest != index && slot.in_lru.load(Ordering::Relaxed) {
                self.unlink_lru(&mut lru, index);
                self.link_newest(&mut lru, index);
                slot.seen_promotions.store(
                    self.promotions.fetch_add(1, Ordering::Relaxed),
                    Ordering::Relaxed,
                );
            }
        }
    }

    fn link_newest(&self, lru: &mut LruState, index: u32) {
        let slot = self.slot(index);
        slot.newer.store(NIL, Ordering::Relaxed);
        slot.older.store(lru.newest, Ordering::Relaxed);
        if lru.newest != NIL {
            self.slot(lru.newest).newer.store(index, Ordering::Relaxed);
        } else {
            lru.oldest = index;
        }
        lru.newest = index;
        slot.in_lru.store(true, Ordering::Relaxed);
    }

    fn unlink_lru(&self, lru: &mut LruState, index: u32) {
        let slot = self.slot(index);
        let newer = slot.newer.load(Ordering::Relaxed);
        let older = slot.older.load(Ordering::Relaxed);
        if older != NIL {
            self.slot(older).newer.store(newer, Ordering::Relaxed);
        } else {
            lru.oldest = newer;
        }
        if newer != NIL {
            self.slot(newer).older.store(older, Ordering::Relaxed);
        } else {
            lru.newest = older;
        }
        slot.newer.store(NIL, Ordering::Relaxed);
        slot.older.store(NIL, Ordering::Relaxed);
        slot.in_lru.store(false, Ordering::Relaxed);
    }

    /// Removes an evicted entry from its chain.
    fn unlink_chain(&self, index: u32) {
        let slot = self.slot(index);
        let mut head = self.bucket(slot.hash.load(Ordering::Relaxed)).lock().unwrap();
        let next = slot.next.load(Ordering::Relaxed);
        let prev = slot.prev.load(Ordering::Relaxed);
        if prev != NIL {
            self.slot(prev).next.store(next, Ordering::Relaxed);
        } else {
            *head = next;
        }
        if next != NIL {
            self.slot(next).prev.store(prev, Ordering::Relaxed);
        }
        slot.next.store(NIL, Ordering::Relaxed);
        slot.prev.store(NIL, Ordering::Relaxed);
    }
}

/// Draws distinct random tags for the vote values `1..=max_vote`.
fn zobrist_tags(max_vote: u32) -> Vec<u32> {
    let mut random = Pcg32::new();
    let mut seen = HashSet::with_capacity(max_vote as usize);
    let mut tags = Vec::with_capacity(max_vote as usize);
    while tags.len() < max_vote as usize {
        let tag = random.next_u32();
        if seen.insert(tag) {
            tags.push(tag);
        }
    }
    tags
}

/// Per-thread handle holding a lookup key and the scratch space to compare
/// it with cached entries.
pub struct EntryChecker {
    /// Random tags of the vote values.
    tags: Arc<[u32]>,
    /// Occurrence count of each vote value, all zeros between comparisons.
    table: Vec<u32>,
    /// Distribution of the key.
    votes: Vec<u32>,
    /// Tracked vote value.
    value: u32,
    /// Hash of the distribution.
    hash: u32,
}

impl EntryChecker {
    /// Sets the key to the given distribution, with the given tracked vote
    /// value. Every vote must be in `[1, max_vote]`.
    pub fn set_votes_and_value(&mut self, votes: &[u32], value: u32) {
        self.votes.clear();
        self.votes.extend_from_slice(votes);
        self.value = value;
        // The sum is commutative, so all the permutations of a distribution
        // have the same hash.
        self.hash = votes
            .iter()
            .fold(0u32, |acc, &v| acc.wrapping_add(self.tags[v as usize - 1]));
    }

    /// Hash of the current key.
    pub fn hash(&self) -> u32 {
        self.hash
    }

    /// Checks whether the candidate is a permutation of the key, and returns
    /// the position in the candidate of a player with the tracked value.
    fn find_equal(&mut self, candidate: &[u32]) -> Option<usize> {
        for &v in &self.votes {
            self.table[v as usize - 1] += 1;
        }

        let mut position = None;
        for (i, &v) in candidate.iter().enumerate() {
            let count = &mut self.table[v as usize - 1];
            if *count == 0 {
                position = None;
                break;
            }
            if v == self.value {
                position = Some(i);
            }
            *count -= 1;
        }

        for &v in &self.votes {
            self.table[v as usize - 1] = 0;
        }
        position
    }
}
