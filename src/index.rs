//! Robin-Hood hash map backing the ROMFS and TAR path indexes.
//!
//! Open addressing with linear probing; an inserter steals the slot of
//! any resident whose own displacement is smaller. Key bytes live in one
//! arena string so an index built in two passes (count, then populate)
//! allocates its keys exactly once. The map is not internally
//! synchronized; the owning backend serializes mutators.

use crate::error::{Error, VfsResult};

/// Probe counters are 15 bits wide; a saturated probe fails the insert.
pub const MAX_PROBE: u16 = 0x7FFF;

/// Bucket counts, ascending. Tuned for slow growth so a grow step on a
/// memory-constrained target roughly adds half the current footprint.
const PRIMES: &[u32] = &[
    13, 19, 29, 43, 67, 101, 149, 223, 331, 487, 709, 1031, 1499, 2179, 3163, 4591, 6659, 9661,
    14009, 20323, 29473, 42737, 61979, 89891, 130343, 188999, 274061, 397427, 576287, 835633,
    1211669, 1756921, 2547581,
];

/// 32-bit FNV-1a, the default first-level key hash.
pub fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811C_9DC5;
    for &b in bytes {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Fibonacci-multiplicative second-level mix applied before the modulo.
fn mix(hash: u32) -> u32 {
    hash.wrapping_mul(0x9E37_79B9)
}

struct Bucket<V> {
    /// Memoised first-level hash; grow re-inserts without re-hashing.
    hash: u32,
    /// 1-based displacement from the initial probe bucket; 0 = empty.
    probe: u16,
    /// Tombstone flag; the probe count of a tombstone is preserved.
    deleted: bool,
    key_off: u32,
    key_len: u32,
    value: Option<V>,
}

impl<V> Bucket<V> {
    fn empty() -> Self {
        Self { hash: 0, probe: 0, deleted: false, key_off: 0, key_len: 0, value: None }
    }
}

/// Prime-sized Robin-Hood map from string keys to values.
pub struct RhMap<V> {
    buckets: Vec<Bucket<V>>,
    arena: String,
    prime_ix: usize,
    live: usize,
    fixed: bool,
    hasher: fn(&[u8]) -> u32,
}

impl<V> Default for RhMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> RhMap<V> {
    /// An empty map at the smallest prime capacity.
    pub fn new() -> Self {
        Self::at_prime(0, 0, false)
    }

    /// A map pre-sized for `entries` insertions whose keys total
    /// `key_bytes` bytes. The key arena is allocated exactly once.
    pub fn with_exact_keys(entries: usize, key_bytes: usize) -> Self {
        Self::at_prime(Self::prime_for(entries), key_bytes, false)
    }

    /// Like [`RhMap::with_exact_keys`] but the bucket array never grows;
    /// inserting past the load limit reports [`Error::Overflow`].
    pub fn fixed_capacity(entries: usize, key_bytes: usize) -> Self {
        Self::at_prime(Self::prime_for(entries), key_bytes, true)
    }

    /// Replaces the first-level key hash. Entries already inserted keep
    /// their memoised hashes.
    pub fn with_hasher(mut self, hasher: fn(&[u8]) -> u32) -> Self {
        self.hasher = hasher;
        self
    }

    fn at_prime(prime_ix: usize, key_bytes: usize, fixed: bool) -> Self {
        let cap = PRIMES[prime_ix] as usize;
        Self {
            buckets: (0..cap).map(|_| Bucket::empty()).collect(),
            arena: String::with_capacity(key_bytes),
            prime_ix,
            live: 0,
            fixed,
            hasher: fnv1a,
        }
    }

    fn prime_for(entries: usize) -> usize {
        PRIMES
            .iter()
            .position(|&p| entries * 16 <= p as usize * 15)
            .unwrap_or(PRIMES.len() - 1)
    }

    /// Number of live (non-tombstone) entries.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether the map holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Current bucket count.
    pub fn capacity(&self) -> usize {
        PRIMES[self.prime_ix] as usize
    }

    fn initial_ix(&self, hash: u32) -> usize {
        (mix(hash) % PRIMES[self.prime_ix]) as usize
    }

    fn key_of(&self, bucket: &Bucket<V>) -> &str {
        let start = bucket.key_off as usize;
        &self.arena[start..start + bucket.key_len as usize]
    }

    fn find(&self, hash: u32, key: &str) -> Option<usize> {
        let cap = self.capacity();
        let mut ix = self.initial_ix(hash);
        let mut dist: u16 = 1;
        loop {
            let bucket = &self.buckets[ix];
            if bucket.probe == 0 || bucket.probe < dist {
                return None;
            }
            if !bucket.deleted && bucket.hash == hash && self.key_of(bucket) == key {
                return Some(ix);
            }
            if dist == MAX_PROBE {
                return None;
            }
            dist += 1;
            ix += 1;
            if ix == cap {
                ix = 0;
            }
        }
    }

    /// Looks up a key.
    pub fn get(&self, key: &str) -> Option<&V> {
        let hash = (self.hasher)(key.as_bytes());
        let ix = self.find(hash, key)?;
        self.buckets[ix].value.as_ref()
    }

    /// Whether the key is present.
    pub fn contains(&self, key: &str) -> bool {
        let hash = (self.hasher)(key.as_bytes());
        self.find(hash, key).is_some()
    }

    /// Inserts or replaces, returning the previous value for an existing
    /// key. Grows to the next prime past the 15/16 load limit unless the
    /// map is fixed-capacity.
    pub fn insert(&mut self, key: &str, value: V) -> VfsResult<Option<V>> {
        let hash = (self.hasher)(key.as_bytes());
        if let Some(ix) = self.find(hash, key) {
            return Ok(self.buckets[ix].value.replace(value));
        }
        if (self.live + 1) * 16 > self.capacity() * 15 {
            if self.fixed {
                return Err(Error::Overflow);
            }
            self.grow()?;
        }
        let key_off = self.arena.len() as u32;
        self.arena.push_str(key);
        self.place(hash, key_off, key.len() as u32, value)?;
        self.live += 1;
        Ok(None)
    }

    /// Removes a key, leaving a tombstone that keeps its probe count.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        let hash = (self.hasher)(key.as_bytes());
        let ix = self.find(hash, key)?;
        let bucket = &mut self.buckets[ix];
        bucket.hash = 0;
        bucket.key_off = 0;
        bucket.key_len = 0;
        bucket.deleted = true;
        self.live -= 1;
        bucket.value.take()
    }

    /// In-order bucket scan over live entries. Structural mutation while
    /// iterating is ruled out by the borrow.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.buckets
            .iter()
            .filter(|b| b.probe != 0 && !b.deleted)
            .filter_map(|b| Some((self.key_of(b), b.value.as_ref()?)))
    }

    fn place(&mut self, hash: u32, key_off: u32, key_len: u32, value: V) -> VfsResult<()> {
        let cap = self.capacity();
        let mut hash = hash;
        let mut key_off = key_off;
        let mut key_len = key_len;
        let mut value = Some(value);
        let mut ix = self.initial_ix(hash);
        let mut dist: u16 = 1;
        loop {
            let bucket = &mut self.buckets[ix];
            if bucket.probe == 0 || (bucket.deleted && dist >= bucket.probe) {
                *bucket = Bucket { hash, probe: dist, deleted: false, key_off, key_len, value };
                return Ok(());
            }
            if !bucket.deleted && bucket.probe < dist {
                std::mem::swap(&mut bucket.hash, &mut hash);
                std::mem::swap(&mut bucket.key_off, &mut key_off);
                std::mem::swap(&mut bucket.key_len, &mut key_len);
                std::mem::swap(&mut bucket.value, &mut value);
                let displaced = bucket.probe;
                bucket.probe = dist;
                dist = displaced;
            }
            if dist == MAX_PROBE {
                return Err(Error::Overflow);
            }
            dist += 1;
            ix += 1;
            if ix == cap {
                ix = 0;
            }
        }
    }

    fn grow(&mut self) -> VfsResult<()> {
        if self.prime_ix + 1 >= PRIMES.len() {
            return Err(Error::FsFull);
        }
        self.prime_ix += 1;
        let cap = self.capacity();
        let old = std::mem::replace(&mut self.buckets, (0..cap).map(|_| Bucket::empty()).collect());
        for bucket in old {
            if bucket.probe == 0 || bucket.deleted {
                continue;
            }
            let Some(value) = bucket.value else { continue };
            // memoised hash: the user hash never runs again on grow
            self.place(bucket.hash, bucket.key_off, bucket.key_len, value)?;
        }
        Ok(())
    }

    #[cfg(test)]
    fn assert_probe_invariant(&self) {
        let cap = self.capacity();
        for (ix, bucket) in self.buckets.iter().enumerate() {
            if bucket.probe == 0 || bucket.deleted {
                continue;
            }
            let initial = self.initial_ix(bucket.hash);
            let dist = (ix + cap - initial) % cap;
            assert_eq!(
                bucket.probe as usize,
                dist + 1,
                "probe mismatch at bucket {ix} (initial {initial})"
            );
        }
    }
}
