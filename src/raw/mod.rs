use crate::entry::{self, Entry, MAX_HASH};
use std::borrow::Borrow;
use std::fmt;
use std::mem;

/// The fraction of buckets that may be occupied before a table doubles. Must be above 50%; the
/// shrink threshold is its complement.
const LOAD_FACTOR: f64 = 0.85;

/// The smallest number of buckets a table is ever allocated with. Must be a power of two.
const MIN_BUCKETS: usize = 8;

/// A single-threaded open-addressing table using Robin Hood displacement.
///
/// Every shard of a [`ShardMap`](crate::ShardMap) owns one of these behind its lock. Lookups,
/// insertions and removals all take the caller's hash, which must already have been reduced to
/// the 48 bits an [`Entry`] can store.
///
/// Two invariants make the probing work:
///
///  - an occupied bucket's dib is exactly its distance from `hash & mask`, plus one;
///  - walking forward from any entry's home bucket never crosses an empty bucket before reaching
///    that entry.
///
/// Insertion keeps both by swapping with any resident that has probed less than the candidate,
/// and removal keeps both by shifting the following run back by one slot instead of leaving a
/// tombstone. Together they let a lookup stop at the first empty bucket.
#[derive(Clone)]
pub(crate) struct Table<K, V> {
    /// The capacity the table was originally asked for. Shrinking never goes below it.
    capacity: usize,
    len: usize,
    grow_at: usize,
    shrink_at: usize,
    mask: u64,
    buckets: Box<[Option<Entry<K, V>>]>,
}

impl<K, V> Table<K, V> {
    /// Allocates a table with the smallest power-of-two bucket count that is at least
    /// `capacity` and at least `MIN_BUCKETS`.
    pub(crate) fn new(capacity: usize) -> Self {
        let mut n = MIN_BUCKETS;
        while n < capacity {
            n *= 2;
        }
        let buckets: Vec<_> = (0..n).map(|_| None).collect();
        Self {
            capacity,
            len: 0,
            grow_at: (n as f64 * LOAD_FACTOR) as usize,
            shrink_at: (n as f64 * (1.0 - LOAD_FACTOR)) as usize,
            mask: (n - 1) as u64,
            buckets: buckets.into_boxed_slice(),
        }
    }

    /// Number of entries in the table. This is a maintained counter, not a scan.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The capacity this table was created with.
    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of buckets; always a power of two.
    #[inline]
    pub(crate) fn buckets(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    fn bini(&self, hash: u64) -> usize {
        (hash & self.mask) as usize
    }

    #[inline]
    fn next(&self, i: usize) -> usize {
        (i + 1) & self.mask as usize
    }

    /// Iterates over the occupied buckets in array order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.buckets
            .iter()
            .filter_map(|b| b.as_ref().map(|e| (&e.key, &e.value)))
    }

    /// Calls `visit` for every entry in array order until it returns `false`.
    ///
    /// Returns `false` if the walk was cut short.
    pub(crate) fn scan<F>(&self, mut visit: F) -> bool
    where
        F: FnMut(&K, &V) -> bool,
    {
        for (key, value) in self.iter() {
            if !visit(key, value) {
                return false;
            }
        }
        true
    }

    pub(crate) fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        let mut keys = Vec::with_capacity(self.len);
        keys.extend(self.iter().map(|(k, _)| k.clone()));
        keys
    }

    pub(crate) fn values(&self) -> Vec<V>
    where
        V: Clone,
    {
        let mut values = Vec::with_capacity(self.len);
        values.extend(self.iter().map(|(_, v)| v.clone()));
        values
    }

    pub(crate) fn entries(&self) -> Vec<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        let mut entries = Vec::with_capacity(self.len);
        entries.extend(self.iter().map(|(k, v)| (k.clone(), v.clone())));
        entries
    }

    /// Returns the bucket index holding `key`, if any.
    fn find<Q>(&self, hash: u64, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let hash = hash & MAX_HASH;
        let mut i = self.bini(hash);
        loop {
            match &self.buckets[i] {
                // nothing further along can belong to this key: insertion never walks past an
                // empty bucket, and removal closes every gap it makes.
                None => return None,
                Some(e) if e.hash() == hash && e.key.borrow() == key => return Some(i),
                Some(_) => {}
            }
            i = self.next(i);
        }
    }

    pub(crate) fn get<Q>(&self, hash: u64, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        self.get_key_value(hash, key).map(|(_, v)| v)
    }

    pub(crate) fn get_key_value<Q>(&self, hash: u64, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let i = self.find(hash, key)?;
        self.buckets[i].as_ref().map(|e| (&e.key, &e.value))
    }

    /// Removes the entry at `i` and closes the gap by shifting the following run back.
    fn take(&mut self, mut i: usize) -> Option<Entry<K, V>> {
        let removed = self.buckets[i].take()?;
        loop {
            let next = self.next(i);
            // an empty bucket, or an entry already at home, ends the run: moving the latter
            // back would put it in front of its own ideal bucket.
            if entry::dib(&self.buckets[next]) <= 1 {
                break;
            }
            let mut shifted = self.buckets[next].take();
            if let Some(e) = &mut shifted {
                e.set_dib(e.dib() - 1);
            }
            self.buckets[i] = shifted;
            i = next;
        }
        self.len -= 1;
        Some(removed)
    }

    fn should_shrink(&self) -> bool {
        self.buckets.len() > self.capacity && self.len <= self.shrink_at
    }
}

impl<K, V> Table<K, V>
where
    K: Eq,
{
    /// Maps `key` to `value`, returning the value it replaced.
    pub(crate) fn insert(&mut self, hash: u64, key: K, value: V) -> Option<V> {
        if self.len >= self.grow_at {
            self.resize(self.buckets.len() * 2);
        }

        let mut candidate = Entry::new(hash, key, value);
        let mut i = self.bini(candidate.hash());
        loop {
            let slot = &mut self.buckets[i];
            match slot {
                None => {
                    *slot = Some(candidate);
                    self.len += 1;
                    return None;
                }
                Some(resident) => {
                    if resident.hash() == candidate.hash() && resident.key == candidate.key {
                        return Some(mem::replace(&mut resident.value, candidate.value));
                    }
                    if resident.dib() < candidate.dib() {
                        // the resident is closer to home than we are: take its bucket and keep
                        // probing on its behalf.
                        mem::swap(resident, &mut candidate);
                    }
                }
            }
            i = self.next(i);
            candidate.step();
        }
    }

    /// Removes `key`, returning its value. May shrink the table afterwards.
    pub(crate) fn remove<Q>(&mut self, hash: u64, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let i = self.find(hash, key)?;
        let removed = self.take(i)?;
        if self.should_shrink() {
            self.resize(self.len.max(self.capacity));
        }
        Some(removed.value)
    }

    /// Keeps only the entries for which `keep` returns `true`.
    pub(crate) fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&K, &V) -> bool,
    {
        let mut table = Table::new(self.buckets.len());
        table.capacity = self.capacity;
        for e in mem::take(&mut self.buckets).into_vec().into_iter().flatten() {
            if keep(&e.key, &e.value) {
                table.insert(e.hash(), e.key, e.value);
            }
        }
        *self = table;
        if self.should_shrink() {
            self.resize(self.len.max(self.capacity));
        }
    }

    /// Rebuilds the table with room for `capacity` entries, re-inserting every entry from its
    /// stored hash fragment. The original capacity is carried over.
    fn resize(&mut self, capacity: usize) {
        let mut table = Table::new(capacity);
        tracing::trace!(
            from = self.buckets.len(),
            to = table.buckets.len(),
            len = self.len,
            "resizing shard table"
        );
        for e in mem::take(&mut self.buckets).into_vec().into_iter().flatten() {
            table.insert(e.hash(), e.key, e.value);
        }
        table.capacity = self.capacity;
        *self = table;
    }
}

impl<K, V> fmt::Debug for Table<K, V>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("len", &self.len)
            .field("buckets", &self.buckets())
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Asserts the Robin Hood layout invariants over every bucket.
    fn check<K, V>(table: &Table<K, V>) {
        let n = table.buckets.len();
        assert!(n.is_power_of_two());
        assert_eq!(table.mask as usize, n - 1);
        let mut occupied = 0;
        for (i, bucket) in table.buckets.iter().enumerate() {
            let e = match bucket {
                Some(e) => e,
                None => continue,
            };
            occupied += 1;
            let home = table.bini(e.hash());
            let distance = (i + n - home) & (n - 1);
            assert_eq!(e.dib() as usize, distance + 1, "bucket {} has a stale dib", i);
            for step in 0..distance {
                assert!(
                    table.buckets[(home + step) & (n - 1)].is_some(),
                    "gap between home {} and bucket {}",
                    home,
                    i
                );
            }
        }
        assert_eq!(occupied, table.len);
    }

    #[test]
    fn new_rounds_up_to_power_of_two() {
        assert_eq!(Table::<u8, u8>::new(0).buckets(), 8);
        assert_eq!(Table::<u8, u8>::new(8).buckets(), 8);
        assert_eq!(Table::<u8, u8>::new(9).buckets(), 16);
        assert_eq!(Table::<u8, u8>::new(1000).buckets(), 1024);

        let t = Table::<u8, u8>::new(100);
        assert_eq!(t.grow_at, 108);
        assert_eq!(t.shrink_at, 19);
        assert_eq!(t.capacity(), 100);
        assert!(t.is_empty());
    }

    #[test]
    fn insert_get_remove() {
        let mut t = Table::new(0);
        assert_eq!(t.insert(1, "a", 1), None);
        assert_eq!(t.insert(2, "b", 2), None);
        assert_eq!(t.get(1, "a"), Some(&1));
        assert_eq!(t.get(2, "b"), Some(&2));
        assert_eq!(t.get(1, "b"), None);
        assert_eq!(t.insert(1, "a", 10), Some(1));
        assert_eq!(t.len(), 2);
        assert_eq!(t.remove(1, "a"), Some(10));
        assert_eq!(t.remove(1, "a"), None);
        assert_eq!(t.get(1, "a"), None);
        assert_eq!(t.len(), 1);
        check(&t);
    }

    #[test]
    fn colliding_hashes_probe_and_shift() {
        // every key shares one home bucket, so they form a single run.
        let mut t = Table::new(16);
        for k in 0..10 {
            t.insert(3, k, k * 10);
            check(&t);
        }
        for k in 0..10 {
            assert_eq!(t.get(3, &k), Some(&(k * 10)));
        }

        // removing from the front of the run must pull every follower back.
        assert_eq!(t.remove(3, &0), Some(0));
        check(&t);
        assert_eq!(t.remove(3, &5), Some(50));
        check(&t);
        for k in (1..10).filter(|&k| k != 5) {
            assert_eq!(t.get(3, &k), Some(&(k * 10)));
        }
        assert_eq!(t.get(3, &5), None);
    }

    #[test]
    fn probes_wrap_around() {
        let mut t = Table::new(8);
        let last = (t.buckets() - 1) as u64;
        for k in 0..4 {
            t.insert(last, k, k);
        }
        check(&t);
        assert!(t.buckets[0].is_some());
        assert_eq!(t.remove(last, &0), Some(0));
        check(&t);
        for k in 1..4 {
            assert_eq!(t.get(last, &k), Some(&k));
        }
    }

    #[test]
    fn robin_hood_steals_from_the_rich() {
        let mut t = Table::new(8);
        // "c" sits at home in bucket 1 until "b", which wants bucket 0, arrives having already
        // probed one step and takes it over.
        t.insert(0, "a", ());
        t.insert(1, "c", ());
        assert_eq!(t.buckets[1].as_ref().map(|e| e.key), Some("c"));
        t.insert(0, "b", ());
        check(&t);
        assert_eq!(t.buckets[1].as_ref().map(|e| e.key), Some("b"));
        assert_eq!(t.buckets[2].as_ref().map(|e| e.key), Some("c"));
        assert_eq!(t.buckets[2].as_ref().map(|e| e.dib()), Some(2));
    }

    #[test]
    fn grows_at_load_factor() {
        let mut t = Table::new(0);
        for k in 0..6u64 {
            t.insert(k, k, k);
        }
        assert_eq!(t.buckets(), 8);
        t.insert(6, 6, 6);
        assert_eq!(t.buckets(), 16);
        check(&t);
        for k in 0..7u64 {
            assert_eq!(t.get(k, &k), Some(&k));
        }
    }

    #[test]
    fn shrinks_but_not_below_capacity() {
        let mut t = Table::new(0);
        for k in 0..1000u64 {
            t.insert(k.wrapping_mul(0x9E37_79B9_7F4A_7C15) & MAX_HASH, k, k);
        }
        let grown = t.buckets();
        assert!(grown >= 1024);
        for k in 10..1000u64 {
            let h = k.wrapping_mul(0x9E37_79B9_7F4A_7C15) & MAX_HASH;
            assert_eq!(t.remove(h, &k), Some(k));
        }
        assert!(t.buckets() < grown);
        assert_eq!(t.capacity(), 0);
        check(&t);
        for k in 0..10u64 {
            let h = k.wrapping_mul(0x9E37_79B9_7F4A_7C15) & MAX_HASH;
            assert_eq!(t.get(h, &k), Some(&k));
        }

        let mut t = Table::new(64);
        for k in 0..200u64 {
            t.insert(k, k, k);
        }
        for k in 0..200u64 {
            t.remove(k, &k);
        }
        assert_eq!(t.buckets(), 64);
        assert_eq!(t.capacity(), 64);
    }

    #[test]
    fn scan_stops_early() {
        let mut t = Table::new(0);
        for k in 0..5u64 {
            t.insert(k, k, ());
        }
        let mut seen = 0;
        assert!(!t.scan(|_, _| {
            seen += 1;
            seen < 3
        }));
        assert_eq!(seen, 3);
        assert!(t.scan(|_, _| true));

        let mut keys = t.keys();
        keys.sort_unstable();
        assert_eq!(keys, vec![0, 1, 2, 3, 4]);
        assert_eq!(t.values().len(), 5);
        let mut entries = t.entries();
        entries.sort_unstable();
        assert_eq!(entries, vec![(0, ()), (1, ()), (2, ()), (3, ()), (4, ())]);
    }

    #[test]
    fn retain_keeps_layout() {
        let mut t = Table::new(0);
        for k in 0..100u64 {
            t.insert(k % 7, k, k);
        }
        t.retain(|k, _| k % 3 == 0);
        check(&t);
        assert_eq!(t.len(), 34);
        for k in 0..100u64 {
            assert_eq!(t.get(k % 7, &k).is_some(), k % 3 == 0);
        }
    }
}
