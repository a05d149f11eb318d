/// Number of low bits of the packed word that hold the displacement.
pub(crate) const DIB_BITS: u32 = 16;

/// Number of high bits of the packed word that hold the hash fragment.
pub(crate) const HASH_BITS: u32 = u64::BITS - DIB_BITS;

/// Largest displacement an entry can record (65,535).
pub(crate) const MAX_DIB: u64 = u64::MAX >> HASH_BITS;

/// Largest hash fragment an entry can record (2^48 - 1).
pub(crate) const MAX_HASH: u64 = u64::MAX >> DIB_BITS;

const HASH_MASK: u64 = !MAX_DIB;

/// An occupied slot in a [`Table`](crate::raw::Table).
///
/// The stored hash fragment and the displacement share one word, `{ hash: 48, dib: 16 }`, so a
/// probe can compare displacements and fragments with a single load. A dib of `0` is reserved
/// for empty slots; an entry sitting at its ideal bucket has a dib of `1`.
#[derive(Clone)]
pub(crate) struct Entry<K, V> {
    hdib: u64,
    pub(crate) key: K,
    pub(crate) value: V,
}

impl<K, V> Entry<K, V> {
    /// Creates an entry that has not yet moved away from its ideal bucket.
    #[inline]
    pub(crate) fn new(hash: u64, key: K, value: V) -> Self {
        let mut entry = Self {
            hdib: 1,
            key,
            value,
        };
        entry.set_hash(hash);
        entry
    }

    #[inline]
    pub(crate) fn hash(&self) -> u64 {
        self.hdib >> DIB_BITS
    }

    #[inline]
    pub(crate) fn dib(&self) -> u64 {
        self.hdib & MAX_DIB
    }

    #[inline]
    pub(crate) fn set_hash(&mut self, hash: u64) {
        self.hdib = (hash & MAX_HASH) << DIB_BITS | self.hdib & MAX_DIB;
    }

    #[inline]
    pub(crate) fn set_dib(&mut self, dib: u64) {
        debug_assert!(dib <= MAX_DIB, "displacement {} overflows {} bits", dib, DIB_BITS);
        self.hdib = self.hdib & HASH_MASK | dib & MAX_DIB;
    }

    /// Records one more probe step away from the ideal bucket.
    ///
    /// # Panics
    ///
    /// Panics if the displacement would no longer fit in its 16 bits, which takes more than
    /// 65,535 keys probing through the same run.
    #[inline]
    pub(crate) fn step(&mut self) {
        let dib = self.dib();
        assert!(
            dib < MAX_DIB,
            "probe displacement overflow: more than {} keys in one collision run",
            MAX_DIB
        );
        self.set_dib(dib + 1);
    }
}

/// Displacement of a bucket, reading an empty slot as `0`.
#[inline]
pub(crate) fn dib<K, V>(bucket: &Option<Entry<K, V>>) -> u64 {
    bucket.as_ref().map_or(0, Entry::dib)
}
