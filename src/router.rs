use crate::entry::{DIB_BITS, HASH_BITS, MAX_HASH};

/// Largest number of shards a map can be split into.
///
/// Shard selection reads the low bits of a key's digest while the table stores the high
/// [`HASH_BITS`] bits, so the selector must fit in what the stored fragment leaves out.
pub const MAX_SHARDS: usize = 1 << (u64::BITS - HASH_BITS);

/// Splits one 64-bit key digest into a shard index and the hash the shard stores.
///
/// The two fields are taken from disjoint bit ranges of the same digest, so a shard sees a hash
/// distribution that does not depend on which shard was picked, without hashing twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Router {
    shard_bits: u32,
    shard_mask: u64,
}

impl Router {
    /// Creates a router over `shards` shards.
    ///
    /// # Panics
    ///
    /// Panics if `shards` is not a power of two, or if it needs more selector bits than the
    /// stored hash fragment leaves free.
    pub(crate) fn new(shards: usize) -> Self {
        assert!(
            shards.is_power_of_two(),
            "shard amount must be a power of two, got {}",
            shards
        );
        let shard_bits = shards.trailing_zeros();
        assert!(
            shard_bits + HASH_BITS <= u64::BITS,
            "{} shards need {} selector bits, but only {} are free of the {}-bit stored hash",
            shards,
            shard_bits,
            u64::BITS - HASH_BITS,
            HASH_BITS
        );
        Self {
            shard_bits,
            shard_mask: (shards - 1) as u64,
        }
    }

    #[inline]
    pub(crate) fn shards(&self) -> usize {
        1 << self.shard_bits
    }

    /// Returns `(shard index, intra-shard hash)` for a key digest.
    #[inline]
    pub(crate) fn route(&self, digest: u64) -> (usize, u64) {
        let shard = (digest & self.shard_mask) as usize;
        let hash = digest >> DIB_BITS;
        debug_assert!(hash <= MAX_HASH);
        (shard, hash)
    }
}

/// Default shard amount: the smallest power of two that is at least 16 times the available
/// parallelism, clamped to [`MAX_SHARDS`].
pub(crate) fn default_shard_amount() -> usize {
    (num_cpus() * 16).next_power_of_two().min(MAX_SHARDS)
}

#[cfg(not(miri))]
fn num_cpus() -> usize {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Once;

    static NCPU_INITIALIZER: Once = Once::new();
    static NCPU: AtomicUsize = AtomicUsize::new(0);

    NCPU_INITIALIZER.call_once(|| NCPU.store(num_cpus::get(), Ordering::Relaxed));
    NCPU.load(Ordering::Relaxed).max(1)
}

#[cfg(miri)]
const fn num_cpus() -> usize {
    1
}
