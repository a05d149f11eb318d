//! A concurrent hash map that bounds lock contention by sharding.
//!
//! [`ShardMap`] splits its key space over a fixed, power-of-two number of shards. Each shard is
//! an open-addressing hash table guarded by its own read-write lock, so threads that touch
//! different shards never wait on each other, and threads that only read a shard share it.
//!
//! # Shards and routing
//!
//! A key's byte view (see [`KeyBytes`]) is hashed once into 64 bits. The low bits of that digest
//! pick the shard; the high 48 bits are what the shard stores and probes with. Because the two
//! fields come from disjoint bit ranges of the same digest, the distribution of hashes inside a
//! shard does not depend on which shard was chosen. The map therefore never has more than
//! [`MAX_SHARDS`] shards.
//!
//! By default a map uses the smallest power of two that is at least 16 times the available
//! parallelism. The shard array is allocated lazily, exactly once, the first time the map is
//! inserted into; use [`Builder`] to pick a shard amount yourself.
//!
//! # Robin Hood tables
//!
//! Inside a shard, entries live in a flat, power-of-two sized array. Insertion uses Robin Hood
//! displacement: a new entry that has probed further from its ideal bucket than the resident
//! entry takes the resident's place, and the resident continues probing instead. This keeps
//! probe lengths short and even, and lets a lookup give up at the first empty bucket. Removal
//! uses backward-shift deletion rather than tombstones, so the table never fills with dead
//! slots.
//!
//! Each entry packs a 48-bit hash fragment and a 16-bit displacement into a single word. A
//! displacement of zero marks an empty bucket.
//!
//! # Resizing behavior
//!
//! A shard doubles its bucket array once 85% of its buckets are occupied, and shrinks once
//! occupancy drops to 15%. Shrinking never goes below the share of the map's initial capacity
//! the shard started with. Resizes only ever involve the one shard being written to, under that
//! shard's lock.
//!
//! # Consistency
//!
//! Operations on a single key are linearizable. [`ShardMap::len`], [`ShardMap::range`],
//! [`ShardMap::clear`] and the other whole-map operations visit the shards one after another,
//! holding one shard lock at a time; they are consistent per shard, but do not observe the map
//! as a single snapshot while other threads are writing.
//!
//! [`ShardMap::insert_accept`] and [`ShardMap::remove_accept`] let a caller inspect the current
//! value of a key and veto a change while holding the key's shard lock, giving per-key
//! read-decide-write atomicity:
//!
//! ```
//! use shardmap::ShardMap;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let map = Arc::new(ShardMap::new());
//! let handles: Vec<_> = (0..4)
//!     .map(|t| {
//!         let map = Arc::clone(&map);
//!         thread::spawn(move || {
//!             // only the first thread to get here claims the slot
//!             map.insert_accept("owner", t, |current| current.is_none());
//!         })
//!     })
//!     .collect();
//! for h in handles {
//!     h.join().unwrap();
//! }
//! assert!(map.get("owner").is_some());
//! assert_eq!(map.len(), 1);
//! ```
#![deny(
    missing_docs,
    missing_debug_implementations,
    unreachable_pub,
    rustdoc::broken_intra_doc_links
)]
#![warn(rust_2018_idioms)]

mod builder;
mod entry;
mod key;
mod map;
mod raw;
mod router;

#[cfg(feature = "rayon")]
mod rayon_impls;

#[cfg(feature = "serde")]
mod serde_impls;

pub use builder::Builder;
pub use key::KeyBytes;
pub use map::ShardMap;
pub use router::MAX_SHARDS;

/// Default hasher for [`ShardMap`].
pub type DefaultHashBuilder = ahash::RandomState;

/// An [`xxh3`](xxhash_rust::xxh3) based [`BuildHasher`](std::hash::BuildHasher), as an
/// alternative to [`DefaultHashBuilder`].
#[cfg(feature = "xxh3")]
pub type Xxh3HashBuilder = xxhash_rust::xxh3::Xxh3Builder;
