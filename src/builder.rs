use crate::router::{Router, MAX_SHARDS};
use crate::ShardMap;

/// Configures and creates a [`ShardMap`].
///
/// # Examples
///
/// ```
/// use shardmap::{Builder, ShardMap};
///
/// let map: ShardMap<u64, String> = Builder::new().capacity(4096).shards(64).build();
/// assert_eq!(map.shard_count(), 64);
/// assert_eq!(map.capacity(), 4096);
/// ```
#[derive(Debug, Clone)]
pub struct Builder<S = crate::DefaultHashBuilder> {
    capacity: usize,
    shards: Option<usize>,
    build_hasher: S,
}

impl Builder {
    /// Creates a builder with no capacity, the default shard amount and the default hasher.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S: Default> Default for Builder<S> {
    fn default() -> Self {
        Self {
            capacity: 0,
            shards: None,
            build_hasher: S::default(),
        }
    }
}

impl<S> Builder<S> {
    /// Sets the total capacity, spread evenly over the shards.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the number of shards.
    ///
    /// Without this, the map picks the smallest power of two that is at least 16 times the
    /// available parallelism when it is first used.
    ///
    /// # Panics
    ///
    /// Panics if `shards` is not a power of two or exceeds [`MAX_SHARDS`].
    pub fn shards(mut self, shards: usize) -> Self {
        assert!(
            shards <= MAX_SHARDS,
            "shard amount {} exceeds the maximum of {}",
            shards,
            MAX_SHARDS
        );
        Router::new(shards);
        self.shards = Some(shards);
        self
    }

    /// Sets the [`BuildHasher`](std::hash::BuildHasher) used to hash keys.
    pub fn hasher<T>(self, hash_builder: T) -> Builder<T> {
        Builder {
            capacity: self.capacity,
            shards: self.shards,
            build_hasher: hash_builder,
        }
    }

    /// Creates the map. No shard is allocated until the map is first used.
    pub fn build<K, V>(self) -> ShardMap<K, V, S> {
        ShardMap::from_builder(self.capacity, self.shards, self.build_hasher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::RandomState;

    #[test]
    fn defaults() {
        let map: ShardMap<u8, u8> = Builder::new().build();
        assert_eq!(map.capacity(), 0);
        assert!(map.shard_count() >= 16);
        assert!(map.shard_count().is_power_of_two());
    }

    #[test]
    fn custom_hasher() {
        let map: ShardMap<u8, u8, RandomState> =
            Builder::new().hasher(RandomState::new()).shards(1).build();
        map.insert(1, 2);
        assert_eq!(map.get(&1), Some(2));
        assert_eq!(map.shard_count(), 1);
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn rejects_uneven_shards() {
        let _ = Builder::new().shards(3);
    }

    #[test]
    #[should_panic(expected = "exceeds the maximum")]
    fn rejects_too_many_shards() {
        let _ = Builder::new().shards(MAX_SHARDS << 1);
    }
}
