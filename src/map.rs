use crate::key::{hash_key, KeyBytes};
use crate::raw::Table;
use crate::router::{default_shard_amount, Router};
use parking_lot::RwLock;
use std::borrow::Borrow;
use std::fmt::{self, Debug, Formatter};
use std::hash::BuildHasher;
use std::sync::OnceLock;

/// The shard array, allocated once per map.
struct Shards<K, V> {
    router: Router,
    /// Capacity each shard's table is created and cleared with.
    shard_capacity: usize,
    tables: Box<[RwLock<Table<K, V>>]>,
}

/// A concurrent hash map split into independently locked shards.
///
/// Each key is routed, by the low bits of its hash, to exactly one shard: a Robin Hood
/// open-addressing table behind its own [`parking_lot::RwLock`]. Reads take the shard's shared
/// lock, writes its exclusive lock, and no operation ever holds more than one shard lock at a
/// time.
///
/// Keys are hashed through their [`KeyBytes`] byte view by the map's [`BuildHasher`], which is
/// [`ahash::RandomState`](crate::DefaultHashBuilder) unless another one is given.
///
/// The shard array is allocated lazily, exactly once, on the first insertion (or on an explicit
/// call to [`ShardMap::init`]). Its size is fixed from then on.
///
/// # Examples
///
/// ```
/// use shardmap::ShardMap;
///
/// let map = ShardMap::new();
/// assert_eq!(map.insert("Hello", "Dolly!"), None);
/// assert_eq!(map.get("Hello"), Some("Dolly!"));
/// assert_eq!(map.remove("Hello"), Some("Dolly!"));
/// assert_eq!(map.get("Hello"), None);
/// ```
pub struct ShardMap<K, V, S = crate::DefaultHashBuilder> {
    /// The capacity the map was asked for, spread evenly over the shards.
    capacity: usize,

    /// Fixed when the shard amount was chosen explicitly; computed on initialization otherwise.
    router: Option<Router>,

    shards: OnceLock<Shards<K, V>>,

    build_hasher: S,
}

impl<K, V> ShardMap<K, V, crate::DefaultHashBuilder> {
    /// Creates an empty `ShardMap`.
    ///
    /// No shard is allocated until the map is first inserted into.
    ///
    /// # Examples
    ///
    /// ```
    /// use shardmap::ShardMap;
    /// let map: ShardMap<&str, i32> = ShardMap::new();
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty `ShardMap` able to hold at least `capacity` elements, spread over its
    /// shards, before any shard has to grow.
    ///
    /// # Examples
    ///
    /// ```
    /// use shardmap::ShardMap;
    /// let map: ShardMap<&str, i32> = ShardMap::with_capacity(10);
    /// ```
    ///
    /// # Notes
    ///
    /// Every shard gets `capacity / shard_count` of the requested capacity, so a skewed key
    /// distribution may still make individual shards grow early. Shards never shrink below
    /// their share.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, crate::DefaultHashBuilder::default())
    }
}

impl<K, V, S> Default for ShardMap<K, V, S>
where
    S: Default,
{
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S> ShardMap<K, V, S> {
    /// Creates an empty map which will use `hash_builder` to hash keys.
    ///
    /// # Examples
    ///
    /// ```
    /// use shardmap::{DefaultHashBuilder, ShardMap};
    ///
    /// let map = ShardMap::with_hasher(DefaultHashBuilder::default());
    /// map.insert(1, 2);
    /// ```
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_capacity_and_hasher(0, hash_builder)
    }

    /// Creates an empty map with the specified `capacity`, using `hash_builder` to hash the keys.
    ///
    /// # Examples
    ///
    /// ```
    /// use shardmap::ShardMap;
    /// use std::collections::hash_map::RandomState;
    ///
    /// let s = RandomState::new();
    /// let map = ShardMap::with_capacity_and_hasher(10, s);
    /// map.insert(1, 2);
    /// ```
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self {
            capacity,
            router: None,
            shards: OnceLock::new(),
            build_hasher: hash_builder,
        }
    }

    pub(crate) fn from_builder(capacity: usize, shards: Option<usize>, hash_builder: S) -> Self {
        Self {
            capacity,
            router: shards.map(Router::new),
            shards: OnceLock::new(),
            build_hasher: hash_builder,
        }
    }

    /// Allocates the shard array if that has not happened yet.
    ///
    /// Every inserting operation initializes the map on its own; calling this up front only
    /// moves the allocation out of the first insertion. Concurrent and repeated calls are fine:
    /// the shards are allocated exactly once.
    pub fn init(&self) {
        self.shards();
    }

    fn shards(&self) -> &Shards<K, V> {
        self.shards.get_or_init(|| {
            let router = self
                .router
                .unwrap_or_else(|| Router::new(default_shard_amount()));
            let shard_capacity = self.capacity / router.shards();
            tracing::debug!(
                shards = router.shards(),
                shard_capacity,
                "allocating map shards"
            );
            Shards {
                router,
                shard_capacity,
                tables: (0..router.shards())
                    .map(|_| RwLock::new(Table::new(shard_capacity)))
                    .collect(),
            }
        })
    }

    /// Returns the number of shards the map is split into.
    ///
    /// This initializes the map if it was not yet initialized.
    pub fn shard_count(&self) -> usize {
        self.shards().router.shards()
    }

    /// Returns the capacity the map was created with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns a reference to the map's [`BuildHasher`].
    pub fn hasher(&self) -> &S {
        &self.build_hasher
    }

    /// Returns the number of entries in the map.
    ///
    /// Each shard's exclusive lock is taken in turn, so the count is consistent per shard but
    /// is not a snapshot of the whole map while other threads keep writing.
    ///
    /// # Examples
    ///
    /// ```
    /// use shardmap::ShardMap;
    ///
    /// let map = ShardMap::new();
    ///
    /// map.insert(1, "a");
    /// map.insert(2, "b");
    /// assert!(map.len() == 2);
    /// ```
    pub fn len(&self) -> usize {
        match self.shards.get() {
            Some(shards) => shards.tables.iter().map(|t| t.write().len()).sum(),
            None => 0,
        }
    }

    /// Returns `true` if the map is empty. Otherwise returns `false`.
    pub fn is_empty(&self) -> bool {
        match self.shards.get() {
            Some(shards) => shards.tables.iter().all(|t| t.write().is_empty()),
            None => true,
        }
    }

    /// Calls `visit` for every key-value pair in the map until it returns `false`.
    ///
    /// Shards are visited one after another, each under its shared lock. The order of the pairs
    /// is unspecified. A concurrent writer may change a shard that has not been visited yet, so
    /// the walk sees a series of per-shard snapshots rather than one snapshot of the map.
    ///
    /// `visit` runs while a shard lock is held and must not call back into the map.
    ///
    /// # Examples
    ///
    /// ```
    /// use shardmap::ShardMap;
    ///
    /// let map = ShardMap::new();
    /// map.insert("a", 1);
    /// map.insert("b", 2);
    ///
    /// let mut sum = 0;
    /// map.range(|_, v| {
    ///     sum += v;
    ///     true
    /// });
    /// assert_eq!(sum, 3);
    /// ```
    pub fn range<F>(&self, mut visit: F)
    where
        F: FnMut(&K, &V) -> bool,
    {
        let shards = match self.shards.get() {
            Some(shards) => shards,
            None => return,
        };
        for table in shards.tables.iter() {
            if !table.read().scan(&mut visit) {
                break;
            }
        }
    }

    /// Returns the keys of the map, collected shard by shard.
    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        let mut keys = Vec::new();
        if let Some(shards) = self.shards.get() {
            for table in shards.tables.iter() {
                keys.extend(table.read().keys());
            }
        }
        keys
    }

    /// Returns the values of the map, collected shard by shard.
    pub fn values(&self) -> Vec<V>
    where
        V: Clone,
    {
        let mut values = Vec::new();
        if let Some(shards) = self.shards.get() {
            for table in shards.tables.iter() {
                values.extend(table.read().values());
            }
        }
        values
    }

    /// Returns a copy of every key-value pair in the map, collected shard by shard.
    ///
    /// Each shard is copied under its shared lock, which is released before the next shard is
    /// visited.
    ///
    /// # Examples
    ///
    /// ```
    /// use shardmap::ShardMap;
    ///
    /// let map = ShardMap::new();
    /// map.insert(1, "a");
    /// assert_eq!(map.entries(), vec![(1, "a")]);
    /// ```
    pub fn entries(&self) -> Vec<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        let mut entries = Vec::new();
        if let Some(shards) = self.shards.get() {
            for table in shards.tables.iter() {
                entries.extend(table.read().entries());
            }
        }
        entries
    }

    /// Removes every entry from the map.
    ///
    /// Each shard's table is replaced by a fresh one sized to the shard's share of the map's
    /// capacity, one shard at a time.
    ///
    /// # Examples
    ///
    /// ```
    /// use shardmap::ShardMap;
    ///
    /// let map = ShardMap::new();
    /// map.insert(1, "a");
    /// map.clear();
    /// assert!(map.is_empty());
    /// ```
    pub fn clear(&self) {
        let shards = match self.shards.get() {
            Some(shards) => shards,
            None => return,
        };
        for table in shards.tables.iter() {
            *table.write() = Table::new(shards.shard_capacity);
        }
    }
}

impl<K, V, S> ShardMap<K, V, S>
where
    K: KeyBytes + Eq,
    S: BuildHasher,
{
    /// Finds the shard for `key`, along with the hash that shard files it under.
    #[inline]
    fn locate<'a, Q>(&self, shards: &'a Shards<K, V>, key: &Q) -> (&'a RwLock<Table<K, V>>, u64)
    where
        Q: ?Sized + KeyBytes,
    {
        let (shard, hash) = shards.router.route(hash_key(&self.build_hasher, key));
        (&shards.tables[shard], hash)
    }

    /// Maps `key` to `value`, returning the value previously mapped to `key`, if any.
    ///
    /// # Examples
    ///
    /// ```
    /// use shardmap::ShardMap;
    ///
    /// let map = ShardMap::new();
    /// assert_eq!(map.insert(37, "a"), None);
    /// assert_eq!(map.insert(37, "b"), Some("a"));
    /// assert_eq!(map.get(&37), Some("b"));
    /// ```
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let (table, hash) = self.locate(self.shards(), &key);
        table.write().insert(hash, key, value)
    }

    /// Maps `key` to `value` if `accept` approves of the value currently mapped to `key`.
    ///
    /// `accept` is called with the current value (`None` if `key` is absent) while the key's
    /// shard is exclusively locked, and the mutation happens under the same lock. If `accept`
    /// returns `true`, this behaves like [`ShardMap::insert`] and returns the replaced value. If
    /// it returns `false`, the map is left untouched and `None` is returned. No other thread can
    /// observe the shard between the decision and the write.
    ///
    /// `accept` must not call back into the map.
    ///
    /// # Examples
    ///
    /// ```
    /// use shardmap::ShardMap;
    ///
    /// let map = ShardMap::new();
    /// map.insert("counter", 1);
    ///
    /// // only ever move forward
    /// assert_eq!(map.insert_accept("counter", 0, |prev| prev.map_or(true, |&p| p < 0)), None);
    /// assert_eq!(map.insert_accept("counter", 2, |prev| prev.map_or(true, |&p| p < 2)), Some(1));
    /// assert_eq!(map.get("counter"), Some(2));
    /// ```
    pub fn insert_accept<F>(&self, key: K, value: V, accept: F) -> Option<V>
    where
        F: FnOnce(Option<&V>) -> bool,
    {
        let (table, hash) = self.locate(self.shards(), &key);
        let mut table = table.write();
        if !accept(table.get(hash, &key)) {
            return None;
        }
        table.insert(hash, key, value)
    }

    /// Returns a clone of the value mapped to `key`.
    ///
    /// The key may be any borrowed form of the map's key type, but `KeyBytes` and `Eq` on the
    /// borrowed form must match those for the key type.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + KeyBytes + Eq,
        V: Clone,
    {
        self.get_and(key, V::clone)
    }

    /// Calls `then` with the value mapped to `key` while the key's shard is read-locked, and
    /// returns its result.
    ///
    /// # Examples
    ///
    /// ```
    /// use shardmap::ShardMap;
    ///
    /// let map = ShardMap::new();
    /// map.insert("k", vec![1, 2, 3]);
    /// assert_eq!(map.get_and("k", |v| v.len()), Some(3));
    /// assert_eq!(map.get_and("x", |v| v.len()), None);
    /// ```
    pub fn get_and<Q, R, F>(&self, key: &Q, then: F) -> Option<R>
    where
        K: Borrow<Q>,
        Q: ?Sized + KeyBytes + Eq,
        F: FnOnce(&V) -> R,
    {
        let shards = self.shards.get()?;
        let (table, hash) = self.locate(shards, key);
        let table = table.read();
        table.get(hash, key).map(then)
    }

    /// Returns `true` if the map contains a value for `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + KeyBytes + Eq,
    {
        self.get_and(key, |_| ()).is_some()
    }

    /// Removes `key` from the map, returning the value it was mapped to, if any.
    ///
    /// # Examples
    ///
    /// ```
    /// use shardmap::ShardMap;
    ///
    /// let map = ShardMap::new();
    /// map.insert(1, "a");
    /// assert_eq!(map.remove(&1), Some("a"));
    /// assert_eq!(map.remove(&1), None);
    /// ```
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + KeyBytes + Eq,
    {
        let shards = self.shards.get()?;
        let (table, hash) = self.locate(shards, key);
        table.write().remove(hash, key)
    }

    /// Removes `key` if `accept` approves of the value currently mapped to it.
    ///
    /// `accept` is called with the current value (`None` if `key` is absent) while the key's
    /// shard is exclusively locked. If it returns `true`, this behaves like
    /// [`ShardMap::remove`]; if it returns `false`, the map is left untouched and `None` is
    /// returned.
    ///
    /// `accept` must not call back into the map.
    ///
    /// # Examples
    ///
    /// ```
    /// use shardmap::ShardMap;
    ///
    /// let map = ShardMap::new();
    /// map.insert("session", 0);
    /// assert_eq!(map.remove_accept("session", |v| v == Some(&1)), None);
    /// assert_eq!(map.remove_accept("session", |v| v == Some(&0)), Some(0));
    /// assert!(map.is_empty());
    /// ```
    pub fn remove_accept<Q, F>(&self, key: &Q, accept: F) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + KeyBytes + Eq,
        F: FnOnce(Option<&V>) -> bool,
    {
        let shards = self.shards.get();
        let (table, hash) = match shards {
            Some(shards) => self.locate(shards, key),
            None => {
                accept(None);
                return None;
            }
        };
        let mut table = table.write();
        if !accept(table.get(hash, key)) {
            return None;
        }
        table.remove(hash, key)
    }

    /// Retains only the entries for which `keep` returns `true`.
    ///
    /// Shards are processed one at a time under their exclusive lock. `keep` must not call
    /// back into the map.
    ///
    /// # Examples
    ///
    /// ```
    /// use shardmap::ShardMap;
    ///
    /// let map = ShardMap::new();
    /// for i in 0..8 {
    ///     map.insert(i, i * 10);
    /// }
    /// map.retain(|&k, _| k % 2 == 0);
    /// assert_eq!(map.len(), 4);
    /// ```
    pub fn retain<F>(&self, mut keep: F)
    where
        F: FnMut(&K, &V) -> bool,
    {
        let shards = match self.shards.get() {
            Some(shards) => shards,
            None => return,
        };
        for table in shards.tables.iter() {
            table.write().retain(&mut keep);
        }
    }
}

impl<K, V, S> PartialEq for ShardMap<K, V, S>
where
    K: KeyBytes + Eq + Clone,
    V: PartialEq + Clone,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        if self.len() != other.len() {
            return false;
        }
        let shards = match self.shards.get() {
            Some(shards) => shards,
            None => return true,
        };
        for table in shards.tables.iter() {
            // copied out first: a lock on `self` must not be held while `other` is locked
            let entries = table.read().entries();
            for (key, value) in &entries {
                if other.get_and(key, |v| v == value) != Some(true) {
                    return false;
                }
            }
        }
        true
    }
}

impl<K, V, S> Eq for ShardMap<K, V, S>
where
    K: KeyBytes + Eq + Clone,
    V: Eq + Clone,
    S: BuildHasher,
{
}

impl<K, V, S> Debug for ShardMap<K, V, S>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        self.range(|k, v| {
            map.entry(k, v);
            true
        });
        map.finish()
    }
}

impl<K, V, S> Clone for ShardMap<K, V, S>
where
    K: Clone,
    V: Clone,
    S: Clone,
{
    fn clone(&self) -> Self {
        let cloned = Self {
            capacity: self.capacity,
            router: self.router,
            shards: OnceLock::new(),
            build_hasher: self.build_hasher.clone(),
        };
        if let Some(shards) = self.shards.get() {
            // same hasher, same router: every entry belongs to the same shard in the copy.
            let copy = Shards {
                router: shards.router,
                shard_capacity: shards.shard_capacity,
                tables: shards
                    .tables
                    .iter()
                    .map(|t| RwLock::new(t.read().clone()))
                    .collect(),
            };
            let _ = cloned.shards.set(copy);
        }
        cloned
    }
}

impl<K, V, S> Extend<(K, V)> for &ShardMap<K, V, S>
where
    K: KeyBytes + Eq,
    S: BuildHasher,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<K, V, S> Extend<(K, V)> for ShardMap<K, V, S>
where
    K: KeyBytes + Eq,
    S: BuildHasher,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        (&*self).extend(iter);
    }
}

impl<K, V, S> FromIterator<(K, V)> for ShardMap<K, V, S>
where
    K: KeyBytes + Eq,
    S: BuildHasher + Default,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let iter = iter.into_iter();
        let map = Self::with_capacity_and_hasher(iter.size_hint().0, S::default());
        (&map).extend(iter);
        map
    }
}
