use crate::{KeyBytes, ShardMap};
use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};
use std::fmt::{self, Formatter};
use std::hash::BuildHasher;
use std::marker::PhantomData;

struct ShardMapVisitor<K, V, S> {
    key_marker: PhantomData<K>,
    value_marker: PhantomData<V>,
    hash_builder_marker: PhantomData<S>,
}

impl<K, V, S> Serialize for ShardMap<K, V, S>
where
    K: Serialize + Clone,
    V: Serialize + Clone,
{
    fn serialize<Sr>(&self, serializer: Sr) -> Result<Sr::Ok, Sr::Error>
    where
        Sr: Serializer,
    {
        // writers may run between shards, so the length is only known once every shard is copied
        let entries = self.entries();
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (key, value) in &entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de, K, V, S> Deserialize<'de> for ShardMap<K, V, S>
where
    K: Deserialize<'de> + KeyBytes + Eq,
    V: Deserialize<'de>,
    S: Default + BuildHasher,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(ShardMapVisitor::new())
    }
}

impl<K, V, S> ShardMapVisitor<K, V, S> {
    pub(crate) fn new() -> Self {
        Self {
            key_marker: PhantomData,
            value_marker: PhantomData,
            hash_builder_marker: PhantomData,
        }
    }
}

impl<'de, K, V, S> Visitor<'de> for ShardMapVisitor<K, V, S>
where
    K: Deserialize<'de> + KeyBytes + Eq,
    V: Deserialize<'de>,
    S: Default + BuildHasher,
{
    type Value = ShardMap<K, V, S>;

    fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "a map")
    }

    fn visit_map<M>(self, mut access: M) -> Result<Self::Value, M::Error>
    where
        M: MapAccess<'de>,
    {
        let map = match access.size_hint() {
            Some(n) => ShardMap::with_capacity_and_hasher(n, S::default()),
            None => ShardMap::with_hasher(S::default()),
        };

        while let Some((key, value)) = access.next_entry()? {
            // last one wins, as with std's maps
            let _ = map.insert(key, value);
        }

        Ok(map)
    }
}
