use crate::{KeyBytes, ShardMap};
use rayon::iter::{FromParallelIterator, IntoParallelIterator, ParallelExtend, ParallelIterator};
use std::hash::BuildHasher;

impl<K, V, S> ParallelExtend<(K, V)> for ShardMap<K, V, S>
where
    K: KeyBytes + Eq + Send + Sync,
    V: Send + Sync,
    S: BuildHasher + Sync,
{
    // This is of limited use due to the `&mut self` parameter. See `par_extend_sync`
    fn par_extend<I>(&mut self, par_iter: I)
    where
        I: IntoParallelIterator<Item = (K, V)>,
    {
        self.par_extend_sync(par_iter);
    }
}

impl<K, V, S> ShardMap<K, V, S>
where
    K: KeyBytes + Eq + Send + Sync,
    V: Send + Sync,
    S: BuildHasher + Sync,
{
    fn par_extend_sync<I>(&self, par_iter: I)
    where
        I: IntoParallelIterator<Item = (K, V)>,
    {
        // workers inserting into different shards never contend
        par_iter.into_par_iter().for_each(|(k, v)| {
            self.insert(k, v);
        });
    }
}

impl<K, V> FromParallelIterator<(K, V)> for ShardMap<K, V, crate::DefaultHashBuilder>
where
    K: KeyBytes + Eq + Send + Sync,
    V: Send + Sync,
{
    fn from_par_iter<I>(par_iter: I) -> Self
    where
        I: IntoParallelIterator<Item = (K, V)>,
    {
        let mut created_map = ShardMap::new();
        created_map.par_extend(par_iter);
        created_map
    }
}
