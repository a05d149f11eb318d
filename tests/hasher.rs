use shardmap::{Builder, DefaultHashBuilder, ShardMap};
use std::hash::{BuildHasher, BuildHasherDefault, Hasher};

#[derive(Default)]
pub struct ZeroHasher;

pub struct ZeroHashBuilder;

impl Hasher for ZeroHasher {
    fn finish(&self) -> u64 {
        0
    }
    fn write(&mut self, _: &[u8]) {}
}

impl BuildHasher for ZeroHashBuilder {
    type Hasher = ZeroHasher;

    fn build_hasher(&self) -> ZeroHasher {
        ZeroHasher
    }
}

fn check<S: BuildHasher + Default>() {
    let range = if cfg!(miri) { 0..16 } else { 0..1000 };
    let map = ShardMap::<i32, i32, S>::default();
    for i in range.clone() {
        map.insert(i, i);
    }

    assert!(!map.contains_key(&i32::MIN));
    assert!(!map.contains_key(&(range.start - 1)));
    for i in range.clone() {
        assert!(map.contains_key(&i));
    }
    assert!(!map.contains_key(&range.end));
    assert!(!map.contains_key(&i32::MAX));

    // remove every other key, which forces long backward shifts in a fully colliding run
    for i in range.clone().step_by(2) {
        assert_eq!(map.remove(&i), Some(i));
    }
    for i in range.clone() {
        assert_eq!(map.get(&i), if i % 2 == 0 { None } else { Some(i) });
    }
    assert_eq!(map.len(), range.len() / 2);
}

#[test]
fn test_default_hasher() {
    check::<DefaultHashBuilder>();
}

#[test]
fn test_std_hasher() {
    check::<std::collections::hash_map::RandomState>();
}

#[test]
fn test_zero_hasher() {
    check::<BuildHasherDefault<ZeroHasher>>();
}

#[test]
fn test_max_hasher() {
    #[derive(Default)]
    struct MaxHasher;

    impl Hasher for MaxHasher {
        fn finish(&self) -> u64 {
            u64::MAX
        }
        fn write(&mut self, _: &[u8]) {}
    }

    check::<BuildHasherDefault<MaxHasher>>();
}

#[test]
fn one_bucket() {
    let map: ShardMap<&'static str, usize, _> = Builder::new().hasher(ZeroHashBuilder).build();

    // all keys share one home bucket, so check that operations work at the head of the run,
    // at its tail, and in the middle.
    let v = map.insert("head", 0);
    assert_eq!(v, None);
    let v = map.insert("middle", 10);
    assert_eq!(v, None);
    let v = map.insert("tail", 100);
    assert_eq!(v, None);
    assert_eq!(map.get("head"), Some(0));
    assert_eq!(map.get("middle"), Some(10));
    assert_eq!(map.get("tail"), Some(100));

    // check that replacing the keys returns the correct old value
    assert_eq!(map.insert("head", 1), Some(0));
    assert_eq!(map.insert("middle", 11), Some(10));
    assert_eq!(map.insert("tail", 101), Some(100));
    // and updated the right value
    assert_eq!(map.get("head"), Some(1));
    assert_eq!(map.get("middle"), Some(11));
    assert_eq!(map.get("tail"), Some(101));
    // and that remove produces the right value
    assert_eq!(map.remove("middle"), Some(11));
    assert_eq!(map.get("tail"), Some(101));
    assert_eq!(map.remove("tail"), Some(101));
    assert_eq!(map.remove("head"), Some(1));
    assert!(map.is_empty());
}

#[cfg(feature = "xxh3")]
#[test]
fn test_xxh3_hasher() {
    let map = ShardMap::with_hasher(shardmap::Xxh3HashBuilder::new());
    for i in 0..1000u64 {
        map.insert(i, i);
    }
    for i in 0..1000u64 {
        assert_eq!(map.get(&i), Some(i));
    }
}
