use std::borrow::Cow;
use std::hash::{BuildHasher, Hasher};
use std::rc::Rc;
use std::sync::Arc;

/// A key that can expose a deterministic byte representation for hashing.
///
/// [`ShardMap`](crate::ShardMap) hashes a key by feeding its bytes, in a single
/// [`Hasher::write`] call, to a hasher built by the map's [`BuildHasher`]. String-like keys hand
/// over the bytes they already hold; fixed-size keys hand over their native fixed-width
/// representation.
///
/// # Contract
///
/// Two keys that compare equal must produce identical bytes. When a map is queried with a
/// borrowed form `Q` of its key type `K`, `Q`'s bytes must match those of the `K` it borrows
/// from (`String` and `str` do, for example). A key type that breaks this contract will not be
/// found again after insertion, and may end up stored twice.
///
/// # Examples
///
/// ```
/// use shardmap::{KeyBytes, ShardMap};
///
/// #[derive(PartialEq, Eq)]
/// struct UserId(u64);
///
/// impl KeyBytes for UserId {
///     fn with_key_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
///         self.0.with_key_bytes(f)
///     }
/// }
///
/// let map = ShardMap::new();
/// map.insert(UserId(7), "seven");
/// assert_eq!(map.get(&UserId(7)), Some("seven"));
/// ```
pub trait KeyBytes {
    /// Calls `f` with the byte view of `self`.
    fn with_key_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R;
}

impl KeyBytes for [u8] {
    #[inline]
    fn with_key_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(self)
    }
}

impl KeyBytes for str {
    #[inline]
    fn with_key_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(self.as_bytes())
    }
}

impl KeyBytes for String {
    #[inline]
    fn with_key_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(self.as_bytes())
    }
}

impl KeyBytes for Vec<u8> {
    #[inline]
    fn with_key_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(self)
    }
}

impl<const N: usize> KeyBytes for [u8; N] {
    #[inline]
    fn with_key_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(self)
    }
}

macro_rules! impl_fixed {
    ($($t:ty),*) => {
        $(
            impl KeyBytes for $t {
                #[inline]
                fn with_key_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
                    f(&self.to_ne_bytes())
                }
            }
        )*
    };
}

impl_fixed!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);

impl KeyBytes for bool {
    #[inline]
    fn with_key_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&[*self as u8])
    }
}

impl KeyBytes for char {
    #[inline]
    fn with_key_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        (*self as u32).with_key_bytes(f)
    }
}

impl KeyBytes for () {
    #[inline]
    fn with_key_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&[])
    }
}

macro_rules! impl_forward {
    ($($t:ty),*) => {
        $(
            impl<T: ?Sized + KeyBytes> KeyBytes for $t {
                #[inline]
                fn with_key_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
                    (**self).with_key_bytes(f)
                }
            }
        )*
    };
}

impl_forward!(&T, &mut T, Box<T>, Rc<T>, Arc<T>);

impl<T> KeyBytes for Cow<'_, T>
where
    T: ?Sized + ToOwned + KeyBytes,
{
    #[inline]
    fn with_key_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        (**self).with_key_bytes(f)
    }
}

/// Hashes `key`'s byte view with a hasher built by `build_hasher`.
#[inline]
pub(crate) fn hash_key<Q, S>(build_hasher: &S, key: &Q) -> u64
where
    Q: ?Sized + KeyBytes,
    S: BuildHasher,
{
    let mut h = build_hasher.build_hasher();
    key.with_key_bytes(|bytes| h.write(bytes));
    h.finish()
}
