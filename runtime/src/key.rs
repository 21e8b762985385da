//! Descriptor keys for the executor cache.

use std::hash::{Hash, Hasher};

use xxhash_rust::xxh64::Xxh64;

/// Order-sensitive hash combiner.
///
/// `seed ^ (h + 0x9e3779b9 + (seed << 6) + (seed >> 2))` where `h` is the
/// xxh64 of `value`.
pub fn hash_combine<T: Hash + ?Sized>(seed: u64, value: &T) -> u64 {
    let mut hasher = Xxh64::new(0);
    value.hash(&mut hasher);
    let h = hasher.finish();
    seed ^ h.wrapping_add(0x9e37_79b9).wrapping_add(seed << 6).wrapping_add(seed >> 2)
}

/// Identity of a cached executor.
///
/// `hash_value` must agree with `Eq`: equal keys produce equal values.
/// Implementors forward [`Hash`] to it with [`hash_key`].
pub trait CacheKey: Eq + Hash + Clone + Send + Sync + 'static {
    fn hash_value(&self) -> u64;
}

/// [`Hash`] body shared by every [`CacheKey`].
pub fn hash_key<K: CacheKey, H: Hasher>(key: &K, state: &mut H) {
    state.write_u64(key.hash_value());
}
