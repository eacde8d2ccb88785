use std::hash::{Hash, Hasher};

/// Identity of a keyed element among its siblings.
pub type Key = u64;

#[cfg(feature = "std-hash")]
pub mod default {
    pub use std::collections::hash_map::DefaultHasher;

    #[inline]
    pub fn new() -> DefaultHasher {
        DefaultHasher::new()
    }
}

#[cfg(not(feature = "std-hash"))]
pub mod default {
    // fast branch
    pub use ahash::AHasher as DefaultHasher;

    #[inline]
    pub fn new() -> DefaultHasher {
        DefaultHasher::default()
    }
}

/// Hashes any `Hash` value into a sibling [`Key`].
///
/// The hasher is unseeded so equal values produce equal keys across renders.
pub fn hash_key<K: Hash + ?Sized>(key: &K) -> Key {
    let mut hasher = default::new();
    key.hash(&mut hasher);
    hasher.finish()
}
