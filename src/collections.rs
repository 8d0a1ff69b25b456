//! Hash collection aliases.
//!
//! With the `gxhash` feature (default) the in-memory caches and traversal
//! sets use gxhash; without it they fall back to the std hasher so the crate
//! builds on targets lacking AES/SSE2 intrinsics. Anything that is serialized
//! or compared for determinism uses `BTreeMap` instead.

#[cfg(feature = "gxhash")]
pub use gxhash::{GxBuildHasher, HashMap, HashMapExt, HashSet, HashSetExt};

#[cfg(not(feature = "gxhash"))]
pub use std::collections::{HashMap, HashSet};

/// Hasher for `DashMap` caches
#[cfg(not(feature = "gxhash"))]
pub type GxBuildHasher = std::hash::RandomState;

/// Constructor shim matching gxhash's `HashMapExt`
#[cfg(not(feature = "gxhash"))]
pub trait HashMapExt {
    /// Creates an empty map
    fn new() -> Self;
}

#[cfg(not(feature = "gxhash"))]
impl<K, V> HashMapExt for HashMap<K, V> {
    fn new() -> Self {
        HashMap::default()
    }
}

/// Constructor shim matching gxhash's `HashSetExt`
#[cfg(not(feature = "gxhash"))]
pub trait HashSetExt {
    /// Creates an empty set
    fn new() -> Self;
}

#[cfg(not(feature = "gxhash"))]
impl<T> HashSetExt for HashSet<T> {
    fn new() -> Self {
        HashSet::default()
    }
}
