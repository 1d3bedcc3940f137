//! This module provides deterministic `HashMap` and `HashSet` variants. The hashing data
//! structures in the standard library are not deterministic:
//!
//! > By default, HashMap uses a hashing algorithm selected to provide
//! > resistance against HashDoS attacks. The algorithm is randomly seeded, and a
//! > reasonable best-effort is made to generate this seed from a high quality,
//! > secure source of randomness provided by the host without blocking the program.
//!
//! Nothing in the simulation iterates a hash map in a way that affects results, but a fixed
//! hasher keeps debugging output stable from run to run. Use `HashMap::default()` to create a
//! new map.
//!
//! The `hash_str` free function is used to derive the seed of each named random stream in
//! `crate::random`.

use xxhash_rust::xxh3::xxh3_64;

pub use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

/// A convenience method to compute a stable hash of a `&str`.
#[must_use]
pub fn hash_str(data: &str) -> u64 {
    xxh3_64(data.as_bytes())
}
