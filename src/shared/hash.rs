use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

/// Deterministic 64-bit hash, identical across processes and runs.
/// Tuple routing depends on it, so changing the hasher reroutes data.
pub fn stable_hash64<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = FxHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Re-hashes a key hash for one recursion level of a spilling table, so
/// that levels (and upstream routing) split keys independently.
pub fn level_hash(hash: i32, level: u32) -> u64 {
    stable_hash64(&(hash, level, 0x9e37_79b9u32))
}
