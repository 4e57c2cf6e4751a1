//! Hashing utilities.
//!
//! - `compute`: FxHash for in-memory comparisons (artifact fields, port sets)
//! - `content_hash`: blake3 hex digest, stable across runs and sent to clients
//!
//! # Usage
//!
//! ```ignore
//! use crate::utils::hash;
//!
//! let h = hash::compute("some content"); // -> u64
//! let id = hash::content_hash(code.as_bytes()); // -> "af13..." (64 hex chars)
//! ```

use rustc_hash::FxHasher;
use std::hash::Hasher;

/// Compute 64-bit hash from byte data.
#[inline]
pub fn compute<T: AsRef<[u8]> + ?Sized>(data: &T) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(data.as_ref());
    hasher.finish()
}

/// Hash an ordered sequence of parts, with separators so `["ab","c"]`
/// and `["a","bc"]` differ.
pub fn compute_parts<'a>(parts: impl IntoIterator<Item = &'a str>) -> u64 {
    let mut hasher = FxHasher::default();
    for part in parts {
        hasher.write(part.as_bytes());
        hasher.write_u8(0xff);
    }
    hasher.finish()
}

/// Full blake3 digest as lowercase hex.
pub fn content_hash(data: &[u8]) -> String {
    hex::encode(blake3::hash(data).as_bytes())
}
