//! Hash computation for event topics and file-tree paths
//!
//! Event topics use keccak256 over the canonical Solidity signature, the
//! same value the origin contract emits as `topics[0]`. File-tree paths use
//! the destination chain's SHA-256 path chaining.

use sha2::{Digest, Sha256};
use tiny_keccak::{Hasher, Keccak};

/// Compute keccak256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// Topic hash of a canonical event signature, e.g. `PostedKey(address,string)`
pub fn event_signature_hash(signature: &str) -> [u8; 32] {
    keccak256(signature.as_bytes())
}

/// Compute the content-path identifier of a file-tree path
///
/// The path is split on `/` after dropping one trailing separator. Starting
/// from an empty accumulator, each segment folds in as
/// `acc = hex(sha256(acc ++ hex(sha256(segment))))`.
///
/// # Example
///
/// ```
/// use mulberry::hash::merkle_path;
///
/// assert_eq!(merkle_path("s/home/"), merkle_path("s/home"));
/// assert_ne!(merkle_path("s/home"), merkle_path("home/s"));
/// ```
pub fn merkle_path(path: &str) -> String {
    let trimmed = path.strip_suffix('/').unwrap_or(path);

    trimmed.split('/').fold(String::new(), |total, segment| {
        let segment_hash = hex::encode(Sha256::digest(segment.as_bytes()));

        let mut hasher = Sha256::new();
        hasher.update(total.as_bytes());
        hasher.update(segment_hash.as_bytes());
        hex::encode(hasher.finalize())
    })
}
