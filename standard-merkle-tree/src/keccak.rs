//! Keccak-256 hashing for leaves and internal nodes.
//!
//! Leaves and internal nodes live in separate hash domains: an internal node
//! is the hash of exactly 64 bytes, a leaf is the hash of a hash. A leaf
//! preimage can therefore never be passed off as a pair of children, which
//! rules out second-preimage attacks on the tree.

use sha3::Digest as Sha3Digest;
use sha3::Keccak256;

use crate::digest::Digest;

/// Keccak-256 of arbitrary bytes.
pub fn keccak256(data: impl AsRef<[u8]>) -> Digest {
    Digest::new(Keccak256::digest(data).into())
}

/// The leaf digest of an already encoded record: `keccak256(keccak256(encoding))`.
pub fn leaf_hash(encoding: impl AsRef<[u8]>) -> Digest {
    keccak256(keccak256(encoding))
}

/// Combine two digests into their parent.
///
/// The smaller digest is hashed first, so `hash_pair(a, b) == hash_pair(b, a)`.
/// This matches `Hashes.commutativeKeccak256` of OpenZeppelin's Solidity
/// library, which verifiers replay without knowing left from right.
pub fn hash_pair(a: Digest, b: Digest) -> Digest {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    let mut hasher = Keccak256::new();
    hasher.update(low.0);
    hasher.update(high.0);
    Digest::new(hasher.finalize().into())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use proptest::prelude::*;
    use test_strategy::proptest;

    use super::*;

    #[test]
    fn keccak_of_empty_input() {
        let expected = "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470";
        assert_eq!(expected, keccak256(b"").to_hex());
    }

    #[proptest]
    fn hash_pair_is_commutative(a: Digest, b: Digest) {
        prop_assert_eq!(hash_pair(a, b), hash_pair(b, a));
    }

    #[proptest]
    fn hash_pair_hashes_sorted_concatenation(a: Digest, b: Digest) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let concatenation = [low.0, high.0].concat();
        prop_assert_eq!(keccak256(concatenation), hash_pair(a, b));
    }

    #[proptest]
    fn leaf_and_node_domains_differ(a: Digest, b: Digest) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let concatenation = [low.0, high.0].concat();
        prop_assert_ne!(leaf_hash(concatenation), hash_pair(a, b));
    }
}
