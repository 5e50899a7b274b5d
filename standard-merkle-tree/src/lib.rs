//! Merkle roots and membership proofs over lists of ABI-encoded records.
//!
//! Records are encoded according to a [`LeafSchema`](abi::LeafSchema),
//! double-hashed with Keccak-256 into leaves, and combined with sorted-pair
//! hashing. The resulting roots and proofs can be checked by on-chain
//! verifiers such as OpenZeppelin's `MerkleProof` library.
//!
//! ```
//! use standard_merkle_tree::prelude::*;
//!
//! let records = [
//!     ["0", "0x7F1d642DbfD62aD4A8fA9810eA619707d09825D0"],
//!     ["1", "0x5935897A39AFABbedA5a599D38236E7Df151C8b8"],
//! ];
//! let tree = StandardMerkleTree::from_text(&records, &["uint256", "address"]).unwrap();
//!
//! let proof = tree.prove_index(1).unwrap();
//! let record = tree.record(1).unwrap();
//! let is_member = verify(record, tree.schema(), &proof.authentication_path, tree.root());
//! assert_eq!(Ok(true), is_member);
//! ```
#![deny(clippy::shadow_unrelated)]
pub mod abi;
pub mod config;
pub mod digest;
pub mod error;
pub mod keccak;
pub mod prelude;
pub mod util_types;

// re-export crates used in our public API
pub use num_bigint;
