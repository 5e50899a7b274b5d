pub use crate::abi::AbiType;
pub use crate::abi::LeafSchema;
pub use crate::abi::Record;
pub use crate::abi::Value;
pub use crate::digest::Digest;
pub use crate::error::EncodingError;
pub use crate::error::MerkleTreeError;
pub use crate::keccak::hash_pair;
pub use crate::keccak::keccak256;
pub use crate::util_types::merkle_tree::MerkleTree;
pub use crate::util_types::multi_proof::MultiProof;
pub use crate::util_types::standard_merkle_tree::MembershipProof;
pub use crate::util_types::standard_merkle_tree::RootAndProofs;
pub use crate::util_types::standard_merkle_tree::StandardMerkleTree;
pub use crate::util_types::standard_merkle_tree::TreeOptions;
pub use crate::util_types::standard_merkle_tree::verify;
pub use crate::util_types::standard_merkle_tree::verify_multi_proof;
