use thiserror::Error;

use crate::abi::AbiType;
use crate::digest::Digest;

#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[non_exhaustive]
pub enum TryFromDigestError {
    #[error("expected {expected} bytes for digest, but got {0}", expected = Digest::BYTES)]
    InvalidLength(usize),
}

#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum TryFromHexDigestError {
    #[error("hex decoding error")]
    HexDecode(#[from] hex::FromHexError),

    #[error("digest error")]
    Digest(#[from] TryFromDigestError),
}

/// A record could not be encoded according to its [schema](crate::abi::LeafSchema).
#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[non_exhaustive]
pub enum EncodingError {
    #[error("schema has {expected} types, but the record has {actual} values")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("value at position {position} is not of type `{expected}`")]
    TypeMismatch { position: usize, expected: AbiType },

    #[error("value at position {position} does not fit into `{expected}`")]
    IntegerOverflow { position: usize, expected: AbiType },

    #[error("value at position {position} has {actual} bytes, but `{expected}` needs {needed}")]
    InvalidByteLength {
        position: usize,
        expected: AbiType,
        needed: usize,
        actual: usize,
    },

    #[error("cannot parse “{input}” as `{expected}`")]
    InvalidValue { input: String, expected: AbiType },

    #[error("unknown or unsupported type “{0}”")]
    UnknownType(String),
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[non_exhaustive]
pub enum MerkleTreeError {
    #[error("cannot build a Merkle tree without leaves")]
    EmptyTree,

    #[error("index {index} is out of bounds for a tree with {num_leaves} leaves")]
    IndexOutOfBounds { index: usize, num_leaves: usize },

    #[error("node {0} is not a leaf")]
    NotALeaf(usize),

    #[error("index {0} is requested more than once")]
    DuplicateIndex(usize),

    #[error("records {first} and {second} have the same leaf digest")]
    DuplicateLeaf { first: usize, second: usize },

    #[error("record is not part of the tree")]
    LeafNotFound,

    #[error("record {index} cannot be encoded")]
    InvalidRecord {
        index: usize,
        #[source]
        source: EncodingError,
    },

    #[error("node {0} does not match its children or its record")]
    InvalidNode(usize),

    #[error("a tree of {0} nodes is not complete")]
    InvalidNodeCount(usize),

    #[error("invalid multi-proof: {0}")]
    InvalidMultiProof(&'static str),

    #[error("encoding error")]
    Encoding(#[from] EncodingError),
}
