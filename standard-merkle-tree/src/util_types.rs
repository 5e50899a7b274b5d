pub mod merkle_tree;
pub mod multi_proof;
pub mod standard_merkle_tree;
