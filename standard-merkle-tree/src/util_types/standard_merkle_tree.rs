use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

use itertools::Itertools;
use rayon::prelude::*;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::trace;

use crate::abi::LeafSchema;
use crate::abi::Record;
use crate::abi::Value;
use crate::config::merkle_tree_parallelization_cutoff;
use crate::digest::Digest;
use crate::error::EncodingError;
use crate::error::MerkleTreeError;
use crate::util_types::merkle_tree::MerkleTree;
use crate::util_types::merkle_tree::MerkleTreeIndex;
use crate::util_types::multi_proof::MultiProof;

/// Policies that change the shape, and therefore the root, of a
/// [`StandardMerkleTree`]. Whoever rebuilds a root independently must use the
/// same options.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TreeOptions {
    /// Sort the leaf digests before building the tree. The root then commits
    /// to the set of records, not to their order.
    pub sort_leaves: bool,

    /// Refuse to build a tree in which two records share a leaf digest.
    pub reject_duplicate_leaves: bool,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            sort_leaves: true,
            reject_duplicate_leaves: false,
        }
    }
}

/// Proof that the record at `index` is part of a [`StandardMerkleTree`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MembershipProof {
    /// The record's position in the list the tree was built from.
    pub index: usize,

    /// Sibling digests, from the leaf up to the root, excluding the root.
    pub authentication_path: Vec<Digest>,
}

impl MembershipProof {
    /// The root implied by this proof for the given record.
    pub fn root(&self, schema: &LeafSchema, record: &[Value]) -> Result<Digest, EncodingError> {
        let leaf = schema.leaf_hash(record)?;
        Ok(MerkleTree::root_from_authentication_path(
            leaf,
            &self.authentication_path,
        ))
    }

    /// See [`verify`].
    pub fn verify(
        &self,
        schema: &LeafSchema,
        record: &[Value],
        root: Digest,
    ) -> Result<bool, EncodingError> {
        verify(record, schema, &self.authentication_path, root)
    }
}

/// The root and every record's authentication path, keyed by record index.
/// This is everything a claimant needs; persisting it is up to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootAndProofs {
    pub root: Digest,
    pub proofs: BTreeMap<usize, Vec<Digest>>,
}

/// A Merkle tree over ABI-encoded records.
///
/// Every record is [encoded](LeafSchema::encode) and double-hashed into a leaf.
/// Depending on the [`TreeOptions`], the leaves are sorted, then assembled into
/// a [`MerkleTree`]. Records keep their original position as their identity:
/// proofs are requested and labeled by that position regardless of where the
/// leaf ended up in the tree.
///
/// With default options, roots and proofs match those of OpenZeppelin's
/// `StandardMerkleTree`, and verify with its `MerkleProof` Solidity library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardMerkleTree {
    schema: LeafSchema,
    options: TreeOptions,
    records: Vec<Record>,

    /// The node index of every record's leaf, by record index.
    node_indices: Vec<MerkleTreeIndex>,

    /// The first record index of every leaf digest.
    index_lookup: HashMap<Digest, usize>,

    tree: MerkleTree,
}

impl StandardMerkleTree {
    /// Build a tree over `records` with the [default options](TreeOptions::default).
    pub fn new(records: Vec<Record>, schema: LeafSchema) -> Result<Self, MerkleTreeError> {
        Self::with_options(records, schema, TreeOptions::default())
    }

    /// Build a tree over records given as text. See [`AbiType::parse_value`][parse].
    ///
    /// [parse]: crate::abi::AbiType::parse_value
    pub fn from_text<R, S>(records: &[R], types: &[S]) -> Result<Self, MerkleTreeError>
    where
        R: AsRef<[S]>,
        S: AsRef<str>,
    {
        let schema = LeafSchema::parse(types)?;
        let records = records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                schema
                    .parse_record(record.as_ref())
                    .map_err(|source| MerkleTreeError::InvalidRecord { index, source })
            })
            .try_collect()?;
        Self::new(records, schema)
    }

    pub fn with_options(
        records: Vec<Record>,
        schema: LeafSchema,
        options: TreeOptions,
    ) -> Result<Self, MerkleTreeError> {
        if records.is_empty() {
            return Err(MerkleTreeError::EmptyTree);
        }

        let leaf_digests = Self::hash_records(&records, &schema)?;

        let mut index_lookup = HashMap::with_capacity(records.len());
        for (record_index, &digest) in leaf_digests.iter().enumerate() {
            match index_lookup.entry(digest) {
                Entry::Vacant(entry) => {
                    entry.insert(record_index);
                }
                Entry::Occupied(entry) if options.reject_duplicate_leaves => {
                    return Err(MerkleTreeError::DuplicateLeaf {
                        first: *entry.get(),
                        second: record_index,
                    });
                }
                Entry::Occupied(_) => (),
            }
        }

        // (leaf digest, record index), in leaf order
        let mut leaves = leaf_digests.into_iter().enumerate().map(|(i, d)| (d, i)).collect_vec();
        if options.sort_leaves {
            // stable, so duplicates stay in record order
            leaves.sort_by_key(|&(digest, _)| digest);
        }

        let leaf_digests = leaves.iter().map(|&(digest, _)| digest).collect_vec();
        let tree = MerkleTree::par_new(&leaf_digests)?;

        let mut node_indices = vec![MerkleTree::ROOT_INDEX; records.len()];
        for (leaf_index, &(_, record_index)) in leaves.iter().enumerate() {
            node_indices[record_index] = tree.leaf_node_index(leaf_index)?;
        }

        debug!(
            num_records = records.len(),
            %schema,
            sort_leaves = options.sort_leaves,
            root = %tree.root(),
            "built standard Merkle tree",
        );

        Ok(Self {
            schema,
            options,
            records,
            node_indices,
            index_lookup,
            tree,
        })
    }

    fn hash_records(records: &[Record], schema: &LeafSchema) -> Result<Vec<Digest>, MerkleTreeError> {
        let hash_record = |(index, record): (usize, &Record)| {
            schema
                .leaf_hash(record)
                .map_err(|source| MerkleTreeError::InvalidRecord { index, source })
        };

        if records.len() >= merkle_tree_parallelization_cutoff() {
            records.par_iter().enumerate().map(hash_record).collect()
        } else {
            records.iter().enumerate().map(hash_record).collect()
        }
    }

    pub fn root(&self) -> Digest {
        self.tree.root()
    }

    pub fn schema(&self) -> &LeafSchema {
        &self.schema
    }

    pub fn options(&self) -> TreeOptions {
        self.options
    }

    /// The underlying tree of leaf digests.
    pub fn tree(&self) -> &MerkleTree {
        &self.tree
    }

    /// The number of records. Never zero.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    /// All records with their index, in their original order.
    pub fn entries(&self) -> impl Iterator<Item = (usize, &Record)> {
        self.records.iter().enumerate()
    }

    /// The leaf digest `record` would have in this tree, whether or not it is
    /// part of it.
    pub fn leaf_hash(&self, record: &[Value]) -> Result<Digest, EncodingError> {
        self.schema.leaf_hash(record)
    }

    /// The index of the first record equal to `record`.
    pub fn leaf_lookup(&self, record: &[Value]) -> Result<usize, MerkleTreeError> {
        let digest = self.leaf_hash(record)?;
        self.index_lookup
            .get(&digest)
            .copied()
            .ok_or(MerkleTreeError::LeafNotFound)
    }

    fn node_index(&self, index: usize) -> Result<MerkleTreeIndex, MerkleTreeError> {
        self.node_indices
            .get(index)
            .copied()
            .ok_or(MerkleTreeError::IndexOutOfBounds {
                index,
                num_leaves: self.len(),
            })
    }

    /// The membership proof for the record at `index`.
    pub fn prove_index(&self, index: usize) -> Result<MembershipProof, MerkleTreeError> {
        let node_index = self.node_index(index)?;
        let authentication_path = self.tree.authentication_path(node_index)?;
        trace!(index, node_index, "proved record");

        Ok(MembershipProof {
            index,
            authentication_path,
        })
    }

    /// The membership proof for the first record equal to `record`.
    pub fn prove_record(&self, record: &[Value]) -> Result<MembershipProof, MerkleTreeError> {
        self.prove_index(self.leaf_lookup(record)?)
    }

    /// The membership proofs of all records, keyed by record index.
    pub fn proofs(&self) -> BTreeMap<usize, MembershipProof> {
        let prove = |index| {
            let authentication_path = self.tree.siblings_up_to_root(self.node_indices[index]);
            let proof = MembershipProof {
                index,
                authentication_path,
            };
            (index, proof)
        };

        if self.len() >= merkle_tree_parallelization_cutoff() {
            (0..self.len()).into_par_iter().map(prove).collect()
        } else {
            (0..self.len()).map(prove).collect()
        }
    }

    /// The root and all authentication paths, ready to be handed out.
    pub fn root_and_proofs(&self) -> RootAndProofs {
        let proofs = self
            .proofs()
            .into_iter()
            .map(|(index, proof)| (index, proof.authentication_path))
            .collect();

        RootAndProofs {
            root: self.root(),
            proofs,
        }
    }

    /// A proof for the records at the given indices at once.
    ///
    /// The proof's leaves are the records themselves, in proof order, which is
    /// generally not the order of `indices`.
    pub fn multi_proof(&self, indices: &[usize]) -> Result<MultiProof<Record>, MerkleTreeError> {
        let mut record_index_of_node = HashMap::with_capacity(indices.len());
        let mut node_indices = Vec::with_capacity(indices.len());
        for &index in indices {
            let node_index = self.node_index(index)?;
            if record_index_of_node.insert(node_index, index).is_some() {
                return Err(MerkleTreeError::DuplicateIndex(index));
            }
            node_indices.push(node_index);
        }

        let multi_proof = self.tree.multi_proof(&node_indices)?;

        // leaves come back in node order; map each back to its record
        let mut node_order = node_indices;
        node_order.sort_unstable_by(|a, b| b.cmp(a));
        let mut records = node_order
            .into_iter()
            .map(|node_index| self.records[record_index_of_node[&node_index]].clone());

        multi_proof.try_map_leaves(|_| records.next().ok_or(MerkleTreeError::LeafNotFound))
    }

    /// Verify a membership proof against this tree's root.
    pub fn verify_record(
        &self,
        record: &[Value],
        authentication_path: &[Digest],
    ) -> Result<bool, EncodingError> {
        verify(record, &self.schema, authentication_path, self.root())
    }

    /// Verify a membership proof for the record at `index` against this tree's
    /// root.
    pub fn verify_index(
        &self,
        index: usize,
        authentication_path: &[Digest],
    ) -> Result<bool, MerkleTreeError> {
        let record = self.record(index).ok_or(MerkleTreeError::IndexOutOfBounds {
            index,
            num_leaves: self.len(),
        })?;
        Ok(self.verify_record(record, authentication_path)?)
    }

    pub fn verify_multi_proof(&self, multi_proof: &MultiProof<Record>) -> Result<bool, EncodingError> {
        verify_multi_proof(&self.schema, multi_proof, self.root())
    }

    /// Recompute every leaf from its record and every internal node from its
    /// children.
    pub fn validate(&self) -> Result<(), MerkleTreeError> {
        for (record, &node_index) in self.records.iter().zip(&self.node_indices) {
            if self.tree.node(node_index) != Some(self.schema.leaf_hash(record)?) {
                return Err(MerkleTreeError::InvalidNode(node_index));
            }
        }

        match self.tree.first_invalid_node() {
            Some(node_index) => Err(MerkleTreeError::InvalidNode(node_index)),
            None => Ok(()),
        }
    }
}

/// Check that `record` is committed to by `root`.
///
/// The record is hashed into a leaf, which is combined with each element of the
/// authentication path in turn. The result must equal `root` byte for byte.
///
/// A proof that does not check out is not an error: the result is `Ok(false)`.
/// Errors signal a record that does not fit the schema.
pub fn verify(
    record: &[Value],
    schema: &LeafSchema,
    authentication_path: &[Digest],
    root: Digest,
) -> Result<bool, EncodingError> {
    let leaf = schema.leaf_hash(record)?;
    Ok(MerkleTree::verify_authentication_path(
        root,
        leaf,
        authentication_path,
    ))
}

/// Check that all records of the multi-proof are committed to by `root`.
/// Malformed proofs are not errors, but do not verify.
pub fn verify_multi_proof(
    schema: &LeafSchema,
    multi_proof: &MultiProof<Record>,
    root: Digest,
) -> Result<bool, EncodingError> {
    let multi_proof = multi_proof
        .clone()
        .try_map_leaves(|record| schema.leaf_hash(&record))?;
    Ok(multi_proof.verify(root))
}
