use std::collections::VecDeque;
use std::fmt;

use get_size2::GetSize;
use rayon::prelude::*;
use serde::Deserialize;
use serde::Serialize;
use tracing::trace;

use crate::config::merkle_tree_parallelization_cutoff;
use crate::digest::Digest;
use crate::error::MerkleTreeError;
use crate::keccak::hash_pair;
use crate::util_types::multi_proof::MultiProof;

/// Index of a node in the flat node array of a [`MerkleTree`].
pub type MerkleTreeIndex = usize;

/// A complete binary hash tree, stored as a flat array of `2n - 1` nodes.
///
/// ```markdown
///               ──── 0 ────
///              ╱           ╲
///            1               2
///          ╱   ╲           ╱   ╲
///        3       4       5       6
///       ╱ ╲
///      7   8
/// ```
///
/// The root is at index 0 and the children of node `i` are at `2i + 1` and
/// `2i + 2`. The `n` leaves occupy the last `n` slots in reverse order: leaf
/// 0 is the last node, leaf `n - 1` is node `n - 1`. The drawing above shows
/// five leaves, 0 through 4 living in nodes 8, 7, 6, 5 and 4.
///
/// If a layer has an odd number of nodes, its last node stays unpaired at that
/// depth and is combined one layer further up, as node 4 above. No node is ever
/// duplicated, and leaves that sit higher up have shorter authentication paths.
/// Since parents are [order-independent](hash_pair), verifiers need neither
/// the leaf's index nor the tree's shape; they only fold the path.
///
/// This layout is the one of OpenZeppelin's `@openzeppelin/merkle-tree`, so
/// roots and proofs agree with theirs for the same leaves.
///
/// Serializes as the flat node array. Deserialization checks that the array
/// describes a complete tree whose internal nodes match their children.
#[derive(Debug, Clone, PartialEq, Eq, Hash, GetSize, Serialize, Deserialize)]
#[serde(try_from = "Vec<Digest>", into = "Vec<Digest>")]
pub struct MerkleTree {
    nodes: Vec<Digest>,
}

impl MerkleTree {
    /// The index of the root node.
    pub const ROOT_INDEX: MerkleTreeIndex = 0;

    /// Build a Merkle tree with the given leafs, using a single thread.
    ///
    /// No hashing is applied to the leafs; they are expected to be digests
    /// already, for example as produced by [`LeafSchema::leaf_hash`][leaf].
    ///
    /// [leaf]: crate::abi::LeafSchema::leaf_hash
    pub fn sequential_new(leafs: &[Digest]) -> Result<Self, MerkleTreeError> {
        let mut nodes = Self::initialize_nodes(leafs)?;
        Self::compute_internal_nodes(&mut nodes, leafs.len(), usize::MAX);
        Ok(Self { nodes })
    }

    /// Build a Merkle tree with the given leafs, computing every layer that is
    /// at least as wide as the
    /// [parallelization cutoff](crate::config::set_merkle_tree_parallelization_cutoff)
    /// in parallel.
    ///
    /// The result is identical to [`Self::sequential_new`].
    pub fn par_new(leafs: &[Digest]) -> Result<Self, MerkleTreeError> {
        let mut nodes = Self::initialize_nodes(leafs)?;
        let cutoff = merkle_tree_parallelization_cutoff();
        Self::compute_internal_nodes(&mut nodes, leafs.len(), cutoff);
        Ok(Self { nodes })
    }

    fn initialize_nodes(leafs: &[Digest]) -> Result<Vec<Digest>, MerkleTreeError> {
        if leafs.is_empty() {
            return Err(MerkleTreeError::EmptyTree);
        }

        let num_internal_nodes = leafs.len() - 1;
        let mut nodes = vec![Digest::ALL_ZERO; num_internal_nodes];
        nodes.extend(leafs.iter().rev());
        Ok(nodes)
    }

    /// Fill in the internal nodes, one layer at a time, deepest layer first.
    /// All parents within one layer only depend on the layer below, so a layer
    /// can be computed in parallel.
    fn compute_internal_nodes(nodes: &mut [Digest], num_leafs: usize, cutoff: usize) {
        let num_internal_nodes = num_leafs - 1;
        if num_internal_nodes == 0 {
            return;
        }

        // first node of the deepest layer holding internal nodes
        let deepest_layer_width = 1 << num_internal_nodes.ilog2();
        let mut layer_start = deepest_layer_width - 1;
        loop {
            let layer_end = num_internal_nodes.min(2 * layer_start + 1);

            // all children of this layer live at or beyond `layer_end`
            let (parents, children) = nodes.split_at_mut(layer_end);
            let children: &[Digest] = children;
            let layer = &mut parents[layer_start..layer_end];
            let compute_node = |(offset, node): (usize, &mut Digest)| {
                let node_index = layer_start + offset;
                let left = children[left_child_index(node_index) - layer_end];
                let right = children[right_child_index(node_index) - layer_end];
                *node = hash_pair(left, right);
            };

            if layer.len() >= cutoff {
                layer.par_iter_mut().enumerate().for_each(compute_node);
            } else {
                layer.iter_mut().enumerate().for_each(compute_node);
            }

            if layer_start == Self::ROOT_INDEX {
                break;
            }
            layer_start = parent_index(layer_start);
        }
    }

    pub fn root(&self) -> Digest {
        self.nodes[Self::ROOT_INDEX]
    }

    pub fn num_leafs(&self) -> usize {
        self.nodes.len().div_ceil(2)
    }

    /// The height of the tree, _i.e._, the length of the longest
    /// authentication path.
    pub fn height(&self) -> u32 {
        self.nodes.len().ilog2()
    }

    /// All nodes of the tree, in the order described on [`MerkleTree`].
    pub fn nodes(&self) -> &[Digest] {
        &self.nodes
    }

    pub fn node(&self, index: MerkleTreeIndex) -> Option<Digest> {
        self.nodes.get(index).copied()
    }

    /// The leafs, in the order they were given when building the tree.
    pub fn leafs(&self) -> impl Iterator<Item = &Digest> {
        self.nodes[self.num_leafs() - 1..].iter().rev()
    }

    pub fn leaf(&self, leaf_index: usize) -> Option<Digest> {
        let node_index = self.leaf_node_index(leaf_index).ok()?;
        self.node(node_index)
    }

    /// The node index of the leaf at position `leaf_index` of the leafs.
    pub fn leaf_node_index(&self, leaf_index: usize) -> Result<MerkleTreeIndex, MerkleTreeError> {
        let num_leafs = self.num_leafs();
        if leaf_index >= num_leafs {
            return Err(MerkleTreeError::IndexOutOfBounds {
                index: leaf_index,
                num_leaves: num_leafs,
            });
        }

        Ok(self.nodes.len() - 1 - leaf_index)
    }

    pub fn is_leaf_node(&self, node_index: MerkleTreeIndex) -> bool {
        (self.num_leafs() - 1..self.nodes.len()).contains(&node_index)
    }

    fn check_leaf_node(&self, node_index: MerkleTreeIndex) -> Result<(), MerkleTreeError> {
        if self.is_leaf_node(node_index) {
            Ok(())
        } else {
            Err(MerkleTreeError::NotALeaf(node_index))
        }
    }

    /// The digests of the siblings of the nodes on the path from the given
    /// leaf node up to the root, excluding the root.
    ///
    /// ```markdown
    ///              root
    ///             /    \
    /// H(H(a)+H(b))      H(H(c)+H(d))
    ///   /      \        /      \
    /// H(a)    H(b)    H(c)    H(d)
    /// ```
    ///
    /// The authentication path for `c` would be `vec![ H(d), H(H(a)+H(b)) ]`,
    /// _i.e._, a criss-cross of siblings upwards.
    pub fn authentication_path(
        &self,
        node_index: MerkleTreeIndex,
    ) -> Result<Vec<Digest>, MerkleTreeError> {
        self.check_leaf_node(node_index)?;
        Ok(self.siblings_up_to_root(node_index))
    }

    /// The authentication path of any node, including internal ones.
    pub(crate) fn siblings_up_to_root(&self, node_index: MerkleTreeIndex) -> Vec<Digest> {
        let mut authentication_path = Vec::with_capacity(self.height() as usize);
        let mut current = node_index;
        while current > Self::ROOT_INDEX {
            authentication_path.push(self.nodes[sibling_index(current)]);
            current = parent_index(current);
        }

        trace!(node_index, len = authentication_path.len(), "authentication path");
        authentication_path
    }

    /// Like [`Self::authentication_path`], but addresses the leaf by its
    /// position among the leafs.
    pub fn leaf_authentication_path(&self, leaf_index: usize) -> Result<Vec<Digest>, MerkleTreeError> {
        self.authentication_path(self.leaf_node_index(leaf_index)?)
    }

    /// Fold the authentication path onto the leaf, producing the root it
    /// implies.
    pub fn root_from_authentication_path(leaf: Digest, authentication_path: &[Digest]) -> Digest {
        authentication_path
            .iter()
            .fold(leaf, |node, &sibling| hash_pair(node, sibling))
    }

    pub fn verify_authentication_path(
        root: Digest,
        leaf: Digest,
        authentication_path: &[Digest],
    ) -> bool {
        Self::root_from_authentication_path(leaf, authentication_path) == root
    }

    /// A proof for several leafs at once. Siblings that can be computed from
    /// other opened leafs are not part of the proof.
    ///
    /// The order of `node_indices` does not matter, but every node must be a
    /// leaf and may only be requested once.
    pub fn multi_proof(
        &self,
        node_indices: &[MerkleTreeIndex],
    ) -> Result<MultiProof<Digest>, MerkleTreeError> {
        for &node_index in node_indices {
            self.check_leaf_node(node_index)?;
        }

        let mut sorted_indices = node_indices.to_vec();
        sorted_indices.sort_unstable_by(|a, b| b.cmp(a));
        if let Some(pair) = sorted_indices.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(MerkleTreeError::DuplicateIndex(pair[0]));
        }

        let mut stack = VecDeque::from(sorted_indices.clone());
        let mut proof = vec![];
        let mut proof_flags = vec![];
        while let Some(&node_index) = stack.front() {
            if node_index == Self::ROOT_INDEX {
                break;
            }
            stack.pop_front();

            let sibling = sibling_index(node_index);
            if stack.front() == Some(&sibling) {
                proof_flags.push(true);
                stack.pop_front();
            } else {
                proof_flags.push(false);
                proof.push(self.nodes[sibling]);
            }
            stack.push_back(parent_index(node_index));
        }

        if node_indices.is_empty() {
            proof.push(self.root());
        }

        let leaves = sorted_indices.into_iter().map(|i| self.nodes[i]).collect();
        Ok(MultiProof {
            leaves,
            proof,
            proof_flags,
        })
    }

    /// Check that every internal node is the hash of its children.
    pub fn is_valid(&self) -> bool {
        self.first_invalid_node().is_none()
    }

    /// The deepest internal node that is not the hash of its children, if any.
    pub(crate) fn first_invalid_node(&self) -> Option<MerkleTreeIndex> {
        (0..self.num_leafs() - 1).rev().find(|&i| {
            let left = self.nodes[left_child_index(i)];
            let right = self.nodes[right_child_index(i)];
            self.nodes[i] != hash_pair(left, right)
        })
    }
}

impl TryFrom<Vec<Digest>> for MerkleTree {
    type Error = MerkleTreeError;

    fn try_from(nodes: Vec<Digest>) -> Result<Self, Self::Error> {
        // `2n - 1` nodes for `n > 0` leafs
        if nodes.len() % 2 == 0 {
            return Err(MerkleTreeError::InvalidNodeCount(nodes.len()));
        }

        let tree = Self { nodes };
        match tree.first_invalid_node() {
            Some(node_index) => Err(MerkleTreeError::InvalidNode(node_index)),
            None => Ok(tree),
        }
    }
}

impl From<MerkleTree> for Vec<Digest> {
    fn from(tree: MerkleTree) -> Self {
        tree.nodes
    }
}

const fn parent_index(node_index: MerkleTreeIndex) -> MerkleTreeIndex {
    (node_index - 1) / 2
}

const fn left_child_index(node_index: MerkleTreeIndex) -> MerkleTreeIndex {
    2 * node_index + 1
}

const fn right_child_index(node_index: MerkleTreeIndex) -> MerkleTreeIndex {
    2 * node_index + 2
}

const fn sibling_index(node_index: MerkleTreeIndex) -> MerkleTreeIndex {
    if node_index % 2 == 0 {
        node_index - 1
    } else {
        node_index + 1
    }
}

/// Draws the tree, one node per line:
///
/// ```text
/// 0) 0x…
/// ├─ 1) 0x…
/// │  ├─ 3) 0x…
/// │  └─ 4) 0x…
/// └─ 2) 0x…
/// ```
impl fmt::Display for MerkleTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // each node carries, per ancestor, whether more siblings follow it
        let mut stack = vec![(Self::ROOT_INDEX, vec![])];
        while let Some((node_index, path)) = stack.pop() {
            if let Some((&has_more_siblings, ancestors)) = path.split_last() {
                for &has_more in ancestors {
                    write!(f, "{}", if has_more { "│  " } else { "   " })?;
                }
                write!(f, "{}", if has_more_siblings { "├─ " } else { "└─ " })?;
            }
            writeln!(f, "{node_index}) {}", self.nodes[node_index])?;
            self.push_children(&mut stack, node_index, &path);
        }

        Ok(())
    }
}

impl MerkleTree {
    fn push_children(
        &self,
        stack: &mut Vec<(MerkleTreeIndex, Vec<bool>)>,
        node_index: MerkleTreeIndex,
        path: &[bool],
    ) {
        if right_child_index(node_index) >= self.nodes.len() {
            return;
        }
        let child_path = |has_more| [path, &[has_more]].concat();
        stack.push((right_child_index(node_index), child_path(false)));
        stack.push((left_child_index(node_index), child_path(true)));
    }
}
