use std::collections::VecDeque;

use serde::Deserialize;
use serde::Serialize;

use crate::digest::Digest;
use crate::error::MerkleTreeError;
use crate::keccak::hash_pair;

/// A proof of membership for several leaves at once.
///
/// The leaves are listed deepest node first. Replaying the proof consumes two
/// items per flag: the next pending node, and either another pending node
/// (flag `true`) or the next element of `proof` (flag `false`). Their parent
/// becomes pending. The last remaining node is the root.
///
/// This is the format of OpenZeppelin's `MerkleProof.multiProofVerify`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MultiProof<L> {
    pub leaves: Vec<L>,
    pub proof: Vec<Digest>,
    pub proof_flags: Vec<bool>,
}

impl<L> MultiProof<L> {
    /// Replace every leaf, keeping the proof. A failing conversion aborts.
    pub fn try_map_leaves<M, E>(
        self,
        f: impl FnMut(L) -> Result<M, E>,
    ) -> Result<MultiProof<M>, E> {
        let leaves = self.leaves.into_iter().map(f).collect::<Result<_, _>>()?;
        Ok(MultiProof {
            leaves,
            proof: self.proof,
            proof_flags: self.proof_flags,
        })
    }
}

impl MultiProof<Digest> {
    /// The root implied by this proof.
    pub fn root(&self) -> Result<Digest, MerkleTreeError> {
        let num_proof_elements_needed = self.proof_flags.iter().filter(|&&flag| !flag).count();
        if self.proof.len() < num_proof_elements_needed {
            return Err(MerkleTreeError::InvalidMultiProof("too few proof elements"));
        }
        if self.leaves.len() + self.proof.len() != self.proof_flags.len() + 1 {
            return Err(MerkleTreeError::InvalidMultiProof(
                "number of leaves and proof elements does not match flags",
            ));
        }

        let mut pending = self.leaves.iter().copied().collect::<VecDeque<_>>();
        let mut proof = self.proof.iter().copied();
        for &take_pending in &self.proof_flags {
            let a = pending.pop_front();
            let b = if take_pending {
                pending.pop_front()
            } else {
                proof.next()
            };
            let (Some(a), Some(b)) = (a, b) else {
                return Err(MerkleTreeError::InvalidMultiProof("proof is exhausted early"));
            };
            pending.push_back(hash_pair(a, b));
        }

        let root = pending.pop_back().or_else(|| proof.next());
        if !pending.is_empty() || proof.next().is_some() {
            return Err(MerkleTreeError::InvalidMultiProof("unused proof elements"));
        }

        root.ok_or(MerkleTreeError::InvalidMultiProof("proof is empty"))
    }

    /// Whether this proof is valid for the given root. Malformed proofs are
    /// invalid.
    pub fn verify(&self, root: Digest) -> bool {
        self.root().is_ok_and(|computed_root| computed_root == root)
    }
}
