//! Performance knobs. None of them changes a root or a proof.
//!
//! Options that change the shape of a tree, and therefore its root, are not
//! configured here but passed explicitly with every build; see
//! [`TreeOptions`](crate::util_types::standard_merkle_tree::TreeOptions).
//!
//! Environment variables take precedence over the options set in this module.

use std::cell::Cell;

thread_local! {
    static PARALLELIZATION_CUTOFF: Cell<ParallelizationCutoff> =
        Cell::new(ParallelizationCutoff::new(None));
}

/// The smallest workload, in records, nodes of one layer, or proofs, that is
/// spread across the [rayon] thread pool.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
struct ParallelizationCutoff(usize);

impl ParallelizationCutoff {
    const ENV_VAR: &'static str = "STANDARD_MERKLE_TREE_PARALLELIZATION_CUTOFF";
    const DEFAULT: usize = 512;
    const MINIMUM: usize = 2;

    /// The environment variable wins over `requested`, which wins over the
    /// default. The result is never below the minimum.
    fn new(requested: Option<usize>) -> Self {
        let from_env = std::env::var(Self::ENV_VAR).ok().and_then(|s| s.parse().ok());
        let cutoff = from_env
            .or(requested)
            .unwrap_or(Self::DEFAULT)
            .max(Self::MINIMUM);

        Self(cutoff)
    }
}

/// Sets the cutoff for parallelizing Merkle tree operations.
///
/// For example, if the cutoff is set to 512, then encoding fewer than 512
/// records, or computing a layer of fewer than 512 internal nodes, happens
/// sequentially. Wider workloads are spread across the [rayon] thread pool.
///
/// The setting is thread-local: it applies to trees built on the calling
/// thread.
///
/// Can also be set via the environment variable
/// `STANDARD_MERKLE_TREE_PARALLELIZATION_CUTOFF`. The environment variable
/// has higher precedence than this function.
///
/// The default is 512. The minimum is always 2.
pub fn set_merkle_tree_parallelization_cutoff(cutoff: usize) {
    PARALLELIZATION_CUTOFF.set(ParallelizationCutoff::new(Some(cutoff)));
}

/// The cutoff in effect on the calling thread.
pub fn merkle_tree_parallelization_cutoff() -> usize {
    PARALLELIZATION_CUTOFF.get().0
}
