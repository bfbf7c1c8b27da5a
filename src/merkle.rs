//! Merkle tree over the initial states of the threads open in a ledger
//! channel.
//!
//! Both parties rebuild the tree independently from an unordered list of open
//! threads, so it has to be independent of input order: leaves are
//! deduplicated and sorted, and pairs are hashed in sorted order. The tree is
//! built from scratch whenever a thread opens or closes.

use crate::{
    fingerprint::thread_fingerprint,
    packed::keccak,
    thread::ThreadState,
    types::{Hash, EMPTY_ROOT},
    Error, Result,
};

/// `keccak(min(a, b) ++ max(a, b))`, so the pair order never matters.
fn combine(a: &Hash, b: &Hash) -> Hash {
    if a <= b {
        keccak(&[&a.0, &b.0])
    } else {
        keccak(&[&b.0, &a.0])
    }
}

/// Deduplicated, sorted and padded to an even count. The padding leaf is
/// appended after sorting.
fn normalize(leaves: &[Hash]) -> Vec<Hash> {
    let mut leaves = leaves.to_vec();
    leaves.sort_unstable();
    leaves.dedup();
    if leaves.len() % 2 == 1 {
        leaves.push(EMPTY_ROOT);
    }
    leaves
}

#[derive(Debug, Clone)]
pub struct MerkleTree {
    // layers[0] are the leaves, the last layer holds only the root.
    layers: Vec<Vec<Hash>>,
}

impl MerkleTree {
    /// Builds the tree. A channel without threads does not have a tree, it
    /// uses [EMPTY_ROOT] directly, so an empty leaf set is an error.
    pub fn new(leaves: &[Hash]) -> Result<Self> {
        if leaves.is_empty() {
            return Err(Error::validation(
                "MerkleTree::new",
                "cannot build a tree without leaves",
            ));
        }

        let mut layers = vec![normalize(leaves)];
        while layers[layers.len() - 1].len() > 1 {
            let next = layers[layers.len() - 1]
                .chunks(2)
                .map(|pair| match pair {
                    [a, b] => combine(a, b),
                    // unpaired: carried up as is
                    [a] => *a,
                    _ => unreachable!("chunks(2) yields one or two elements"),
                })
                .collect();
            layers.push(next);
        }

        Ok(Self { layers })
    }

    pub fn root(&self) -> Hash {
        self.layers[self.layers.len() - 1][0]
    }

    pub fn leaves(&self) -> &[Hash] {
        &self.layers[0]
    }

    /// Sibling hashes from the leaf up to (excluding) the root.
    pub fn proof(&self, leaf: &Hash) -> Result<Vec<Hash>> {
        let mut idx = self.layers[0]
            .iter()
            .position(|l| l == leaf)
            .ok_or_else(|| {
                Error::not_found("MerkleTree::proof", format!("leaf {} is not in the tree", leaf))
            })?;

        let mut proof = Vec::with_capacity(self.layers.len() - 1);
        for layer in &self.layers[..self.layers.len() - 1] {
            if let Some(sibling) = layer.get(idx ^ 1) {
                proof.push(*sibling);
            }
            idx /= 2;
        }
        Ok(proof)
    }
}

/// Recomputes the root from `leaf` and `proof` and compares.
pub fn verify(root: &Hash, leaf: &Hash, proof: &[Hash]) -> bool {
    let computed = proof.iter().fold(*leaf, |acc, p| combine(&acc, p));
    computed == *root
}

/// Root committed to by a ledger channel with the given open threads.
pub fn thread_root(initial_states: &[ThreadState]) -> Result<Hash> {
    if initial_states.is_empty() {
        return Ok(EMPTY_ROOT);
    }
    let leaves = initial_states
        .iter()
        .map(thread_fingerprint)
        .collect::<Result<Vec<_>>>()?;
    Ok(MerkleTree::new(&leaves)?.root())
}

/// Inclusion proof of `target` among `initial_states`, as consumed by the
/// on-chain `initThreadState`.
pub fn thread_proof(initial_states: &[ThreadState], target: &ThreadState) -> Result<Vec<Hash>> {
    let leaves = initial_states
        .iter()
        .map(thread_fingerprint)
        .collect::<Result<Vec<_>>>()?;
    let tree = MerkleTree::new(&leaves)?;
    tree.proof(&thread_fingerprint(target)?)
}
