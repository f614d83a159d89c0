use savanna_types::{hash_pair, Digest};

use crate::error::CryptoError;

/// Number of levels a proof over `n` leaves must climb: `ceil(log2(n))`.
///
/// `n == 0` and `n == 1` both have depth 0 — there is nothing to prove
/// past the leaf itself.
pub fn calculate_max_depth(leaf_count: usize) -> usize {
    if leaf_count <= 1 {
        return 0;
    }
    let mut depth = 0usize;
    let mut remaining = leaf_count;
    while remaining > 1 {
        remaining = (remaining + 1) / 2;
        depth += 1;
    }
    depth
}

/// Combine one level of the tree into the next. An odd trailing leaf has no
/// sibling and is promoted to the parent level unchanged rather than
/// hashed with itself.
fn next_level(level: &[Digest]) -> Vec<Digest> {
    let mut out = Vec::with_capacity(level.len().div_ceil(2));
    let mut i = 0;
    while i < level.len() {
        if i + 1 < level.len() {
            out.push(hash_pair(&level[i], &level[i + 1]));
            i += 2;
        } else {
            out.push(level[i]);
            i += 1;
        }
    }
    out
}

/// Incremental binary Merkle tree over SHA-256 digests.
pub struct MerkleTree {
    leaves: Vec<Digest>,
    levels: Vec<Vec<Digest>>,
}

impl MerkleTree {
    pub fn from_leaves(leaves: &[Digest]) -> Self {
        if leaves.is_empty() {
            return Self { leaves: vec![], levels: vec![] };
        }

        let mut levels = vec![leaves.to_vec()];
        while levels.last().unwrap().len() > 1 {
            let next = next_level(levels.last().unwrap());
            levels.push(next);
        }

        Self { leaves: leaves.to_vec(), levels }
    }

    pub fn root(&self) -> Digest {
        self.levels.last().and_then(|l| l.first()).copied().unwrap_or(Digest::ZERO)
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Generate an inclusion proof for the leaf at `index`.
    pub fn proof(&self, index: usize) -> Result<MerkleProof, CryptoError> {
        if index >= self.leaves.len() {
            return Err(CryptoError::IndexOutOfRange { index, leaf_count: self.leaves.len() });
        }

        let leaf = self.leaves[index];
        let mut siblings = Vec::new();
        let mut current_index = index;

        for level in &self.levels[..self.levels.len().saturating_sub(1)] {
            let remaining = level.len();
            if current_index % 2 == 0 {
                if current_index + 1 < remaining {
                    siblings.push(level[current_index + 1]);
                }
                // else: promoted, no sibling at this level
            } else {
                siblings.push(level[current_index - 1]);
            }
            current_index /= 2;
        }

        Ok(MerkleProof { leaf, index, leaf_count: self.leaves.len(), siblings })
    }
}

/// Inclusion proof for a leaf at `index` among `leaf_count` leaves.
///
/// `siblings` omits an entry for every level where `index` was the lone,
/// promoted node — the verifier replays the same `(index, remaining)`
/// recurrence to know where those gaps fall.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleProof {
    pub leaf: Digest,
    pub index: usize,
    pub leaf_count: usize,
    pub siblings: Vec<Digest>,
}

impl MerkleProof {
    pub fn verify(&self, root: &Digest) -> Result<bool, CryptoError> {
        Ok(self.compute_root()? == *root)
    }

    /// Recompute the root, consuming siblings only at levels where `index`
    /// has a real pair, and rejecting a proof whose sibling count doesn't
    /// match what `(index, leaf_count)` demands at every level.
    pub fn compute_root(&self) -> Result<Digest, CryptoError> {
        let mut current = self.leaf;
        let mut index = self.index;
        let mut remaining = self.leaf_count;
        let mut siblings = self.siblings.iter();
        let mut consumed = 0usize;

        while remaining > 1 {
            if index % 2 == 0 && index + 1 >= remaining {
                // promoted unchanged, no sibling to consume
            } else {
                let sibling = siblings.next().ok_or(CryptoError::ProofLengthMismatch {
                    expected: consumed + 1,
                    actual: consumed,
                })?;
                consumed += 1;
                current = if index % 2 == 0 { hash_pair(&current, sibling) } else { hash_pair(sibling, &current) };
            }
            index /= 2;
            remaining = (remaining + 1) / 2;
        }

        if siblings.next().is_some() {
            return Err(CryptoError::ProofLengthMismatch { expected: consumed, actual: self.siblings.len() });
        }

        let expected_depth = calculate_max_depth(self.leaf_count);
        let _ = expected_depth; // depth is implied by the loop above; kept for documentation parity with the spec

        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: usize) -> Vec<Digest> {
        (0..n).map(|i| Digest::compute(format!("leaf{i}").as_bytes())).collect()
    }

    #[test]
    fn empty_tree_root_is_zero() {
        let tree = MerkleTree::from_leaves(&[]);
        assert_eq!(tree.root(), Digest::ZERO);
        assert!(tree.is_empty());
    }

    #[test]
    fn single_leaf_is_its_own_root() {
        let l = leaves(1);
        let tree = MerkleTree::from_leaves(&l);
        assert_eq!(tree.root(), l[0]);
        assert_eq!(calculate_max_depth(1), 0);
    }

    #[test]
    fn proof_roundtrip_for_power_of_two() {
        let l = leaves(8);
        let tree = MerkleTree::from_leaves(&l);
        for i in 0..8 {
            let proof = tree.proof(i).unwrap();
            assert!(proof.verify(&tree.root()).unwrap());
            assert_eq!(proof.siblings.len(), calculate_max_depth(8));
        }
    }

    #[test]
    fn proof_roundtrip_for_odd_leaf_counts() {
        for n in 1..20 {
            let l = leaves(n);
            let tree = MerkleTree::from_leaves(&l);
            for i in 0..n {
                let proof = tree.proof(i).unwrap();
                assert!(proof.verify(&tree.root()).unwrap(), "n={n} i={i}");
            }
        }
    }

    #[test]
    fn tampered_leaf_fails_verification() {
        let l = leaves(5);
        let tree = MerkleTree::from_leaves(&l);
        let mut proof = tree.proof(2).unwrap();
        proof.leaf = Digest::compute(b"tampered");
        assert!(!proof.verify(&tree.root()).unwrap());
    }

    #[test]
    fn mismatched_sibling_count_is_rejected() {
        let l = leaves(5);
        let tree = MerkleTree::from_leaves(&l);
        let mut proof = tree.proof(0).unwrap();
        proof.siblings.push(Digest::compute(b"extra"));
        assert!(proof.compute_root().is_err());
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let l = leaves(4);
        let tree = MerkleTree::from_leaves(&l);
        assert!(tree.proof(4).is_err());
    }

    #[test]
    fn max_depth_matches_ceil_log2() {
        assert_eq!(calculate_max_depth(0), 0);
        assert_eq!(calculate_max_depth(1), 0);
        assert_eq!(calculate_max_depth(2), 1);
        assert_eq!(calculate_max_depth(3), 2);
        assert_eq!(calculate_max_depth(4), 2);
        assert_eq!(calculate_max_depth(5), 3);
        assert_eq!(calculate_max_depth(8), 3);
        assert_eq!(calculate_max_depth(9), 4);
    }
}
