//! Builds a [`FinalityProof`] out of a QC-complete block-state and one of
//! its ancestors (spec §4.8, §6). Grounded on `savanna-forkdb::block_state`
//! for the block-state fields and `savanna-forkdb::fork_db` for ancestry
//! confirmation — this crate performs no fork-tree bookkeeping of its own.

use savanna_crypto::MerkleTree;
use savanna_forkdb::{BlockState, ForkDb};
use savanna_types::{Digest, FinalityError};

use crate::error::ProofError;
use crate::package::{ActionInclusionProof, FinalityProof};
use crate::wire::{MerkleInclusion, QcBlockFinalityData};

/// Material for an optional action inclusion proof: the full list of action
/// digests executed in the target block (in order) and the index of the
/// one being proven. `savanna-forkdb` only retains the block's
/// `action_mroot`, not the underlying action list, so the caller supplies
/// it — typically the execution layer that produced the block.
pub struct ActionProofInput<'a> {
    pub action_digests: &'a [Digest],
    pub target_index: usize,
}

/// Build a proof that `target` (an ancestor of `qc_block`, inclusive) is
/// final, witnessed by `qc_block`'s completed quorum certificate.
pub fn build_proof(
    fork_db: &ForkDb,
    qc_block: &BlockState,
    target: &BlockState,
    action: Option<ActionProofInput>,
) -> Result<FinalityProof, ProofError> {
    let qc = qc_block
        .qc()
        .ok_or_else(|| ProofError::Finality(FinalityError::InvalidQc("QC block has no completed quorum certificate".into())))?;

    if target.id != qc_block.id && !fork_db.is_descendant_of(target.id, qc_block.id) {
        return Err(ProofError::Finality(FinalityError::InvalidQc(
            "target block is not an ancestor of the QC block".into(),
        )));
    }

    let policy = (*qc_block.active_policy).clone();
    let pending_policy = qc_block.pending_policy.as_ref().map(|p| (**p).clone());

    let finality_data = QcBlockFinalityData {
        active_gen: policy.generation,
        pending_gen: pending_policy.as_ref().map(|p| p.generation),
        final_on_strong_qc_block_num: qc_block.final_on_strong_qc_block_num(),
        finality_mroot: qc_block.finality_mroot,
        witness_hash: qc_block.witness_hash,
        strong_digest: qc_block.strong_digest,
    };

    let tree = MerkleTree::from_leaves(qc_block.finality_leaves());
    let proof = tree
        .proof(target.block_num as usize)
        .map_err(|_| ProofError::Finality(FinalityError::InvalidMerkleProof))?;
    let finality_inclusion = MerkleInclusion::from_merkle_proof(&proof);

    let action_proof = match action {
        Some(input) => {
            let action_tree = MerkleTree::from_leaves(input.action_digests);
            if action_tree.root() != target.action_mroot {
                return Err(ProofError::Finality(FinalityError::InvalidMerkleProof));
            }
            let action_merkle_proof = action_tree
                .proof(input.target_index)
                .map_err(|_| ProofError::Finality(FinalityError::InvalidMerkleProof))?;
            Some(ActionInclusionProof {
                target_action_digest: action_merkle_proof.leaf,
                target_action_mroot: target.action_mroot,
                inclusion: MerkleInclusion::from_merkle_proof(&action_merkle_proof),
            })
        }
        None => None,
    };

    Ok(FinalityProof {
        policy,
        pending_policy,
        finality_data,
        active_qc_sig: qc.active_qc_sig,
        pending_qc_sig: qc.pending_qc_sig,
        target_block_num: target.block_num,
        target_finality_digest: target.finality_digest,
        target_action_mroot: target.action_mroot,
        finality_inclusion,
        action_proof,
    })
}
