//! Finality proof verifier (spec §4.8). Implements the four-step contract
//! exactly: policy/tuple-count check, per-QC-tuple bitset/weight/signature
//! check, finality-leaf merkle inclusion, optional action inclusion.

use savanna_crypto::{verify as bls_verify, verify_aggregate, vote_signing_message};
use savanna_types::{BLSPublicKey, Bitset, FinalityError, FinalizerPolicy, QcSig};

use crate::error::ProofError;
use crate::package::FinalityProof;

/// Verify a [`FinalityProof`] end to end. Returns `Ok(())` iff every step
/// of spec §4.8 passes; otherwise one of `invalid_qc`, `invalid_qc_signature`,
/// `invalid_merkle_proof`, `policy_mismatch` (spec §7).
pub fn verify_proof(proof: &FinalityProof) -> Result<(), ProofError> {
    verify_policy_consistency(proof)?;
    verify_qc_tuple(&proof.policy, &proof.active_qc_sig, &proof.finality_data.strong_digest)?;
    if let Some(pending_policy) = &proof.pending_policy {
        let pending_sig = proof
            .pending_qc_sig
            .as_ref()
            .ok_or_else(|| ProofError::Finality(FinalityError::PolicyMismatch))?;
        verify_qc_tuple(pending_policy, pending_sig, &proof.finality_data.strong_digest)?;
        verify_dual_finalizer_bitset_modes(&proof.active_qc_sig, pending_sig)?;
    } else if proof.pending_qc_sig.is_some() {
        return Err(ProofError::Finality(FinalityError::PolicyMismatch));
    }

    verify_finality_inclusion(proof)?;
    verify_action_inclusion(proof)?;
    Ok(())
}

/// Step 1: the declared policy's generation must match the QC block's own
/// `active_gen`, and a pending policy must be present iff `pending_gen` is.
fn verify_policy_consistency(proof: &FinalityProof) -> Result<(), ProofError> {
    if proof.policy.generation != proof.finality_data.active_gen {
        return Err(ProofError::Finality(FinalityError::PolicyMismatch));
    }
    match (&proof.pending_policy, proof.finality_data.pending_gen) {
        (Some(p), Some(gen)) if p.generation == gen => Ok(()),
        (None, None) => Ok(()),
        _ => Err(ProofError::Finality(FinalityError::PolicyMismatch)),
    }
}

/// Step 2, for one policy/signature tuple.
fn verify_qc_tuple(policy: &FinalizerPolicy, sig: &QcSig, strong_digest: &savanna_types::Digest) -> Result<(), ProofError> {
    let n = policy.finalizers.len();
    if let Some(b) = &sig.strong_votes {
        if b.len() != n {
            return Err(ProofError::Finality(FinalityError::InvalidQc("strong_votes bitset length mismatch".into())));
        }
    }
    if let Some(b) = &sig.weak_votes {
        if b.len() != n {
            return Err(ProofError::Finality(FinalityError::InvalidQc("weak_votes bitset length mismatch".into())));
        }
    }
    if sig.strong_votes.is_none() && sig.weak_votes.is_none() {
        return Err(ProofError::Finality(FinalityError::InvalidQc("QC tuple carries no votes".into())));
    }

    let strong_weight = weight_of(policy, sig.strong_votes.as_ref());
    let weak_weight = weight_of(policy, sig.weak_votes.as_ref());
    if strong_weight + weak_weight < policy.threshold {
        return Err(ProofError::Finality(FinalityError::InvalidQc("combined weight below threshold".into())));
    }

    let strong_pubkeys = keys_of(policy, sig.strong_votes.as_ref());
    let weak_pubkeys = keys_of(policy, sig.weak_votes.as_ref());

    let strong_msg = vote_signing_message(strong_digest, true);
    let weak_msg = vote_signing_message(strong_digest, false);

    let result = match (strong_pubkeys, weak_pubkeys) {
        (Some(s), Some(w)) => {
            let agg_s = savanna_crypto::aggregate_pubkeys(&s).map_err(map_invalid_sig)?;
            let agg_w = savanna_crypto::aggregate_pubkeys(&w).map_err(map_invalid_sig)?;
            verify_aggregate(&[(&agg_s, strong_msg.as_bytes()), (&agg_w, weak_msg.as_bytes())], &sig.aggregate_signature)
        }
        (Some(s), None) => {
            let agg_s = savanna_crypto::aggregate_pubkeys(&s).map_err(map_invalid_sig)?;
            bls_verify(&agg_s, &sig.aggregate_signature, strong_msg.as_bytes())
        }
        (None, Some(w)) => {
            let agg_w = savanna_crypto::aggregate_pubkeys(&w).map_err(map_invalid_sig)?;
            bls_verify(&agg_w, &sig.aggregate_signature, weak_msg.as_bytes())
        }
        (None, None) => return Err(ProofError::Finality(FinalityError::InvalidQc("QC tuple carries no set bits".into()))),
    };

    result.map_err(|_| ProofError::Finality(FinalityError::InvalidQcSignature))
}

fn map_invalid_sig(_: savanna_crypto::CryptoError) -> ProofError {
    ProofError::Finality(FinalityError::InvalidQcSignature)
}

fn weight_of(policy: &FinalizerPolicy, bitset: Option<&Bitset>) -> u64 {
    match bitset {
        Some(b) => b.iter_ones().map(|i| policy.finalizers[i].weight).sum(),
        None => 0,
    }
}

fn keys_of(policy: &FinalizerPolicy, bitset: Option<&Bitset>) -> Option<Vec<BLSPublicKey>> {
    let b = bitset?;
    let keys: Vec<_> = b.iter_ones().map(|i| policy.finalizers[i].public_key.clone()).collect();
    if keys.is_empty() {
        None
    } else {
        Some(keys)
    }
}

/// Step 2's dual-finalizer rule: a finalizer slot voting in both the active
/// and pending tuples must vote the same mode in both (spec §4.8). Slot
/// identity is positional, matching the policy lineage's slot-based diffs
/// (spec §4.3) — position `i` in the active policy and position `i` in the
/// pending policy are the same finalizer across a generation change.
fn verify_dual_finalizer_bitset_modes(active: &QcSig, pending: &QcSig) -> Result<(), ProofError> {
    let n = [&active.strong_votes, &active.weak_votes, &pending.strong_votes, &pending.weak_votes]
        .iter()
        .filter_map(|b| b.as_ref().map(|b| b.len()))
        .min()
        .unwrap_or(0);

    for i in 0..n {
        let active_strong = active.strong_votes.as_ref().is_some_and(|b| b.get(i));
        let active_weak = active.weak_votes.as_ref().is_some_and(|b| b.get(i));
        let pending_strong = pending.strong_votes.as_ref().is_some_and(|b| b.get(i));
        let pending_weak = pending.weak_votes.as_ref().is_some_and(|b| b.get(i));

        let active_voted = active_strong || active_weak;
        let pending_voted = pending_strong || pending_weak;
        if active_voted && pending_voted && active_strong != pending_strong {
            return Err(ProofError::Finality(FinalityError::ConflictingDualVote));
        }
    }
    Ok(())
}

/// Step 3: the target block's finality leaf must be included under the QC
/// block's `finality_mroot`.
fn verify_finality_inclusion(proof: &FinalityProof) -> Result<(), ProofError> {
    let leaf = savanna_types::Digest::compute_multi(&[
        &proof.target_block_num.to_le_bytes(),
        proof.target_finality_digest.as_bytes(),
        proof.target_action_mroot.as_bytes(),
    ]);
    let merkle_proof = proof.finality_inclusion.to_merkle_proof(leaf);
    let ok = merkle_proof.verify(&proof.finality_data.finality_mroot).map_err(|_| {
        ProofError::Finality(FinalityError::InvalidMerkleProof)
    })?;
    if ok {
        Ok(())
    } else {
        Err(ProofError::Finality(FinalityError::InvalidMerkleProof))
    }
}

/// Step 4: if present, the action inclusion proof must verify against the
/// target block's `action_mroot`.
fn verify_action_inclusion(proof: &FinalityProof) -> Result<(), ProofError> {
    let Some(action_proof) = &proof.action_proof else { return Ok(()) };
    if action_proof.target_action_mroot != proof.target_action_mroot {
        return Err(ProofError::Finality(FinalityError::PolicyMismatch));
    }
    let merkle_proof = action_proof.inclusion.to_merkle_proof(action_proof.target_action_digest);
    let ok = merkle_proof
        .verify(&action_proof.target_action_mroot)
        .map_err(|_| ProofError::Finality(FinalityError::InvalidMerkleProof))?;
    if ok {
        Ok(())
    } else {
        Err(ProofError::Finality(FinalityError::InvalidMerkleProof))
    }
}
