//! The finality proof package itself: a finalizer policy, a QC block's
//! finality data and signature(s), and a merkle inclusion proof binding a
//! target block (and optionally a target action) into that QC block's
//! finality tree (spec §3 "Finality proof package").

use bytes::{Buf, BufMut, Bytes, BytesMut};
use savanna_types::{BlockNum, Digest, FinalizerPolicy, QcSig};

use crate::error::ProofError;
use crate::wire::{
    get_digest, get_finality_data, get_merkle_inclusion, get_policy, get_qc_sig, put_digest, put_finality_data,
    put_merkle_inclusion, put_policy, put_qc_sig, MerkleInclusion, QcBlockFinalityData,
};

/// An inner merkle inclusion proof binding a target action's digest into
/// the target block's `action_mroot` (spec §4.8 step 4, optional).
#[derive(Clone, Debug, PartialEq)]
pub struct ActionInclusionProof {
    pub target_action_digest: Digest,
    pub target_action_mroot: Digest,
    pub inclusion: MerkleInclusion,
}

/// A complete, self-contained finality proof (spec §3, §4.8, §6).
#[derive(Clone, Debug, PartialEq)]
pub struct FinalityProof {
    /// Finalizer policy active at the QC block.
    pub policy: FinalizerPolicy,
    /// Pending policy at the QC block, present iff the QC carries a second
    /// signature tuple over the pending policy too.
    pub pending_policy: Option<FinalizerPolicy>,
    pub finality_data: QcBlockFinalityData,
    pub active_qc_sig: QcSig,
    pub pending_qc_sig: Option<QcSig>,
    pub target_block_num: BlockNum,
    /// The target block's own `finality_digest` and `action_mroot` — the
    /// two inputs (besides `target_block_num`) to `finality_leaf =
    /// H(block_num, finality_digest, action_mroot)` (spec §3). The verifier
    /// recomputes the leaf from these rather than trusting one on the wire.
    pub target_finality_digest: Digest,
    pub target_action_mroot: Digest,
    pub finality_inclusion: MerkleInclusion,
    pub action_proof: Option<ActionInclusionProof>,
}

impl FinalityProof {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        put_policy(&mut buf, &self.policy);
        match &self.pending_policy {
            Some(p) => {
                buf.put_u8(1);
                put_policy(&mut buf, p);
            }
            None => buf.put_u8(0),
        }
        put_finality_data(&mut buf, &self.finality_data);
        put_qc_sig(&mut buf, &self.active_qc_sig);
        match &self.pending_qc_sig {
            Some(sig) => {
                buf.put_u8(1);
                put_qc_sig(&mut buf, sig);
            }
            None => buf.put_u8(0),
        }
        buf.put_u32_le(self.target_block_num);
        put_digest(&mut buf, &self.target_finality_digest);
        put_digest(&mut buf, &self.target_action_mroot);
        put_merkle_inclusion(&mut buf, &self.finality_inclusion);
        match &self.action_proof {
            Some(ap) => {
                buf.put_u8(1);
                put_digest(&mut buf, &ap.target_action_digest);
                put_digest(&mut buf, &ap.target_action_mroot);
                put_merkle_inclusion(&mut buf, &ap.inclusion);
            }
            None => buf.put_u8(0),
        }
        buf.to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProofError> {
        let mut buf = Bytes::copy_from_slice(bytes);

        let policy = get_policy(&mut buf)?;
        if !buf.has_remaining() {
            return Err(ProofError::WireCorrupt("truncated pending policy presence flag".into()));
        }
        let pending_policy = if buf.get_u8() == 1 { Some(get_policy(&mut buf)?) } else { None };

        let finality_data = get_finality_data(&mut buf)?;
        let active_qc_sig = get_qc_sig(&mut buf)?;
        if !buf.has_remaining() {
            return Err(ProofError::WireCorrupt("truncated pending qc_sig presence flag".into()));
        }
        let pending_qc_sig = if buf.get_u8() == 1 { Some(get_qc_sig(&mut buf)?) } else { None };

        if buf.remaining() < 4 {
            return Err(ProofError::WireCorrupt("truncated target_block_num".into()));
        }
        let target_block_num = buf.get_u32_le();
        let target_finality_digest = get_digest(&mut buf)?;
        let target_action_mroot = get_digest(&mut buf)?;
        let finality_inclusion = get_merkle_inclusion(&mut buf)?;

        if !buf.has_remaining() {
            return Err(ProofError::WireCorrupt("truncated action proof presence flag".into()));
        }
        let action_proof = if buf.get_u8() == 1 {
            let target_action_digest = get_digest(&mut buf)?;
            let target_action_mroot = get_digest(&mut buf)?;
            let inclusion = get_merkle_inclusion(&mut buf)?;
            Some(ActionInclusionProof { target_action_digest, target_action_mroot, inclusion })
        } else {
            None
        };

        Ok(Self {
            policy,
            pending_policy,
            finality_data,
            active_qc_sig,
            pending_qc_sig,
            target_block_num,
            target_finality_digest,
            target_action_mroot,
            finality_inclusion,
            action_proof,
        })
    }
}
