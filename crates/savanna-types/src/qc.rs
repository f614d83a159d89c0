use crate::bitset::Bitset;
use crate::block_id::{BlockId, BlockNum};
use crate::signature::BLSSignature;

/// One policy's worth of a quorum certificate (spec §3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QcSig {
    pub strong_votes: Option<Bitset>,
    pub weak_votes: Option<Bitset>,
    pub aggregate_signature: BLSSignature,
}

/// A complete quorum certificate for a block: one signature tuple for the
/// active policy, and optionally a second for the pending policy (spec §3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Qc {
    pub block_num: BlockNum,
    pub active_qc_sig: QcSig,
    pub pending_qc_sig: Option<QcSig>,
}

/// Which ancestor block a block's header claims a QC for, and whether that
/// claim is strong (spec §3: `qc_claim = {block_num, is_strong}`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QcClaim {
    pub block_num: BlockNum,
    pub is_strong: bool,
}

/// Carried by a block whose header references an ancestor's QC — gives the
/// fork database the ancestor's id without needing to walk the chain to
/// find it (spec §4.6 "add" note on advancing `pending_savanna_lib_id`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LatestQcClaim {
    pub claim: QcClaim,
    pub claimed_block_id: BlockId,
}
