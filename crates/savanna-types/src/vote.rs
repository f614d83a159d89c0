use crate::block_id::BlockId;
use crate::signature::{BLSPublicKey, BLSSignature};

/// A single finalizer's vote on a block (spec §3). `strong` selects which
/// digest the signature is over: `strong_digest` if true, else
/// `weak_digest`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vote {
    pub block_id: BlockId,
    pub strong: bool,
    pub finalizer_public_key: BLSPublicKey,
    pub signature: BLSSignature,
}

impl Vote {
    pub fn new(block_id: BlockId, strong: bool, finalizer_public_key: BLSPublicKey, signature: BLSSignature) -> Self {
        Self { block_id, strong, finalizer_public_key, signature }
    }
}
