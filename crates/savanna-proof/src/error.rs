use thiserror::Error;

use savanna_types::FinalityError;

/// Errors raised while building, decoding or verifying a finality proof.
/// Structural/verification failures reuse the canonical [`FinalityError`]
/// variants (`invalid_qc`, `invalid_qc_signature`, `invalid_merkle_proof`,
/// `policy_mismatch`) spec §7 already defines; this adds only the one kind
/// that's specific to this crate's own wire format.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProofError {
    #[error("malformed finality proof bytes: {0}")]
    WireCorrupt(String),

    #[error(transparent)]
    Finality(#[from] FinalityError),
}
