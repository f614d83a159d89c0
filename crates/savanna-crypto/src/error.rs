use thiserror::Error;

/// Errors raised by the digest, Merkle and BLS primitives.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid BLS public key")]
    InvalidPublicKey,

    #[error("invalid BLS signature")]
    InvalidSignature,

    #[error("BLS signature verification failed")]
    VerificationFailed,

    #[error("cannot aggregate an empty signature list")]
    EmptyAggregation,

    #[error("Merkle proof length mismatch: expected {expected}, got {actual}")]
    ProofLengthMismatch { expected: usize, actual: usize },

    #[error("Merkle proof index {index} out of range for {leaf_count} leaves")]
    IndexOutOfRange { index: usize, leaf_count: usize },
}
