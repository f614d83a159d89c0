use thiserror::Error;

/// Low-level parse/format errors for the fixed-width primitives in this
/// crate (digests, keys, signatures). Kept separate from [`FinalityError`]
/// because these can occur in contexts with no fork-db or policy in scope
/// (e.g. deserializing a value off the wire before any validation runs).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("invalid digest length: expected 32, got {0}")]
    InvalidDigestLength(usize),

    #[error("invalid block id length: expected 32, got {0}")]
    InvalidBlockIdLength(usize),

    #[error("invalid signature length: expected {expected}, got {actual}")]
    InvalidSignatureLength { expected: usize, actual: usize },

    #[error("invalid public key length: expected {expected}, got {actual}")]
    InvalidPublicKeyLength { expected: usize, actual: usize },

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("zero finalizer weight")]
    ZeroWeight,
}

impl From<hex::FromHexError> for TypesError {
    fn from(e: hex::FromHexError) -> Self {
        TypesError::InvalidHex(e.to_string())
    }
}

/// Vote ingestion is not an error channel: three of its outcomes are
/// ordinary network events (spec §7 — "those are normal network events").
/// `aggregate_vote` returns this status directly rather than a `Result`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteStatus {
    Success,
    Duplicate,
    UnknownPublicKey,
    InvalidSignature,
    ConflictingDualVote,
}

/// The single fatal-error taxonomy for the finality core (spec §7).
///
/// Every crate in the workspace converts its local error type into this one
/// at its public boundary, the way `merklith-consensus::error::ConsensusError`
/// and `merklith-storage::error::StorageError` both exist independently but
/// compose at the node layer — here the composition point is this enum
/// instead of a higher crate, because this *is* the top of the stack.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FinalityError {
    #[error("block is not linkable to any known block-state or the root")]
    UnlinkableBlock,

    #[error("duplicate block")]
    DuplicateBlock,

    #[error("root not set; call reset_root before any other operation")]
    RootNotSet,

    #[error("advance_root target is missing or not valid")]
    InvalidAdvanceRoot,

    #[error("block not found")]
    BlockNotFound,

    #[error("block rejected by feature-compatibility validator")]
    IncompatibleFeatures,

    #[error("invalid quorum certificate: {0}")]
    InvalidQc(String),

    #[error("quorum certificate signature verification failed")]
    InvalidQcSignature,

    #[error("merkle inclusion proof failed to verify")]
    InvalidMerkleProof,

    #[error("finalizer voted strong under one policy and weak under the other for the same block")]
    ConflictingDualVote,

    #[error("proof references a policy generation inconsistent with embedded data")]
    PolicyMismatch,

    #[error("block timestamp {timestamp} does not exceed parent timestamp {parent_timestamp}")]
    NonMonotonicTimestamp { timestamp: u64, parent_timestamp: u64 },

    #[error("fork database snapshot corrupt: {0}")]
    SnapshotCorrupt(String),

    #[error("type error: {0}")]
    Type(#[from] TypesError),
}
