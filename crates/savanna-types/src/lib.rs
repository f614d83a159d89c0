//! Core data types for the Savanna finality core: block identifiers,
//! digests, finalizer policies, votes and quorum-certificate shapes.
//!
//! This crate defines no behavior beyond construction, validation and
//! canonical encoding — aggregation, merkle proofs and BLS math live in
//! `savanna-crypto` and `savanna-consensus`.

pub mod bitset;
pub mod block_id;
pub mod digest;
pub mod domain;
pub mod error;
pub mod policy;
pub mod qc;
pub mod signature;
pub mod varint;
pub mod vote;

#[cfg(feature = "serde")]
mod serialization;

pub use bitset::Bitset;
pub use block_id::{BlockId, BlockNum, BlockTimestamp};
pub use digest::{hash_pair, hash_with_domain, Digest};
pub use error::{FinalityError, TypesError, VoteStatus};
pub use policy::{apply_diff, diff, FinalizerAuthority, FinalizerPolicy, FinalizerSlotDiff, PolicyDiff, PolicyError};
pub use qc::{LatestQcClaim, Qc, QcClaim, QcSig};
pub use signature::{BLSPublicKey, BLSSignature};
pub use vote::Vote;

/// Convenient bundle of the crate's most commonly used items.
pub mod prelude {
    pub use crate::{
        apply_diff, diff, BLSPublicKey, BLSSignature, Bitset, BlockId, BlockNum, BlockTimestamp, Digest,
        FinalityError, FinalizerAuthority, FinalizerPolicy, FinalizerSlotDiff, LatestQcClaim, PolicyDiff,
        PolicyError, Qc, QcClaim, QcSig, TypesError, Vote, VoteStatus,
    };
}
