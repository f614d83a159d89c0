//! Digest, Merkle and BLS aggregation primitives for the Savanna finality
//! core. Hashing is SHA-256 throughout (re-exported from `savanna-types`);
//! signing is BLS12-381 in the min_pk variant via `blst`.

pub mod bls;
pub mod error;
pub mod merkle;

pub use bls::{
    aggregate_pubkeys, aggregate_signatures, verify, verify_aggregate, vote_signing_message, SignatureAccumulator,
};
pub use error::CryptoError;
pub use merkle::{calculate_max_depth, MerkleProof, MerkleTree};
