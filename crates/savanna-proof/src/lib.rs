//! Finality proof builder and verifier for the Savanna finality core.
//!
//! A proof binds a target block to the quorum certificate of one of its
//! descendants via a finalizer policy, the QC's signature data, and a
//! merkle inclusion proof into the QC block's finality tree (spec §3, §6).
//! This crate performs no fork-tree bookkeeping of its own; `build_proof`
//! borrows a `savanna-forkdb::ForkDb` only to confirm ancestry.

pub mod builder;
pub mod error;
pub mod package;
pub mod verifier;
pub mod wire;

pub use builder::{build_proof, ActionProofInput};
pub use error::ProofError;
pub use package::{ActionInclusionProof, FinalityProof};
pub use verifier::verify_proof;
pub use wire::{MerkleInclusion, QcBlockFinalityData};
