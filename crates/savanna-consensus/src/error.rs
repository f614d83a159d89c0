use thiserror::Error;

use savanna_types::FinalityError;

/// Errors raised by the finality controller itself, layered over
/// [`FinalityError`] the same way `merklith-consensus::error::ConsensusError`
/// wrapped `merklith-storage::error::StorageError` (spec SPEC_FULL §3.B).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControllerError {
    #[error("fork database: {0}")]
    ForkDb(#[from] FinalityError),
}
