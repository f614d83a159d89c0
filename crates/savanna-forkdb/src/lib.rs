//! In-memory fork database, block state and quorum-certificate aggregation
//! for the Savanna finality core.
//!
//! Block-states (see [`block_state`]) are created on insert and owned
//! exclusively by the [`fork_db::ForkDb`] that holds them; [`qc`] tracks the
//! vote aggregate each one accumulates; [`snapshot`] handles the on-disk
//! restart format written and read by the finality controller.

pub mod block_state;
pub mod fork_db;
pub mod qc;
pub mod snapshot;

pub use block_state::{BlockState, NewBlock};
pub use fork_db::{AddOutcome, ForkDb, OnDuplicate};
pub use qc::AggregatingQc;
pub use snapshot::BlockStateRecord;
