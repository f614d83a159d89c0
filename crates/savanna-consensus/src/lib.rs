//! Finality controller for the Savanna finality core: drives block-states
//! through the `received → linked → voted* → qc-complete → claimed-by-child
//! → finalized` state machine over a [`savanna_forkdb::ForkDb`], applies the
//! policy promotion rules, and owns persistence across restarts.
//!
//! The block-state, quorum-certificate and fork-tree types this crate drives
//! live in [`savanna_forkdb`]; this crate only adds the sequencing logic on
//! top, the way `merklith-consensus` sat above `merklith-storage` and
//! `merklith-core`.

pub mod callbacks;
pub mod config;
pub mod controller;
pub mod error;

pub use callbacks::Callbacks;
pub use config::ControllerConfig;
pub use controller::{BlockStatus, FinalityController};
pub use error::ControllerError;
