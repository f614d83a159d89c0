//! Domain separation tags used throughout the finality core.
//!
//! Kept as named constants (`hash_with_domain`-style, see
//! `digest::hash_with_domain`) rather than inline string literals so every
//! call site is grep-able and the two weak-related tags below can never be
//! confused for each other by accident.

/// Prefixed to `strong_digest` when deriving the block's stored
/// `weak_digest` field (spec §3: `weak_digest = H("WEAK" ∥ strong_digest)`).
pub const WEAK_DIGEST_TAG: &[u8] = b"WEAK";

/// Prefixed to `strong_digest` to derive the message a weak BLS vote
/// actually signs (spec §4.2: `H("WEAK_BLS_SIG_PREFIX" ∥ strong_digest)`).
/// Deliberately distinct from [`WEAK_DIGEST_TAG`] — the original source
/// keeps the stored weak digest and the weak vote's signing message
/// separate, and collapsing the two tags would silently change which bytes
/// get signed.
pub const WEAK_VOTE_SIG_PREFIX: &[u8] = b"WEAK_BLS_SIG_PREFIX";
