use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use savanna_types::{
    domain, hash_pair, hash_with_domain, BlockId, BlockNum, BlockTimestamp, Digest, FinalityError, FinalizerPolicy,
    PolicyDiff, Qc, QcClaim, Vote, VoteStatus,
};

use crate::qc::AggregatingQc;

/// Everything the fork database needs to hang a finality decision off one
/// candidate block, derived once from its parent and never mutated again
/// except the two fields noted below (spec §3, §4.4).
pub struct BlockState {
    pub id: BlockId,
    pub previous: BlockId,
    pub block_num: BlockNum,
    pub timestamp: BlockTimestamp,

    /// Timestamp of the highest ancestor this branch has evidence of QC
    /// completion for; feeds the fork database's best-branch comparator.
    pub latest_qc_block_timestamp: BlockTimestamp,

    pub strong_digest: Digest,
    pub weak_digest: Digest,
    pub finality_digest: Digest,
    /// `H(pending_policy_digest ∥ base_digest)`, the inner hash folded into
    /// `finality_digest` (spec §3). Kept as its own field because a finality
    /// proof's `qc_block_finality_data` (spec §6) carries it directly rather
    /// than the `base_digest` it was derived from.
    pub witness_hash: Digest,
    pub finality_leaf: Digest,
    pub finality_mroot: Digest,
    pub action_mroot: Digest,

    pub active_policy: Arc<FinalizerPolicy>,
    pub pending_policy: Option<Arc<FinalizerPolicy>>,
    pub last_proposed_policy: Arc<FinalizerPolicy>,
    /// The last policy to become pending on this branch, paired with the
    /// block number at which it did so (spec §3 "policy lineage state").
    pub last_pending_policy: Option<(Arc<FinalizerPolicy>, BlockNum)>,

    pub qc_claim: QcClaim,

    /// The highest ancestor (inclusive) this branch's strong-claim chain has
    /// reached: `qc_claim.block_num` if this block's own claim is strong,
    /// else inherited unchanged from the parent (spec §3 `finality_digest`
    /// formula input). Accumulated the same way as `latest_qc_block_timestamp`
    /// — a new strong claim supersedes it, a weak claim leaves it untouched.
    final_on_strong_qc_block_num: BlockNum,

    /// The only field that mutates after construction: grows monotonically
    /// as votes arrive, snapshotting a `Qc` once quorum is reached. Locked
    /// rather than exposed via `&mut` because block-states are shared
    /// through `Arc` the moment they enter the fork database (spec §9
    /// "ownership of block-states").
    aggregating_qc: Mutex<AggregatingQc>,

    /// Set exactly once, false -> true (spec §4.4 observable contract).
    is_valid: AtomicBool,

    finality_leaves: Arc<Vec<Digest>>,
}

/// Inputs needed to derive a child block-state from its parent. Everything
/// here is supplied by the caller (the finality controller); this type
/// does not reach into the fork database itself.
pub struct NewBlock {
    pub id: BlockId,
    pub previous: BlockId,
    pub timestamp: BlockTimestamp,
    pub action_mroot: Digest,
    pub proposed_policy_diff: Option<PolicyDiff>,
    pub qc_claim: QcClaim,
    /// Timestamp of the ancestor newly claimed by `qc_claim`, if this block
    /// advances the branch's QC-completion watermark past its parent's.
    pub claimed_block_timestamp: Option<BlockTimestamp>,
    /// Resolved by the controller per the promotion rules of §4.7 before
    /// construction; this type performs no promotion logic itself.
    pub active_policy: Arc<FinalizerPolicy>,
    pub pending_policy: Option<Arc<FinalizerPolicy>>,
    /// Opaque per-block witness (e.g. the header hash outside the
    /// finality-relevant fields); see DESIGN.md for the `base_digest`
    /// naming, taken from the original source's finality proof structures.
    pub base_digest: Digest,
}

impl BlockState {
    /// Construct the genesis block-state: the one block-state not derived
    /// from a parent, seeded directly with a starting policy.
    pub fn genesis(
        id: BlockId,
        timestamp: BlockTimestamp,
        action_mroot: Digest,
        active_policy: Arc<FinalizerPolicy>,
        base_digest: Digest,
    ) -> Arc<Self> {
        let strong_digest = compute_strong_digest(&id, &BlockId::default(), 0, timestamp, Digest::ZERO);
        let weak_digest = weak_digest_of(&strong_digest);
        let (finality_digest, witness_hash) =
            compute_finality_digest(active_policy.generation, 0, Digest::ZERO, None, base_digest);
        let finality_leaf = compute_finality_leaf(0, finality_digest, action_mroot);
        let finality_leaves = Arc::new(vec![finality_leaf]);
        let qc_claim = QcClaim { block_num: 0, is_strong: false };

        Arc::new(Self {
            id,
            previous: BlockId::default(),
            block_num: 0,
            timestamp,
            latest_qc_block_timestamp: timestamp,
            strong_digest,
            weak_digest,
            finality_digest,
            witness_hash,
            finality_leaf,
            finality_mroot: finality_leaf,
            action_mroot,
            last_proposed_policy: active_policy.clone(),
            last_pending_policy: None,
            pending_policy: None,
            aggregating_qc: Mutex::new(AggregatingQc::new(active_policy.clone(), None)),
            active_policy,
            qc_claim,
            final_on_strong_qc_block_num: 0,
            is_valid: AtomicBool::new(true),
            finality_leaves,
        })
    }

    /// Derive a child block-state (spec §4.4, steps 1-8).
    pub fn new(parent: &BlockState, input: NewBlock) -> Result<Arc<Self>, FinalityError> {
        if input.timestamp <= parent.timestamp {
            return Err(FinalityError::NonMonotonicTimestamp {
                timestamp: input.timestamp,
                parent_timestamp: parent.timestamp,
            });
        }

        let block_num = input.id.num();

        let last_proposed_policy = match input.proposed_policy_diff {
            Some(diff) => Arc::new(
                savanna_types::apply_diff(&parent.last_proposed_policy, &diff).map_err(|_| FinalityError::PolicyMismatch)?,
            ),
            None => parent.last_proposed_policy.clone(),
        };

        let latest_qc_block_timestamp = input
            .claimed_block_timestamp
            .map(|ts| ts.max(parent.latest_qc_block_timestamp))
            .unwrap_or(parent.latest_qc_block_timestamp);

        let strong_digest =
            compute_strong_digest(&input.id, &input.previous, block_num, input.timestamp, input.base_digest);
        let weak_digest = weak_digest_of(&strong_digest);

        let final_on_strong_qc_block_num =
            if input.qc_claim.is_strong { input.qc_claim.block_num } else { parent.final_on_strong_qc_block_num() };

        let pending_policy_digest = input.pending_policy.as_ref().map(|p| p.digest());
        let finality_tree_root = parent.finality_mroot;
        let (finality_digest, witness_hash) = compute_finality_digest(
            input.active_policy.generation,
            final_on_strong_qc_block_num,
            finality_tree_root,
            pending_policy_digest,
            input.base_digest,
        );
        let finality_leaf = compute_finality_leaf(block_num, finality_digest, input.action_mroot);

        let mut finality_leaves = (*parent.finality_leaves).clone();
        finality_leaves.push(finality_leaf);
        let finality_leaves = Arc::new(finality_leaves);
        let finality_mroot = savanna_crypto::MerkleTree::from_leaves(&finality_leaves).root();

        let last_pending_policy = match &input.pending_policy {
            Some(p) if parent.pending_policy.as_ref().map(|pp| pp.generation) != Some(p.generation) => {
                Some((p.clone(), block_num))
            }
            _ => parent.last_pending_policy.clone(),
        };

        Ok(Arc::new(Self {
            id: input.id,
            previous: input.previous,
            block_num,
            timestamp: input.timestamp,
            latest_qc_block_timestamp,
            strong_digest,
            weak_digest,
            finality_digest,
            witness_hash,
            finality_leaf,
            finality_mroot,
            action_mroot: input.action_mroot,
            last_proposed_policy,
            last_pending_policy,
            pending_policy: input.pending_policy.clone(),
            aggregating_qc: Mutex::new(AggregatingQc::new(input.active_policy.clone(), input.pending_policy)),
            active_policy: input.active_policy,
            qc_claim: input.qc_claim,
            final_on_strong_qc_block_num,
            is_valid: AtomicBool::new(false),
            finality_leaves,
        }))
    }

    /// Fold one vote into this block's running QC aggregate (spec §4.5).
    pub fn aggregate_vote(&self, vote: &Vote) -> VoteStatus {
        self.aggregating_qc.lock().aggregate_vote(vote, &self.strong_digest)
    }

    /// The completed QC, if this block's aggregate has reached quorum.
    /// `AggregatingQc` doesn't know its own block number, so it's stamped on
    /// here rather than threaded through every constructor.
    pub fn qc(&self) -> Option<Qc> {
        self.aggregating_qc.lock().qc().cloned().map(|qc| Qc { block_num: self.block_num, ..qc })
    }

    pub fn qc_is_complete(&self) -> bool {
        self.aggregating_qc.lock().is_complete()
    }

    /// The finality leaves of this block's whole ancestor chain, in block
    /// order, ending with this block's own leaf — the exact leaf set
    /// `finality_mroot` is the merkle root of. A finality proof builder
    /// generates a target block's inclusion proof out of this (spec §4.8
    /// step 3).
    pub fn finality_leaves(&self) -> &[Digest] {
        &self.finality_leaves
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid.load(Ordering::Acquire)
    }

    /// Sets the valid bit. Monotonic false -> true; a second call is a
    /// no-op, never reverting the flag (spec §4.4 observable contract).
    pub fn mark_valid(&self) {
        self.is_valid.store(true, Ordering::Release);
    }

    /// Which ancestor this block's strong QC claim chain currently treats as
    /// "final on strong QC" (spec §3 `finality_digest` formula input). A
    /// finality proof's `qc_block_finality_data.final_on_strong_qc_block_num`
    /// (spec §6) is exactly this value for the QC block.
    pub fn final_on_strong_qc_block_num(&self) -> BlockNum {
        self.final_on_strong_qc_block_num
    }
}

fn compute_strong_digest(
    id: &BlockId,
    previous: &BlockId,
    block_num: BlockNum,
    timestamp: BlockTimestamp,
    base_digest: Digest,
) -> Digest {
    Digest::compute_multi(&[
        id.as_bytes(),
        previous.as_bytes(),
        &block_num.to_le_bytes(),
        &timestamp.to_le_bytes(),
        base_digest.as_bytes(),
    ])
}

fn weak_digest_of(strong_digest: &Digest) -> Digest {
    hash_with_domain(domain::WEAK_DIGEST_TAG, strong_digest.as_bytes())
}

fn compute_finality_digest(
    active_gen: u32,
    final_on_strong_qc_block_num: BlockNum,
    finality_tree_root: Digest,
    pending_policy_digest: Option<Digest>,
    base_digest: Digest,
) -> (Digest, Digest) {
    let witness = hash_pair(&pending_policy_digest.unwrap_or(Digest::ZERO), &base_digest);
    let digest = Digest::compute_multi(&[
        &active_gen.to_le_bytes(),
        &final_on_strong_qc_block_num.to_le_bytes(),
        finality_tree_root.as_bytes(),
        witness.as_bytes(),
    ]);
    (digest, witness)
}

fn compute_finality_leaf(block_num: BlockNum, finality_digest: Digest, action_mroot: Digest) -> Digest {
    Digest::compute_multi(&[&block_num.to_le_bytes(), finality_digest.as_bytes(), action_mroot.as_bytes()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use savanna_types::{BLSPublicKey, FinalizerAuthority};

    fn policy() -> Arc<FinalizerPolicy> {
        let key = BLSPublicKey::from_bytes(&[1u8; 96]).unwrap();
        Arc::new(FinalizerPolicy::new(0, 1, vec![FinalizerAuthority::new("a", 1, key).unwrap()]).unwrap())
    }

    fn child(parent: &BlockState, num: u32, timestamp: BlockTimestamp, qc_claim: QcClaim) -> Arc<BlockState> {
        let p = parent.active_policy.clone();
        BlockState::new(
            parent,
            NewBlock {
                id: BlockId::from_num_and_digest(num, &[num as u8; 28]),
                previous: parent.id,
                timestamp,
                action_mroot: Digest::ZERO,
                proposed_policy_diff: None,
                qc_claim,
                claimed_block_timestamp: if qc_claim.is_strong { Some(timestamp) } else { None },
                active_policy: p,
                pending_policy: None,
                base_digest: Digest::ZERO,
            },
        )
        .unwrap()
    }

    /// A strong claim's `final_on_strong_qc_block_num` must survive two or
    /// more subsequent weak-claim blocks, not just one.
    #[test]
    fn final_on_strong_qc_block_num_survives_multiple_weak_claims() {
        let p = policy();
        let genesis = BlockState::genesis(BlockId::from_num_and_digest(0, &[0u8; 28]), 0, Digest::ZERO, p, Digest::ZERO);

        let b1 = child(&genesis, 1, 1, QcClaim { block_num: 7, is_strong: true });
        assert_eq!(b1.final_on_strong_qc_block_num(), 7);

        let b2 = child(&b1, 2, 2, QcClaim { block_num: 0, is_strong: false });
        assert_eq!(b2.final_on_strong_qc_block_num(), 7);

        let b3 = child(&b2, 3, 3, QcClaim { block_num: 0, is_strong: false });
        assert_eq!(b3.final_on_strong_qc_block_num(), 7, "value must not reset to 0 after two weak-claim blocks");
    }
}
