use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use savanna_forkdb::{snapshot, AddOutcome, BlockState, BlockStateRecord, ForkDb, OnDuplicate};
use savanna_types::{BlockId, LatestQcClaim, Vote, VoteStatus};
use tracing::{debug, info, warn};

use crate::callbacks::Callbacks;
use crate::config::ControllerConfig;
use crate::error::ControllerError;

/// Per-block progress through the state machine of spec §4.7. `received`
/// isn't a tracked state: a block only enters this map once `add` succeeds.
/// `finalized` isn't tracked either — a finalized block becomes the fork-db
/// root and this controller stops carrying a status for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    /// Linked into the fork database; may still be accumulating votes
    /// (`voted*` is a self-transition, spec §4.7).
    Linked,
    QcComplete,
    ClaimedByChild,
}

type Validator = dyn Fn(&BlockState, &BlockState) -> bool + Send + Sync;

/// Drives blocks through `received → linked → voted* → qc-complete →
/// claimed-by-child → finalized` over a [`ForkDb`], applies the policy
/// promotion rules, and persists/restores the fork-db snapshot across
/// restarts (spec §4.7). Grounded on the teacher's
/// `merklith-consensus::finality::FinalityEngine` for the shape of a
/// single-struct state-machine driver owning its own book-keeping maps.
pub struct FinalityController {
    fork_db: Arc<ForkDb>,
    config: ControllerConfig,
    callbacks: Callbacks,
    status: Mutex<HashMap<BlockId, BlockStatus>>,
    validate: Option<Box<Validator>>,
}

impl FinalityController {
    pub fn new(config: ControllerConfig, callbacks: Callbacks) -> Self {
        Self { fork_db: Arc::new(ForkDb::new()), config, callbacks, status: Mutex::new(HashMap::new()), validate: None }
    }

    pub fn with_validator(mut self, f: impl Fn(&BlockState, &BlockState) -> bool + Send + Sync + 'static) -> Self {
        self.validate = Some(Box::new(f));
        self
    }

    pub fn fork_db(&self) -> &ForkDb {
        &self.fork_db
    }

    pub fn status_of(&self, id: BlockId) -> Option<BlockStatus> {
        self.status.lock().get(&id).copied()
    }

    /// Seeds the fork database with `genesis` and clears all controller
    /// book-keeping. Called once on startup when there is no snapshot to
    /// restore from.
    pub fn start(&self, genesis: Arc<BlockState>) {
        self.fork_db.reset_root(genesis);
        self.status.lock().clear();
    }

    /// `received → linked`. Runs the feature-compatibility predicate (if
    /// `config.validate_features` and one was registered) and folds the
    /// block into the fork database.
    pub fn add_block(
        &self,
        bs: Arc<BlockState>,
        latest_qc_claim: Option<LatestQcClaim>,
    ) -> Result<AddOutcome, ControllerError> {
        self.callbacks.fire_block_start(&bs);

        let validate: Option<&dyn Fn(&BlockState, &BlockState) -> bool> =
            if self.config.validate_features {
                self.validate.as_deref().map(|f| f as &dyn Fn(&BlockState, &BlockState) -> bool)
            } else {
                None
            };

        let outcome = self.fork_db.add(bs.clone(), latest_qc_claim, OnDuplicate::Ignore, validate)?;
        if outcome == AddOutcome::Duplicate {
            return Ok(outcome);
        }

        debug!(block_id = %bs.id, block_num = bs.block_num, ?outcome, "block linked");
        self.status.lock().insert(bs.id, BlockStatus::Linked);
        self.callbacks.fire_accepted_block_header(&bs);

        self.advance_claim_chain(&bs);

        Ok(outcome)
    }

    /// Self-transition: folds a vote into the target block's aggregate and,
    /// on reaching quorum, moves it to `qc-complete`.
    pub fn submit_vote(&self, block_id: BlockId, vote: &Vote) -> VoteStatus {
        let Some(bs) = self.fork_db.get(block_id) else { return VoteStatus::UnknownPublicKey };
        let status = bs.aggregate_vote(vote);
        if status == VoteStatus::InvalidSignature {
            warn!(block_id = %block_id, finalizer = ?vote.finalizer_public_key, "vote rejected: bad signature");
        }
        if status == VoteStatus::Success && bs.qc_is_complete() {
            let mut statuses = self.status.lock();
            if statuses.get(&block_id) != Some(&BlockStatus::QcComplete) {
                statuses.insert(block_id, BlockStatus::QcComplete);
                drop(statuses);
                info!(block_id = %block_id, block_num = bs.block_num, "qc complete");
                self.callbacks.fire_accepted_block(&bs);
            }
        }
        status
    }

    /// `qc-complete → claimed-by-child` and, when the strong claim chain now
    /// reaches two generations deep, `claimed-by-child → finalized` (spec
    /// §4.7). Called after every successful `add_block`, since a new block's
    /// header is what carries the claim on its parent's ancestor.
    fn advance_claim_chain(&self, child: &Arc<BlockState>) {
        if !child.qc_claim.is_strong {
            return;
        }
        let Some(claimed) = self.fork_db.search_on_branch(child.previous, child.qc_claim.block_num, true) else {
            return;
        };

        {
            let mut statuses = self.status.lock();
            statuses
                .entry(claimed.id)
                .and_modify(|s| *s = BlockStatus::ClaimedByChild)
                .or_insert(BlockStatus::ClaimedByChild);
        }

        if !claimed.qc_claim.is_strong {
            return;
        }
        let Some(grandparent) = self.fork_db.search_on_branch(claimed.previous, claimed.qc_claim.block_num, true)
        else {
            return;
        };

        info!(block_id = %grandparent.id, block_num = grandparent.block_num, "finalized");
        if let Err(e) = self.fork_db.advance_root(grandparent.id) {
            warn!(block_id = %grandparent.id, error = %e, "advance_root failed for claimed-final block");
            return;
        }
        self.callbacks.fire_irreversible_block(&grandparent);
        self.apply_policy_promotions(&grandparent);
        self.prune_status();
    }

    /// Policy promotion rules tied to finalization (spec §4.7): a proposed
    /// policy that first appeared on `final_block`'s branch becomes pending,
    /// and a pending policy that took effect at `final_block` becomes
    /// active. Both transitions are already materialized as plain fields on
    /// `final_block` by `BlockState::new` (`last_proposed_policy`,
    /// `last_pending_policy`, `active_policy`); this just documents that
    /// `final_block` itself is the authoritative view a caller should read
    /// the effective policies off of once finalization completes.
    fn apply_policy_promotions(&self, final_block: &Arc<BlockState>) {
        debug!(
            block_id = %final_block.id,
            active_generation = final_block.active_policy.generation,
            pending_generation = final_block.pending_policy.as_ref().map(|p| p.generation),
            "policy state at finalization"
        );
    }

    fn prune_status(&self) {
        let mut statuses = self.status.lock();
        statuses.retain(|id, _| self.fork_db.get(*id).is_some());
    }

    /// Persists the fork database for a later [`Self::restore_records`]
    /// (spec §4.7, §6). Only a flat view of each block-state survives —
    /// enough to detect what had been linked/voted/claimed, not enough to
    /// resume voting without the embedder re-supplying the original blocks.
    /// See `savanna-forkdb::snapshot` for why.
    pub fn shutdown(&self) -> Result<(), ControllerError> {
        let Some(path) = &self.config.snapshot_path else { return Ok(()) };
        let Some(root) = self.fork_db.root() else { return Ok(()) };

        let pending_lib_id = self.fork_db.pending_savanna_lib_id().unwrap_or_default();
        let root_record = BlockStateRecord::from(root.as_ref());
        let records: Vec<BlockStateRecord> =
            self.fork_db.blocks_reverse_branch_order().iter().map(|bs| BlockStateRecord::from(bs.as_ref())).collect();

        snapshot::write(path, pending_lib_id, &root_record, &records)?;
        info!(path = %path.display(), count = records.len(), "fork database snapshot written");
        Ok(())
    }

    /// Reads back whatever a prior [`Self::shutdown`] wrote, consuming the
    /// file. Returns `None` if there was nothing to restore.
    pub fn restore_records(
        &self,
    ) -> Result<Option<(BlockId, BlockStateRecord, Vec<BlockStateRecord>)>, ControllerError> {
        let Some(path) = &self.config.snapshot_path else { return Ok(None) };
        Ok(snapshot::read_and_consume(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blst::min_pk::SecretKey;
    use savanna_forkdb::NewBlock;
    use savanna_types::{BLSPublicKey, Digest, FinalizerAuthority, FinalizerPolicy, QcClaim, Vote};

    fn keypair(seed: u8) -> (SecretKey, BLSPublicKey) {
        let mut ikm = [0u8; 32];
        ikm[0] = seed;
        let sk = SecretKey::key_gen(&ikm, &[]).unwrap();
        let pk = BLSPublicKey::from_bytes(&sk.sk_to_pk().serialize()).unwrap();
        (sk, pk)
    }

    fn policy(weights: &[(u8, u64)], threshold: u64) -> Arc<FinalizerPolicy> {
        let finalizers = weights
            .iter()
            .map(|&(seed, weight)| {
                let (_, pk) = keypair(seed);
                FinalizerAuthority::new(format!("f{seed}"), weight, pk).unwrap()
            })
            .collect();
        Arc::new(FinalizerPolicy::new(0, threshold, finalizers).unwrap())
    }

    fn vote_for(seed: u8, strong_digest: &Digest, strong: bool) -> Vote {
        let (sk, pk) = keypair(seed);
        let msg = savanna_crypto::vote_signing_message(strong_digest, strong);
        let sig = savanna_crypto::bls::sign_for_tests(&sk, msg.as_bytes());
        Vote::new(BlockId::from_num_and_digest(1, &[0u8; 28]), strong, pk, sig)
    }

    fn child(
        num: u32,
        tail: u8,
        parent: &Arc<BlockState>,
        timestamp: u64,
        policy: &Arc<FinalizerPolicy>,
        qc_claim: QcClaim,
    ) -> Arc<BlockState> {
        let id = BlockId::from_num_and_digest(num, &[tail; 28]);
        BlockState::new(
            parent,
            NewBlock {
                id,
                previous: parent.id,
                timestamp,
                action_mroot: Digest::ZERO,
                proposed_policy_diff: None,
                qc_claim,
                claimed_block_timestamp: if qc_claim.is_strong { Some(timestamp) } else { None },
                active_policy: policy.clone(),
                pending_policy: None,
                base_digest: Digest::ZERO,
            },
        )
        .unwrap()
    }

    #[test]
    fn add_block_transitions_to_linked() {
        let controller = FinalityController::new(ControllerConfig::default(), Callbacks::new());
        let policy = policy(&[(1, 3)], 2);
        let genesis = BlockState::genesis(BlockId::from_num_and_digest(0, &[0; 28]), 1, Digest::ZERO, policy.clone(), Digest::ZERO);
        controller.start(genesis.clone());

        let b1 = child(1, 1, &genesis, 2, &policy, QcClaim { block_num: 0, is_strong: false });
        controller.add_block(b1.clone(), None).unwrap();

        assert_eq!(controller.status_of(b1.id), Some(BlockStatus::Linked));
    }

    #[test]
    fn votes_reach_quorum_and_transition_to_qc_complete() {
        let fired = Arc::new(Mutex::new(false));
        let fired_clone = fired.clone();
        let callbacks = Callbacks::new().on_accepted_block(move |_| *fired_clone.lock() = true);
        let controller = FinalityController::new(ControllerConfig::default(), callbacks);

        let policy = policy(&[(1, 1), (2, 3), (3, 5)], 5);
        let genesis = BlockState::genesis(BlockId::from_num_and_digest(0, &[0; 28]), 1, Digest::ZERO, policy.clone(), Digest::ZERO);
        controller.start(genesis.clone());

        let b1 = child(1, 1, &genesis, 2, &policy, QcClaim { block_num: 0, is_strong: false });
        controller.add_block(b1.clone(), None).unwrap();

        assert_eq!(controller.submit_vote(b1.id, &vote_for(3, &b1.strong_digest, true)), VoteStatus::Success);
        assert_eq!(controller.status_of(b1.id), Some(BlockStatus::QcComplete));
        assert!(*fired.lock());
    }

    #[test]
    fn claim_chain_two_deep_finalizes_grandparent() {
        let controller = FinalityController::new(ControllerConfig::default(), Callbacks::new());
        let policy = policy(&[(1, 3)], 2);
        let genesis = BlockState::genesis(BlockId::from_num_and_digest(0, &[0; 28]), 1, Digest::ZERO, policy.clone(), Digest::ZERO);
        controller.start(genesis.clone());

        let b1 = child(1, 1, &genesis, 2, &policy, QcClaim { block_num: 0, is_strong: false });
        controller.add_block(b1.clone(), None).unwrap();
        b1.mark_valid();

        let b2 = child(2, 2, &b1, 3, &policy, QcClaim { block_num: 1, is_strong: true });
        controller.add_block(b2.clone(), None).unwrap();
        assert_eq!(controller.status_of(b1.id), Some(BlockStatus::ClaimedByChild));

        let b3 = child(3, 3, &b2, 4, &policy, QcClaim { block_num: 2, is_strong: true });
        controller.add_block(b3.clone(), None).unwrap();

        assert_eq!(controller.fork_db().root().unwrap().id, b1.id);
        assert!(controller.fork_db().get(genesis.id).is_none());
    }

    #[test]
    fn shutdown_and_restore_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forkdb.snapshot");
        let config = ControllerConfig { snapshot_path: Some(path.clone()), validate_features: true };
        let controller = FinalityController::new(config, Callbacks::new());

        let policy = policy(&[(1, 3)], 2);
        let genesis = BlockState::genesis(BlockId::from_num_and_digest(0, &[0; 28]), 1, Digest::ZERO, policy.clone(), Digest::ZERO);
        controller.start(genesis.clone());
        let b1 = child(1, 1, &genesis, 2, &policy, QcClaim { block_num: 0, is_strong: false });
        controller.add_block(b1.clone(), None).unwrap();

        controller.shutdown().unwrap();
        assert!(path.exists());

        let (_, root_record, records) = controller.restore_records().unwrap().unwrap();
        assert_eq!(root_record.id, genesis.id);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, b1.id);
        assert!(!path.exists());
    }
}
