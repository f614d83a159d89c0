//! End-to-end integration tests for the Savanna finality core.
//!
//! Exercises the full stack together: fork database, quorum aggregation,
//! the finality controller's state machine, and finality proof
//! build/verify, the way a library embedder would actually drive them.

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;

    use blst::min_pk::SecretKey;
    use parking_lot::Mutex;
    use savanna_consensus::{BlockStatus, Callbacks, ControllerConfig, FinalityController};
    use savanna_forkdb::{AddOutcome, BlockState, NewBlock, OnDuplicate};
    use savanna_proof::{build_proof, verify_proof, ProofError};
    use savanna_types::{
        BLSPublicKey, BlockId, Digest, FinalityError, FinalizerAuthority, FinalizerPolicy, LatestQcClaim, QcClaim, Vote,
    };

    fn keypair(seed: u8) -> (SecretKey, BLSPublicKey) {
        let mut ikm = [0u8; 32];
        ikm[0] = seed;
        let sk = SecretKey::key_gen(&ikm, &[]).unwrap();
        let pk = BLSPublicKey::from_bytes(&sk.sk_to_pk().serialize()).unwrap();
        (sk, pk)
    }

    fn policy(gen: u32, weights: &[(u8, u64)], threshold: u64) -> Arc<FinalizerPolicy> {
        let finalizers = weights
            .iter()
            .map(|&(seed, weight)| {
                let (_, pk) = keypair(seed);
                FinalizerAuthority::new(format!("f{seed}"), weight, pk).unwrap()
            })
            .collect();
        Arc::new(FinalizerPolicy::new(gen, threshold, finalizers).unwrap())
    }

    fn vote_for(seed: u8, strong_digest: &Digest, strong: bool, block_id: BlockId) -> Vote {
        let (sk, pk) = keypair(seed);
        let msg = savanna_crypto::vote_signing_message(strong_digest, strong);
        let sig = savanna_crypto::bls::sign_for_tests(&sk, msg.as_bytes());
        Vote::new(block_id, strong, pk, sig)
    }

    fn genesis_block(policy: Arc<FinalizerPolicy>) -> Arc<BlockState> {
        BlockState::genesis(BlockId::from_num_and_digest(0, &[0u8; 28]), 0, Digest::ZERO, policy, Digest::ZERO)
    }

    fn child(
        parent: &BlockState,
        num: u32,
        timestamp: u64,
        active_policy: Arc<FinalizerPolicy>,
        pending_policy: Option<Arc<FinalizerPolicy>>,
        qc_claim: QcClaim,
    ) -> Arc<BlockState> {
        child_tail(parent, num, num as u8, timestamp, active_policy, pending_policy, qc_claim)
    }

    #[allow(clippy::too_many_arguments)]
    fn child_tail(
        parent: &BlockState,
        num: u32,
        tail: u8,
        timestamp: u64,
        active_policy: Arc<FinalizerPolicy>,
        pending_policy: Option<Arc<FinalizerPolicy>>,
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
                active_policy,
                pending_policy,
                base_digest: Digest::ZERO,
            },
        )
        .unwrap()
    }

    /// Weights 1, 3, 5 over threshold 5: the two heaviest finalizers alone
    /// reach quorum before the lightest ever votes.
    #[test]
    fn quorum_reached_with_weighted_votes() {
        let p = policy(0, &[(1, 1), (2, 3), (3, 5)], 5);
        let fork_db = savanna_forkdb::ForkDb::new();
        let genesis = genesis_block(p.clone());
        fork_db.reset_root(genesis.clone());

        let b1 = child(&genesis, 1, 1, p.clone(), None, QcClaim { block_num: 0, is_strong: false });
        fork_db.add(b1.clone(), None, OnDuplicate::Error, None).unwrap();

        assert!(!b1.qc_is_complete());
        b1.aggregate_vote(&vote_for(2, &b1.strong_digest, true, b1.id));
        assert!(!b1.qc_is_complete());
        b1.aggregate_vote(&vote_for(3, &b1.strong_digest, true, b1.id));
        assert!(b1.qc_is_complete());

        let qc = b1.qc().unwrap();
        assert_eq!(qc.active_qc_sig.strong_votes.unwrap().count_ones(), 2);
    }

    /// A dual-policy QC needs both the active and pending quorums met; weight
    /// sufficient for the active policy alone does not complete it.
    #[test]
    fn dual_policy_withholds_completion_until_pending_quorum_met_too() {
        let active = policy(0, &[(1, 5)], 3);
        let pending = policy(1, &[(1, 1), (2, 1), (3, 1)], 3);
        let fork_db = savanna_forkdb::ForkDb::new();
        let genesis = genesis_block(active.clone());
        fork_db.reset_root(genesis.clone());

        let b1 = child(&genesis, 1, 1, active.clone(), Some(pending.clone()), QcClaim { block_num: 0, is_strong: false });
        fork_db.add(b1.clone(), None, OnDuplicate::Error, None).unwrap();

        b1.aggregate_vote(&vote_for(1, &b1.strong_digest, true, b1.id));
        assert!(!b1.qc_is_complete(), "active policy alone met, pending still short");

        b1.aggregate_vote(&vote_for(2, &b1.strong_digest, true, b1.id));
        assert!(!b1.qc_is_complete());
        b1.aggregate_vote(&vote_for(3, &b1.strong_digest, true, b1.id));
        assert!(b1.qc_is_complete());
        assert!(b1.qc().unwrap().pending_qc_sig.is_some());
    }

    /// A finalizer present in both active and pending policies cannot vote
    /// strong under one and weak under the other for the same block.
    #[test]
    fn dual_finalizer_conflicting_mode_rejected() {
        let active = policy(0, &[(1, 3)], 2);
        let pending = policy(1, &[(1, 3)], 2);
        let fork_db = savanna_forkdb::ForkDb::new();
        let genesis = genesis_block(active.clone());
        fork_db.reset_root(genesis.clone());

        let b1 = child(&genesis, 1, 1, active.clone(), Some(pending.clone()), QcClaim { block_num: 0, is_strong: false });
        fork_db.add(b1.clone(), None, OnDuplicate::Error, None).unwrap();

        assert_eq!(
            b1.aggregate_vote(&vote_for(1, &b1.strong_digest, true, b1.id)),
            savanna_types::VoteStatus::Success
        );
        assert_eq!(
            b1.aggregate_vote(&vote_for(1, &b1.strong_digest, false, b1.id)),
            savanna_types::VoteStatus::ConflictingDualVote
        );
    }

    /// A later branch with a strictly greater claimed-QC timestamp takes over
    /// the head even though it started from a lower block number.
    #[test]
    fn fork_switch_on_higher_qc_timestamp() {
        let p = policy(0, &[(1, 5)], 3);
        let fork_db = savanna_forkdb::ForkDb::new();
        let genesis = BlockState::genesis(BlockId::from_num_and_digest(100, &[0u8; 28]), 1, Digest::ZERO, p.clone(), Digest::ZERO);
        fork_db.reset_root(genesis.clone());

        let mut a = child(&genesis, 101, 2, p.clone(), None, QcClaim { block_num: 0, is_strong: false });
        fork_db.add(a.clone(), None, OnDuplicate::Error, None).unwrap();
        for n in 102..=110u32 {
            a = child(&a, n, n as u64, p.clone(), None, QcClaim { block_num: 0, is_strong: false });
            fork_db.add(a.clone(), None, OnDuplicate::Error, None).unwrap();
        }
        assert_eq!(fork_db.head(false).unwrap().id, a.id);

        let mut b = child(&genesis, 105, 200, p.clone(), None, QcClaim { block_num: 0, is_strong: false });
        let outcome = fork_db.add(b.clone(), None, OnDuplicate::Error, None).unwrap();
        assert_eq!(outcome, AddOutcome::ForkSwitch);
        for n in 106..=111u32 {
            b = child(&b, n, (200 + n) as u64, p.clone(), None, QcClaim { block_num: 0, is_strong: false });
            fork_db.add(b.clone(), None, OnDuplicate::Error, None).unwrap();
        }
        assert_eq!(fork_db.head(false).unwrap().id, b.id);
    }

    /// Two generations of strong claims finalize the grandparent and purge
    /// any sibling subtree via the finality controller.
    #[test]
    fn controller_finalizes_grandparent_and_advances_claim_chain() {
        let p = policy(0, &[(1, 5)], 3);
        let finalized = Arc::new(Mutex::new(None));
        let finalized_clone = finalized.clone();
        let callbacks = Callbacks::new().on_irreversible_block(move |bs| *finalized_clone.lock() = Some(bs.id));
        let controller = FinalityController::new(ControllerConfig::default(), callbacks);

        let genesis = genesis_block(p.clone());
        controller.start(genesis.clone());

        let b1 = child(&genesis, 1, 1, p.clone(), None, QcClaim { block_num: 0, is_strong: false });
        controller.add_block(b1.clone(), None).unwrap();
        b1.mark_valid();
        assert_eq!(controller.status_of(b1.id), Some(BlockStatus::Linked));

        let b2 = child(&b1, 2, 2, p.clone(), None, QcClaim { block_num: 1, is_strong: true });
        controller.add_block(b2.clone(), None).unwrap();
        assert_eq!(controller.status_of(b1.id), Some(BlockStatus::ClaimedByChild));

        let sibling = child_tail(&genesis, 1, 99, 5, p.clone(), None, QcClaim { block_num: 0, is_strong: false });
        controller.add_block(sibling.clone(), None).unwrap();

        let b3 = child(&b2, 4, 4, p.clone(), None, QcClaim { block_num: 2, is_strong: true });
        controller.add_block(b3.clone(), None).unwrap();

        assert_eq!(*finalized.lock(), Some(b1.id));
        assert_eq!(controller.fork_db().root().unwrap().id, b1.id);
        assert!(controller.fork_db().get(sibling.id).is_none());
        assert!(controller.fork_db().get(genesis.id).is_none());
    }

    /// A claimed-QC ancestor reported via `LatestQcClaim` advances
    /// `pending_savanna_lib_id` even before that ancestor's own descendants
    /// arrive.
    #[test]
    fn latest_qc_claim_advances_pending_lib() {
        let p = policy(0, &[(1, 5)], 3);
        let fork_db = savanna_forkdb::ForkDb::new();
        let genesis = genesis_block(p.clone());
        fork_db.reset_root(genesis.clone());

        let b1 = child(&genesis, 1, 1, p.clone(), None, QcClaim { block_num: 0, is_strong: false });
        fork_db.add(b1.clone(), None, OnDuplicate::Error, None).unwrap();

        let b2 = child(&b1, 2, 2, p.clone(), None, QcClaim { block_num: 0, is_strong: false });
        let claim = LatestQcClaim { claim: QcClaim { block_num: 1, is_strong: true }, claimed_block_id: b1.id };
        fork_db.add(b2.clone(), Some(claim), OnDuplicate::Error, None).unwrap();

        assert_eq!(fork_db.pending_savanna_lib_id(), Some(b1.id));
    }

    /// A proof built two generations below the QC block verifies end to end,
    /// and a one-byte flip of the aggregate signature is rejected.
    #[test]
    fn finality_proof_round_trips_and_rejects_tampered_signature() {
        let p = policy(0, &[(1, 1), (2, 2), (3, 3)], 4);
        let fork_db = savanna_forkdb::ForkDb::new();
        let genesis = genesis_block(p.clone());
        fork_db.reset_root(genesis.clone());

        let b1 = child(&genesis, 1, 1, p.clone(), None, QcClaim { block_num: 0, is_strong: false });
        fork_db.add(b1.clone(), None, OnDuplicate::Error, None).unwrap();
        let b2 = child(&b1, 2, 2, p.clone(), None, QcClaim { block_num: 0, is_strong: false });
        fork_db.add(b2.clone(), None, OnDuplicate::Error, None).unwrap();

        for (seed, strong) in [(2, true), (3, true)] {
            b2.aggregate_vote(&vote_for(seed, &b2.strong_digest, strong, b2.id));
        }
        assert!(b2.qc_is_complete());

        let proof = build_proof(&fork_db, &b2, &genesis, None).unwrap();
        assert!(verify_proof(&proof).is_ok());

        let encoded = proof.encode();
        let decoded = savanna_proof::FinalityProof::decode(&encoded).unwrap();
        assert!(verify_proof(&decoded).is_ok());

        let mut tampered = proof;
        let mut sig_bytes = tampered.active_qc_sig.aggregate_signature.as_bytes().to_vec();
        sig_bytes[0] ^= 0xff;
        tampered.active_qc_sig.aggregate_signature = savanna_types::BLSSignature::from_bytes(&sig_bytes).unwrap();
        assert!(matches!(verify_proof(&tampered), Err(ProofError::Finality(FinalityError::InvalidQcSignature))));
    }

    /// Persisting and restoring the fork-db snapshot round-trips through
    /// disk, as a library embedder would do across a process restart.
    #[test]
    fn controller_snapshot_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forkdb.snapshot");
        let config = ControllerConfig { snapshot_path: Some(path.clone()), validate_features: true };
        let controller = FinalityController::new(config, Callbacks::new());

        let p = policy(0, &[(1, 3)], 2);
        let genesis = genesis_block(p.clone());
        controller.start(genesis.clone());
        let b1 = child(&genesis, 1, 1, p.clone(), None, QcClaim { block_num: 0, is_strong: false });
        controller.add_block(b1.clone(), None).unwrap();

        controller.shutdown().unwrap();
        assert!(path.exists());

        let (_, root_record, records) = controller.restore_records().unwrap().unwrap();
        assert_eq!(root_record.id, genesis.id);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, b1.id);
        assert!(!path.exists(), "restore consumes the snapshot file");
    }
}
