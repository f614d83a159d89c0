use std::collections::HashMap;
use std::sync::Arc;

use savanna_crypto::SignatureAccumulator;
use savanna_types::{BLSPublicKey, Bitset, FinalizerPolicy, Qc, QcSig, Vote, VoteStatus};

/// Which policy (or both) a finalizer key is present in, and at what
/// bitset position (spec §4.5: a finalizer overlapping both the active and
/// pending policy casts one vote that counts toward both certificates).
struct Membership {
    active_index: Option<usize>,
    pending_index: Option<usize>,
}

/// Tracks progress toward one or two quorum certificates (active policy,
/// and optionally pending policy) for a single block as votes arrive.
///
/// Mirrors the running-aggregate shape of the original fork database's
/// `pending_qc`: bitsets and an incremental BLS aggregate per policy, so a
/// vote is O(1) to fold in rather than re-aggregating the whole vote set.
pub struct AggregatingQc {
    active_policy: Arc<FinalizerPolicy>,
    pending_policy: Option<Arc<FinalizerPolicy>>,

    active_strong_votes: Bitset,
    active_weak_votes: Bitset,
    active_strong_sig: SignatureAccumulator,
    active_weak_sig: SignatureAccumulator,
    active_strong_weight: u64,
    active_weak_weight: u64,

    pending_strong_votes: Option<Bitset>,
    pending_weak_votes: Option<Bitset>,
    pending_strong_sig: SignatureAccumulator,
    pending_weak_sig: SignatureAccumulator,
    pending_strong_weight: u64,
    pending_weak_weight: u64,

    /// First strong/weak mode observed for a finalizer present in both
    /// policies; a later vote in the other mode is a conflicting dual vote
    /// (spec §4.5).
    dual_finalizer_mode: HashMap<BLSPublicKey, bool>,

    qc: Option<Qc>,
}

impl AggregatingQc {
    pub fn new(active_policy: Arc<FinalizerPolicy>, pending_policy: Option<Arc<FinalizerPolicy>>) -> Self {
        let active_len = active_policy.finalizers.len();
        let pending_len = pending_policy.as_ref().map(|p| p.finalizers.len());

        Self {
            active_policy,
            pending_policy,
            active_strong_votes: Bitset::new(active_len),
            active_weak_votes: Bitset::new(active_len),
            active_strong_sig: SignatureAccumulator::new(),
            active_weak_sig: SignatureAccumulator::new(),
            active_strong_weight: 0,
            active_weak_weight: 0,
            pending_strong_votes: pending_len.map(Bitset::new),
            pending_weak_votes: pending_len.map(Bitset::new),
            pending_strong_sig: SignatureAccumulator::new(),
            pending_weak_sig: SignatureAccumulator::new(),
            pending_strong_weight: 0,
            pending_weak_weight: 0,
            dual_finalizer_mode: HashMap::new(),
            qc: None,
        }
    }

    pub fn qc(&self) -> Option<&Qc> {
        self.qc.as_ref()
    }

    pub fn is_complete(&self) -> bool {
        self.qc.is_some()
    }

    fn membership(&self, key: &BLSPublicKey) -> Membership {
        Membership {
            active_index: self.active_policy.position_of(key),
            pending_index: self.pending_policy.as_ref().and_then(|p| p.position_of(key)),
        }
    }

    /// Fold one vote into the running aggregate (spec §4.5).
    ///
    /// Returns the outcome as a plain status rather than `Result`: unknown
    /// keys, duplicates and bad signatures are ordinary network noise, not
    /// faults in the fork database itself.
    pub fn aggregate_vote(&mut self, vote: &Vote, strong_digest: &savanna_types::Digest) -> VoteStatus {
        let membership = self.membership(&vote.finalizer_public_key);
        if membership.active_index.is_none() && membership.pending_index.is_none() {
            return VoteStatus::UnknownPublicKey;
        }

        let already_active = membership
            .active_index
            .map(|i| if vote.strong { self.active_strong_votes.get(i) } else { self.active_weak_votes.get(i) })
            .unwrap_or(false);
        let already_pending = membership
            .pending_index
            .map(|i| {
                if vote.strong {
                    self.pending_strong_votes.as_ref().is_some_and(|b| b.get(i))
                } else {
                    self.pending_weak_votes.as_ref().is_some_and(|b| b.get(i))
                }
            })
            .unwrap_or(false);
        if already_active || already_pending {
            return VoteStatus::Duplicate;
        }

        if membership.active_index.is_some() && membership.pending_index.is_some() {
            match self.dual_finalizer_mode.get(&vote.finalizer_public_key) {
                Some(&mode) if mode != vote.strong => return VoteStatus::ConflictingDualVote,
                _ => {}
            }
        }

        let msg = savanna_crypto::vote_signing_message(strong_digest, vote.strong);
        if savanna_crypto::verify(&vote.finalizer_public_key, &vote.signature, msg.as_bytes()).is_err() {
            return VoteStatus::InvalidSignature;
        }

        if let Some(index) = membership.active_index {
            let weight = self.active_policy.finalizers[index].weight;
            if vote.strong {
                self.active_strong_votes.set(index);
                self.active_strong_weight += weight;
                let _ = self.active_strong_sig.add(&vote.signature);
            } else {
                self.active_weak_votes.set(index);
                self.active_weak_weight += weight;
                let _ = self.active_weak_sig.add(&vote.signature);
            }
        }
        if let Some(index) = membership.pending_index {
            let weight = self.pending_policy.as_ref().unwrap().finalizers[index].weight;
            if vote.strong {
                self.pending_strong_votes.as_mut().unwrap().set(index);
                self.pending_strong_weight += weight;
                let _ = self.pending_strong_sig.add(&vote.signature);
            } else {
                self.pending_weak_votes.as_mut().unwrap().set(index);
                self.pending_weak_weight += weight;
                let _ = self.pending_weak_sig.add(&vote.signature);
            }
        }
        if membership.active_index.is_some() && membership.pending_index.is_some() {
            self.dual_finalizer_mode.insert(vote.finalizer_public_key.clone(), vote.strong);
        }

        self.maybe_complete();
        VoteStatus::Success
    }

    fn policy_quorum_met(&self, strong_weight: u64, weak_weight: u64, policy: &FinalizerPolicy) -> bool {
        strong_weight + weak_weight >= policy.threshold
    }

    fn maybe_complete(&mut self) {
        if self.qc.is_some() {
            return;
        }
        if !self.policy_quorum_met(self.active_strong_weight, self.active_weak_weight, &self.active_policy) {
            return;
        }
        if let Some(pending) = &self.pending_policy {
            if !self.policy_quorum_met(self.pending_strong_weight, self.pending_weak_weight, pending) {
                return;
            }
        }

        let active_qc_sig = QcSig {
            strong_votes: (self.active_strong_weight > 0).then(|| self.active_strong_votes.clone()),
            weak_votes: (self.active_weak_weight > 0).then(|| self.active_weak_votes.clone()),
            aggregate_signature: self.combined_active_signature(),
        };
        let pending_qc_sig = self.pending_policy.as_ref().map(|_| QcSig {
            strong_votes: (self.pending_strong_weight > 0).then(|| self.pending_strong_votes.clone().unwrap()),
            weak_votes: (self.pending_weak_weight > 0).then(|| self.pending_weak_votes.clone().unwrap()),
            aggregate_signature: self.combined_pending_signature(),
        });

        self.qc = Some(Qc { block_num: 0, active_qc_sig, pending_qc_sig });
    }

    fn combined_active_signature(&self) -> savanna_types::BLSSignature {
        combine(&self.active_strong_sig, &self.active_weak_sig)
    }

    fn combined_pending_signature(&self) -> savanna_types::BLSSignature {
        combine(&self.pending_strong_sig, &self.pending_weak_sig)
    }
}

/// Combine an optional strong aggregate and an optional weak aggregate into
/// a single signature, as stored in `QcSig::aggregate_signature` (spec §3).
fn combine(strong: &SignatureAccumulator, weak: &SignatureAccumulator) -> savanna_types::BLSSignature {
    match (strong.finalize(), weak.finalize()) {
        (Some(s), Some(w)) => savanna_crypto::aggregate_signatures(&[s, w]).expect("both inputs are valid signatures"),
        (Some(s), None) => s,
        (None, Some(w)) => w,
        (None, None) => savanna_types::BLSSignature::from_bytes(&[0u8; 96]).expect("zero signature is 96 bytes"),
    }
}
