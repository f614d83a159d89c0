use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use savanna_types::{BlockId, BlockNum, FinalityError, LatestQcClaim};

use crate::block_state::BlockState;

/// What to do when `add` is handed a block id already present in the index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnDuplicate {
    Ignore,
    Error,
}

/// Observable effect of a successful `add` (spec §4.6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AppendedToHead,
    ForkSwitch,
    Duplicate,
}

/// Best-branch comparator key: `(latest_qc_block_timestamp, timestamp, id)`,
/// ascending so the tree's last element is the head (spec §4.6 index 3).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct BranchKey {
    latest_qc_block_timestamp: u64,
    timestamp: u64,
    id: BlockId,
}

impl BranchKey {
    fn of(bs: &BlockState) -> Self {
        Self { latest_qc_block_timestamp: bs.latest_qc_block_timestamp, timestamp: bs.timestamp, id: bs.id }
    }
}

struct Inner {
    root: Option<Arc<BlockState>>,
    by_id: HashMap<BlockId, Arc<BlockState>>,
    by_previous: HashMap<BlockId, Vec<BlockId>>,
    by_branch: BTreeSet<BranchKey>,
    pending_savanna_lib_id: Option<BlockId>,
}

impl Inner {
    fn empty() -> Self {
        Self { root: None, by_id: HashMap::new(), by_previous: HashMap::new(), by_branch: BTreeSet::new(), pending_savanna_lib_id: None }
    }

    fn head_id(&self) -> Option<BlockId> {
        self.by_branch.iter().next_back().map(|k| k.id)
    }
}

/// In-memory tree of candidate blocks rooted at the last known-final block
/// (spec §4.6). Every public operation locks the whole structure for its
/// duration; there is no internal queueing.
pub struct ForkDb {
    inner: Mutex<Inner>,
}

impl Default for ForkDb {
    fn default() -> Self {
        Self::new()
    }
}

impl ForkDb {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::empty()) }
    }

    /// Sets `root`, clears every index and `pending_savanna_lib_id`, and
    /// marks the root valid. Called once on start.
    pub fn reset_root(&self, root: Arc<BlockState>) {
        root.mark_valid();
        let mut inner = self.inner.lock();
        *inner = Inner::empty();
        inner.root = Some(root);
    }

    pub fn root(&self) -> Option<Arc<BlockState>> {
        self.inner.lock().root.clone()
    }

    pub fn pending_savanna_lib_id(&self) -> Option<BlockId> {
        self.inner.lock().pending_savanna_lib_id
    }

    pub fn get(&self, id: BlockId) -> Option<Arc<BlockState>> {
        self.inner.lock().by_id.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every tracked block-state (root excluded), in reverse best-branch
    /// order (head first) — the order the on-disk snapshot format serializes
    /// blocks in (spec §6).
    pub fn blocks_reverse_branch_order(&self) -> Vec<Arc<BlockState>> {
        let inner = self.inner.lock();
        inner.by_branch.iter().rev().filter_map(|k| inner.by_id.get(&k.id).cloned()).collect()
    }

    /// Link a new block into the tree (spec §4.6 `add`).
    ///
    /// `latest_qc_claim`, if the block's header carries one, advances
    /// `pending_savanna_lib_id` before linkage when the claim is strong,
    /// ahead of the current pending lib, and its target is reachable from
    /// the new block's parent — this happens even if `validate` later
    /// rejects the block, matching the original's unchecked-order bug
    /// (spec §9 "Open questions").
    pub fn add(
        &self,
        bs: Arc<BlockState>,
        latest_qc_claim: Option<LatestQcClaim>,
        on_duplicate: OnDuplicate,
        validate: Option<&dyn Fn(&BlockState, &BlockState) -> bool>,
    ) -> Result<AddOutcome, FinalityError> {
        let mut inner = self.inner.lock();
        let root = inner.root.clone().ok_or(FinalityError::RootNotSet)?;

        let parent = if bs.previous == root.id {
            root.clone()
        } else {
            inner.by_id.get(&bs.previous).cloned().ok_or(FinalityError::UnlinkableBlock)?
        };

        if bs.id == root.id || inner.by_id.contains_key(&bs.id) {
            return match on_duplicate {
                OnDuplicate::Ignore => Ok(AddOutcome::Duplicate),
                OnDuplicate::Error => Err(FinalityError::DuplicateBlock),
            };
        }

        if let Some(claim) = latest_qc_claim {
            if claim.claim.is_strong {
                let ahead_of_pending =
                    inner.pending_savanna_lib_id.map(|pending| claim.claim.block_num > pending.num()).unwrap_or(true);
                if ahead_of_pending && Self::search_on_branch_locked(&inner, parent.id, claim.claim.block_num, true).is_some() {
                    inner.pending_savanna_lib_id = Some(claim.claimed_block_id);
                }
            }
        }

        if let Some(validate) = validate {
            if !validate(&parent, &bs) {
                return Err(FinalityError::IncompatibleFeatures);
            }
        }

        let prior_head = inner.head_id();

        inner.by_id.insert(bs.id, bs.clone());
        inner.by_previous.entry(bs.previous).or_default().push(bs.id);
        inner.by_branch.insert(BranchKey::of(&bs));

        let outcome = if inner.head_id() == Some(bs.id) {
            match prior_head {
                Some(prev) if prev == bs.previous => AddOutcome::AppendedToHead,
                Some(_) => AddOutcome::ForkSwitch,
                None => AddOutcome::Added,
            }
        } else {
            AddOutcome::Added
        };

        Ok(outcome)
    }

    fn search_on_branch_locked(inner: &Inner, h: BlockId, block_num: BlockNum, include_root: bool) -> Option<Arc<BlockState>> {
        let root = inner.root.as_ref()?;
        if block_num < root.block_num {
            return None;
        }
        if block_num == root.block_num {
            return if include_root { Some(root.clone()) } else { None };
        }
        if h == root.id {
            return None;
        }
        let mut current = inner.by_id.get(&h)?.clone();
        loop {
            if current.block_num == block_num {
                return Some(current);
            }
            if current.block_num < block_num {
                return None;
            }
            if current.previous == root.id {
                return None;
            }
            current = inner.by_id.get(&current.previous)?.clone();
        }
    }

    /// Walk from `h` toward root through `previous` links, returning the
    /// block-state at height `block_num` (spec §4.6 `search_on_branch`).
    pub fn search_on_branch(&self, h: BlockId, block_num: BlockNum, include_root: bool) -> Option<Arc<BlockState>> {
        let inner = self.inner.lock();
        Self::search_on_branch_locked(&inner, h, block_num, include_root)
    }

    /// First element under best-branch order (spec §4.6 `head`).
    pub fn head(&self, include_root: bool) -> Option<Arc<BlockState>> {
        let inner = self.inner.lock();
        match inner.head_id() {
            Some(id) => inner.by_id.get(&id).cloned(),
            None if include_root => inner.root.clone(),
            None => None,
        }
    }

    /// Block-states from `h` to root (exclusive), capped at `block_num ≤
    /// trim_after`, head-to-root order (spec §4.6 `fetch_branch`).
    pub fn fetch_branch(&self, h: BlockId, trim_after: BlockNum) -> Result<Vec<Arc<BlockState>>, FinalityError> {
        let inner = self.inner.lock();
        let root = inner.root.as_ref().ok_or(FinalityError::RootNotSet)?;
        let mut out = Vec::new();
        let mut current_id = h;
        while current_id != root.id {
            let bs = inner.by_id.get(&current_id).ok_or(FinalityError::BlockNotFound)?.clone();
            current_id = bs.previous;
            if bs.block_num <= trim_after {
                out.push(bs);
            }
        }
        Ok(out)
    }

    /// Two-pointer walk to the branches from each head down to (but
    /// excluding) their shared ancestor (spec §4.6 `fetch_branch` two-head
    /// variant).
    pub fn fetch_branch_pair(
        &self,
        h_a: BlockId,
        h_b: BlockId,
    ) -> Result<(Vec<Arc<BlockState>>, Vec<Arc<BlockState>>), FinalityError> {
        let inner = self.inner.lock();
        let root = inner.root.as_ref().ok_or(FinalityError::RootNotSet)?.clone();

        if !inner.by_id.contains_key(&h_a) && h_a != root.id {
            return Err(FinalityError::BlockNotFound);
        }
        if !inner.by_id.contains_key(&h_b) && h_b != root.id {
            return Err(FinalityError::BlockNotFound);
        }

        let chain_to_root = |mut id: BlockId| -> Vec<Arc<BlockState>> {
            let mut chain = Vec::new();
            while id != root.id {
                let bs = inner.by_id.get(&id).expect("checked present above").clone();
                id = bs.previous;
                chain.push(bs);
            }
            chain
        };

        let chain_a = chain_to_root(h_a);
        let chain_b = chain_to_root(h_b);

        let ids_a: HashSet<BlockId> = chain_a.iter().map(|bs| bs.id).collect();
        let shared = chain_b.iter().map(|bs| bs.id).find(|id| ids_a.contains(id));

        let branch_a = match shared {
            Some(s) => chain_a.into_iter().take_while(|bs| bs.id != s).collect(),
            None => chain_a,
        };
        let branch_b = match shared {
            Some(s) => chain_b.into_iter().take_while(|bs| bs.id != s).collect(),
            None => chain_b,
        };

        Ok((branch_a, branch_b))
    }

    /// True iff walking `previous` from `d` reaches a block whose previous
    /// is `a`, bounded by `num(a) + 1`; the root is not consulted (spec
    /// §4.6 `is_descendant_of`).
    pub fn is_descendant_of(&self, a: BlockId, d: BlockId) -> bool {
        let inner = self.inner.lock();
        let a_num = a.num();
        let Some(mut current) = inner.by_id.get(&d).cloned() else { return false };
        loop {
            if current.previous == a {
                return true;
            }
            if current.block_num <= a_num + 1 {
                return false;
            }
            current = match inner.by_id.get(&current.previous) {
                Some(next) => next.clone(),
                None => return false,
            };
        }
    }

    /// Moves `root` forward to `id`, purging every subtree not on the path
    /// to the new root (spec §4.6 `advance_root`).
    pub fn advance_root(&self, id: BlockId) -> Result<(), FinalityError> {
        let mut inner = self.inner.lock();
        let new_root = inner.by_id.get(&id).cloned().ok_or(FinalityError::InvalidAdvanceRoot)?;
        if !new_root.is_valid() {
            return Err(FinalityError::InvalidAdvanceRoot);
        }
        let old_root = inner.root.clone().ok_or(FinalityError::RootNotSet)?;

        let mut path = Vec::new();
        let mut cursor = new_root.previous;
        loop {
            path.push(cursor);
            if cursor == old_root.id {
                break;
            }
            cursor = inner.by_id.get(&cursor).ok_or(FinalityError::InvalidAdvanceRoot)?.previous;
        }

        let mut kept_child = new_root.id;
        for ancestor_id in &path {
            let siblings = inner.by_previous.get(ancestor_id).cloned().unwrap_or_default();
            for sibling in siblings {
                if sibling != kept_child {
                    Self::remove_subtree_locked(&mut inner, sibling);
                }
            }
            kept_child = *ancestor_id;
        }

        for ancestor_id in &path {
            inner.by_id.remove(ancestor_id);
            inner.by_previous.remove(ancestor_id);
        }

        inner.by_id.remove(&new_root.id);
        inner.by_branch.remove(&BranchKey::of(&new_root));
        inner.root = Some(new_root);

        Ok(())
    }

    fn remove_subtree_locked(inner: &mut Inner, root_id: BlockId) {
        let mut stack = vec![root_id];
        while let Some(id) = stack.pop() {
            if let Some(children) = inner.by_previous.remove(&id) {
                stack.extend(children);
            }
            if let Some(bs) = inner.by_id.remove(&id) {
                inner.by_branch.remove(&BranchKey::of(&bs));
            }
        }
    }

    /// BFS deletion of the subtree rooted at `id` (spec §4.6 `remove`).
    pub fn remove(&self, id: BlockId) {
        let mut inner = self.inner.lock();
        Self::remove_subtree_locked(&mut inner, id);
    }

    /// Removes every block at or above `block_num` (spec §4.6 `remove`).
    pub fn remove_from(&self, block_num: BlockNum) {
        let mut inner = self.inner.lock();
        let ids: Vec<BlockId> =
            inner.by_id.iter().filter(|(_, bs)| bs.block_num >= block_num).map(|(id, _)| *id).collect();
        for id in ids {
            if inner.by_id.contains_key(&id) {
                Self::remove_subtree_locked(&mut inner, id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_state::NewBlock;
    use savanna_types::{BlockTimestamp, Digest, FinalizerAuthority, FinalizerPolicy, QcClaim};

    fn root_policy() -> Arc<FinalizerPolicy> {
        let key = savanna_types::BLSPublicKey::from_bytes(&[1u8; 96]).unwrap();
        Arc::new(FinalizerPolicy::new(0, 1, vec![FinalizerAuthority::new("a", 1, key).unwrap()]).unwrap())
    }

    fn block(num: u32, tail: u8, previous: BlockId, timestamp: BlockTimestamp, policy: &Arc<FinalizerPolicy>) -> Arc<BlockState> {
        let parent = BlockState::genesis(previous, 0, Digest::ZERO, policy.clone(), Digest::ZERO);
        let id = BlockId::from_num_and_digest(num, &[tail; 28]);
        BlockState::new(
            &parent,
            NewBlock {
                id,
                previous,
                timestamp,
                action_mroot: Digest::ZERO,
                proposed_policy_diff: None,
                qc_claim: QcClaim { block_num: 0, is_strong: false },
                claimed_block_timestamp: None,
                active_policy: policy.clone(),
                pending_policy: None,
                base_digest: Digest::ZERO,
            },
        )
        .unwrap()
    }

    fn child(num: u32, tail: u8, parent: &Arc<BlockState>, timestamp: BlockTimestamp, policy: &Arc<FinalizerPolicy>) -> Arc<BlockState> {
        let id = BlockId::from_num_and_digest(num, &[tail; 28]);
        BlockState::new(
            parent,
            NewBlock {
                id,
                previous: parent.id,
                timestamp,
                action_mroot: Digest::ZERO,
                proposed_policy_diff: None,
                qc_claim: QcClaim { block_num: 0, is_strong: false },
                claimed_block_timestamp: None,
                active_policy: policy.clone(),
                pending_policy: None,
                base_digest: Digest::ZERO,
            },
        )
        .unwrap()
    }

    #[test]
    fn first_block_since_reset_becomes_head() {
        let db = ForkDb::new();
        let policy = root_policy();
        let root = BlockState::genesis(BlockId::from_num_and_digest(100, &[0; 28]), 1, Digest::ZERO, policy.clone(), Digest::ZERO);
        db.reset_root(root.clone());

        let b = block(101, 1, root.id, 2, &policy);
        let outcome = db.add(b.clone(), None, OnDuplicate::Error, None).unwrap();
        assert_eq!(outcome, AddOutcome::Added);
        assert_eq!(db.head(false).unwrap().id, b.id);
    }

    #[test]
    fn fork_switch_detected_on_higher_qc_timestamp() {
        let db = ForkDb::new();
        let policy = root_policy();
        let root = BlockState::genesis(BlockId::from_num_and_digest(100, &[0; 28]), 1, Digest::ZERO, policy.clone(), Digest::ZERO);
        db.reset_root(root.clone());

        let mut a = block(101, 1, root.id, 2, &policy);
        db.add(a.clone(), None, OnDuplicate::Error, None).unwrap();
        for i in 102..=110u32 {
            a = child(i, i as u8, &a, i as u64, &policy);
            db.add(a.clone(), None, OnDuplicate::Error, None).unwrap();
        }
        assert_eq!(db.head(false).unwrap().id, a.id);

        let mut b = block(105, 200, root.id, 200, &policy);
        let outcome = db.add(b.clone(), None, OnDuplicate::Error, None).unwrap();
        assert_eq!(outcome, AddOutcome::ForkSwitch);
        for i in 106..=111u32 {
            b = child(i, (200 + i) as u8, &b, (200 + i) as u64, &policy);
            db.add(b.clone(), None, OnDuplicate::Error, None).unwrap();
        }
        assert_eq!(db.head(false).unwrap().id, b.id);
    }

    #[test]
    fn advance_root_purges_abandoned_subtree() {
        let db = ForkDb::new();
        let policy = root_policy();
        let root = BlockState::genesis(BlockId::from_num_and_digest(100, &[0; 28]), 1, Digest::ZERO, policy.clone(), Digest::ZERO);
        db.reset_root(root.clone());

        let a1 = block(101, 1, root.id, 2, &policy);
        db.add(a1.clone(), None, OnDuplicate::Error, None).unwrap();
        let a2 = child(102, 2, &a1, 3, &policy);
        db.add(a2.clone(), None, OnDuplicate::Error, None).unwrap();

        let b1 = child(102, 99, &a1, 4, &policy);
        db.add(b1.clone(), None, OnDuplicate::Error, None).unwrap();

        a1.mark_valid();
        db.advance_root(a1.id).unwrap();

        assert!(db.get(a2.id).is_some());
        assert!(db.get(b1.id).is_none());
        assert_eq!(db.root().unwrap().id, a1.id);
    }

    #[test]
    fn is_descendant_of_walks_previous_links() {
        let db = ForkDb::new();
        let policy = root_policy();
        let root = BlockState::genesis(BlockId::from_num_and_digest(100, &[0; 28]), 1, Digest::ZERO, policy.clone(), Digest::ZERO);
        db.reset_root(root.clone());

        let a1 = block(101, 1, root.id, 2, &policy);
        db.add(a1.clone(), None, OnDuplicate::Error, None).unwrap();
        let a2 = child(102, 2, &a1, 3, &policy);
        db.add(a2.clone(), None, OnDuplicate::Error, None).unwrap();

        assert!(db.is_descendant_of(a1.id, a2.id));
        assert!(!db.is_descendant_of(a2.id, a1.id));
    }
}
