//! Wire encoding for the finality proof package (spec §6: "Finality proof
//! wire format"). Hand-rolled over `bytes::{Buf, BufMut}`, matching
//! `savanna-forkdb::snapshot`'s approach — the byte layout is the contract
//! here, not a general-purpose derive.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use savanna_types::{varint, BLSSignature, Bitset, BlockNum, Digest, FinalizerPolicy, QcSig};

use crate::error::ProofError;

/// `qc_block_finality_data` (spec §6), extended with the QC block's own
/// `strong_digest`. The four spec-listed fields are enough to recompute
/// `finality_digest` for promotion bookkeeping, but BLS votes are signed
/// over `strong_digest` (spec §3), which none of those four fields
/// determine on their own — so it travels alongside them on the wire. See
/// DESIGN.md.
#[derive(Clone, Debug, PartialEq)]
pub struct QcBlockFinalityData {
    pub active_gen: u32,
    pub pending_gen: Option<u32>,
    pub final_on_strong_qc_block_num: BlockNum,
    pub finality_mroot: Digest,
    pub witness_hash: Digest,
    pub strong_digest: Digest,
}

/// `merkle_proof` (spec §6): `{target_index, last_index, siblings}`. The
/// leaf value itself travels separately in the package, the way
/// `savanna_crypto::MerkleProof` keeps `leaf` distinct from `index` and
/// `leaf_count` — the verifier recomputes the leaf it expects rather than
/// trusting one carried on the wire.
#[derive(Clone, Debug, PartialEq)]
pub struct MerkleInclusion {
    pub target_index: u64,
    pub last_index: u64,
    pub siblings: Vec<Digest>,
}

impl MerkleInclusion {
    /// `last_index` is the highest valid leaf index, one less than the leaf
    /// count `savanna_crypto::MerkleProof` expects.
    pub fn leaf_count(&self) -> u64 {
        self.last_index + 1
    }

    pub fn to_merkle_proof(&self, leaf: Digest) -> savanna_crypto::MerkleProof {
        savanna_crypto::MerkleProof {
            leaf,
            index: self.target_index as usize,
            leaf_count: self.leaf_count() as usize,
            siblings: self.siblings.clone(),
        }
    }

    pub fn from_merkle_proof(proof: &savanna_crypto::MerkleProof) -> Self {
        Self {
            target_index: proof.index as u64,
            last_index: proof.leaf_count as u64 - 1,
            siblings: proof.siblings.clone(),
        }
    }
}

pub(crate) fn put_digest(buf: &mut BytesMut, d: &Digest) {
    buf.put_slice(d.as_bytes());
}

pub(crate) fn get_digest(buf: &mut Bytes) -> Result<Digest, ProofError> {
    if buf.remaining() < Digest::LEN {
        return Err(ProofError::WireCorrupt("truncated digest".into()));
    }
    let mut bytes = [0u8; 32];
    buf.copy_to_slice(&mut bytes);
    Ok(Digest::from_bytes(bytes))
}

pub(crate) fn put_policy(buf: &mut BytesMut, policy: &FinalizerPolicy) {
    buf.put_slice(&policy.canonical_bytes());
}

pub(crate) fn get_policy(buf: &mut Bytes) -> Result<FinalizerPolicy, ProofError> {
    let (policy, consumed) = FinalizerPolicy::from_canonical_bytes(buf.chunk())
        .map_err(|e| ProofError::WireCorrupt(format!("malformed finalizer policy: {e}")))?;
    buf.advance(consumed);
    Ok(policy)
}

fn put_bitset_opt(buf: &mut BytesMut, b: &Option<Bitset>) {
    match b {
        Some(bitset) => {
            buf.put_u8(1);
            buf.put_slice(&bitset.to_wire_bytes());
        }
        None => buf.put_u8(0),
    }
}

fn get_bitset_opt(buf: &mut Bytes) -> Result<Option<Bitset>, ProofError> {
    if !buf.has_remaining() {
        return Err(ProofError::WireCorrupt("truncated bitset presence flag".into()));
    }
    if buf.get_u8() == 0 {
        return Ok(None);
    }
    let (bitset, consumed) =
        Bitset::from_wire_bytes(buf.chunk()).ok_or_else(|| ProofError::WireCorrupt("malformed bitset".into()))?;
    buf.advance(consumed);
    Ok(Some(bitset))
}

pub(crate) fn put_qc_sig(buf: &mut BytesMut, sig: &QcSig) {
    put_bitset_opt(buf, &sig.strong_votes);
    put_bitset_opt(buf, &sig.weak_votes);
    buf.put_slice(sig.aggregate_signature.as_bytes());
}

pub(crate) fn get_qc_sig(buf: &mut Bytes) -> Result<QcSig, ProofError> {
    let strong_votes = get_bitset_opt(buf)?;
    let weak_votes = get_bitset_opt(buf)?;
    if buf.remaining() < BLSSignature::LEN {
        return Err(ProofError::WireCorrupt("truncated aggregate signature".into()));
    }
    let mut sig_bytes = [0u8; 96];
    buf.copy_to_slice(&mut sig_bytes);
    let aggregate_signature =
        BLSSignature::from_bytes(&sig_bytes).map_err(|e| ProofError::WireCorrupt(e.to_string()))?;
    Ok(QcSig { strong_votes, weak_votes, aggregate_signature })
}

pub(crate) fn put_finality_data(buf: &mut BytesMut, d: &QcBlockFinalityData) {
    buf.put_u32_le(d.active_gen);
    match d.pending_gen {
        Some(gen) => {
            buf.put_u8(1);
            buf.put_u32_le(gen);
        }
        None => buf.put_u8(0),
    }
    buf.put_u32_le(d.final_on_strong_qc_block_num);
    put_digest(buf, &d.finality_mroot);
    put_digest(buf, &d.witness_hash);
    put_digest(buf, &d.strong_digest);
}

pub(crate) fn get_finality_data(buf: &mut Bytes) -> Result<QcBlockFinalityData, ProofError> {
    if buf.remaining() < 4 {
        return Err(ProofError::WireCorrupt("truncated active_gen".into()));
    }
    let active_gen = buf.get_u32_le();
    if !buf.has_remaining() {
        return Err(ProofError::WireCorrupt("truncated pending_gen presence flag".into()));
    }
    let pending_gen = if buf.get_u8() == 1 {
        if buf.remaining() < 4 {
            return Err(ProofError::WireCorrupt("truncated pending_gen".into()));
        }
        Some(buf.get_u32_le())
    } else {
        None
    };
    if buf.remaining() < 4 {
        return Err(ProofError::WireCorrupt("truncated final_on_strong_qc_block_num".into()));
    }
    let final_on_strong_qc_block_num = buf.get_u32_le();
    let finality_mroot = get_digest(buf)?;
    let witness_hash = get_digest(buf)?;
    let strong_digest = get_digest(buf)?;
    Ok(QcBlockFinalityData { active_gen, pending_gen, final_on_strong_qc_block_num, finality_mroot, witness_hash, strong_digest })
}

pub(crate) fn put_merkle_inclusion(buf: &mut BytesMut, m: &MerkleInclusion) {
    buf.put_u64_le(m.target_index);
    buf.put_u64_le(m.last_index);
    let mut count_buf = Vec::new();
    varint::write_uvarint(&mut count_buf, m.siblings.len() as u64);
    buf.put_slice(&count_buf);
    for sibling in &m.siblings {
        put_digest(buf, sibling);
    }
}

pub(crate) fn get_merkle_inclusion(buf: &mut Bytes) -> Result<MerkleInclusion, ProofError> {
    if buf.remaining() < 16 {
        return Err(ProofError::WireCorrupt("truncated merkle proof indices".into()));
    }
    let target_index = buf.get_u64_le();
    let last_index = buf.get_u64_le();
    let (count, consumed) =
        varint::read_uvarint(buf.chunk()).ok_or_else(|| ProofError::WireCorrupt("truncated sibling count".into()))?;
    buf.advance(consumed);
    let mut siblings = Vec::with_capacity(count as usize);
    for _ in 0..count {
        siblings.push(get_digest(buf)?);
    }
    Ok(MerkleInclusion { target_index, last_index, siblings })
}

#[cfg(test)]
mod tests {
    use super::*;
    use savanna_types::{BLSPublicKey, FinalizerAuthority};

    fn sample_policy() -> FinalizerPolicy {
        let key = |b: u8| BLSPublicKey::from_bytes(&[b; 96]).unwrap();
        FinalizerPolicy::new(
            3,
            4,
            vec![
                FinalizerAuthority::new("a", 1, key(1)).unwrap(),
                FinalizerAuthority::new("b", 2, key(2)).unwrap(),
                FinalizerAuthority::new("c", 3, key(3)).unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn policy_roundtrip() {
        let policy = sample_policy();
        let mut buf = BytesMut::new();
        put_policy(&mut buf, &policy);
        let mut bytes = buf.freeze();
        let decoded = get_policy(&mut bytes).unwrap();
        assert_eq!(decoded, policy);
        assert!(!bytes.has_remaining());
    }

    #[test]
    fn finality_data_roundtrip_with_and_without_pending_gen() {
        for pending_gen in [None, Some(9u32)] {
            let data = QcBlockFinalityData {
                active_gen: 3,
                pending_gen,
                final_on_strong_qc_block_num: 100,
                finality_mroot: Digest::compute(b"mroot"),
                witness_hash: Digest::compute(b"witness"),
                strong_digest: Digest::compute(b"strong"),
            };
            let mut buf = BytesMut::new();
            put_finality_data(&mut buf, &data);
            let mut bytes = buf.freeze();
            let decoded = get_finality_data(&mut bytes).unwrap();
            assert_eq!(decoded, data);
            assert!(!bytes.has_remaining());
        }
    }

    #[test]
    fn merkle_inclusion_roundtrip() {
        let m = MerkleInclusion {
            target_index: 2,
            last_index: 7,
            siblings: vec![Digest::compute(b"s1"), Digest::compute(b"s2")],
        };
        let mut buf = BytesMut::new();
        put_merkle_inclusion(&mut buf, &m);
        let mut bytes = buf.freeze();
        let decoded = get_merkle_inclusion(&mut bytes).unwrap();
        assert_eq!(decoded, m);
    }

    #[test]
    fn truncated_finality_data_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(1);
        let mut bytes = buf.freeze();
        assert!(get_finality_data(&mut bytes).is_err());
    }
}
