//! On-disk fork-database restart format (spec §6). Used only for graceful
//! restart, never for interchange: the file is consumed and deleted on
//! open, and corruption is always fatal rather than partially recovered.
//!
//! This module persists and restores the *record* view of a block-state
//! (identity, digests, QC claim and completed QC if any). Re-hydrating a
//! live [`crate::block_state::BlockState`] tree from those records — which
//! needs the active/pending `FinalizerPolicy` objects in scope — is the
//! finality controller's job on restart, not this module's.

use std::fs;
use std::path::Path;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use savanna_types::{varint, BLSSignature, Bitset, BlockId, BlockNum, BlockTimestamp, Digest, FinalityError, Qc, QcClaim, QcSig};

use crate::block_state::BlockState;

const MAGIC: u32 = 0x5341_564E; // b"SAVN" as big-endian u32
const VERSION_LEGACY: u32 = 1;
const VERSION_REJECTED: u32 = 2;
const VERSION_SAVANNA: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum InUse {
    Legacy,
    Savanna,
    Both,
}

impl InUse {
    fn to_u32(self) -> u32 {
        match self {
            InUse::Legacy => 0,
            InUse::Savanna => 1,
            InUse::Both => 2,
        }
    }

    fn from_u32(v: u32) -> Result<Self, FinalityError> {
        match v {
            0 => Ok(InUse::Legacy),
            1 => Ok(InUse::Savanna),
            2 => Ok(InUse::Both),
            other => Err(FinalityError::SnapshotCorrupt(format!("unknown in_use tag {other}"))),
        }
    }
}

/// Flat, serializable view of one block-state (spec §6 `section`'s
/// per-block entries).
#[derive(Clone, Debug, PartialEq)]
pub struct BlockStateRecord {
    pub id: BlockId,
    pub previous: BlockId,
    pub block_num: BlockNum,
    pub timestamp: BlockTimestamp,
    pub latest_qc_block_timestamp: BlockTimestamp,
    pub strong_digest: Digest,
    pub weak_digest: Digest,
    pub finality_digest: Digest,
    pub finality_leaf: Digest,
    pub finality_mroot: Digest,
    pub action_mroot: Digest,
    pub qc_claim: QcClaim,
    pub qc: Option<Qc>,
}

impl From<&BlockState> for BlockStateRecord {
    fn from(bs: &BlockState) -> Self {
        Self {
            id: bs.id,
            previous: bs.previous,
            block_num: bs.block_num,
            timestamp: bs.timestamp,
            latest_qc_block_timestamp: bs.latest_qc_block_timestamp,
            strong_digest: bs.strong_digest,
            weak_digest: bs.weak_digest,
            finality_digest: bs.finality_digest,
            finality_leaf: bs.finality_leaf,
            finality_mroot: bs.finality_mroot,
            action_mroot: bs.action_mroot,
            qc_claim: bs.qc_claim,
            qc: bs.qc(),
        }
    }
}

fn put_digest(buf: &mut BytesMut, d: &Digest) {
    buf.put_slice(d.as_bytes());
}

fn get_digest(buf: &mut Bytes) -> Result<Digest, FinalityError> {
    if buf.remaining() < Digest::LEN {
        return Err(FinalityError::SnapshotCorrupt("truncated digest".into()));
    }
    let mut bytes = [0u8; 32];
    buf.copy_to_slice(&mut bytes);
    Ok(Digest::from_bytes(bytes))
}

fn put_block_id(buf: &mut BytesMut, id: &BlockId) {
    buf.put_slice(id.as_bytes());
}

fn get_block_id(buf: &mut Bytes) -> Result<BlockId, FinalityError> {
    if buf.remaining() < BlockId::LEN {
        return Err(FinalityError::SnapshotCorrupt("truncated block id".into()));
    }
    let mut bytes = [0u8; 32];
    buf.copy_to_slice(&mut bytes);
    Ok(BlockId::from_bytes(bytes))
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

fn get_bitset_opt(buf: &mut Bytes) -> Result<Option<Bitset>, FinalityError> {
    if !buf.has_remaining() {
        return Err(FinalityError::SnapshotCorrupt("truncated bitset presence flag".into()));
    }
    let present = buf.get_u8();
    if present == 0 {
        return Ok(None);
    }
    let remaining = buf.chunk();
    let (bitset, consumed) =
        Bitset::from_wire_bytes(remaining).ok_or_else(|| FinalityError::SnapshotCorrupt("malformed bitset".into()))?;
    buf.advance(consumed);
    Ok(Some(bitset))
}

fn put_qc_sig(buf: &mut BytesMut, sig: &QcSig) {
    put_bitset_opt(buf, &sig.strong_votes);
    put_bitset_opt(buf, &sig.weak_votes);
    buf.put_slice(sig.aggregate_signature.as_bytes());
}

fn get_qc_sig(buf: &mut Bytes) -> Result<QcSig, FinalityError> {
    let strong_votes = get_bitset_opt(buf)?;
    let weak_votes = get_bitset_opt(buf)?;
    if buf.remaining() < BLSSignature::LEN {
        return Err(FinalityError::SnapshotCorrupt("truncated aggregate signature".into()));
    }
    let mut sig_bytes = [0u8; 96];
    buf.copy_to_slice(&mut sig_bytes);
    let aggregate_signature =
        BLSSignature::from_bytes(&sig_bytes).map_err(|e| FinalityError::SnapshotCorrupt(e.to_string()))?;
    Ok(QcSig { strong_votes, weak_votes, aggregate_signature })
}

fn put_qc_opt(buf: &mut BytesMut, qc: &Option<Qc>) {
    match qc {
        Some(qc) => {
            buf.put_u8(1);
            buf.put_u32_le(qc.block_num);
            put_qc_sig(buf, &qc.active_qc_sig);
            match &qc.pending_qc_sig {
                Some(pending) => {
                    buf.put_u8(1);
                    put_qc_sig(buf, pending);
                }
                None => buf.put_u8(0),
            }
        }
        None => buf.put_u8(0),
    }
}

fn get_qc_opt(buf: &mut Bytes) -> Result<Option<Qc>, FinalityError> {
    if !buf.has_remaining() {
        return Err(FinalityError::SnapshotCorrupt("truncated qc presence flag".into()));
    }
    if buf.get_u8() == 0 {
        return Ok(None);
    }
    if buf.remaining() < 4 {
        return Err(FinalityError::SnapshotCorrupt("truncated qc block_num".into()));
    }
    let block_num = buf.get_u32_le();
    let active_qc_sig = get_qc_sig(buf)?;
    if !buf.has_remaining() {
        return Err(FinalityError::SnapshotCorrupt("truncated pending qc presence flag".into()));
    }
    let pending_qc_sig = if buf.get_u8() == 1 { Some(get_qc_sig(buf)?) } else { None };
    Ok(Some(Qc { block_num, active_qc_sig, pending_qc_sig }))
}

fn encode_record(buf: &mut BytesMut, r: &BlockStateRecord) {
    put_block_id(buf, &r.id);
    put_block_id(buf, &r.previous);
    buf.put_u32_le(r.block_num);
    buf.put_u64_le(r.timestamp);
    buf.put_u64_le(r.latest_qc_block_timestamp);
    put_digest(buf, &r.strong_digest);
    put_digest(buf, &r.weak_digest);
    put_digest(buf, &r.finality_digest);
    put_digest(buf, &r.finality_leaf);
    put_digest(buf, &r.finality_mroot);
    put_digest(buf, &r.action_mroot);
    buf.put_u32_le(r.qc_claim.block_num);
    buf.put_u8(u8::from(r.qc_claim.is_strong));
    put_qc_opt(buf, &r.qc);
}

fn decode_record(buf: &mut Bytes) -> Result<BlockStateRecord, FinalityError> {
    let id = get_block_id(buf)?;
    let previous = get_block_id(buf)?;
    if buf.remaining() < 20 {
        return Err(FinalityError::SnapshotCorrupt("truncated block-state header".into()));
    }
    let block_num = buf.get_u32_le();
    let timestamp = buf.get_u64_le();
    let latest_qc_block_timestamp = buf.get_u64_le();
    let strong_digest = get_digest(buf)?;
    let weak_digest = get_digest(buf)?;
    let finality_digest = get_digest(buf)?;
    let finality_leaf = get_digest(buf)?;
    let finality_mroot = get_digest(buf)?;
    let action_mroot = get_digest(buf)?;
    if buf.remaining() < 5 {
        return Err(FinalityError::SnapshotCorrupt("truncated qc claim".into()));
    }
    let qc_claim = QcClaim { block_num: buf.get_u32_le(), is_strong: buf.get_u8() != 0 };
    let qc = get_qc_opt(buf)?;

    Ok(BlockStateRecord {
        id,
        previous,
        block_num,
        timestamp,
        latest_qc_block_timestamp,
        strong_digest,
        weak_digest,
        finality_digest,
        finality_leaf,
        finality_mroot,
        action_mroot,
        qc_claim,
        qc,
    })
}

/// Encode one snapshot section: `pending_savanna_lib_id ∥ root record ∥
/// varint count ∥ count × record` (spec §6 `section`), with the remaining
/// records in reverse best-branch order as supplied by the caller.
fn encode_section(pending_lib_id: BlockId, root: &BlockStateRecord, records: &[BlockStateRecord]) -> BytesMut {
    let mut buf = BytesMut::new();
    put_block_id(&mut buf, &pending_lib_id);
    encode_record(&mut buf, root);
    let mut count_buf = Vec::new();
    varint::write_uvarint(&mut count_buf, records.len() as u64);
    buf.put_slice(&count_buf);
    for record in records {
        encode_record(&mut buf, record);
    }
    buf
}

fn decode_section(buf: &mut Bytes) -> Result<(BlockId, BlockStateRecord, Vec<BlockStateRecord>), FinalityError> {
    let pending_lib_id = get_block_id(buf)?;
    let root = decode_record(buf)?;
    let (count, consumed) =
        varint::read_uvarint(buf.chunk()).ok_or_else(|| FinalityError::SnapshotCorrupt("malformed record count".into()))?;
    buf.advance(consumed);
    let mut records = Vec::with_capacity(count as usize);
    for _ in 0..count {
        records.push(decode_record(buf)?);
    }
    Ok((pending_lib_id, root, records))
}

/// Serialize a full snapshot file. Always writes a Savanna-only file
/// (`legacy_valid = 0`); this core never produces or consumes the legacy
/// section (spec §9 "specialise to Savanna and delete the legacy arm").
pub fn encode_file(pending_lib_id: BlockId, root: &BlockStateRecord, records: &[BlockStateRecord]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u32_le(MAGIC);
    buf.put_u32_le(VERSION_SAVANNA);
    buf.put_u32_le(InUse::Savanna.to_u32());
    buf.put_u8(0); // legacy_valid
    buf.put_u8(1); // savanna_valid
    buf.put_slice(&encode_section(pending_lib_id, root, records));
    buf.to_vec()
}

/// Parse a snapshot file's bytes. Returns `Ok(None)` for a valid-but-empty
/// database (no savanna section present); never returns `Ok(Some(..))`
/// carrying a legacy section, since this core cannot interpret one.
pub fn decode_file(bytes: &[u8]) -> Result<Option<(BlockId, BlockStateRecord, Vec<BlockStateRecord>)>, FinalityError> {
    if bytes.is_empty() {
        return Ok(None);
    }
    let mut buf = Bytes::copy_from_slice(bytes);
    if buf.remaining() < 12 {
        return Err(FinalityError::SnapshotCorrupt("truncated file header".into()));
    }
    let magic = buf.get_u32_le();
    if magic != MAGIC {
        return Err(FinalityError::SnapshotCorrupt(format!("bad magic {magic:#x}")));
    }
    let version = buf.get_u32_le();
    if version == VERSION_REJECTED {
        return Err(FinalityError::SnapshotCorrupt("version 2 is explicitly rejected".into()));
    }
    if version != VERSION_LEGACY && version != VERSION_SAVANNA {
        return Err(FinalityError::SnapshotCorrupt(format!("unsupported version {version}")));
    }
    let _in_use = InUse::from_u32(buf.get_u32_le())?;

    if !buf.has_remaining() {
        return Err(FinalityError::SnapshotCorrupt("truncated legacy_valid flag".into()));
    }
    let legacy_valid = buf.get_u8() != 0;
    if legacy_valid {
        return Err(FinalityError::SnapshotCorrupt("legacy section present but unsupported by this build".into()));
    }

    if !buf.has_remaining() {
        return Err(FinalityError::SnapshotCorrupt("truncated savanna_valid flag".into()));
    }
    let savanna_valid = buf.get_u8() != 0;
    if !savanna_valid {
        return Ok(None);
    }

    decode_section(&mut buf).map(Some)
}

/// Read a snapshot from `path`, consuming (deleting) the file if present.
/// A missing file and an empty file both yield an empty database.
pub fn read_and_consume(path: &Path) -> Result<Option<(BlockId, BlockStateRecord, Vec<BlockStateRecord>)>, FinalityError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(FinalityError::SnapshotCorrupt(e.to_string())),
    };
    let result = decode_file(&bytes)?;
    let _ = fs::remove_file(path);
    Ok(result)
}

/// Write a snapshot to `path`, overwriting any existing file.
pub fn write(path: &Path, pending_lib_id: BlockId, root: &BlockStateRecord, records: &[BlockStateRecord]) -> Result<(), FinalityError> {
    let bytes = encode_file(pending_lib_id, root, records);
    fs::write(path, bytes).map_err(|e| FinalityError::SnapshotCorrupt(e.to_string()))
}
