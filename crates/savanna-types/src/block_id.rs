use crate::error::TypesError;
use std::fmt;
use std::str::FromStr;

/// Block number, as carried in the first four bytes of a [`BlockId`].
pub type BlockNum = u32;

/// Monotonically non-decreasing slot timestamp (spec §3).
pub type BlockTimestamp = u64;

/// 32-byte block identifier. The first 4 bytes encode the block number in
/// big-endian, matching the teacher's `Hash`-as-identifier convention but
/// with the number folded into the value itself per spec §3, so that
/// `num(id)` is a pure, allocation-free accessor and ordering by id also
/// orders by the embedded block number for ids sharing the same prefix
/// source.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BlockId([u8; 32]);

impl BlockId {
    pub const LEN: usize = 32;

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self, TypesError> {
        if slice.len() != 32 {
            return Err(TypesError::InvalidBlockIdLength(slice.len()));
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Build a block id from a block number and a 28-byte content digest
    /// (e.g. the low bytes of a header hash), matching how the original
    /// chain folds the height into the id so forks at the same height never
    /// collide by height alone.
    pub fn from_num_and_digest(num: BlockNum, digest_tail: &[u8; 28]) -> Self {
        let mut bytes = [0u8; 32];
        bytes[0..4].copy_from_slice(&num.to_be_bytes());
        bytes[4..32].copy_from_slice(digest_tail);
        Self(bytes)
    }

    /// Extract the big-endian block number encoded in the first 4 bytes.
    pub fn num(&self) -> BlockNum {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId(num={}, 0x{})", self.num(), self.to_hex())
    }
}

impl FromStr for BlockId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }
}

impl AsRef<[u8]> for BlockId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<crate::digest::Digest> for BlockId {
    fn from(d: crate::digest::Digest) -> Self {
        Self(*d.as_bytes())
    }
}

/// Extract the block number encoded in a block id (spec §3: `num(id)`).
pub fn num(id: &BlockId) -> BlockNum {
    id.num()
}
