use crate::digest::Digest;
use crate::error::TypesError;
use crate::signature::BLSPublicKey;
use crate::varint::{read_uvarint, write_uvarint};

/// A single weighted finalizer (spec §3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinalizerAuthority {
    pub description: String,
    pub weight: u64,
    pub public_key: BLSPublicKey,
}

impl FinalizerAuthority {
    pub fn new(description: impl Into<String>, weight: u64, public_key: BLSPublicKey) -> Result<Self, TypesError> {
        if weight == 0 {
            return Err(TypesError::ZeroWeight);
        }
        Ok(Self { description: description.into(), weight, public_key })
    }
}

/// A generation-stamped, weighted finalizer set with a voting threshold
/// (spec §3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinalizerPolicy {
    pub generation: u32,
    pub threshold: u64,
    pub finalizers: Vec<FinalizerAuthority>,
}

impl FinalizerPolicy {
    /// Validates the two invariants from spec §3:
    /// `sum(weights) >= threshold` and `threshold > sum(weights) / 2`.
    pub fn new(generation: u32, threshold: u64, finalizers: Vec<FinalizerAuthority>) -> Result<Self, PolicyError> {
        let policy = Self { generation, threshold, finalizers };
        policy.validate()?;
        Ok(policy)
    }

    pub fn total_weight(&self) -> u64 {
        self.finalizers.iter().map(|f| f.weight).sum()
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        let total = self.total_weight();
        if total < self.threshold {
            return Err(PolicyError::ThresholdExceedsWeight { total, threshold: self.threshold });
        }
        if self.threshold <= total / 2 {
            return Err(PolicyError::ThresholdNotSupermajority { total, threshold: self.threshold });
        }
        Ok(())
    }

    /// Canonical byte encoding (spec §4.3):
    /// `generation(u32 LE) ∥ threshold(u64 LE) ∥ varint len ∥ (desc_len ∥ desc ∥ weight ∥ 96-byte key)*`
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.generation.to_le_bytes());
        out.extend_from_slice(&self.threshold.to_le_bytes());
        write_uvarint(&mut out, self.finalizers.len() as u64);
        for f in &self.finalizers {
            write_uvarint(&mut out, f.description.len() as u64);
            out.extend_from_slice(f.description.as_bytes());
            out.extend_from_slice(&f.weight.to_le_bytes());
            out.extend_from_slice(f.public_key.as_bytes());
        }
        out
    }

    /// Digest of the canonical encoding (spec §3: "the policy digest is the
    /// hash of its canonical serialization").
    pub fn digest(&self) -> Digest {
        Digest::compute(&self.canonical_bytes())
    }

    pub fn position_of(&self, key: &BLSPublicKey) -> Option<usize> {
        self.finalizers.iter().position(|f| &f.public_key == key)
    }

    /// Inverse of [`Self::canonical_bytes`]: parses a policy off the front of
    /// `buf`, returning it together with the number of bytes consumed. Used
    /// by the finality proof wire format (spec §6), which embeds a policy
    /// using this exact encoding.
    pub fn from_canonical_bytes(buf: &[u8]) -> Result<(Self, usize), PolicyError> {
        if buf.len() < 12 {
            return Err(PolicyError::Decode("buffer too short for policy header".into()));
        }
        let generation = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let threshold = u64::from_le_bytes(buf[4..12].try_into().unwrap());
        let mut offset = 12;

        let (count, consumed) =
            read_uvarint(&buf[offset..]).ok_or_else(|| PolicyError::Decode("truncated finalizer count".into()))?;
        offset += consumed;

        let mut finalizers = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (desc_len, consumed) = read_uvarint(&buf[offset..])
                .ok_or_else(|| PolicyError::Decode("truncated description length".into()))?;
            offset += consumed;
            let desc_len = desc_len as usize;

            let entry_len = desc_len + 8 + BLSPublicKey::LEN;
            if buf.len() < offset + entry_len {
                return Err(PolicyError::Decode("truncated finalizer entry".into()));
            }
            let description =
                String::from_utf8(buf[offset..offset + desc_len].to_vec()).map_err(|e| PolicyError::Decode(e.to_string()))?;
            offset += desc_len;
            let weight = u64::from_le_bytes(buf[offset..offset + 8].try_into().unwrap());
            offset += 8;
            let public_key = BLSPublicKey::from_bytes(&buf[offset..offset + BLSPublicKey::LEN])
                .map_err(|e| PolicyError::Decode(e.to_string()))?;
            offset += BLSPublicKey::LEN;

            if weight == 0 {
                return Err(PolicyError::Decode("zero finalizer weight".into()));
            }
            finalizers.push(FinalizerAuthority { description, weight, public_key });
        }

        let policy = FinalizerPolicy::new(generation, threshold, finalizers)?;
        Ok((policy, offset))
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("policy threshold {threshold} exceeds total finalizer weight {total}")]
    ThresholdExceedsWeight { total: u64, threshold: u64 },
    #[error("policy threshold {threshold} is not a strict supermajority of total weight {total}")]
    ThresholdNotSupermajority { total: u64, threshold: u64 },
    #[error("decode error: {0}")]
    Decode(String),
}

/// A single changed/added/removed finalizer slot between two policies,
/// keyed by position — the diff is over *slots*, not identities, mirroring
/// how the original block extension carries a positional diff against the
/// parent's proposed policy rather than a full replacement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FinalizerSlotDiff {
    Unchanged,
    Changed(FinalizerAuthority),
    Removed,
    Added(FinalizerAuthority),
}

/// A compact delta between two [`FinalizerPolicy`] values (spec §4.3:
/// "Supports `diff` ... and `apply_diff`").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyDiff {
    pub new_generation: u32,
    pub new_threshold: u64,
    pub slots: Vec<FinalizerSlotDiff>,
}

/// Produce the delta that turns `from` into `to`.
pub fn diff(from: &FinalizerPolicy, to: &FinalizerPolicy) -> PolicyDiff {
    let len = from.finalizers.len().max(to.finalizers.len());
    let mut slots = Vec::with_capacity(len);
    for i in 0..len {
        let a = from.finalizers.get(i);
        let b = to.finalizers.get(i);
        let slot = match (a, b) {
            (Some(a), Some(b)) if a == b => FinalizerSlotDiff::Unchanged,
            (Some(_), Some(b)) => FinalizerSlotDiff::Changed(b.clone()),
            (Some(_), None) => FinalizerSlotDiff::Removed,
            (None, Some(b)) => FinalizerSlotDiff::Added(b.clone()),
            (None, None) => unreachable!("i < len implies at least one side has a slot"),
        };
        slots.push(slot);
    }
    PolicyDiff { new_generation: to.generation, new_threshold: to.threshold, slots }
}

/// Reconstruct a policy from a prior one plus its delta. Deterministic and
/// the exact inverse of [`diff`]: `apply_diff(from, diff(from, to)) == to`.
pub fn apply_diff(from: &FinalizerPolicy, delta: &PolicyDiff) -> Result<FinalizerPolicy, PolicyError> {
    let mut finalizers = Vec::with_capacity(delta.slots.len());
    for (i, slot) in delta.slots.iter().enumerate() {
        match slot {
            FinalizerSlotDiff::Unchanged => {
                let existing = from.finalizers.get(i).ok_or_else(|| {
                    PolicyError::Decode(format!("unchanged slot {i} has no predecessor"))
                })?;
                finalizers.push(existing.clone());
            }
            FinalizerSlotDiff::Changed(f) | FinalizerSlotDiff::Added(f) => finalizers.push(f.clone()),
            FinalizerSlotDiff::Removed => {}
        }
    }
    FinalizerPolicy::new(delta.new_generation, delta.new_threshold, finalizers)
}
