use blst::min_pk::{AggregatePublicKey, AggregateSignature, PublicKey, Signature};
use blst::BLST_ERROR;
use savanna_types::{BLSPublicKey, BLSSignature, Digest};

use crate::error::CryptoError;

/// Ciphersuite used for all BLS signing and verification in this core,
/// matching the min_pk variant (public keys in G1, signatures in G2).
const BLS_SIG_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

/// Prefix hashed in front of `strong_digest` to derive the message a weak
/// vote signs, keeping weak and strong votes on the same block
/// unambiguous even though both start from the same digest.
const WEAK_VOTE_SIG_PREFIX: &[u8] = savanna_types::domain::WEAK_VOTE_SIG_PREFIX;

fn parse_public_key(pk: &BLSPublicKey) -> Result<PublicKey, CryptoError> {
    PublicKey::deserialize(pk.as_bytes()).map_err(|_| CryptoError::InvalidPublicKey)
}

fn parse_signature(sig: &BLSSignature) -> Result<Signature, CryptoError> {
    Signature::uncompress(sig.as_bytes()).map_err(|_| CryptoError::InvalidSignature)
}

/// Message a finalizer signs for a given vote: `strong_digest` itself for
/// a strong vote, or `H(WEAK_BLS_SIG_PREFIX ∥ strong_digest)` for a weak one.
pub fn vote_signing_message(strong_digest: &Digest, strong: bool) -> Digest {
    if strong {
        *strong_digest
    } else {
        Digest::compute_multi(&[WEAK_VOTE_SIG_PREFIX, strong_digest.as_bytes()])
    }
}

/// Aggregate public keys into one, used to verify the combined signature
/// of all voters present in a quorum certificate.
pub fn aggregate_pubkeys(keys: &[BLSPublicKey]) -> Result<BLSPublicKey, CryptoError> {
    if keys.is_empty() {
        return Err(CryptoError::EmptyAggregation);
    }
    let parsed = keys.iter().map(parse_public_key).collect::<Result<Vec<_>, _>>()?;
    let refs: Vec<&PublicKey> = parsed.iter().collect();
    let agg = AggregatePublicKey::aggregate(&refs, true).map_err(|_| CryptoError::InvalidPublicKey)?;
    Ok(BLSPublicKey::from_bytes(&agg.to_public_key().serialize()).expect("blst pubkey is always 96 bytes"))
}

/// Aggregate signatures into one, used to combine finalizer votes into a
/// single quorum certificate signature.
pub fn aggregate_signatures(sigs: &[BLSSignature]) -> Result<BLSSignature, CryptoError> {
    if sigs.is_empty() {
        return Err(CryptoError::EmptyAggregation);
    }
    let parsed = sigs.iter().map(parse_signature).collect::<Result<Vec<_>, _>>()?;
    let refs: Vec<&Signature> = parsed.iter().collect();
    let agg = AggregateSignature::aggregate(&refs, true).map_err(|_| CryptoError::InvalidSignature)?;
    Ok(BLSSignature::from_bytes(&agg.to_signature().compress()).expect("blst signature is always 96 bytes"))
}

/// Verify an aggregate signature against an aggregate public key and a
/// single message, as used to validate a block's quorum certificate.
pub fn verify(agg_pub: &BLSPublicKey, sig: &BLSSignature, msg: &[u8]) -> Result<(), CryptoError> {
    let pk = parse_public_key(agg_pub)?;
    let sig = parse_signature(sig)?;
    let result = sig.verify(true, msg, BLS_SIG_DST, &[], &pk, false);
    if result == BLST_ERROR::BLST_SUCCESS {
        Ok(())
    } else {
        Err(CryptoError::VerificationFailed)
    }
}

/// Verify a signature that aggregates votes over more than one distinct
/// message — a strong/weak QC pair, where the strong voters signed
/// `strong_digest` and the weak voters signed the weak message (spec §4.8
/// step 2: "verify the aggregate signature against ... the pair of
/// (strong, weak) digests"). Each `(pubkey, message)` pair stands for one
/// already-aggregated group, not one finalizer, so this is typically
/// called with exactly two pairs.
pub fn verify_aggregate(pairs: &[(&BLSPublicKey, &[u8])], sig: &BLSSignature) -> Result<(), CryptoError> {
    if pairs.is_empty() {
        return Err(CryptoError::EmptyAggregation);
    }
    let parsed_pks = pairs.iter().map(|(pk, _)| parse_public_key(pk)).collect::<Result<Vec<_>, _>>()?;
    let pk_refs: Vec<&PublicKey> = parsed_pks.iter().collect();
    let msgs: Vec<&[u8]> = pairs.iter().map(|(_, msg)| *msg).collect();
    let sig = parse_signature(sig)?;
    let result = sig.aggregate_verify(true, &msgs, BLS_SIG_DST, &pk_refs, false);
    if result == BLST_ERROR::BLST_SUCCESS {
        Ok(())
    } else {
        Err(CryptoError::VerificationFailed)
    }
}

/// Incrementally aggregates signatures one at a time, O(1) per addition,
/// so a quorum certificate's running aggregate never re-aggregates the
/// whole vote set on each new vote.
#[derive(Default)]
pub struct SignatureAccumulator(Option<AggregateSignature>);

impl SignatureAccumulator {
    pub fn new() -> Self {
        Self(None)
    }

    pub fn add(&mut self, sig: &BLSSignature) -> Result<(), CryptoError> {
        let parsed = parse_signature(sig)?;
        match &mut self.0 {
            Some(acc) => acc.add_signature(&parsed, true).map_err(|_| CryptoError::InvalidSignature)?,
            None => self.0 = Some(AggregateSignature::from_signature(&parsed)),
        }
        Ok(())
    }

    pub fn finalize(&self) -> Option<BLSSignature> {
        self.0.as_ref().map(|acc| {
            BLSSignature::from_bytes(&acc.to_signature().compress()).expect("blst signature is always 96 bytes")
        })
    }
}

/// Sign `msg` with a raw secret key, used only by test harnesses that need
/// to produce finalizer votes without a real keystore.
#[cfg(any(test, feature = "test-support"))]
pub fn sign_for_tests(secret_key: &blst::min_pk::SecretKey, msg: &[u8]) -> BLSSignature {
    let sig = secret_key.sign(msg, BLS_SIG_DST, &[]);
    BLSSignature::from_bytes(&sig.compress()).expect("blst signature is always 96 bytes")
}
