use crate::error::TypesError;
use std::fmt;

/// BLS12-381 public key: a G1 point in uncompressed affine form, 96 bytes,
/// little-endian (spec §3, §4.2). Uncompressed rather than the more usual
/// 48-byte compressed form, because §6's wire format gives signatures and
/// public keys the same nominal size class and the 96-byte `agg_sig` in
/// that table only lines up with a *compressed* G2 point — which forces
/// public keys (G1) to the uncompressed encoding to hit 96 bytes. See
/// DESIGN.md for the full reasoning.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct BLSPublicKey(Vec<u8>);

impl BLSPublicKey {
    pub const LEN: usize = 96;

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TypesError> {
        if bytes.len() != Self::LEN {
            return Err(TypesError::InvalidPublicKeyLength {
                expected: Self::LEN,
                actual: bytes.len(),
            });
        }
        Ok(Self(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl fmt::Debug for BLSPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BLSPublicKey(0x{}...)", &hex::encode(&self.0[..8.min(self.0.len())]))
    }
}

impl fmt::LowerHex for BLSPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

/// BLS12-381 signature: a G2 point in compressed affine form, 96 bytes
/// (spec §6 `qc_sig.agg_sig`).
#[derive(Clone, PartialEq, Eq, Default)]
pub struct BLSSignature(Vec<u8>);

impl BLSSignature {
    pub const LEN: usize = 96;

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TypesError> {
        if bytes.len() != Self::LEN {
            return Err(TypesError::InvalidSignatureLength {
                expected: Self::LEN,
                actual: bytes.len(),
            });
        }
        Ok(Self(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl fmt::Debug for BLSSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BLSSignature(0x{}...)", &hex::encode(&self.0[..8.min(self.0.len())]))
    }
}

impl fmt::LowerHex for BLSSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bls_signature_length() {
        let sig = BLSSignature::from_bytes(&[1u8; 96]).unwrap();
        assert_eq!(sig.as_bytes(), &[1u8; 96]);
        assert!(BLSSignature::from_bytes(&[1u8; 95]).is_err());
    }

    #[test]
    fn bls_public_key_length() {
        let pk = BLSPublicKey::from_bytes(&[1u8; 96]).unwrap();
        assert_eq!(pk.as_bytes(), &[1u8; 96]);
        assert!(BLSPublicKey::from_bytes(&[1u8; 95]).is_err());
    }

    #[test]
    fn zero_detection() {
        assert!(BLSSignature::default().is_zero());
        assert!(BLSPublicKey::default().is_zero());
        assert!(!BLSSignature::from_bytes(&[1u8; 96]).unwrap().is_zero());
    }
}
