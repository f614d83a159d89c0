//! serde implementations for the crate's fixed-width primitives.
//!
//! Matches the teacher's approach (`merklith-types::serialization`):
//! hex/string encoding for human-facing formats, hand-written rather than
//! derived because these types don't have a `serde`-friendly internal
//! representation (fixed arrays / raw byte vectors).

#[cfg(feature = "serde")]
mod serde_impls {
    use crate::block_id::BlockId;
    use crate::digest::Digest;
    use crate::signature::{BLSPublicKey, BLSSignature};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;

    impl Serialize for Digest {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            self.to_string().serialize(serializer)
        }
    }

    impl<'de> Deserialize<'de> for Digest {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let s = String::deserialize(deserializer)?;
            Digest::from_str(&s).map_err(serde::de::Error::custom)
        }
    }

    impl Serialize for BlockId {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            self.to_string().serialize(serializer)
        }
    }

    impl<'de> Deserialize<'de> for BlockId {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let s = String::deserialize(deserializer)?;
            BlockId::from_str(&s).map_err(serde::de::Error::custom)
        }
    }

    impl Serialize for BLSSignature {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            format!("0x{}", hex::encode(self.as_bytes())).serialize(serializer)
        }
    }

    impl<'de> Deserialize<'de> for BLSSignature {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let s = String::deserialize(deserializer)?;
            let s = s.strip_prefix("0x").unwrap_or(&s);
            let bytes = hex::decode(s).map_err(serde::de::Error::custom)?;
            BLSSignature::from_bytes(&bytes).map_err(serde::de::Error::custom)
        }
    }

    impl Serialize for BLSPublicKey {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            format!("0x{}", hex::encode(self.as_bytes())).serialize(serializer)
        }
    }

    impl<'de> Deserialize<'de> for BLSPublicKey {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let s = String::deserialize(deserializer)?;
            let s = s.strip_prefix("0x").unwrap_or(&s);
            let bytes = hex::decode(s).map_err(serde::de::Error::custom)?;
            BLSPublicKey::from_bytes(&bytes).map_err(serde::de::Error::custom)
        }
    }
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use crate::block_id::BlockId;
    use crate::digest::Digest;

    #[test]
    fn digest_serde_roundtrip() {
        let original = Digest::compute(b"test");
        let json = serde_json::to_string(&original).unwrap();
        let decoded: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn block_id_serde_roundtrip() {
        let original = BlockId::from_num_and_digest(7, &[1u8; 28]);
        let json = serde_json::to_string(&original).unwrap();
        let decoded: BlockId = serde_json::from_str(&json).unwrap();
        assert_eq!(original, decoded);
    }
}
