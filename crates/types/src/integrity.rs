use serde::{Deserialize, Serialize};

use crate::types::RedundancyType;

/// Integrity roots that authorize an object on chain.
///
/// Roots are 32-byte SHA-256 digests, serialized as hex strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityHashSet {
    /// Root over the per-segment checksums of the raw payload.
    #[serde(with = "hex_digest")]
    pub primary_root: [u8; 32],
    /// One root per erasure-coded shard, in redundancy-index order.
    #[serde(with = "hex_digest_list")]
    pub secondary_roots: Vec<[u8; 32]>,
    /// Total payload bytes consumed while hashing.
    pub size: u64,
    pub redundancy_type: RedundancyType,
}

impl IntegrityHashSet {
    /// All roots with the primary first, as the chain records them.
    pub fn all_roots(&self) -> Vec<[u8; 32]> {
        let mut roots = Vec::with_capacity(self.secondary_roots.len() + 1);
        roots.push(self.primary_root);
        roots.extend_from_slice(&self.secondary_roots);
        roots
    }

    /// Hex-encoded roots with the primary first.
    pub fn hex_roots(&self) -> Vec<String> {
        self.all_roots().iter().map(hex::encode).collect()
    }
}

mod hex_digest {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(digest: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(digest))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        let mut out = [0u8; 32];
        hex::decode_to_slice(&s, &mut out).map_err(D::Error::custom)?;
        Ok(out)
    }
}

mod hex_digest_list {
    use serde::{Deserialize, Deserializer, Serializer, de::Error, ser::SerializeSeq};

    pub fn serialize<S: Serializer>(digests: &[[u8; 32]], s: S) -> Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(digests.len()))?;
        for d in digests {
            seq.serialize_element(&hex::encode(d))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<[u8; 32]>, D::Error> {
        let raw = Vec::<String>::deserialize(d)?;
        raw.iter()
            .map(|s| {
                let mut out = [0u8; 32];
                hex::decode_to_slice(s, &mut out).map_err(D::Error::custom)?;
                Ok(out)
            })
            .collect()
    }
}
