//! Integrity roots for chain authorization.
//!
//! Each segment contributes one SHA-256 checksum of its raw bytes and, after
//! Reed-Solomon encoding into `data + parity` pieces, one SHA-256 per piece.
//! The primary root hashes the concatenated segment checksums; secondary
//! root `i` hashes the concatenated hashes of piece `i` across all segments.
//! Storage providers recompute the same values, so the output must be
//! bit-for-bit deterministic.

use std::io::{ErrorKind, Read};

use gnfd_types::{IntegrityHashSet, RedundancyParams, RedundancyType};
use reed_solomon_erasure::galois_8::ReedSolomon;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::TransferError;

/// GF(2^8) limits the total number of shards.
const MAX_TOTAL_SHARDS: usize = 256;

/// SHA-256 of a raw segment.
pub fn segment_checksum(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Erasure-codes one segment into `data + parity` equally sized shards.
///
/// The segment is zero-padded to a multiple of `data_shards` first.
pub fn encode_pieces(
    data: &[u8],
    params: RedundancyParams,
) -> Result<Vec<Vec<u8>>, TransferError> {
    check_params(params)?;
    let codec = ReedSolomon::new(params.data_shards, params.parity_shards)?;
    encode_with(&codec, data, params)
}

fn encode_with(
    codec: &ReedSolomon,
    data: &[u8],
    params: RedundancyParams,
) -> Result<Vec<Vec<u8>>, TransferError> {
    if data.is_empty() {
        return Err(TransferError::InvalidConfiguration(
            "cannot erasure-code an empty segment".into(),
        ));
    }
    let shard_len = data.len().div_ceil(params.data_shards);
    let mut shards: Vec<Vec<u8>> = Vec::with_capacity(params.total_shards());
    for i in 0..params.data_shards {
        let start = (i * shard_len).min(data.len());
        let end = ((i + 1) * shard_len).min(data.len());
        let mut shard = data[start..end].to_vec();
        shard.resize(shard_len, 0);
        shards.push(shard);
    }
    for _ in 0..params.parity_shards {
        shards.push(vec![0u8; shard_len]);
    }
    codec.encode(&mut shards)?;
    Ok(shards)
}

fn check_params(params: RedundancyParams) -> Result<(), TransferError> {
    if params.data_shards == 0 || params.parity_shards == 0 {
        return Err(TransferError::InvalidConfiguration(format!(
            "shard counts must be positive (data={}, parity={})",
            params.data_shards, params.parity_shards
        )));
    }
    if params.total_shards() > MAX_TOTAL_SHARDS {
        return Err(TransferError::InvalidConfiguration(format!(
            "at most {MAX_TOTAL_SHARDS} shards supported, got {}",
            params.total_shards()
        )));
    }
    Ok(())
}

/// Streams an object once and derives its [`IntegrityHashSet`].
#[derive(Debug, Clone, Copy)]
pub struct IntegrityHasher {
    segment_size: u64,
    params: RedundancyParams,
}

impl IntegrityHasher {
    /// Creates a hasher, validating segment size and shard counts.
    pub fn new(segment_size: u64, params: RedundancyParams) -> Result<Self, TransferError> {
        if segment_size == 0 {
            return Err(TransferError::InvalidConfiguration(
                "segment size must be greater than zero".into(),
            ));
        }
        check_params(params)?;
        Ok(Self {
            segment_size,
            params,
        })
    }

    pub fn segment_size(&self) -> u64 {
        self.segment_size
    }

    pub fn params(&self) -> RedundancyParams {
        self.params
    }

    /// Consumes `reader` to EOF, one segment at a time.
    pub fn compute<R: Read>(&self, mut reader: R) -> Result<IntegrityHashSet, TransferError> {
        let codec = ReedSolomon::new(self.params.data_shards, self.params.parity_shards)?;
        let total_shards = self.params.total_shards();

        let mut primary = Sha256::new();
        let mut secondary: Vec<Sha256> = (0..total_shards).map(|_| Sha256::new()).collect();
        let mut buf = vec![0u8; self.segment_size as usize];
        let mut size: u64 = 0;
        let mut segments: u64 = 0;

        loop {
            let n = read_full(&mut reader, &mut buf)?;
            if n == 0 {
                break;
            }
            let segment = &buf[..n];
            primary.update(segment_checksum(segment));

            let shards = encode_with(&codec, segment, self.params)?;
            for (hasher, shard) in secondary.iter_mut().zip(&shards) {
                hasher.update(Sha256::digest(shard));
            }

            size += n as u64;
            segments += 1;
            if n < buf.len() {
                break;
            }
        }

        debug!(size, segments, shards = total_shards, "integrity hash computed");

        Ok(IntegrityHashSet {
            primary_root: primary.finalize().into(),
            secondary_roots: secondary
                .into_iter()
                .map(|h| h.finalize().into())
                .collect(),
            size,
            redundancy_type: RedundancyType::Ec,
        })
    }
}

/// Fills `buf` unless EOF comes first. Returns the number of bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, TransferError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn params() -> RedundancyParams {
        RedundancyParams {
            data_shards: 4,
            parity_shards: 2,
        }
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    /// Reader that hands out at most 7 bytes per call.
    struct Trickle(Cursor<Vec<u8>>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let cap = buf.len().min(7);
            self.0.read(&mut buf[..cap])
        }
    }

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk gone"))
        }
    }

    #[test]
    fn rejects_bad_configuration() {
        assert!(matches!(
            IntegrityHasher::new(0, params()),
            Err(TransferError::InvalidConfiguration(_))
        ));
        let zero_data = RedundancyParams {
            data_shards: 0,
            parity_shards: 2,
        };
        assert!(matches!(
            IntegrityHasher::new(16, zero_data),
            Err(TransferError::InvalidConfiguration(_))
        ));
        let zero_parity = RedundancyParams {
            data_shards: 4,
            parity_shards: 0,
        };
        assert!(IntegrityHasher::new(16, zero_parity).is_err());
        let too_many = RedundancyParams {
            data_shards: 200,
            parity_shards: 100,
        };
        assert!(IntegrityHasher::new(16, too_many).is_err());
    }

    #[test]
    fn root_counts_and_size() {
        let data = pattern(1000);
        let hasher = IntegrityHasher::new(256, params()).unwrap();
        let set = hasher.compute(Cursor::new(&data)).unwrap();
        assert_eq!(set.size, 1000);
        assert_eq!(set.secondary_roots.len(), 6);
        assert_eq!(set.all_roots().len(), 7);
        assert_eq!(set.redundancy_type, RedundancyType::Ec);
    }

    #[test]
    fn deterministic() {
        let data = pattern(5000);
        let hasher = IntegrityHasher::new(1024, params()).unwrap();
        let a = hasher.compute(Cursor::new(&data)).unwrap();
        let b = hasher.compute(Cursor::new(&data)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn independent_of_read_granularity() {
        let data = pattern(3000);
        let hasher = IntegrityHasher::new(512, params()).unwrap();
        let whole = hasher.compute(Cursor::new(&data)).unwrap();
        let trickled = hasher.compute(Trickle(Cursor::new(data))).unwrap();
        assert_eq!(whole, trickled);
    }

    #[test]
    fn primary_root_is_hash_of_segment_checksums() {
        let data = pattern(600);
        let hasher = IntegrityHasher::new(256, params()).unwrap();
        let set = hasher.compute(Cursor::new(&data)).unwrap();

        let mut expected = Sha256::new();
        for chunk in data.chunks(256) {
            expected.update(segment_checksum(chunk));
        }
        let expected: [u8; 32] = expected.finalize().into();
        assert_eq!(set.primary_root, expected);
    }

    #[test]
    fn different_content_different_roots() {
        let hasher = IntegrityHasher::new(256, params()).unwrap();
        let mut data = pattern(600);
        let a = hasher.compute(Cursor::new(&data)).unwrap();
        data[599] ^= 0xff;
        let b = hasher.compute(Cursor::new(&data)).unwrap();
        assert_ne!(a.primary_root, b.primary_root);
        assert_ne!(a.secondary_roots, b.secondary_roots);
    }

    #[test]
    fn segment_size_changes_roots() {
        let data = pattern(600);
        let a = IntegrityHasher::new(256, params())
            .unwrap()
            .compute(Cursor::new(&data))
            .unwrap();
        let b = IntegrityHasher::new(300, params())
            .unwrap()
            .compute(Cursor::new(&data))
            .unwrap();
        assert_ne!(a.primary_root, b.primary_root);
    }

    #[test]
    fn empty_input() {
        let hasher = IntegrityHasher::new(256, params()).unwrap();
        let set = hasher.compute(Cursor::new(Vec::<u8>::new())).unwrap();
        assert_eq!(set.size, 0);
        assert_eq!(set.secondary_roots.len(), 6);
        let empty: [u8; 32] = Sha256::digest(b"").into();
        assert_eq!(set.primary_root, empty);
    }

    #[test]
    fn read_error_propagates_as_io() {
        let hasher = IntegrityHasher::new(256, params()).unwrap();
        assert!(matches!(hasher.compute(Broken), Err(TransferError::Io(_))));
    }

    #[test]
    fn pieces_are_padded_and_systematic() {
        let data = pattern(10);
        let shards = encode_pieces(&data, params()).unwrap();
        assert_eq!(shards.len(), 6);
        // ceil(10 / 4) = 3 bytes per shard, last data shard zero-padded.
        assert!(shards.iter().all(|s| s.len() == 3));
        assert_eq!(&shards[0], &data[0..3]);
        assert_eq!(&shards[3][..1], &data[9..10]);
        assert_eq!(&shards[3][1..], &[0, 0]);
    }
}
