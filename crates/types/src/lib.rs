//! Wire-level types for storage-provider and chain communication.
//!
//! Everything here is shared by the transfer engine and the client:
//! object metadata as reported by the chain, redundancy parameters,
//! inclusive byte ranges, the integrity hash set that authorizes an
//! object, and the `X-Gnfd-*` header vocabulary.

pub mod constants;
pub mod integrity;
pub mod range;
pub mod types;

// Re-export primary types for convenience.
pub use integrity::IntegrityHashSet;
pub use range::{ByteRange, RangeError};
pub use types::{
    BucketMeta, ObjectMeta, ObjectStatus, RedundancyParams, RedundancyType, StorageProviderInfo,
    TransferStatus,
};
