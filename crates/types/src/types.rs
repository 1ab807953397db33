use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_DATA_SHARDS, DEFAULT_PARITY_SHARDS};

/// Encoding scheme applied to an object's pieces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RedundancyType {
    /// Reed-Solomon erasure coding across data and parity shards.
    #[serde(rename = "REDUNDANCY_EC_TYPE")]
    Ec,
    /// Whole-segment replicas on every secondary provider.
    #[serde(rename = "REDUNDANCY_REPLICA_TYPE")]
    Replica,
}

/// Erasure-coding parameters for an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedundancyParams {
    pub data_shards: usize,
    pub parity_shards: usize,
}

impl Default for RedundancyParams {
    fn default() -> Self {
        Self {
            data_shards: DEFAULT_DATA_SHARDS,
            parity_shards: DEFAULT_PARITY_SHARDS,
        }
    }
}

impl RedundancyParams {
    /// Total pieces produced per segment.
    pub fn total_shards(&self) -> usize {
        self.data_shards + self.parity_shards
    }
}

/// Lifecycle state of an object on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectStatus {
    /// Created on chain, payload not yet sealed by the primary provider.
    #[serde(rename = "OBJECT_STATUS_CREATED")]
    Created,
    /// Payload stored and sealed; the object is readable.
    #[serde(rename = "OBJECT_STATUS_SEALED")]
    Sealed,
    /// Object was discontinued by the storage provider.
    #[serde(rename = "OBJECT_STATUS_DISCONTINUED")]
    Discontinued,
}

/// Object metadata as reported by `HeadObject` on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Chain-assigned object id, sent with every piece request.
    pub id: String,
    pub bucket_name: String,
    pub object_name: String,
    pub payload_size: u64,
    pub status: ObjectStatus,
    pub redundancy_type: RedundancyType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content_type: String,
    /// Hex-encoded integrity roots recorded on chain (primary first).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checksums: Vec<String>,
}

impl ObjectMeta {
    /// Returns `true` once the object can be downloaded.
    pub fn is_sealed(&self) -> bool {
        self.status == ObjectStatus::Sealed
    }
}

/// Bucket metadata as reported by `HeadBucket` on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketMeta {
    pub id: String,
    pub bucket_name: String,
    pub owner: String,
    /// Operator address of the primary storage provider serving this bucket.
    pub primary_sp_address: String,
}

/// A storage provider registered on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageProviderInfo {
    pub operator_address: String,
    /// Endpoint as registered, with or without scheme.
    pub endpoint: String,
    #[serde(default)]
    pub in_service: bool,
}

/// Current state of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "in_progress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "cancelled")]
    Cancelled,
}

impl TransferStatus {
    /// Returns `true` while the transfer may still make progress.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }
}
