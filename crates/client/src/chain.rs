//! Chain service seam.
//!
//! The chain is an external collaborator: the client only needs metadata
//! lookups and object creation. Applications implement this trait on top
//! of their chain client; tests use in-memory mocks.

use std::future::Future;
use std::pin::Pin;

use gnfd_transfer::TransferError;
use gnfd_types::{BucketMeta, IntegrityHashSet, ObjectMeta, StorageProviderInfo};

use crate::types::TransferDescriptor;

/// Boxed future returned by [`ChainService`] methods.
pub type ChainFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TransferError>> + Send + 'a>>;

/// Queries and transactions against the chain.
///
/// Failures should be reported as [`TransferError::Chain`].
pub trait ChainService: Send + Sync {
    fn head_bucket<'a>(&'a self, bucket: &'a str) -> ChainFuture<'a, BucketMeta>;

    fn head_object<'a>(&'a self, bucket: &'a str, object: &'a str) -> ChainFuture<'a, ObjectMeta>;

    /// Lists storage providers currently registered on chain.
    fn list_storage_providers(&self) -> ChainFuture<'_, Vec<StorageProviderInfo>>;

    /// Broadcasts an object creation authorized by `integrity`. Returns the
    /// transaction hash.
    fn create_object<'a>(
        &'a self,
        descriptor: &'a TransferDescriptor,
        integrity: &'a IntegrityHashSet,
    ) -> ChainFuture<'a, String>;
}
