//! Shared client state: configuration, collaborators and the provider
//! endpoint cache.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use gnfd_transfer::{
    Checkpoint, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore, ResumePoint,
    TransferError, TransferKey, resolve_resume_point,
};
use tracing::{debug, info, warn};

use crate::chain::ChainService;
use crate::config::{ClientConfig, TransferOptions};
use crate::error::ClientError;
use crate::http::normalize_endpoint;
use crate::transport::SpTransport;

/// Everything an orchestrator needs, passed explicitly.
///
/// The endpoint cache maps storage-provider operator addresses to
/// endpoints. It only changes through [`ClientContext::refresh_endpoints`].
pub struct ClientContext {
    config: ClientConfig,
    options: TransferOptions,
    chain: Arc<dyn ChainService>,
    transport: Arc<dyn SpTransport>,
    checkpoints: Arc<dyn CheckpointStore>,
    endpoints: RwLock<HashMap<String, String>>,
}

impl ClientContext {
    /// Builds a context. Checkpoints go to `config.checkpoint_dir` when set,
    /// otherwise they are kept in memory.
    pub fn new(
        config: ClientConfig,
        chain: Arc<dyn ChainService>,
        transport: Arc<dyn SpTransport>,
    ) -> Result<Self, ClientError> {
        let options = config.transfer_options()?;
        let checkpoints: Arc<dyn CheckpointStore> = match &config.checkpoint_dir {
            Some(dir) => Arc::new(FileCheckpointStore::new(dir)?),
            None => Arc::new(MemoryCheckpointStore::new()),
        };
        Ok(Self {
            config,
            options,
            chain,
            transport,
            checkpoints,
            endpoints: RwLock::new(HashMap::new()),
        })
    }

    /// Replaces the checkpoint store.
    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = store;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    pub fn chain(&self) -> &dyn ChainService {
        self.chain.as_ref()
    }

    pub fn transport(&self) -> &dyn SpTransport {
        self.transport.as_ref()
    }

    /// Loads and validates the checkpoint for `key` on the blocking pool.
    pub async fn resume_point(
        &self,
        key: &TransferKey,
        total_len: u64,
    ) -> Result<ResumePoint, TransferError> {
        let store = Arc::clone(&self.checkpoints);
        let key = key.clone();
        blocking(move || resolve_resume_point(store.as_ref(), &key, total_len)).await
    }

    /// Persists `checkpoint` on the blocking pool.
    pub async fn save_checkpoint(
        &self,
        key: &TransferKey,
        checkpoint: Checkpoint,
    ) -> Result<(), TransferError> {
        let store = Arc::clone(&self.checkpoints);
        let key = key.clone();
        blocking(move || store.save(&key, &checkpoint)).await
    }

    /// Removes the checkpoint for `key` on the blocking pool.
    pub async fn clear_checkpoint(&self, key: &TransferKey) -> Result<(), TransferError> {
        let store = Arc::clone(&self.checkpoints);
        let key = key.clone();
        blocking(move || store.clear(&key)).await
    }

    /// Reloads the endpoint cache from the chain. Returns the number of
    /// in-service providers cached.
    ///
    /// Providers with an unusable endpoint are skipped with a warning.
    pub async fn refresh_endpoints(&self) -> Result<usize, ClientError> {
        let providers = self.chain.list_storage_providers().await?;
        let mut fresh = HashMap::with_capacity(providers.len());
        for sp in providers.into_iter().filter(|sp| sp.in_service) {
            match normalize_endpoint(&sp.endpoint, self.config.secure) {
                Ok(endpoint) => {
                    fresh.insert(sp.operator_address, endpoint);
                }
                Err(e) => {
                    warn!(address = %sp.operator_address, endpoint = %sp.endpoint, error = %e, "skipping provider");
                }
            }
        }
        let count = fresh.len();
        *self.endpoints.write().unwrap() = fresh;
        info!(providers = count, "storage provider endpoints refreshed");
        Ok(count)
    }

    /// Cached endpoint for an operator address.
    pub fn endpoint(&self, operator_address: &str) -> Option<String> {
        self.endpoints
            .read()
            .unwrap()
            .get(operator_address)
            .cloned()
    }

    /// Resolves the primary provider endpoint serving `bucket`.
    ///
    /// Does not refresh the cache; an unknown provider is an error.
    pub async fn endpoint_for_bucket(&self, bucket: &str) -> Result<String, ClientError> {
        let meta = self.chain.head_bucket(bucket).await?;
        let endpoint = self
            .endpoint(&meta.primary_sp_address)
            .ok_or_else(|| ClientError::UnknownProvider(meta.primary_sp_address.clone()))?;
        debug!(bucket, sp = %meta.primary_sp_address, endpoint = %endpoint, "resolved primary provider");
        Ok(endpoint)
    }
}

async fn blocking<T, F>(f: F) -> Result<T, TransferError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, TransferError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TransferError::Io(std::io::Error::other(e)))?
}
