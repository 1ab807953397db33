#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use std::time::Duration;

use gnfd_client::{
    ChainFuture, ChainService, ClientConfig, ClientContext, SpRequest, SpResponse, SpTransport,
    TransferDescriptor, TransportFuture,
};
use gnfd_transfer::{
    Checkpoint, CheckpointStore, MemoryCheckpointStore, TransferError, TransferKey,
};
use gnfd_types::constants::{
    HEADER_CONTENT_SHA256, HEADER_PIECE_INDEX, HEADER_RANGE, QUERY_COMPLETE, QUERY_OFFSET,
};
use gnfd_types::{
    BucketMeta, ByteRange, IntegrityHashSet, ObjectMeta, ObjectStatus, RedundancyType,
    StorageProviderInfo,
};
use sha2::{Digest, Sha256};

pub const MIB: u64 = 1024 * 1024;
pub const BUCKET: &str = "test-bucket";
pub const SP_ADDRESS: &str = "0xprimary";

/// Deterministic, non-repeating-per-segment test payload.
pub fn pattern(len: u64) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + i / 7) % 251) as u8).collect()
}

pub fn test_config() -> ClientConfig {
    ClientConfig {
        part_size: MIB,
        parallelism: 4,
        max_attempts: 3,
        initial_backoff_ms: 0,
        max_backoff_ms: 0,
        ..ClientConfig::default()
    }
}

// ---------------------------------------------------------------------------
// MockSp
// ---------------------------------------------------------------------------

/// One PUT as the provider saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRecord {
    pub object: String,
    pub offset: u64,
    pub complete: bool,
    pub piece: u64,
    pub len: u64,
}

/// In-memory storage provider.
///
/// Verifies the content hash header, records every request and assembles
/// uploaded segments into an object once the completing request arrives.
#[derive(Default)]
pub struct MockSp {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    partial: Mutex<HashMap<String, BTreeMap<u64, Vec<u8>>>>,
    puts: Mutex<Vec<PutRecord>>,
    gets: Mutex<Vec<ByteRange>>,
    piece_delays: Mutex<HashMap<u64, Duration>>,
    delay_all: Mutex<Option<Duration>>,
    get_delay: Mutex<Option<(u64, Duration)>>,
    rejected_pieces: Mutex<HashMap<u64, (u16, String)>>,
    short_gets: AtomicU32,
}

impl MockSp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn store_object(&self, object: &str, data: Vec<u8>) {
        self.objects.lock().unwrap().insert(object.to_string(), data);
    }

    pub fn object(&self, object: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(object).cloned()
    }

    pub fn puts(&self) -> Vec<PutRecord> {
        self.puts.lock().unwrap().clone()
    }

    pub fn gets(&self) -> Vec<ByteRange> {
        self.gets.lock().unwrap().clone()
    }

    pub fn clear_log(&self) {
        self.puts.lock().unwrap().clear();
        self.gets.lock().unwrap().clear();
    }

    /// Holds the response for a piece index.
    pub fn delay_piece(&self, piece: u64, delay: Duration) {
        self.piece_delays.lock().unwrap().insert(piece, delay);
    }

    pub fn delay_all(&self, delay: Duration) {
        *self.delay_all.lock().unwrap() = Some(delay);
    }

    /// Holds every GET whose range starts at or after `start`.
    pub fn delay_gets_from(&self, start: u64, delay: Duration) {
        *self.get_delay.lock().unwrap() = Some((start, delay));
    }

    pub fn clear_delays(&self) {
        self.piece_delays.lock().unwrap().clear();
        *self.delay_all.lock().unwrap() = None;
        *self.get_delay.lock().unwrap() = None;
    }

    /// Answers every PUT of `piece` with an error response.
    pub fn reject_piece(&self, piece: u64, status: u16, code: &str) {
        self.rejected_pieces
            .lock()
            .unwrap()
            .insert(piece, (status, code.to_string()));
    }

    /// Truncates the body of the next `n` GET responses by one byte.
    pub fn short_gets(&self, n: u32) {
        self.short_gets.store(n, Ordering::SeqCst);
    }

    async fn delay_for(&self, request: &SpRequest) {
        let piece: Option<u64> = request
            .header_value(HEADER_PIECE_INDEX)
            .and_then(|v| v.parse().ok());
        let get_start = request
            .header_value(HEADER_RANGE)
            .and_then(|v| ByteRange::parse_header(v).ok())
            .map(|r| r.start);
        let get_delay = *self.get_delay.lock().unwrap();
        let delay = piece
            .and_then(|p| self.piece_delays.lock().unwrap().get(&p).copied())
            .or(match (get_start, get_delay) {
                (Some(start), Some((from, delay))) if start >= from => Some(delay),
                _ => None,
            })
            .or(*self.delay_all.lock().unwrap());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn handle_put(&self, request: &SpRequest) -> SpResponse {
        let piece: u64 = request
            .header_value(HEADER_PIECE_INDEX)
            .and_then(|v| v.parse().ok())
            .unwrap_or(u64::MAX);
        let offset: u64 = request
            .query_value(QUERY_OFFSET)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let complete = request.query_value(QUERY_COMPLETE) == Some("true");

        self.puts.lock().unwrap().push(PutRecord {
            object: request.object.clone(),
            offset,
            complete,
            piece,
            len: request.body.len() as u64,
        });

        if let Some((status, code)) = self.rejected_pieces.lock().unwrap().get(&piece) {
            return SpResponse::error(*status, code, "rejected by test");
        }

        let expected = hex::encode(Sha256::digest(&request.body));
        if request.header_value(HEADER_CONTENT_SHA256) != Some(expected.as_str()) {
            return SpResponse::error(400, "BadDigest", "content sha256 mismatch");
        }

        let mut partial = self.partial.lock().unwrap();
        let parts = partial.entry(request.object.clone()).or_default();
        parts.insert(offset, request.body.clone());

        if complete {
            let mut assembled = Vec::new();
            for (offset, data) in parts.iter() {
                if *offset != assembled.len() as u64 {
                    return SpResponse::error(400, "InvalidPart", "segments are not contiguous");
                }
                assembled.extend_from_slice(data);
            }
            partial.remove(&request.object);
            self.store_object(&request.object, assembled);
        }
        SpResponse::ok(Vec::new())
    }

    fn handle_get(&self, request: &SpRequest) -> SpResponse {
        let Some(data) = self.object(&request.object) else {
            return SpResponse::error(404, "NoSuchKey", "object not found");
        };
        let range = match request.header_value(HEADER_RANGE) {
            Some(v) => match ByteRange::parse_header(v) {
                Ok(r) => r,
                Err(e) => return SpResponse::error(400, "InvalidRange", &e.to_string()),
            },
            None => match ByteRange::full(data.len() as u64) {
                Some(r) => r,
                None => return SpResponse::ok(Vec::new()),
            },
        };
        self.gets.lock().unwrap().push(range);
        if range.end >= data.len() as u64 {
            return SpResponse::error(416, "InvalidRange", "range not satisfiable");
        }

        let mut body = data[range.start as usize..=range.end as usize].to_vec();
        let short = self
            .short_gets
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if short {
            body.pop();
        }
        SpResponse {
            status: 206,
            headers: BTreeMap::new(),
            body,
        }
    }
}

impl SpTransport for MockSp {
    fn send(&self, request: SpRequest) -> TransportFuture<'_> {
        Box::pin(async move {
            self.delay_for(&request).await;
            Ok(match request.method {
                gnfd_client::HttpMethod::Put => self.handle_put(&request),
                gnfd_client::HttpMethod::Get => self.handle_get(&request),
                gnfd_client::HttpMethod::Head => SpResponse::ok(Vec::new()),
            })
        })
    }
}

// ---------------------------------------------------------------------------
// MockChain
// ---------------------------------------------------------------------------

/// In-memory chain with one bucket served by [`SP_ADDRESS`].
pub struct MockChain {
    objects: Mutex<HashMap<String, ObjectMeta>>,
    providers: Vec<StorageProviderInfo>,
    next_id: AtomicU32,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            objects: Mutex::new(HashMap::new()),
            providers: vec![
                StorageProviderInfo {
                    operator_address: SP_ADDRESS.into(),
                    endpoint: "mock-sp.local:9033".into(),
                    in_service: true,
                },
                StorageProviderInfo {
                    operator_address: "0xretired".into(),
                    endpoint: "retired.local".into(),
                    in_service: false,
                },
            ],
            next_id: AtomicU32::new(1),
        })
    }

    /// Registers an object directly, bypassing `create_object`.
    pub fn insert_object(&self, object: &str, size: u64, status: ObjectStatus) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().unwrap().insert(
            object.to_string(),
            ObjectMeta {
                id: id.to_string(),
                bucket_name: BUCKET.into(),
                object_name: object.to_string(),
                payload_size: size,
                status,
                redundancy_type: RedundancyType::Ec,
                content_type: String::new(),
                checksums: Vec::new(),
            },
        );
    }

    pub fn set_status(&self, object: &str, status: ObjectStatus) {
        if let Some(meta) = self.objects.lock().unwrap().get_mut(object) {
            meta.status = status;
        }
    }

    pub fn meta(&self, object: &str) -> Option<ObjectMeta> {
        self.objects.lock().unwrap().get(object).cloned()
    }
}

impl ChainService for MockChain {
    fn head_bucket<'a>(&'a self, bucket: &'a str) -> ChainFuture<'a, BucketMeta> {
        Box::pin(async move {
            if bucket != BUCKET {
                return Err(TransferError::Chain(format!("no such bucket {bucket}")));
            }
            Ok(BucketMeta {
                id: "7".into(),
                bucket_name: bucket.to_string(),
                owner: "0xowner".into(),
                primary_sp_address: SP_ADDRESS.into(),
            })
        })
    }

    fn head_object<'a>(&'a self, _bucket: &'a str, object: &'a str) -> ChainFuture<'a, ObjectMeta> {
        Box::pin(async move {
            self.meta(object)
                .ok_or_else(|| TransferError::Chain(format!("no such object {object}")))
        })
    }

    fn list_storage_providers(&self) -> ChainFuture<'_, Vec<StorageProviderInfo>> {
        Box::pin(async move { Ok(self.providers.clone()) })
    }

    fn create_object<'a>(
        &'a self,
        descriptor: &'a TransferDescriptor,
        integrity: &'a IntegrityHashSet,
    ) -> ChainFuture<'a, String> {
        Box::pin(async move {
            let mut objects = self.objects.lock().unwrap();
            if objects.contains_key(&descriptor.object) {
                return Err(TransferError::Chain("object already exists".into()));
            }
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            objects.insert(
                descriptor.object.clone(),
                ObjectMeta {
                    id: id.to_string(),
                    bucket_name: descriptor.bucket.clone(),
                    object_name: descriptor.object.clone(),
                    payload_size: descriptor.size,
                    status: ObjectStatus::Created,
                    redundancy_type: integrity.redundancy_type,
                    content_type: descriptor.content_type.clone(),
                    checksums: integrity.hex_roots(),
                },
            );
            Ok(format!("0xtx{id:04}"))
        })
    }
}

// ---------------------------------------------------------------------------
// ThreadTrackingStore
// ---------------------------------------------------------------------------

/// Memory checkpoint store that records the thread of every call.
#[derive(Default)]
pub struct ThreadTrackingStore {
    inner: MemoryCheckpointStore,
    threads: Mutex<Vec<ThreadId>>,
}

impl ThreadTrackingStore {
    pub fn threads(&self) -> Vec<ThreadId> {
        self.threads.lock().unwrap().clone()
    }

    fn record(&self) {
        self.threads
            .lock()
            .unwrap()
            .push(std::thread::current().id());
    }
}

impl CheckpointStore for ThreadTrackingStore {
    fn load(&self, key: &TransferKey) -> Result<Option<Checkpoint>, TransferError> {
        self.record();
        self.inner.load(key)
    }

    fn save(&self, key: &TransferKey, checkpoint: &Checkpoint) -> Result<(), TransferError> {
        self.record();
        self.inner.save(key, checkpoint)
    }

    fn clear(&self, key: &TransferKey) -> Result<(), TransferError> {
        self.record();
        self.inner.clear(key)
    }
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

pub struct Harness {
    pub chain: Arc<MockChain>,
    pub sp: Arc<MockSp>,
    pub store: Arc<MemoryCheckpointStore>,
    pub ctx: ClientContext,
}

/// Context over the mocks with a memory checkpoint store and a warm
/// endpoint cache.
pub async fn harness(config: ClientConfig) -> Harness {
    let chain = MockChain::new();
    let sp = MockSp::new();
    let store = Arc::new(MemoryCheckpointStore::new());
    let ctx = ClientContext::new(config, chain.clone(), sp.clone())
        .unwrap()
        .with_checkpoint_store(store.clone());
    ctx.refresh_endpoints().await.unwrap();
    Harness {
        chain,
        sp,
        store,
        ctx,
    }
}

/// A second context over the harness mocks with its own checkpoint store.
pub async fn context_with_store(h: &Harness, store: Arc<dyn CheckpointStore>) -> ClientContext {
    let ctx = ClientContext::new(test_config(), h.chain.clone(), h.sp.clone())
        .unwrap()
        .with_checkpoint_store(store);
    ctx.refresh_endpoints().await.unwrap();
    ctx
}
