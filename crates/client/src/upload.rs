//! Resumable upload orchestrator.
//!
//! Segments are sent in parallel, acknowledged in any order, and the
//! checkpoint only ever advances over a contiguous acknowledged prefix. The
//! request carrying `complete=true` is sent last, once everything before it
//! has been acknowledged.

use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use gnfd_transfer::{
    AckWatermark, Checkpoint, IntegrityHasher, ObjectSource, Segment, Segmenter, SpeedCalculator,
    TransferDirection, TransferError, TransferKey, TransferProgress, TransferSession,
    segment_checksum,
};
use gnfd_types::constants::{
    HEADER_CONTENT_SHA256, HEADER_CONTENT_TYPE, HEADER_OBJECT_ID, HEADER_PIECE_INDEX,
    HEADER_REDUNDANCY_INDEX, PRIMARY_REDUNDANCY_INDEX, QUERY_COMPLETE, QUERY_OFFSET,
};
use gnfd_types::{IntegrityHashSet, ObjectMeta, RedundancyParams, TransferStatus};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::ClientContext;
use crate::error::ClientError;
use crate::fault::{FaultInjector, NoFaults};
use crate::runner::SegmentRunner;
use crate::transport::{HttpMethod, SpRequest, check_response};
use crate::types::{CreateObjectResult, TransferDescriptor, TransferEvent, UploadOutcome};

/// Where the segments of one upload go.
struct UploadTarget {
    endpoint: String,
    descriptor: TransferDescriptor,
    object_id: String,
}

/// Totals gathered while segments are acknowledged.
#[derive(Default)]
struct SendStats {
    segments: u64,
    bytes: u64,
}

/// Uploads object payloads to the primary storage provider.
pub struct UploadOrchestrator<'a> {
    ctx: &'a ClientContext,
    cancel: CancellationToken,
    faults: Arc<dyn FaultInjector>,
    events: Option<mpsc::Sender<TransferEvent>>,
}

impl<'a> UploadOrchestrator<'a> {
    pub fn new(ctx: &'a ClientContext, cancel: CancellationToken) -> Self {
        Self {
            ctx,
            cancel,
            faults: Arc::new(NoFaults),
            events: None,
        }
    }

    pub fn with_fault_injector(mut self, faults: Arc<dyn FaultInjector>) -> Self {
        self.faults = faults;
        self
    }

    /// Sends [`TransferEvent`]s to `tx`. Events are dropped when the
    /// channel is full.
    pub fn with_events(mut self, tx: mpsc::Sender<TransferEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    fn emit(&self, event: TransferEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.try_send(event);
        }
    }

    fn descriptor(
        &self,
        bucket: &str,
        object: &str,
        size: u64,
    ) -> Result<TransferDescriptor, TransferError> {
        let opts = self.ctx.options();
        TransferDescriptor::new(bucket, object, size, opts.part_size, opts.redundancy)
    }

    /// Computes the integrity hash set of `source` in one streaming pass.
    pub async fn compute_integrity(
        &self,
        source: Arc<dyn ObjectSource>,
        segment_size: u64,
        redundancy: RedundancyParams,
    ) -> Result<IntegrityHashSet, TransferError> {
        tokio::task::spawn_blocking(move || -> Result<IntegrityHashSet, TransferError> {
            let hasher = IntegrityHasher::new(segment_size, redundancy)?;
            hasher.compute(source.reader()?)
        })
        .await
        .map_err(|e| TransferError::Io(std::io::Error::other(e)))?
    }

    /// Hashes `source` and submits the object creation to the chain.
    pub async fn create_object(
        &self,
        bucket: &str,
        object: &str,
        source: Arc<dyn ObjectSource>,
        content_type: Option<&str>,
    ) -> Result<CreateObjectResult, ClientError> {
        let mut descriptor = self.descriptor(bucket, object, source.size())?;
        if let Some(content_type) = content_type {
            descriptor = descriptor.with_content_type(content_type);
        }
        let integrity = self
            .compute_integrity(source, descriptor.part_size, descriptor.redundancy)
            .await?;
        let tx_hash = self
            .ctx
            .chain()
            .create_object(&descriptor, &integrity)
            .await?;
        info!(bucket, object, tx_hash = %tx_hash, size = descriptor.size, "object created");
        Ok(CreateObjectResult { tx_hash, integrity })
    }

    /// Polls the chain until the object is sealed.
    ///
    /// Waits between polls follow the retry policy's backoff.
    pub async fn wait_for_seal(
        &self,
        bucket: &str,
        object: &str,
        max_polls: u32,
    ) -> Result<ObjectMeta, ClientError> {
        let retry = self.ctx.options().retry;
        for poll in 1..=max_polls {
            let meta = self.ctx.chain().head_object(bucket, object).await?;
            if meta.is_sealed() {
                debug!(bucket, object, poll, "object sealed");
                return Ok(meta);
            }
            if poll == max_polls {
                break;
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(TransferError::Cancelled.into()),
                _ = tokio::time::sleep(retry.delay_for_attempt(poll)) => {}
            }
        }
        Err(ClientError::SealTimeout {
            bucket: bucket.to_string(),
            object: object.to_string(),
            polls: max_polls,
        })
    }

    /// Uploads the payload of an object already created on chain.
    ///
    /// Resumes from the last checkpoint for this bucket, object and part
    /// size. On failure the checkpoint is left at the highest contiguous
    /// acknowledged offset so a later call sends only what is missing.
    pub async fn put_object(
        &self,
        bucket: &str,
        object: &str,
        source: Arc<dyn ObjectSource>,
    ) -> Result<UploadOutcome, ClientError> {
        let size = source.size();
        let mut descriptor = self.descriptor(bucket, object, size)?;

        let meta = self.ctx.chain().head_object(bucket, object).await?;
        if !meta.content_type.is_empty() {
            descriptor = descriptor.with_content_type(&meta.content_type);
        }
        if meta.is_sealed() {
            return Err(TransferError::InvalidConfiguration(format!(
                "object {bucket}/{object} is already sealed"
            ))
            .into());
        }
        if meta.payload_size != size {
            return Err(TransferError::InvalidConfiguration(format!(
                "payload is {size} bytes but the chain expects {}",
                meta.payload_size
            ))
            .into());
        }

        let integrity = self
            .compute_integrity(source.clone(), descriptor.part_size, descriptor.redundancy)
            .await?;
        if !meta.checksums.is_empty() && meta.checksums != integrity.hex_roots() {
            return Err(TransferError::IntegrityMismatch {
                segment: 0,
                detail: "local payload does not match the integrity roots on chain".into(),
            }
            .into());
        }

        let endpoint = self.ctx.endpoint_for_bucket(bucket).await?;
        let target = UploadTarget {
            endpoint,
            descriptor,
            object_id: meta.id,
        };
        let key = TransferKey::upload(bucket, object, target.descriptor.part_size);
        let resume = self.ctx.resume_point(&key, size).await?;
        let restarted = resume.discarded.is_some();

        if size == 0 {
            return self.put_empty(&target, integrity, restarted).await;
        }

        let segmenter = Segmenter::new(size, target.descriptor.part_size)?;
        let start_index = segmenter.index_for_offset(resume.offset).ok_or_else(|| {
            TransferError::CorruptCheckpoint {
                offset: resume.offset,
                reason: "offset is not on a segment boundary".into(),
            }
        })?;
        let session = TransferSession::new(TransferDirection::Upload, &segmenter, start_index);
        session.start();

        info!(
            transfer_id = %session.id(),
            bucket,
            object,
            size,
            part_size = segmenter.part_size(),
            resume_offset = resume.offset,
            "upload started"
        );
        self.emit(TransferEvent::Started {
            transfer_id: session.id(),
            direction: TransferDirection::Upload,
            total_bytes: size,
            resume_offset: resume.offset,
        });

        let result = self
            .send_segments(&target, &source, &segmenter, start_index, &session, &key)
            .await;

        match result {
            Ok(stats) => {
                self.ctx.clear_checkpoint(&key).await?;
                session.complete();
                info!(
                    transfer_id = %session.id(),
                    segments = stats.segments,
                    bytes = stats.bytes,
                    elapsed_ms = session.elapsed().as_millis() as u64,
                    "upload completed"
                );
                self.emit(TransferEvent::Completed {
                    transfer_id: session.id(),
                });
                Ok(UploadOutcome {
                    object_id: target.object_id,
                    integrity,
                    segments_sent: stats.segments,
                    bytes_sent: stats.bytes,
                    resumed_from: resume.offset,
                    restarted_from_corrupt_checkpoint: restarted,
                    progress: session.progress(),
                })
            }
            Err(err) => {
                if matches!(err, TransferError::Cancelled) {
                    session.cancel();
                } else {
                    session.fail(&err.to_string());
                }
                if matches!(err, TransferError::IntegrityMismatch { .. }) {
                    self.ctx.clear_checkpoint(&key).await?;
                }
                warn!(transfer_id = %session.id(), error = %err, "upload failed");
                self.emit(TransferEvent::Failed {
                    transfer_id: session.id(),
                    error: err.to_string(),
                });
                Err(err.into())
            }
        }
    }

    /// Sends a zero-length payload as one completing request.
    async fn put_empty(
        &self,
        target: &UploadTarget,
        integrity: IntegrityHashSet,
        restarted: bool,
    ) -> Result<UploadOutcome, ClientError> {
        let transfer_id = uuid::Uuid::new_v4().to_string();
        self.emit(TransferEvent::Started {
            transfer_id: transfer_id.clone(),
            direction: TransferDirection::Upload,
            total_bytes: 0,
            resume_offset: 0,
        });
        let runner = self.runner(None);
        let segment = Segment {
            index: 0,
            offset: 0,
            len: 0,
        };
        let checksum = hex::encode(segment_checksum(&[]));
        let result = tokio::select! {
            _ = self.cancel.cancelled() => Err(TransferError::Cancelled),
            r = runner.run(segment, || {
                self.send_segment(target, segment, Vec::new(), &checksum, true)
            }) => r,
        };

        let status = match &result {
            Ok(()) => TransferStatus::Completed,
            Err(TransferError::Cancelled) => TransferStatus::Cancelled,
            Err(_) => TransferStatus::Failed,
        };
        let progress = TransferProgress {
            transfer_id: transfer_id.clone(),
            direction: TransferDirection::Upload,
            status,
            total_bytes: 0,
            transferred_bytes: 0,
            resumed_bytes: 0,
            segments_total: 1,
            segments_done: u64::from(result.is_ok()),
            error: result
                .as_ref()
                .err()
                .map(ToString::to_string)
                .unwrap_or_default(),
        };

        if let Err(err) = result {
            self.emit(TransferEvent::Failed {
                transfer_id,
                error: err.to_string(),
            });
            return Err(err.into());
        }
        info!(transfer_id = %transfer_id, object = %target.descriptor.object, "empty object uploaded");
        self.emit(TransferEvent::Completed { transfer_id });
        Ok(UploadOutcome {
            object_id: target.object_id.clone(),
            integrity,
            segments_sent: 1,
            bytes_sent: 0,
            resumed_from: 0,
            restarted_from_corrupt_checkpoint: restarted,
            progress,
        })
    }

    fn runner<'s>(&'s self, session: Option<&'s TransferSession>) -> SegmentRunner<'s> {
        let opts = self.ctx.options();
        SegmentRunner {
            direction: TransferDirection::Upload,
            retry: opts.retry,
            timeout: opts.request_timeout,
            faults: self.faults.as_ref(),
            session,
            events: self.events.as_ref(),
        }
    }

    async fn send_segments(
        &self,
        target: &UploadTarget,
        source: &Arc<dyn ObjectSource>,
        segmenter: &Segmenter,
        start_index: u64,
        session: &TransferSession,
        key: &TransferKey,
    ) -> Result<SendStats, TransferError> {
        let parallelism = self.ctx.options().parallelism.max(1);
        let last_index = segmenter.segment_count().saturating_sub(1);
        let runner = self.runner(Some(session));
        let speed = SpeedCalculator::default();
        let mut watermark = AckWatermark::new(*segmenter, start_index);
        let mut pending = segmenter.iter_from(start_index);
        let mut final_segment: Option<Segment> = None;
        let mut in_flight = FuturesUnordered::new();
        let mut failure: Option<TransferError> = None;
        let mut stats = SendStats::default();

        loop {
            if failure.is_none() {
                while in_flight.len() < parallelism {
                    match pending.next() {
                        Some(seg) if seg.index == last_index => {
                            final_segment = Some(seg);
                            break;
                        }
                        Some(seg) => {
                            in_flight.push(self.upload_segment(&runner, target, source, seg, false));
                        }
                        None => break,
                    }
                }
                if in_flight.is_empty()
                    && let Some(seg) = final_segment.take()
                {
                    in_flight.push(self.upload_segment(&runner, target, source, seg, true));
                }
            }
            if in_flight.is_empty() {
                break;
            }

            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!(transfer_id = %session.id(), offset = watermark.offset(), "upload cancelled");
                    return Err(TransferError::Cancelled);
                }
                next = in_flight.next() => next,
            };
            let Some((seg, result)) = next else { break };

            match result {
                Ok(()) => {
                    session.ack(seg.index);
                    stats.segments += 1;
                    stats.bytes += seg.len;
                    speed.record(seg.len);
                    if let Some(offset) = watermark.ack(seg.index) {
                        self.ctx
                            .save_checkpoint(key, Checkpoint::new(key, segmenter.size(), offset))
                            .await?;
                        debug!(transfer_id = %session.id(), offset, "checkpoint advanced");
                        self.emit(TransferEvent::CheckpointSaved {
                            transfer_id: session.id(),
                            offset,
                        });
                    }
                    let progress = session.progress();
                    self.emit(TransferEvent::Progress {
                        transfer_id: session.id(),
                        eta: speed.eta(progress.remaining_bytes()),
                        bytes_per_second: speed.bytes_per_second(),
                        progress,
                    });
                }
                Err(err) => {
                    if matches!(err, TransferError::IntegrityMismatch { .. }) {
                        return Err(err);
                    }
                    if failure.is_none() {
                        warn!(
                            transfer_id = %session.id(),
                            segment = seg.index,
                            error = %err,
                            in_flight = in_flight.len(),
                            "segment failed, draining in-flight segments"
                        );
                        failure = Some(err);
                    }
                }
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(stats),
        }
    }

    async fn upload_segment(
        &self,
        runner: &SegmentRunner<'_>,
        target: &UploadTarget,
        source: &Arc<dyn ObjectSource>,
        seg: Segment,
        complete: bool,
    ) -> (Segment, Result<(), TransferError>) {
        let result = async {
            let data = read_segment(source.clone(), seg).await?;
            let checksum = hex::encode(segment_checksum(&data));
            runner
                .run(seg, || {
                    self.send_segment(target, seg, data.clone(), &checksum, complete)
                })
                .await
        }
        .await;
        (seg, result)
    }

    async fn send_segment(
        &self,
        target: &UploadTarget,
        seg: Segment,
        data: Vec<u8>,
        checksum: &str,
        complete: bool,
    ) -> Result<(), TransferError> {
        let d = &target.descriptor;
        let request = SpRequest::new(HttpMethod::Put, &target.endpoint, &d.bucket, &d.object)
            .query(QUERY_OFFSET, seg.offset)
            .query(QUERY_COMPLETE, complete)
            .header(HEADER_OBJECT_ID, &target.object_id)
            .header(HEADER_REDUNDANCY_INDEX, PRIMARY_REDUNDANCY_INDEX)
            .header(HEADER_PIECE_INDEX, seg.index)
            .header(HEADER_CONTENT_SHA256, checksum)
            .header(HEADER_CONTENT_TYPE, &d.content_type)
            .body(data);
        let resp = self.ctx.transport().send(request).await?;
        check_response(resp, seg.index)?;
        Ok(())
    }
}

async fn read_segment(
    source: Arc<dyn ObjectSource>,
    seg: Segment,
) -> Result<Vec<u8>, TransferError> {
    tokio::task::spawn_blocking(move || source.read_at(seg.offset, seg.len))
        .await
        .map_err(|e| TransferError::Io(std::io::Error::other(e)))?
}
