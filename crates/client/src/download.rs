//! Resumable ranged download orchestrator.
//!
//! Ranged GETs run in parallel but their results are consumed strictly in
//! order, so the destination file only ever grows sequentially and the
//! checkpoint is simply the number of bytes written and synced.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream::FuturesOrdered;
use gnfd_transfer::{
    Checkpoint, FileSink, Segment, Segmenter, SpeedCalculator, TransferDirection, TransferError,
    TransferKey, TransferProgress, TransferSession,
};
use gnfd_types::constants::HEADER_RANGE;
use gnfd_types::{ByteRange, ObjectMeta, TransferStatus};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::ClientContext;
use crate::error::ClientError;
use crate::fault::{FaultInjector, NoFaults};
use crate::runner::SegmentRunner;
use crate::transport::{HttpMethod, SpRequest, check_response};
use crate::types::{DownloadOutcome, TransferEvent};

/// Where the segments of one download come from.
struct DownloadTarget {
    endpoint: String,
    bucket: String,
    object: String,
    /// Absolute object range; segment offsets are relative to its start.
    range: ByteRange,
}

impl DownloadTarget {
    fn absolute(&self, seg: Segment) -> Result<ByteRange, TransferError> {
        self.range
            .sub_range(seg.offset, seg.len)
            .ok_or_else(|| {
                TransferError::InvalidConfiguration(format!(
                    "segment {} lies outside range {}",
                    seg.index, self.range
                ))
            })
    }
}

/// Downloads objects from the primary storage provider.
pub struct DownloadOrchestrator<'a> {
    ctx: &'a ClientContext,
    cancel: CancellationToken,
    faults: Arc<dyn FaultInjector>,
    events: Option<mpsc::Sender<TransferEvent>>,
}

impl<'a> DownloadOrchestrator<'a> {
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

    fn runner<'s>(&'s self, session: Option<&'s TransferSession>) -> SegmentRunner<'s> {
        let opts = self.ctx.options();
        SegmentRunner {
            direction: TransferDirection::Download,
            retry: opts.retry,
            timeout: opts.request_timeout,
            faults: self.faults.as_ref(),
            session,
            events: self.events.as_ref(),
        }
    }

    async fn sealed_meta(&self, bucket: &str, object: &str) -> Result<ObjectMeta, ClientError> {
        let meta = self.ctx.chain().head_object(bucket, object).await?;
        if !meta.is_sealed() {
            return Err(ClientError::NotSealed {
                bucket: bucket.to_string(),
                object: object.to_string(),
            });
        }
        Ok(meta)
    }

    /// Resolves the requested range against the object size. `None` means
    /// the object is empty and nothing needs fetching.
    fn resolve_range(
        meta: &ObjectMeta,
        range: Option<ByteRange>,
    ) -> Result<Option<ByteRange>, TransferError> {
        match range {
            Some(r) => {
                r.check_within(meta.payload_size)?;
                Ok(Some(r))
            }
            None => Ok(ByteRange::full(meta.payload_size)),
        }
    }

    async fn target(
        &self,
        bucket: &str,
        object: &str,
        range: ByteRange,
    ) -> Result<DownloadTarget, ClientError> {
        let endpoint = self.ctx.endpoint_for_bucket(bucket).await?;
        Ok(DownloadTarget {
            endpoint,
            bucket: bucket.to_string(),
            object: object.to_string(),
            range,
        })
    }

    /// Downloads an object (or an inclusive byte range of it) into `dest`.
    ///
    /// Resumes from the last checkpoint for this bucket, object, range and
    /// part size: the destination is truncated to the checkpointed length
    /// and fetching continues from there.
    pub async fn download_to_file(
        &self,
        bucket: &str,
        object: &str,
        dest: &Path,
        range: Option<ByteRange>,
    ) -> Result<DownloadOutcome, ClientError> {
        let meta = self.sealed_meta(bucket, object).await?;
        let Some(resolved) = Self::resolve_range(&meta, range)? else {
            return self.download_empty(dest).await;
        };

        let total = resolved.len();
        let part_size = self.ctx.options().part_size.min(total);
        let segmenter = Segmenter::new(total, part_size)?;
        let target = self.target(bucket, object, resolved).await?;
        let key = TransferKey::download(bucket, object, part_size, range);

        let resume = self.ctx.resume_point(&key, total).await?;
        let mut restarted = resume.discarded.is_some();
        let (sink, resume_offset) = match open_sink(dest.to_path_buf(), resume.offset).await {
            Ok(sink) => (sink, resume.offset),
            Err(err @ TransferError::CorruptCheckpoint { .. }) => {
                warn!(path = %dest.display(), error = %err, "destination does not match checkpoint, restarting from zero");
                self.ctx.clear_checkpoint(&key).await?;
                restarted = true;
                (open_sink(dest.to_path_buf(), 0).await?, 0)
            }
            Err(err) => return Err(err.into()),
        };

        let start_index = segmenter.index_for_offset(resume_offset).ok_or_else(|| {
            TransferError::CorruptCheckpoint {
                offset: resume_offset,
                reason: "offset is not on a segment boundary".into(),
            }
        })?;
        let session = TransferSession::new(TransferDirection::Download, &segmenter, start_index);
        session.start();

        info!(
            transfer_id = %session.id(),
            bucket,
            object,
            range = %resolved,
            part_size,
            resume_offset,
            "download started"
        );
        self.emit(TransferEvent::Started {
            transfer_id: session.id(),
            direction: TransferDirection::Download,
            total_bytes: total,
            resume_offset,
        });

        let result = self
            .fetch_to_sink(&target, sink, &segmenter, start_index, &session, &key)
            .await;

        match result {
            Ok(fetched) => {
                self.ctx.clear_checkpoint(&key).await?;
                session.complete();
                info!(
                    transfer_id = %session.id(),
                    segments = fetched,
                    elapsed_ms = session.elapsed().as_millis() as u64,
                    "download completed"
                );
                self.emit(TransferEvent::Completed {
                    transfer_id: session.id(),
                });
                Ok(DownloadOutcome {
                    path: dest.to_path_buf(),
                    range: Some(resolved),
                    bytes_written: total - resume_offset,
                    segments_fetched: fetched,
                    resumed_from: resume_offset,
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
                warn!(transfer_id = %session.id(), error = %err, "download failed");
                self.emit(TransferEvent::Failed {
                    transfer_id: session.id(),
                    error: err.to_string(),
                });
                Err(err.into())
            }
        }
    }

    async fn download_empty(&self, dest: &Path) -> Result<DownloadOutcome, ClientError> {
        open_sink(dest.to_path_buf(), 0).await?;
        let transfer_id = uuid::Uuid::new_v4().to_string();
        debug!(transfer_id = %transfer_id, path = %dest.display(), "empty object, nothing to fetch");
        self.emit(TransferEvent::Completed {
            transfer_id: transfer_id.clone(),
        });
        Ok(DownloadOutcome {
            path: dest.to_path_buf(),
            range: None,
            bytes_written: 0,
            segments_fetched: 0,
            resumed_from: 0,
            restarted_from_corrupt_checkpoint: false,
            progress: TransferProgress {
                transfer_id,
                direction: TransferDirection::Download,
                status: TransferStatus::Completed,
                total_bytes: 0,
                transferred_bytes: 0,
                resumed_bytes: 0,
                segments_total: 0,
                segments_done: 0,
                error: String::new(),
            },
        })
    }

    async fn fetch_to_sink(
        &self,
        target: &DownloadTarget,
        mut sink: FileSink,
        segmenter: &Segmenter,
        start_index: u64,
        session: &TransferSession,
        key: &TransferKey,
    ) -> Result<u64, TransferError> {
        let parallelism = self.ctx.options().parallelism.max(1);
        let runner = self.runner(Some(session));
        let speed = SpeedCalculator::default();
        let mut pending = segmenter.iter_from(start_index);
        let mut in_flight = FuturesOrdered::new();
        let mut fetched = 0u64;

        loop {
            while in_flight.len() < parallelism {
                let Some(seg) = pending.next() else { break };
                in_flight.push_back(self.fetch_segment(&runner, target, seg));
            }

            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!(transfer_id = %session.id(), offset = sink.written(), "download cancelled");
                    return Err(TransferError::Cancelled);
                }
                next = in_flight.next() => next,
            };
            let Some((seg, result)) = next else { break };

            // Later segments cannot be written past a gap, so the first
            // failure ends the transfer.
            let data = result?;
            sink = write_synced(sink, seg.offset, data).await?;
            session.ack(seg.index);
            fetched += 1;
            speed.record(seg.len);

            let offset = sink.written();
            self.ctx
                .save_checkpoint(key, Checkpoint::new(key, segmenter.size(), offset))
                .await?;
            self.emit(TransferEvent::CheckpointSaved {
                transfer_id: session.id(),
                offset,
            });
            let progress = session.progress();
            self.emit(TransferEvent::Progress {
                transfer_id: session.id(),
                eta: speed.eta(progress.remaining_bytes()),
                bytes_per_second: speed.bytes_per_second(),
                progress,
            });
        }
        Ok(fetched)
    }

    async fn fetch_segment(
        &self,
        runner: &SegmentRunner<'_>,
        target: &DownloadTarget,
        seg: Segment,
    ) -> (Segment, Result<Vec<u8>, TransferError>) {
        let result = match target.absolute(seg) {
            Ok(range) => runner.run(seg, || self.get_range(target, seg.index, range)).await,
            Err(err) => Err(err),
        };
        (seg, result)
    }

    /// One ranged GET. The body must be exactly the requested length.
    async fn get_range(
        &self,
        target: &DownloadTarget,
        index: u64,
        range: ByteRange,
    ) -> Result<Vec<u8>, TransferError> {
        let request = SpRequest::new(
            HttpMethod::Get,
            &target.endpoint,
            &target.bucket,
            &target.object,
        )
        .header(HEADER_RANGE, range.header_value());
        let resp = check_response(self.ctx.transport().send(request).await?, index)?;
        if resp.body.len() as u64 != range.len() {
            return Err(TransferError::Network(format!(
                "range {range} returned {} bytes, expected {}",
                resp.body.len(),
                range.len()
            )));
        }
        Ok(resp.body)
    }

    /// Fetches an object, or a range of it, with a single request.
    ///
    /// Not resumable; failed attempts are retried under the configured
    /// policy.
    pub async fn get_object(
        &self,
        bucket: &str,
        object: &str,
        range: Option<ByteRange>,
    ) -> Result<Vec<u8>, ClientError> {
        let meta = self.sealed_meta(bucket, object).await?;
        let Some(resolved) = Self::resolve_range(&meta, range)? else {
            return Ok(Vec::new());
        };
        let target = self.target(bucket, object, resolved).await?;
        let seg = Segment {
            index: 0,
            offset: 0,
            len: resolved.len(),
        };
        let runner = self.runner(None);
        let data = tokio::select! {
            _ = self.cancel.cancelled() => Err(TransferError::Cancelled),
            r = runner.run(seg, || self.get_range(&target, 0, resolved)) => r,
        }?;
        debug!(bucket, object, range = %resolved, bytes = data.len(), "object fetched");
        Ok(data)
    }

    /// Fetches an inclusive range into memory in part-sized requests.
    pub async fn get_object_range_to_vec(
        &self,
        bucket: &str,
        object: &str,
        range: ByteRange,
    ) -> Result<Vec<u8>, ClientError> {
        let meta = self.sealed_meta(bucket, object).await?;
        range.check_within(meta.payload_size).map_err(TransferError::from)?;

        let total = range.len();
        let segmenter = Segmenter::new(total, self.ctx.options().part_size.min(total))?;
        let target = self.target(bucket, object, range).await?;
        let parallelism = self.ctx.options().parallelism.max(1);
        let runner = self.runner(None);

        let mut out = Vec::with_capacity(total as usize);
        let mut pending = segmenter.iter();
        let mut in_flight = FuturesOrdered::new();
        loop {
            while in_flight.len() < parallelism {
                let Some(seg) = pending.next() else { break };
                in_flight.push_back(self.fetch_segment(&runner, &target, seg));
            }
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(TransferError::Cancelled.into()),
                next = in_flight.next() => next,
            };
            let Some((_, result)) = next else { break };
            out.extend_from_slice(&result?);
        }
        Ok(out)
    }
}

async fn open_sink(path: PathBuf, resume_offset: u64) -> Result<FileSink, TransferError> {
    tokio::task::spawn_blocking(move || FileSink::open(&path, resume_offset))
        .await
        .map_err(|e| TransferError::Io(std::io::Error::other(e)))?
}

/// Appends `data` and syncs it before the checkpoint may claim it.
async fn write_synced(
    mut sink: FileSink,
    offset: u64,
    data: Vec<u8>,
) -> Result<FileSink, TransferError> {
    tokio::task::spawn_blocking(move || -> Result<FileSink, TransferError> {
        sink.write_segment(offset, &data)?;
        sink.sync()?;
        Ok(sink)
    })
    .await
    .map_err(|e| TransferError::Io(std::io::Error::other(e)))?
}
