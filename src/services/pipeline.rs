use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use rand::Rng;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, sleep};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{AppConfig, CompressionFailureMode};
use crate::entities::photos;
use crate::services::compression::{CompressedImage, CompressionConfig, ImageCompressor};
use crate::services::gallery::GalleryFeed;
use crate::services::photos::{NewPhoto, PhotoCollection};
use crate::services::storage::ObjectStorage;

/// One photo as received from the request, before compression.
#[derive(Debug, Clone)]
pub struct RawImage {
    pub file_name: Option<String>,
    pub data: Vec<u8>,
}

/// Progress phases of a live batch. A batch that no longer exists in the
/// registry is idle; there is no stored idle value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    Compressing,
    Uploading,
    Done,
}

impl BatchPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            BatchPhase::Compressing => "compressing",
            BatchPhase::Uploading => "uploading",
            BatchPhase::Done => "done",
        }
    }
}

/// Events folded into `BatchState` by the owner loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchEvent {
    CompressionFinished,
    /// One item settled, stored or dropped alike.
    ItemCompleted,
    Finalized,
}

/// Counters and phase of one batch. Owned by the request that created it;
/// everyone else reads published clones through the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchState {
    pub phase: BatchPhase,
    pub completed: usize,
    pub total: usize,
}

impl BatchState {
    pub fn new(total: usize) -> Self {
        Self {
            phase: BatchPhase::Compressing,
            completed: 0,
            total,
        }
    }

    /// Pure transition. The counter saturates at `total`.
    pub fn apply(&self, event: BatchEvent) -> Self {
        let mut next = self.clone();
        match event {
            BatchEvent::CompressionFinished => next.phase = BatchPhase::Uploading,
            BatchEvent::ItemCompleted => {
                next.completed = (next.completed + 1).min(next.total);
            }
            BatchEvent::Finalized => next.phase = BatchPhase::Done,
        }

        next
    }
}

/// Live batches by id, each readable through its progress channel.
/// Entries are removed when the batch terminates or aborts.
pub type BatchRegistry = Arc<DashMap<String, watch::Receiver<BatchState>>>;

/// What the caller gets back once the whole batch settled. `processed`
/// counts every item, stored and dropped alike; the summary never
/// distinguishes the two.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub batch_id: String,
    pub total: usize,
    pub processed: usize,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Compression failed for {failed} of {total} photos")]
    CompressionAborted { failed: usize, total: usize },
}

/// One message per item task, whatever happened to the item.
#[derive(Debug)]
enum ItemOutcome {
    Stored(photos::Model),
    Failed,
}

/// Drives one batch end to end: compression stage, then one isolated
/// upload task per item, folded back into batch progress.
///
/// Item failures are caught at the task boundary, logged and counted;
/// they never touch their siblings and never surface past the summary.
pub struct UploadPipeline {
    compressor: ImageCompressor,
    storage: Arc<dyn ObjectStorage>,
    collection: Arc<PhotoCollection>,
    gallery: Arc<GalleryFeed>,
    batches: BatchRegistry,
    failure_mode: CompressionFailureMode,
    key_prefix: String,
    success_delay: Duration,
}

impl UploadPipeline {
    pub fn new(
        config: &AppConfig,
        storage: Arc<dyn ObjectStorage>,
        collection: Arc<PhotoCollection>,
        gallery: Arc<GalleryFeed>,
        batches: BatchRegistry,
    ) -> Self {
        Self {
            compressor: ImageCompressor::new(CompressionConfig {
                max_bytes: config.photo_max_bytes,
                max_dimension: config.photo_max_dimension,
            }),
            storage,
            collection,
            gallery,
            batches,
            failure_mode: config.compression_failure_mode,
            key_prefix: config.storage_key_prefix.clone(),
            success_delay: Duration::from_millis(config.success_delay_ms),
        }
    }

    /// Run one batch to completion. Resolves only after every item has
    /// settled; the counter reaches `total` no matter how many items fail.
    pub async fn process_batch(&self, items: Vec<RawImage>) -> Result<BatchSummary, PipelineError> {
        let batch_id = Uuid::new_v4().to_string();
        let total = items.len();
        info!("Processing photo batch {} ({} items)", batch_id, total);

        let mut state = BatchState::new(total);
        let (progress_tx, progress_rx) = watch::channel(state.clone());
        self.batches.insert(batch_id.clone(), progress_rx);
        let _guard = RegistryGuard {
            batches: Arc::clone(&self.batches),
            batch_id: batch_id.clone(),
        };

        // Compression stage: all items, then one policy decision
        let (names, payloads): (Vec<_>, Vec<_>) = items
            .into_iter()
            .map(|item| (item.file_name, item.data))
            .unzip();
        let compressed = self.compressor.compress_batch(payloads).await;

        let failed = compressed.iter().filter(|r| r.is_err()).count();
        if failed > 0 && self.failure_mode == CompressionFailureMode::Abort {
            for e in compressed.iter().filter_map(|r| r.as_ref().err()) {
                error!("Batch {}: compression failed: {}", batch_id, e);
            }
            return Err(PipelineError::CompressionAborted { failed, total });
        }

        state = state.apply(BatchEvent::CompressionFinished);
        progress_tx.send_replace(state.clone());

        // Upload stage: one isolated task per item, one outcome each
        let (outcome_tx, mut outcome_rx) = mpsc::channel(total.max(1));
        let mut tasks = Vec::with_capacity(total);

        for (file_name, compressed_result) in names.into_iter().zip(compressed) {
            let outcome_tx = outcome_tx.clone();

            let image = match compressed_result {
                Ok(image) => image,
                Err(e) => {
                    // Skip mode: the item is already failed, only counted
                    warn!("Batch {}: photo dropped, compression failed: {}", batch_id, e);
                    let _ = outcome_tx.send(ItemOutcome::Failed).await;
                    continue;
                }
            };

            let storage = Arc::clone(&self.storage);
            let collection = Arc::clone(&self.collection);
            let key_prefix = self.key_prefix.clone();
            let batch_id = batch_id.clone();

            tasks.push(tokio::spawn(async move {
                let outcome =
                    match upload_one(storage.as_ref(), &collection, &key_prefix, file_name, image)
                        .await
                    {
                        Ok(record) => ItemOutcome::Stored(record),
                        Err(e) => {
                            warn!("Batch {}: photo dropped, upload failed: {}", batch_id, e);
                            ItemOutcome::Failed
                        }
                    };

                let _ = outcome_tx.send(outcome).await;
            }));
        }
        drop(outcome_tx);

        // Fold outcomes until every sender is gone. Stored records reach
        // the gallery here, in completion order.
        while let Some(outcome) = outcome_rx.recv().await {
            if let ItemOutcome::Stored(record) = outcome {
                self.gallery.publish_local_insert(record);
            }

            state = state.apply(BatchEvent::ItemCompleted);
            progress_tx.send_replace(state.clone());
        }

        // Reap every handle; a panicked task is a failed item, still counted
        for task in tasks {
            if let Err(e) = task.await {
                error!("Batch {}: upload task panicked: {}", batch_id, e);
                state = state.apply(BatchEvent::ItemCompleted);
                progress_tx.send_replace(state.clone());
            }
        }

        // Short hold before the terminal phase
        sleep(self.success_delay).await;

        state = state.apply(BatchEvent::Finalized);
        progress_tx.send_replace(state.clone());
        info!(
            "Batch {} done: {}/{} photos processed",
            batch_id, state.completed, state.total
        );

        Ok(BatchSummary {
            batch_id,
            total,
            processed: state.completed,
        })
    }
}

/// Per-item pipeline: key, blob, URL, record. Any failure drops the item.
async fn upload_one(
    storage: &dyn ObjectStorage,
    collection: &PhotoCollection,
    key_prefix: &str,
    file_name: Option<String>,
    image: CompressedImage,
) -> anyhow::Result<photos::Model> {
    // 1. Key is generated blind; nothing checks the store for collisions
    let key = generate_storage_key(key_prefix);

    // 2. Blob write comes first; a record never points at a missing blob
    storage
        .put_object(&key, image.data, image.content_type)
        .await?;

    // 3. The public URL is read back from the store, not assembled here
    let url = storage.public_url(&key).await?;

    // 4. The collection assigns id and created_at
    let record = collection
        .append(NewPhoto {
            url,
            original_file_name: file_name,
        })
        .await?;

    Ok(record)
}

/// Storage key for one photo blob: `{prefix}/{unix_millis}_{suffix}` with
/// a five character base-36 suffix.
pub fn generate_storage_key(prefix: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    let mut rng = rand::thread_rng();
    let suffix: String = (0..5)
        .map(|_| {
            let digit = rng.gen_range(0..36u32);
            char::from_digit(digit, 36).unwrap_or('0')
        })
        .collect();

    format!("{}/{}_{}", prefix, millis, suffix)
}

/// Removes the batch from the registry on every exit path, the abort
/// and cancellation ones included.
struct RegistryGuard {
    batches: BatchRegistry,
    batch_id: String,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        self.batches.remove(&self.batch_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_state_walks_all_phases() {
        let state = BatchState::new(3);
        assert_eq!(state.phase, BatchPhase::Compressing);
        assert_eq!((state.completed, state.total), (0, 3));

        let state = state.apply(BatchEvent::CompressionFinished);
        assert_eq!(state.phase, BatchPhase::Uploading);

        let state = state
            .apply(BatchEvent::ItemCompleted)
            .apply(BatchEvent::ItemCompleted)
            .apply(BatchEvent::ItemCompleted);
        assert_eq!(state.completed, 3);
        assert_eq!(state.phase, BatchPhase::Uploading);

        let state = state.apply(BatchEvent::Finalized);
        assert_eq!(state.phase, BatchPhase::Done);
    }

    #[test]
    fn test_batch_counter_saturates_at_total() {
        let mut state = BatchState::new(2);
        for _ in 0..5 {
            state = state.apply(BatchEvent::ItemCompleted);
        }
        assert_eq!(state.completed, 2);
    }

    #[test]
    fn test_apply_leaves_the_previous_state_alone() {
        let first = BatchState::new(1);
        let _ = first.apply(BatchEvent::ItemCompleted);
        assert_eq!(first.completed, 0);
    }

    #[test]
    fn test_phase_labels() {
        assert_eq!(BatchPhase::Compressing.as_str(), "compressing");
        assert_eq!(BatchPhase::Uploading.as_str(), "uploading");
        assert_eq!(BatchPhase::Done.as_str(), "done");
    }

    #[test]
    fn test_storage_key_format() {
        let key = generate_storage_key("photos");

        let (prefix, rest) = key.split_once('/').unwrap();
        assert_eq!(prefix, "photos");

        let (millis, suffix) = rest.split_once('_').unwrap();
        let millis: i64 = millis.parse().unwrap();
        assert!((millis - Utc::now().timestamp_millis()).abs() < 5_000);

        assert_eq!(suffix.len(), 5);
        assert!(
            suffix
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase())
        );
    }

    #[test]
    fn test_storage_keys_differ_between_calls() {
        let a = generate_storage_key("photos");
        let b = generate_storage_key("photos");
        assert_ne!(a, b);
    }
}
