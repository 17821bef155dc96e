use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

use crate::config::GalleryMode;
use crate::entities::photos;
use crate::services::photos::PhotoCollection;

/// Gallery contents as last published, newest photo first. `revision`
/// increments on every change so stream consumers can tell snapshots apart.
#[derive(Debug, Clone, Serialize)]
pub struct GallerySnapshot {
    pub revision: u64,
    pub photos: Vec<photos::Model>,
}

/// Fan-out point for gallery updates. Everything that renders the gallery
/// subscribes here; who writes depends on the mode.
///
/// In optimistic mode each finished upload is prepended directly. In live
/// mode the snapshot belongs to `LiveFeedWorker`, which re-reads the whole
/// collection so photos inserted outside this service appear too.
pub struct GalleryFeed {
    mode: GalleryMode,
    tx: watch::Sender<GallerySnapshot>,
}

impl GalleryFeed {
    pub fn new(mode: GalleryMode) -> Self {
        let (tx, _rx) = watch::channel(GallerySnapshot {
            revision: 0,
            photos: Vec::new(),
        });

        Self { mode, tx }
    }

    pub fn mode(&self) -> GalleryMode {
        self.mode
    }

    pub fn subscribe(&self) -> watch::Receiver<GallerySnapshot> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> GallerySnapshot {
        self.tx.borrow().clone()
    }

    /// Prepend one freshly uploaded photo. In live mode this is a no-op;
    /// the poller picks the record up from the collection on its next pass.
    pub fn publish_local_insert(&self, photo: photos::Model) {
        if self.mode != GalleryMode::Optimistic {
            return;
        }

        self.tx.send_modify(|snapshot| {
            snapshot.revision += 1;
            snapshot.photos.insert(0, photo);
        });
    }

    /// Replace the whole snapshot. Publishes only when the contents
    /// actually changed, so idle polling does not wake subscribers.
    pub fn replace_all(&self, photos: Vec<photos::Model>) {
        self.tx.send_if_modified(|snapshot| {
            if snapshot.photos == photos {
                return false;
            }

            snapshot.revision += 1;
            snapshot.photos = photos;
            true
        });
    }
}

/// Polls the photo collection and republishes the gallery snapshot.
/// Only spawned when the service runs in live gallery mode.
pub struct LiveFeedWorker {
    photos: Arc<PhotoCollection>,
    feed: Arc<GalleryFeed>,
    poll_interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl LiveFeedWorker {
    pub fn new(
        photos: Arc<PhotoCollection>,
        feed: Arc<GalleryFeed>,
        poll_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            photos,
            feed,
            poll_interval,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("🚀 Live gallery worker started");

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Live gallery worker shutting down");
                    break;
                }
                _ = sleep(self.poll_interval) => {
                    self.poll_once().await;
                }
            }
        }
    }

    /// One refresh pass. Failures are logged and retried on the next tick.
    pub async fn poll_once(&self) {
        match self.photos.newest_first(None).await {
            Ok(photos) => self.feed.replace_all(photos),
            Err(e) => tracing::error!("Failed to refresh gallery snapshot: {}", e),
        }
    }
}
