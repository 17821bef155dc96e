use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use photo_share_backend::config::{AppConfig, CompressionFailureMode};
use photo_share_backend::entities::photos;
use photo_share_backend::infrastructure::database;
use photo_share_backend::services::storage::ObjectStorage;
use photo_share_backend::{AppState, create_app};
use sea_orm::{Database, EntityTrait};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;

async fn setup_test_db() -> sea_orm::DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    database::run_migrations(&db).await.unwrap();
    db
}

/// In-memory blob store. Payloads listed in `reject_payloads` fail their
/// put, which injects a storage failure for exactly one known photo no
/// matter how the item tasks get scheduled.
struct MemoryObjectStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    reject_payloads: Mutex<Vec<Vec<u8>>>,
}

impl MemoryObjectStorage {
    fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            reject_payloads: Mutex::new(Vec::new()),
        }
    }

    fn rejecting(payloads: Vec<Vec<u8>>) -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            reject_payloads: Mutex::new(payloads),
        }
    }

    fn stored(&self) -> HashMap<String, Vec<u8>> {
        self.objects.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn put_object(&self, key: &str, data: Vec<u8>, _content_type: &str) -> anyhow::Result<()> {
        if self.reject_payloads.lock().unwrap().iter().any(|p| p == &data) {
            return Err(anyhow::anyhow!("injected storage failure"));
        }

        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(())
    }

    async fn public_url(&self, key: &str) -> anyhow::Result<String> {
        Ok(format!("http://storage.local/test-bucket/{}", key))
    }

    async fn object_exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }
}

async fn test_app(
    config: AppConfig,
    storage: Arc<MemoryObjectStorage>,
) -> (Router, AppState, sea_orm::DatabaseConnection) {
    let db = setup_test_db().await;
    let state = AppState::new(db.clone(), storage, config);
    (create_app(state.clone()), state, db)
}

/// Small PNG that passes through compression untouched, so the storage
/// fake sees these exact bytes.
fn png_bytes(seed: u8) -> Vec<u8> {
    let img = image::RgbImage::from_fn(16, 16, |x, y| {
        image::Rgb([seed, (x % 256) as u8, (y % 256) as u8])
    });
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

const BOUNDARY: &str = "---------------------------123456789012345678901234567";

fn multipart_body(photos: &[(&str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (field, filename, data) in photos {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\n\
                Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
                Content-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/photos")
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_batch_upload_stores_photos_and_feeds_gallery() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("photo_share_backend=debug,tower_http=debug"))
        .with(fmt::layer().with_test_writer())
        .try_init();

    let storage = Arc::new(MemoryObjectStorage::new());
    let (app, state, db) = test_app(AppConfig::development(), Arc::clone(&storage)).await;
    let start = chrono::Utc::now();

    // 1. Upload a batch of three photos
    let body = multipart_body(&[
        ("photo", "a.png", &png_bytes(1)),
        ("photo", "b.png", &png_bytes(2)),
        ("photo", "c.png", &png_bytes(3)),
    ]);
    let response = app.clone().oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json["total"].as_u64(), Some(3));
    assert_eq!(json["processed"].as_u64(), Some(3));
    assert_eq!(json["phase"].as_str(), Some("done"));
    assert!(!json["batch_id"].as_str().unwrap().is_empty());

    // 2. Every photo got its own record with a real URL and timestamp
    let records = photos::Entity::find().all(&db).await.unwrap();
    assert_eq!(records.len(), 3);
    for record in &records {
        assert!(record.url.starts_with("http://storage.local/test-bucket/photos/"));
        assert!(record.created_at >= start);
    }

    // 3. Every blob landed in the store under the photos prefix
    let stored = storage.stored();
    assert_eq!(stored.len(), 3);
    assert!(stored.keys().all(|k| k.starts_with("photos/")));

    // 4. The gallery feed saw each stored photo exactly once
    let snapshot = state.gallery.current();
    assert_eq!(snapshot.revision, 3);
    assert_eq!(snapshot.photos.len(), 3);
    for record in &records {
        let hits = snapshot.photos.iter().filter(|p| p.id == record.id).count();
        assert_eq!(hits, 1);
    }

    // 5. The listing endpoint returns all three, and the batch is gone
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/photos")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let listed: Vec<Value> = serde_json::from_slice(&body).unwrap();
    assert_eq!(listed.len(), 3);

    assert!(state.batches.is_empty());
}

#[tokio::test]
async fn test_storage_failure_is_isolated_to_its_item() {
    let poisoned = png_bytes(2);
    let storage = Arc::new(MemoryObjectStorage::rejecting(vec![poisoned.clone()]));
    let (app, state, db) = test_app(AppConfig::development(), Arc::clone(&storage)).await;

    let body = multipart_body(&[
        ("photo", "a.png", &png_bytes(1)),
        ("photo", "b.png", &poisoned),
        ("photo", "c.png", &png_bytes(3)),
    ]);
    let response = app.clone().oneshot(upload_request(body)).await.unwrap();

    // The batch still reports full completion
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["total"].as_u64(), Some(3));
    assert_eq!(json["processed"].as_u64(), Some(3));
    assert_eq!(json["phase"].as_str(), Some("done"));

    // The failed item left no blob, no record and no gallery entry
    let stored = storage.stored();
    assert_eq!(stored.len(), 2);
    assert!(stored.values().all(|data| data != &poisoned));

    let records = photos::Entity::find().all(&db).await.unwrap();
    assert_eq!(records.len(), 2);

    assert_eq!(state.gallery.current().photos.len(), 2);
}

#[tokio::test]
async fn test_batch_without_photos_is_rejected() {
    let storage = Arc::new(MemoryObjectStorage::new());
    let (app, state, db) = test_app(AppConfig::development(), storage).await;

    // A field under any other name does not count as a photo
    let body = multipart_body(&[("note", "note.txt", b"hello".as_slice())]);
    let response = app.clone().oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(state.batches.is_empty());
    assert!(
        photos::Entity::find()
            .all(&db)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_identical_photos_get_distinct_records_and_keys() {
    let storage = Arc::new(MemoryObjectStorage::new());
    let (app, _state, db) = test_app(AppConfig::development(), Arc::clone(&storage)).await;

    let same = png_bytes(7);
    let body = multipart_body(&[
        ("photo", "twin.png", &same),
        ("photo", "twin.png", &same),
    ]);
    let response = app.clone().oneshot(upload_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // No dedup anywhere: two blobs under two keys, two records
    assert_eq!(storage.stored().len(), 2);

    let records = photos::Entity::find().all(&db).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_ne!(records[0].id, records[1].id);
    assert_ne!(records[0].url, records[1].url);
}

#[tokio::test]
async fn test_corrupt_photo_aborts_the_batch_by_default() {
    let storage = Arc::new(MemoryObjectStorage::new());
    let (app, state, db) = test_app(AppConfig::development(), Arc::clone(&storage)).await;

    let body = multipart_body(&[
        ("photo", "good.png", &png_bytes(1)),
        ("photo", "bad.png", b"definitely not an image".as_slice()),
    ]);
    let response = app.clone().oneshot(upload_request(body)).await.unwrap();

    // One generic error, nothing written, batch gone
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(storage.stored().is_empty());
    assert!(
        photos::Entity::find()
            .all(&db)
            .await
            .unwrap()
            .is_empty()
    );
    assert!(state.batches.is_empty());
}

#[tokio::test]
async fn test_corrupt_photo_is_skipped_in_skip_mode() {
    let storage = Arc::new(MemoryObjectStorage::new());
    let config = AppConfig {
        compression_failure_mode: CompressionFailureMode::Skip,
        ..AppConfig::development()
    };
    let (app, state, db) = test_app(config, Arc::clone(&storage)).await;

    let body = multipart_body(&[
        ("photo", "good.png", &png_bytes(1)),
        ("photo", "bad.png", b"definitely not an image".as_slice()),
    ]);
    let response = app.clone().oneshot(upload_request(body)).await.unwrap();

    // The broken item is counted but only the good one lands anywhere
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["total"].as_u64(), Some(2));
    assert_eq!(json["processed"].as_u64(), Some(2));

    assert_eq!(storage.stored().len(), 1);
    assert_eq!(photos::Entity::find().all(&db).await.unwrap().len(), 1);
    assert_eq!(state.gallery.current().photos.len(), 1);
}

#[tokio::test]
async fn test_finished_batch_reads_as_unknown() {
    let storage = Arc::new(MemoryObjectStorage::new());
    let (app, _state, _db) = test_app(AppConfig::development(), storage).await;

    let body = multipart_body(&[("photo", "a.png", &png_bytes(1))]);
    let response = app.clone().oneshot(upload_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    let batch_id = json["batch_id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!("/photos/batches/{}", batch_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_gallery_event_stream_answers() {
    let storage = Arc::new(MemoryObjectStorage::new());
    let (app, _state, _db) = test_app(AppConfig::development(), storage).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/photos/events")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(content_type.starts_with("text/event-stream"));
}

#[tokio::test]
async fn test_health_endpoint() {
    let storage = Arc::new(MemoryObjectStorage::new());
    let (app, _state, _db) = test_app(AppConfig::development(), storage).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"].as_str(), Some("ok"));
    assert_eq!(json["database"].as_str(), Some("connected"));
    assert_eq!(json["storage"].as_str(), Some("connected"));
}
