pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod services;

use std::sync::Arc;

use axum::{
    Router,
    middleware::from_fn,
    routing::{get, post},
};
use dashmap::DashMap;
use sea_orm::DatabaseConnection;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::services::gallery::GalleryFeed;
use crate::services::photos::PhotoCollection;
use crate::services::pipeline::{BatchRegistry, UploadPipeline};
use crate::services::storage::ObjectStorage;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::photos::upload::upload_photos,
        api::handlers::photos::gallery::list_photos,
        api::handlers::photos::gallery::gallery_events,
        api::handlers::photos::gallery::batch_progress,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::photos::types::BatchUploadResponse,
            api::handlers::photos::types::PhotoResponse,
            api::handlers::photos::types::BatchProgressResponse,
            api::handlers::photos::types::GalleryEvent,
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "photos", description = "Photo upload and gallery endpoints"),
        (name = "system", description = "Health and diagnostics")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub storage: Arc<dyn ObjectStorage>,
    pub photos: Arc<PhotoCollection>,
    pub gallery: Arc<GalleryFeed>,
    pub pipeline: Arc<UploadPipeline>,
    pub batches: BatchRegistry,
    pub config: AppConfig,
}

impl AppState {
    /// Wire the services around one database and one blob store.
    pub fn new(
        db: DatabaseConnection,
        storage: Arc<dyn ObjectStorage>,
        config: AppConfig,
    ) -> Self {
        let photos = Arc::new(PhotoCollection::new(db.clone()));
        let gallery = Arc::new(GalleryFeed::new(config.gallery_mode));
        let batches: BatchRegistry = Arc::new(DashMap::new());
        let pipeline = Arc::new(UploadPipeline::new(
            &config,
            Arc::clone(&storage),
            Arc::clone(&photos),
            Arc::clone(&gallery),
            Arc::clone(&batches),
        ));

        Self {
            db,
            storage,
            photos,
            gallery,
            pipeline,
            batches,
            config,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/photos",
            post(api::handlers::photos::upload_photos).get(api::handlers::photos::list_photos),
        )
        .route("/photos/events", get(api::handlers::photos::gallery_events))
        .route(
            "/photos/batches/:id",
            get(api::handlers::photos::batch_progress),
        )
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .layer(axum::extract::DefaultBodyLimit::max(
            state.config.max_request_bytes + 10 * 1024 * 1024, // Add 10MB buffer for multipart overhead
        ))
        .with_state(state)
}
