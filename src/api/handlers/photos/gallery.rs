use std::convert::Infallible;

use axum::{
    Json,
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;

use crate::AppState;
use crate::api::error::AppError;

use super::types::*;

#[utoipa::path(
    get,
    path = "/photos",
    params(
        ("limit" = Option<u64>, Query, description = "Maximum number of photos returned")
    ),
    responses(
        (status = 200, description = "Photos, newest first", body = [PhotoResponse])
    ),
    tag = "photos"
)]
pub async fn list_photos(
    State(state): State<AppState>,
    Query(query): Query<ListPhotosQuery>,
) -> Result<Json<Vec<PhotoResponse>>, AppError> {
    let photos = state.photos.newest_first(query.limit).await?;

    Ok(Json(photos.into_iter().map(PhotoResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/photos/events",
    responses(
        (status = 200, description = "Server-sent `gallery` events, one full snapshot each")
    ),
    tag = "photos"
)]
pub async fn gallery_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.gallery.subscribe();

    let stream = async_stream::stream! {
        loop {
            // The borrow must not be held across an await
            let event = {
                let snapshot = rx.borrow_and_update();
                GalleryEvent {
                    revision: snapshot.revision,
                    photos: snapshot
                        .photos
                        .iter()
                        .cloned()
                        .map(PhotoResponse::from)
                        .collect(),
                }
            };

            match Event::default().event("gallery").json_data(&event) {
                Ok(e) => yield Ok(e),
                Err(e) => tracing::error!("Failed to encode gallery event: {}", e),
            }

            if rx.changed().await.is_err() {
                break;
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[utoipa::path(
    get,
    path = "/photos/batches/{id}",
    params(
        ("id" = String, Path, description = "Batch ID")
    ),
    responses(
        (status = 200, description = "Progress of a live batch", body = BatchProgressResponse),
        (status = 404, description = "Batch unknown or already finished")
    ),
    tag = "photos"
)]
pub async fn batch_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BatchProgressResponse>, AppError> {
    let snapshot = state
        .batches
        .get(&id)
        .map(|entry| entry.value().borrow().clone())
        .ok_or_else(|| AppError::NotFound("Batch not found".to_string()))?;

    Ok(Json(BatchProgressResponse {
        phase: snapshot.phase.as_str().to_string(),
        current: snapshot.completed,
        total: snapshot.total,
    }))
}
