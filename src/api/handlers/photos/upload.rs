use axum::{
    Json,
    extract::{Multipart, State},
    extract::multipart::MultipartError,
};

use crate::AppState;
use crate::api::error::AppError;
use crate::services::pipeline::{BatchPhase, PipelineError, RawImage};

use super::types::*;

fn multipart_error(e: MultipartError) -> AppError {
    let err_msg = e.to_string();
    if err_msg.contains("length limit exceeded") {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::BadRequest(err_msg)
    }
}

#[utoipa::path(
    post,
    path = "/photos",
    request_body(content = Multipart, description = "Photo batch, one `photo` field per file"),
    responses(
        (status = 200, description = "Batch processed", body = BatchUploadResponse),
        (status = 400, description = "No photos provided, or the batch was rejected"),
        (status = 413, description = "Request body too large")
    ),
    tag = "photos"
)]
pub async fn upload_photos(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<BatchUploadResponse>, AppError> {
    let mut items = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        if name != "photo" {
            continue;
        }

        let file_name = field.file_name().map(|s| s.to_string());
        let data = field.bytes().await.map_err(multipart_error)?;

        items.push(RawImage {
            file_name,
            data: data.to_vec(),
        });
    }

    if items.is_empty() {
        return Err(AppError::BadRequest("No photos provided".to_string()));
    }

    let summary = state
        .pipeline
        .process_batch(items)
        .await
        .map_err(|e| match e {
            // Details are already in the logs; the caller gets one generic error
            PipelineError::CompressionAborted { .. } => {
                AppError::BadRequest("Failed to process photos".to_string())
            }
        })?;

    Ok(Json(BatchUploadResponse {
        batch_id: summary.batch_id,
        total: summary.total,
        processed: summary.processed,
        phase: BatchPhase::Done.as_str().to_string(),
    }))
}
