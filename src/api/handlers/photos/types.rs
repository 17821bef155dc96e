use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entities::photos;

#[derive(Serialize, ToSchema)]
pub struct BatchUploadResponse {
    pub batch_id: String,
    pub total: usize,
    pub processed: usize,
    pub phase: String,
}

#[derive(Serialize, ToSchema)]
pub struct PhotoResponse {
    pub id: String,
    pub url: String,
    pub created_at: chrono::DateTime<Utc>,
    pub original_file_name: Option<String>,
}

impl From<photos::Model> for PhotoResponse {
    fn from(model: photos::Model) -> Self {
        Self {
            id: model.id,
            url: model.url,
            created_at: model.created_at,
            original_file_name: model.original_file_name,
        }
    }
}

#[derive(Deserialize)]
pub struct ListPhotosQuery {
    pub limit: Option<u64>,
}

#[derive(Serialize, ToSchema)]
pub struct BatchProgressResponse {
    pub phase: String,
    pub current: usize,
    pub total: usize,
}

/// Payload of one `gallery` stream event: the full snapshot, newest first.
#[derive(Serialize, ToSchema)]
pub struct GalleryEvent {
    pub revision: u64,
    pub photos: Vec<PhotoResponse>,
}
