use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::entities::photos;

/// Photo waiting to be appended. Identity and timestamp are assigned by
/// the collection at insert time, never by the caller.
#[derive(Debug, Clone)]
pub struct NewPhoto {
    pub url: String,
    pub original_file_name: Option<String>,
}

/// Append-only view over the shared photo collection.
#[derive(Clone)]
pub struct PhotoCollection {
    db: DatabaseConnection,
}

impl PhotoCollection {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn append(&self, photo: NewPhoto) -> Result<photos::Model, sea_orm::DbErr> {
        let record = photos::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            url: Set(photo.url),
            created_at: Set(Utc::now()),
            original_file_name: Set(photo.original_file_name),
        };

        record.insert(&self.db).await
    }

    /// Most recent photos first, the order the gallery renders them in.
    pub async fn newest_first(
        &self,
        limit: Option<u64>,
    ) -> Result<Vec<photos::Model>, sea_orm::DbErr> {
        let mut select = photos::Entity::find().order_by_desc(photos::Column::CreatedAt);
        if let Some(limit) = limit {
            select = select.limit(limit);
        }

        select.all(&self.db).await
    }
}
