use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One shared photo. Append-only: records are never updated or deleted by
/// this service, and the collection is flat (no relations).
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "photos")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub url: String,
    pub created_at: DateTimeUtc,
    pub original_file_name: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
