//! DB storage for the single latest-image slot
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "latest_image")]
/// One row per slot key, in practice only `latestImage` is ever written
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    /// slot key
    pub key: String,
    /// base64 encoded PNG
    #[sea_orm(column_type = "Text")]
    pub image_b64: String,
    /// prompt the image was generated from
    #[sea_orm(column_type = "Text")]
    pub prompt: String,
    /// when the slot was last overwritten
    pub updated_at: DateTimeUtc,
}

/// no relations
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
