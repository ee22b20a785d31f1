//! The single-slot latest-image store.
//!
//! Every successful generation overwrites the slot; delta requests read it to
//! find their base image and prompt. There is no history and no conflict
//! detection: the last `put` wins.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveValue::Set, DatabaseConnection, EntityTrait};
use tokio::sync::RwLock;
use tracing::debug;

use crate::constants::LATEST_IMAGE_KEY;
use crate::db::entities::latest_image;
use crate::error::DeltaImageError;

/// The most recently generated image and the prompt it came from.
#[derive(Clone, Debug, PartialEq)]
pub struct LatestImageRecord {
    /// PNG bytes
    pub image: Vec<u8>,
    /// prompt tracked for the image, used to compose the next delta
    pub prompt: String,
    /// when the record was written
    pub updated_at: DateTime<Utc>,
}

/// Storage for the latest image.
#[async_trait]
pub trait ImageStore: Send + Sync + std::fmt::Debug {
    /// Overwrites the slot unconditionally.
    async fn put(&self, image: &[u8], prompt: &str) -> Result<(), DeltaImageError>;

    /// Returns the current record, `None` if nothing has been generated yet.
    async fn get(&self) -> Result<Option<LatestImageRecord>, DeltaImageError>;
}

/// Keeps the slot in process memory, handy for tests and the render tool.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slot: RwLock<Option<LatestImageRecord>>,
}

impl MemoryStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ImageStore for MemoryStore {
    async fn put(&self, image: &[u8], prompt: &str) -> Result<(), DeltaImageError> {
        let record = LatestImageRecord {
            image: image.to_vec(),
            prompt: prompt.to_string(),
            updated_at: Utc::now(),
        };
        *self.slot.write().await = Some(record);
        Ok(())
    }

    async fn get(&self) -> Result<Option<LatestImageRecord>, DeltaImageError> {
        Ok(self.slot.read().await.clone())
    }
}

/// Persists the slot in the `latest_image` table, images stored as base64 text.
#[derive(Clone, Debug)]
pub struct DatabaseStore {
    db: DatabaseConnection,
}

impl DatabaseStore {
    /// Wraps a connection that has had migrations applied
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ImageStore for DatabaseStore {
    async fn put(&self, image: &[u8], prompt: &str) -> Result<(), DeltaImageError> {
        let active = latest_image::ActiveModel {
            key: Set(LATEST_IMAGE_KEY.to_string()),
            image_b64: Set(general_purpose::STANDARD.encode(image)),
            prompt: Set(prompt.to_string()),
            updated_at: Set(Utc::now()),
        };
        let rows = latest_image::Entity::insert(active)
            .on_conflict(
                OnConflict::column(latest_image::Column::Key)
                    .update_columns([
                        latest_image::Column::ImageB64,
                        latest_image::Column::Prompt,
                        latest_image::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        debug!("Stored latest image ({} bytes, {} rows)", image.len(), rows);
        Ok(())
    }

    async fn get(&self) -> Result<Option<LatestImageRecord>, DeltaImageError> {
        let Some(model) = latest_image::Entity::find_by_id(LATEST_IMAGE_KEY.to_string())
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };
        let image = general_purpose::STANDARD
            .decode(model.image_b64.as_bytes())
            .map_err(|err| {
                DeltaImageError::InternalServerError(format!(
                    "Stored image is not valid base64: {err}"
                ))
            })?;
        Ok(Some(LatestImageRecord {
            image,
            prompt: model.prompt,
            updated_at: model.updated_at,
        }))
    }
}
