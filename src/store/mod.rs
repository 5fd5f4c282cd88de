use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::experiment::{Experiment, ExperimentStatus, UpdateMetricsInput, Variant};

pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("experiment {0} not found")]
    ExperimentNotFound(Uuid),

    #[error("experiment {0} has an invalid status value: {1}")]
    InvalidStatus(Uuid, String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait::async_trait]
pub trait ExperimentStore: Send + Sync {
    async fn insert(&self, experiment: &Experiment) -> Result<(), StoreError>;

    async fn insert_variant(&self, variant: &Variant) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Experiment>, StoreError>;

    async fn list(&self) -> Result<Vec<Experiment>, StoreError>;

    async fn list_by_status(&self, status: ExperimentStatus) -> Result<Vec<Experiment>, StoreError>;

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn mark_started(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError>;

    async fn mark_completed(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError>;

    async fn advance_rotation(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<i32>, StoreError>;

    async fn set_winner(
        &self,
        id: Uuid,
        variant_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn update_variant_metrics(
        &self,
        experiment_id: Uuid,
        variant_id: Uuid,
        input: &UpdateMetricsInput,
    ) -> Result<bool, StoreError>;

    async fn replace_variant_images(
        &self,
        experiment_id: Uuid,
        variant_id: Uuid,
        images: &[String],
    ) -> Result<bool, StoreError>;

    async fn record_publish_receipt(
        &self,
        experiment_id: Uuid,
        variant_id: Uuid,
        listing_ref: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}
