use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::experiment::{
    Experiment, ExperimentStatus, MetricsMode, UpdateMetricsInput, Variant,
};
use crate::store::{ExperimentStore, StoreError};

#[derive(Clone, Default)]
pub struct MemoryExperimentStore {
    inner: Arc<RwLock<HashMap<Uuid, Experiment>>>,
}

impl MemoryExperimentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ExperimentStore for MemoryExperimentStore {
    async fn insert(&self, experiment: &Experiment) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let mut experiment = experiment.clone();
        experiment.variants.sort_by_key(|v| v.index);
        guard.insert(experiment.id, experiment);
        Ok(())
    }

    async fn insert_variant(&self, variant: &Variant) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let experiment = guard
            .get_mut(&variant.experiment_id)
            .ok_or(StoreError::ExperimentNotFound(variant.experiment_id))?;
        experiment.variants.push(variant.clone());
        experiment.variants.sort_by_key(|v| v.index);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Experiment>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Experiment>, StoreError> {
        let guard = self.inner.read().await;
        let mut all: Vec<Experiment> = guard.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn list_by_status(&self, status: ExperimentStatus) -> Result<Vec<Experiment>, StoreError> {
        let guard = self.inner.read().await;
        let mut matching: Vec<Experiment> = guard
            .values()
            .filter(|e| e.status == status)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut guard = self.inner.write().await;
        Ok(guard.remove(&id).is_some())
    }

    async fn mark_started(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut guard = self.inner.write().await;
        let Some(experiment) = guard.get_mut(&id) else {
            return Ok(false);
        };
        if experiment.status != ExperimentStatus::Draft {
            return Ok(false);
        }
        experiment.status = ExperimentStatus::Testing;
        experiment.started_at = Some(now);
        experiment.current_variant_index = Some(0);
        experiment.updated_at = now;
        Ok(true)
    }

    async fn mark_completed(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut guard = self.inner.write().await;
        let Some(experiment) = guard.get_mut(&id) else {
            return Ok(false);
        };
        if experiment.status == ExperimentStatus::Completed {
            return Ok(false);
        }
        experiment.status = ExperimentStatus::Completed;
        experiment.stopped_at = Some(now);
        experiment.updated_at = now;
        Ok(true)
    }

    async fn advance_rotation(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<i32>, StoreError> {
        let mut guard = self.inner.write().await;
        let Some(experiment) = guard.get_mut(&id) else {
            return Ok(None);
        };
        if experiment.status != ExperimentStatus::Testing || experiment.variants.is_empty() {
            return Ok(None);
        }
        let count = experiment.variants.len() as i32;
        let next = (experiment.current_variant_index.unwrap_or(-1) + 1) % count;
        experiment.current_variant_index = Some(next);
        experiment.last_rotated_at = Some(now);
        experiment.updated_at = now;
        Ok(Some(next))
    }

    async fn set_winner(
        &self,
        id: Uuid,
        variant_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut guard = self.inner.write().await;
        let Some(experiment) = guard.get_mut(&id) else {
            return Ok(false);
        };
        if experiment.status != ExperimentStatus::Testing {
            return Ok(false);
        }
        experiment.winner_variant_id = Some(variant_id);
        experiment.status = ExperimentStatus::WinnerFound;
        experiment.updated_at = now;
        Ok(true)
    }

    async fn update_variant_metrics(
        &self,
        experiment_id: Uuid,
        variant_id: Uuid,
        input: &UpdateMetricsInput,
    ) -> Result<bool, StoreError> {
        let mut guard = self.inner.write().await;
        let Some(experiment) = guard.get_mut(&experiment_id) else {
            return Ok(false);
        };
        let Some(variant) = experiment.variants.iter_mut().find(|v| v.id == variant_id) else {
            return Ok(false);
        };

        match input.mode {
            MetricsMode::Set => {
                if let Some(views) = input.views {
                    variant.views = views;
                }
                if let Some(contacts) = input.contacts {
                    variant.contacts = contacts;
                }
                if let Some(favorites) = input.favorites {
                    variant.favorites = favorites;
                }
            }
            MetricsMode::Increment => {
                variant.views += input.views.unwrap_or(0);
                variant.contacts += input.contacts.unwrap_or(0);
                variant.favorites += input.favorites.unwrap_or(0);
            }
        }
        Ok(true)
    }

    async fn replace_variant_images(
        &self,
        experiment_id: Uuid,
        variant_id: Uuid,
        images: &[String],
    ) -> Result<bool, StoreError> {
        let mut guard = self.inner.write().await;
        let Some(experiment) = guard.get_mut(&experiment_id) else {
            return Ok(false);
        };
        let Some(variant) = experiment.variants.iter_mut().find(|v| v.id == variant_id) else {
            return Ok(false);
        };
        variant.images = images.to_vec();
        Ok(true)
    }

    async fn record_publish_receipt(
        &self,
        experiment_id: Uuid,
        variant_id: Uuid,
        listing_ref: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut guard = self.inner.write().await;
        let Some(experiment) = guard.get_mut(&experiment_id) else {
            return Ok(false);
        };
        let Some(variant) = experiment.variants.iter_mut().find(|v| v.id == variant_id) else {
            return Ok(false);
        };
        variant.external_listing_id = Some(listing_ref.to_string());
        variant.published_at = Some(now);
        Ok(true)
    }
}
