use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::content::ListingContent;
use crate::domain::error::ExperimentError;
use crate::domain::experiment::{
    CreateExperimentInput, CreateVariantInput, Experiment, ExperimentStatus, UpdateMetricsInput,
    Variant,
};
use crate::publisher::{ListingPublisher, PublishRequest};
use crate::selection::winner::{
    score_variant, select_winner, SelectionThresholds, VariantScore, WinnerReport,
};
use crate::store::ExperimentStore;

#[derive(Clone)]
pub struct ExperimentService {
    pub store: Arc<dyn ExperimentStore>,
    pub publisher: Arc<dyn ListingPublisher>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ExperimentStats {
    pub experiment_id: Uuid,
    pub status: ExperimentStatus,
    pub current_variant_index: Option<i32>,
    pub winner_variant_id: Option<Uuid>,
    pub total_views: i64,
    pub total_contacts: i64,
    pub total_favorites: i64,
    pub variants: Vec<VariantScore>,
}

impl ExperimentService {
    pub async fn create(&self, input: CreateExperimentInput) -> Result<Experiment, ExperimentError> {
        validate_create(&input)?;

        let now = Utc::now();
        let experiment_id = Uuid::new_v4();
        let mut variants: Vec<Variant> = input
            .variants
            .iter()
            .map(|v| build_variant(experiment_id, &input.base, v))
            .collect();
        variants.sort_by_key(|v| v.index);

        let experiment = Experiment {
            id: experiment_id,
            owner_id: input.owner_id,
            project_id: input.project_id,
            name: input.name,
            category: input.category,
            base: input.base,
            duration_days: input.duration_days,
            rotation_interval_hours: input.rotation_interval_hours,
            status: ExperimentStatus::Draft,
            current_variant_index: None,
            winner_variant_id: None,
            started_at: None,
            last_rotated_at: None,
            stopped_at: None,
            created_at: now,
            updated_at: now,
            variants,
        };

        self.store.insert(&experiment).await?;
        tracing::info!(
            "created experiment {} with {} variants",
            experiment.id,
            experiment.variants.len()
        );
        Ok(experiment)
    }

    pub async fn add_variant(
        &self,
        experiment_id: Uuid,
        input: CreateVariantInput,
    ) -> Result<Variant, ExperimentError> {
        let experiment = self.require(experiment_id).await?;
        if experiment.status != ExperimentStatus::Draft {
            return Err(ExperimentError::InvalidState {
                operation: "add_variant",
                status: experiment.status,
            });
        }
        validate_variant(&input)?;
        if experiment.variants.iter().any(|v| v.index == input.index) {
            return Err(ExperimentError::Validation(format!(
                "variant index {} already exists",
                input.index
            )));
        }

        let variant = build_variant(experiment_id, &experiment.base, &input);
        self.store.insert_variant(&variant).await?;
        Ok(variant)
    }

    pub async fn start(&self, experiment_id: Uuid) -> Result<Experiment, ExperimentError> {
        let experiment = self.require(experiment_id).await?;
        if !experiment.status.can_transition_to(ExperimentStatus::Testing) {
            return Err(ExperimentError::InvalidState {
                operation: "start",
                status: experiment.status,
            });
        }
        if experiment.variants.len() < 2 {
            return Err(ExperimentError::Validation(format!(
                "experiment needs at least 2 variants to start, has {}",
                experiment.variants.len()
            )));
        }
        for (position, variant) in experiment.variants.iter().enumerate() {
            if variant.index != position as i32 {
                return Err(ExperimentError::Validation(format!(
                    "variant indexes must be contiguous from 0, found {} at position {}",
                    variant.index, position
                )));
            }
        }

        let now = Utc::now();
        if !self.store.mark_started(experiment_id, now).await? {
            return Err(ExperimentError::InvalidState {
                operation: "start",
                status: experiment.status,
            });
        }
        tracing::info!(
            "experiment {} started with {} variants",
            experiment_id,
            experiment.variants.len()
        );

        if let Some(first) = experiment.variant_at(0) {
            self.publish_variant(&experiment, first).await;
        }

        self.require(experiment_id).await
    }

    pub async fn stop(&self, experiment_id: Uuid) -> Result<Experiment, ExperimentError> {
        let experiment = self.require(experiment_id).await?;
        if experiment.status.is_terminal() {
            return Ok(experiment);
        }

        self.store.mark_completed(experiment_id, Utc::now()).await?;
        tracing::info!("experiment {} stopped", experiment_id);
        self.require(experiment_id).await
    }

    pub async fn rotate_next(&self, experiment_id: Uuid) -> Result<i32, ExperimentError> {
        let experiment = self.require(experiment_id).await?;
        if experiment.status != ExperimentStatus::Testing {
            return Err(ExperimentError::InvalidState {
                operation: "rotate",
                status: experiment.status,
            });
        }

        let next = self
            .store
            .advance_rotation(experiment_id, Utc::now())
            .await?
            .ok_or(ExperimentError::InvalidState {
                operation: "rotate",
                status: experiment.status,
            })?;

        tracing::info!("experiment {} rotated to variant {}", experiment_id, next);

        if let Some(variant) = experiment.variant_at(next) {
            self.publish_variant(&experiment, variant).await;
        }

        Ok(next)
    }

    pub async fn delete(&self, experiment_id: Uuid) -> Result<(), ExperimentError> {
        if !self.store.delete(experiment_id).await? {
            return Err(ExperimentError::NotFound(experiment_id));
        }
        tracing::info!("experiment {} deleted", experiment_id);
        Ok(())
    }

    pub async fn update_metrics(
        &self,
        experiment_id: Uuid,
        variant_id: Uuid,
        input: UpdateMetricsInput,
    ) -> Result<(), ExperimentError> {
        for (field, value) in [
            ("views", input.views),
            ("contacts", input.contacts),
            ("favorites", input.favorites),
        ] {
            if let Some(value) = value {
                if value < 0 {
                    return Err(ExperimentError::Validation(format!(
                        "{} must be >= 0, got {}",
                        field, value
                    )));
                }
            }
        }

        if !self
            .store
            .update_variant_metrics(experiment_id, variant_id, &input)
            .await?
        {
            return Err(ExperimentError::NotFound(variant_id));
        }
        Ok(())
    }

    pub async fn apply_image_set(
        &self,
        experiment_id: Uuid,
        variant_id: Uuid,
        images: Vec<String>,
    ) -> Result<(), ExperimentError> {
        if images.is_empty() {
            return Err(ExperimentError::Validation(
                "image set must not be empty".to_string(),
            ));
        }

        let experiment = self.require(experiment_id).await?;
        if !matches!(
            experiment.status,
            ExperimentStatus::Draft | ExperimentStatus::Testing
        ) {
            return Err(ExperimentError::InvalidState {
                operation: "apply_image_set",
                status: experiment.status,
            });
        }

        if !self
            .store
            .replace_variant_images(experiment_id, variant_id, &images)
            .await?
        {
            return Err(ExperimentError::NotFound(variant_id));
        }
        Ok(())
    }

    pub async fn get(&self, experiment_id: Uuid) -> Result<Experiment, ExperimentError> {
        self.require(experiment_id).await
    }

    pub async fn list(&self) -> Result<Vec<Experiment>, ExperimentError> {
        Ok(self.store.list().await?)
    }

    pub async fn list_by_status(
        &self,
        status: ExperimentStatus,
    ) -> Result<Vec<Experiment>, ExperimentError> {
        Ok(self.store.list_by_status(status).await?)
    }

    pub async fn stats(&self, experiment_id: Uuid) -> Result<ExperimentStats, ExperimentError> {
        let experiment = self.require(experiment_id).await?;
        let variants: Vec<VariantScore> = experiment.variants.iter().map(score_variant).collect();

        Ok(ExperimentStats {
            experiment_id: experiment.id,
            status: experiment.status,
            current_variant_index: experiment.current_variant_index,
            winner_variant_id: experiment.winner_variant_id,
            total_views: experiment.variants.iter().map(|v| v.views).sum(),
            total_contacts: experiment.variants.iter().map(|v| v.contacts).sum(),
            total_favorites: experiment.variants.iter().map(|v| v.favorites).sum(),
            variants,
        })
    }

    pub async fn preview_winner(
        &self,
        experiment_id: Uuid,
        thresholds: &SelectionThresholds,
    ) -> Result<WinnerReport, ExperimentError> {
        let experiment = self.require(experiment_id).await?;
        select_winner(&experiment.variants, thresholds)
    }

    pub async fn declare_winner(
        &self,
        experiment_id: Uuid,
        thresholds: &SelectionThresholds,
    ) -> Result<WinnerReport, ExperimentError> {
        let experiment = self.require(experiment_id).await?;
        if !experiment.status.can_transition_to(ExperimentStatus::WinnerFound) {
            return Err(ExperimentError::InvalidState {
                operation: "declare_winner",
                status: experiment.status,
            });
        }

        let report = select_winner(&experiment.variants, thresholds)?;
        if !self
            .store
            .set_winner(experiment_id, report.variant_id, Utc::now())
            .await?
        {
            return Err(ExperimentError::InvalidState {
                operation: "declare_winner",
                status: experiment.status,
            });
        }

        tracing::info!(
            "experiment {} winner declared: variant {} score {:.4}",
            experiment_id,
            report.variant_index,
            report.score
        );
        Ok(report)
    }

    pub async fn publish_variant(&self, experiment: &Experiment, variant: &Variant) {
        let request = PublishRequest {
            experiment_id: experiment.id,
            variant_id: variant.id,
            variant_index: variant.index,
            category: experiment.category.clone(),
            title: variant.title.clone(),
            description: variant.description.clone(),
            price_minor: variant.price_minor,
            images: variant.images.clone(),
        };

        match self.publisher.make_live(&request).await {
            Ok(receipt) => {
                tracing::info!(
                    "published variant {} of experiment {} as {}",
                    variant.index,
                    experiment.id,
                    receipt.listing_ref
                );
                if let Err(err) = self
                    .store
                    .record_publish_receipt(experiment.id, variant.id, &receipt.listing_ref, Utc::now())
                    .await
                {
                    tracing::warn!(
                        "failed to record publish receipt for experiment {} variant {}: {}",
                        experiment.id,
                        variant.index,
                        err
                    );
                }
            }
            Err(err) => {
                tracing::warn!(
                    "publisher {} failed for variant {} of experiment {}: {}",
                    self.publisher.name(),
                    variant.index,
                    experiment.id,
                    err
                );
            }
        }
    }

    async fn require(&self, experiment_id: Uuid) -> Result<Experiment, ExperimentError> {
        self.store
            .get(experiment_id)
            .await?
            .ok_or(ExperimentError::NotFound(experiment_id))
    }
}

fn validate_create(input: &CreateExperimentInput) -> Result<(), ExperimentError> {
    if input.name.trim().is_empty() {
        return Err(ExperimentError::Validation(
            "name must not be empty".to_string(),
        ));
    }
    if input.owner_id.trim().is_empty() {
        return Err(ExperimentError::Validation(
            "owner_id must not be empty".to_string(),
        ));
    }
    if input.base.title.trim().is_empty() {
        return Err(ExperimentError::Validation(
            "base title must not be empty".to_string(),
        ));
    }
    if input.base.price_minor < 0 {
        return Err(ExperimentError::Validation(
            "base price_minor must be >= 0".to_string(),
        ));
    }
    if input.duration_days <= 0 {
        return Err(ExperimentError::Validation(
            "duration_days must be > 0".to_string(),
        ));
    }
    if input.rotation_interval_hours <= 0 {
        return Err(ExperimentError::Validation(
            "rotation_interval_hours must be > 0".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for variant in &input.variants {
        validate_variant(variant)?;
        if !seen.insert(variant.index) {
            return Err(ExperimentError::Validation(format!(
                "duplicate variant index {}",
                variant.index
            )));
        }
    }
    Ok(())
}

fn validate_variant(input: &CreateVariantInput) -> Result<(), ExperimentError> {
    if input.index < 0 {
        return Err(ExperimentError::Validation(
            "variant index must be >= 0".to_string(),
        ));
    }
    if input.name.trim().is_empty() {
        return Err(ExperimentError::Validation(
            "variant name must not be empty".to_string(),
        ));
    }
    if let Some(title) = &input.title {
        if title.trim().is_empty() {
            return Err(ExperimentError::Validation(
                "variant title must not be empty".to_string(),
            ));
        }
    }
    if let Some(price_minor) = input.price_minor {
        if price_minor < 0 {
            return Err(ExperimentError::Validation(
                "variant price_minor must be >= 0".to_string(),
            ));
        }
    }
    Ok(())
}

fn build_variant(experiment_id: Uuid, base: &ListingContent, input: &CreateVariantInput) -> Variant {
    Variant {
        id: Uuid::new_v4(),
        experiment_id,
        index: input.index,
        name: input.name.clone(),
        title: input.title.clone().unwrap_or_else(|| base.title.clone()),
        description: input
            .description
            .clone()
            .unwrap_or_else(|| base.description.clone()),
        price_minor: input.price_minor.unwrap_or(base.price_minor),
        images: input.images.clone().unwrap_or_else(|| base.images.clone()),
        views: 0,
        contacts: 0,
        favorites: 0,
        external_listing_id: None,
        published_at: None,
    }
}
