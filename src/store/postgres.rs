use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::domain::content::ListingContent;
use crate::domain::experiment::{
    Experiment, ExperimentStatus, MetricsMode, UpdateMetricsInput, Variant,
};
use crate::store::{ExperimentStore, StoreError};

#[derive(Clone)]
pub struct PgExperimentStore {
    pub pool: PgPool,
}

impl PgExperimentStore {
    async fn load_variants(&self, ids: Vec<Uuid>) -> Result<HashMap<Uuid, Vec<Variant>>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, experiment_id, variant_index, name, title, description, price_minor,
                   images, views, contacts, favorites, external_listing_id, published_at
            FROM variants
            WHERE experiment_id = ANY($1)
            ORDER BY experiment_id, variant_index ASC
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<Variant>> = HashMap::new();
        for row in rows {
            let variant = variant_from_row(&row);
            grouped.entry(variant.experiment_id).or_default().push(variant);
        }
        Ok(grouped)
    }

    async fn assemble(&self, rows: Vec<PgRow>) -> Result<Vec<Experiment>, StoreError> {
        let mut experiments = Vec::with_capacity(rows.len());
        for row in &rows {
            experiments.push(experiment_from_row(row)?);
        }

        let ids: Vec<Uuid> = experiments.iter().map(|e| e.id).collect();
        let mut grouped = self.load_variants(ids).await?;
        for experiment in &mut experiments {
            experiment.variants = grouped.remove(&experiment.id).unwrap_or_default();
        }
        Ok(experiments)
    }
}

#[async_trait::async_trait]
impl ExperimentStore for PgExperimentStore {
    async fn insert(&self, experiment: &Experiment) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO experiments (
                id, owner_id, project_id, name, category,
                base_title, base_description, base_price_minor, base_images,
                duration_days, rotation_interval_hours, status, current_variant_index,
                winner_variant_id, started_at, last_rotated_at, stopped_at, created_at, updated_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19)
            "#,
        )
        .bind(experiment.id)
        .bind(&experiment.owner_id)
        .bind(&experiment.project_id)
        .bind(&experiment.name)
        .bind(&experiment.category)
        .bind(&experiment.base.title)
        .bind(&experiment.base.description)
        .bind(experiment.base.price_minor)
        .bind(&experiment.base.images)
        .bind(experiment.duration_days)
        .bind(experiment.rotation_interval_hours)
        .bind(experiment.status.as_str())
        .bind(experiment.current_variant_index)
        .bind(experiment.winner_variant_id)
        .bind(experiment.started_at)
        .bind(experiment.last_rotated_at)
        .bind(experiment.stopped_at)
        .bind(experiment.created_at)
        .bind(experiment.updated_at)
        .execute(&mut *tx)
        .await?;

        for variant in &experiment.variants {
            insert_variant_tx(&mut tx, variant).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn insert_variant(&self, variant: &Variant) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO variants (
                id, experiment_id, variant_index, name, title, description, price_minor,
                images, views, contacts, favorites, external_listing_id, published_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)
            "#,
        )
        .bind(variant.id)
        .bind(variant.experiment_id)
        .bind(variant.index)
        .bind(&variant.name)
        .bind(&variant.title)
        .bind(&variant.description)
        .bind(variant.price_minor)
        .bind(&variant.images)
        .bind(variant.views)
        .bind(variant.contacts)
        .bind(variant.favorites)
        .bind(&variant.external_listing_id)
        .bind(variant.published_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Experiment>, StoreError> {
        let row = sqlx::query(&format!("{} WHERE id = $1", SELECT_EXPERIMENT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut experiment = experiment_from_row(&row)?;
        let mut grouped = self.load_variants(vec![id]).await?;
        experiment.variants = grouped.remove(&id).unwrap_or_default();
        Ok(Some(experiment))
    }

    async fn list(&self) -> Result<Vec<Experiment>, StoreError> {
        let rows = sqlx::query(&format!("{} ORDER BY created_at DESC", SELECT_EXPERIMENT))
            .fetch_all(&self.pool)
            .await?;
        self.assemble(rows).await
    }

    async fn list_by_status(&self, status: ExperimentStatus) -> Result<Vec<Experiment>, StoreError> {
        let rows = sqlx::query(&format!(
            "{} WHERE status = $1 ORDER BY created_at DESC",
            SELECT_EXPERIMENT
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        self.assemble(rows).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM experiments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_started(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE experiments
            SET status = 'testing', started_at = $2, current_variant_index = 0, updated_at = $2
            WHERE id = $1 AND status = 'draft'
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_completed(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE experiments
            SET status = 'completed', stopped_at = $2, updated_at = $2
            WHERE id = $1 AND status <> 'completed'
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn advance_rotation(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<i32>, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE experiments
            SET current_variant_index = (COALESCE(current_variant_index, -1) + 1)
                    % (SELECT count(*)::int FROM variants WHERE experiment_id = $1),
                last_rotated_at = $2,
                updated_at = $2
            WHERE id = $1 AND status = 'testing'
              AND EXISTS (SELECT 1 FROM variants WHERE experiment_id = $1)
            RETURNING current_variant_index
            "#,
        )
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|r| r.get::<Option<i32>, _>("current_variant_index")))
    }

    async fn set_winner(
        &self,
        id: Uuid,
        variant_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE experiments
            SET winner_variant_id = $2, status = 'winner_found', updated_at = $3
            WHERE id = $1 AND status = 'testing'
            "#,
        )
        .bind(id)
        .bind(variant_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_variant_metrics(
        &self,
        experiment_id: Uuid,
        variant_id: Uuid,
        input: &UpdateMetricsInput,
    ) -> Result<bool, StoreError> {
        let sql = match input.mode {
            MetricsMode::Set => {
                r#"
                UPDATE variants
                SET views = COALESCE($3, views),
                    contacts = COALESCE($4, contacts),
                    favorites = COALESCE($5, favorites)
                WHERE experiment_id = $1 AND id = $2
                "#
            }
            MetricsMode::Increment => {
                r#"
                UPDATE variants
                SET views = views + COALESCE($3, 0),
                    contacts = contacts + COALESCE($4, 0),
                    favorites = favorites + COALESCE($5, 0)
                WHERE experiment_id = $1 AND id = $2
                "#
            }
        };

        let result = sqlx::query(sql)
            .bind(experiment_id)
            .bind(variant_id)
            .bind(input.views)
            .bind(input.contacts)
            .bind(input.favorites)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn replace_variant_images(
        &self,
        experiment_id: Uuid,
        variant_id: Uuid,
        images: &[String],
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE variants SET images = $3 WHERE experiment_id = $1 AND id = $2",
        )
        .bind(experiment_id)
        .bind(variant_id)
        .bind(images.to_vec())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_publish_receipt(
        &self,
        experiment_id: Uuid,
        variant_id: Uuid,
        listing_ref: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE variants
            SET external_listing_id = $3, published_at = $4
            WHERE experiment_id = $1 AND id = $2
            "#,
        )
        .bind(experiment_id)
        .bind(variant_id)
        .bind(listing_ref)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

const SELECT_EXPERIMENT: &str = r#"
    SELECT id, owner_id, project_id, name, category,
           base_title, base_description, base_price_minor, base_images,
           duration_days, rotation_interval_hours, status, current_variant_index,
           winner_variant_id, started_at, last_rotated_at, stopped_at, created_at, updated_at
    FROM experiments
"#;

async fn insert_variant_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    variant: &Variant,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO variants (
            id, experiment_id, variant_index, name, title, description, price_minor,
            images, views, contacts, favorites, external_listing_id, published_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)
        "#,
    )
    .bind(variant.id)
    .bind(variant.experiment_id)
    .bind(variant.index)
    .bind(&variant.name)
    .bind(&variant.title)
    .bind(&variant.description)
    .bind(variant.price_minor)
    .bind(&variant.images)
    .bind(variant.views)
    .bind(variant.contacts)
    .bind(variant.favorites)
    .bind(&variant.external_listing_id)
    .bind(variant.published_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn experiment_from_row(row: &PgRow) -> Result<Experiment, StoreError> {
    let id: Uuid = row.get("id");
    let status_raw: String = row.get("status");
    let status = ExperimentStatus::parse(&status_raw)
        .ok_or(StoreError::InvalidStatus(id, status_raw))?;

    Ok(Experiment {
        id,
        owner_id: row.get("owner_id"),
        project_id: row.get("project_id"),
        name: row.get("name"),
        category: row.get("category"),
        base: ListingContent {
            title: row.get("base_title"),
            description: row.get("base_description"),
            price_minor: row.get("base_price_minor"),
            images: row.get("base_images"),
        },
        duration_days: row.get("duration_days"),
        rotation_interval_hours: row.get("rotation_interval_hours"),
        status,
        current_variant_index: row.get("current_variant_index"),
        winner_variant_id: row.get("winner_variant_id"),
        started_at: row.get("started_at"),
        last_rotated_at: row.get("last_rotated_at"),
        stopped_at: row.get("stopped_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        variants: Vec::new(),
    })
}

fn variant_from_row(row: &PgRow) -> Variant {
    Variant {
        id: row.get("id"),
        experiment_id: row.get("experiment_id"),
        index: row.get("variant_index"),
        name: row.get("name"),
        title: row.get("title"),
        description: row.get("description"),
        price_minor: row.get("price_minor"),
        images: row.get("images"),
        views: row.get("views"),
        contacts: row.get("contacts"),
        favorites: row.get("favorites"),
        external_listing_id: row.get("external_listing_id"),
        published_at: row.get("published_at"),
    }
}
