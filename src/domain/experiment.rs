use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::content::ListingContent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    Draft,
    Testing,
    WinnerFound,
    Completed,
}

impl ExperimentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentStatus::Draft => "draft",
            ExperimentStatus::Testing => "testing",
            ExperimentStatus::WinnerFound => "winner_found",
            ExperimentStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<ExperimentStatus> {
        match s {
            "draft" => Some(ExperimentStatus::Draft),
            "testing" => Some(ExperimentStatus::Testing),
            "winner_found" => Some(ExperimentStatus::WinnerFound),
            "completed" => Some(ExperimentStatus::Completed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExperimentStatus::Completed)
    }

    pub fn valid_transitions(&self) -> &'static [ExperimentStatus] {
        match self {
            ExperimentStatus::Draft => &[ExperimentStatus::Testing, ExperimentStatus::Completed],
            ExperimentStatus::Testing => {
                &[ExperimentStatus::WinnerFound, ExperimentStatus::Completed]
            }
            ExperimentStatus::WinnerFound => &[ExperimentStatus::Completed],
            ExperimentStatus::Completed => &[],
        }
    }

    pub fn can_transition_to(&self, next: ExperimentStatus) -> bool {
        self.valid_transitions().contains(&next)
    }
}

impl std::fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub id: Uuid,
    pub owner_id: String,
    pub project_id: Option<String>,
    pub name: String,
    pub category: String,
    pub base: ListingContent,
    pub duration_days: i64,
    pub rotation_interval_hours: i64,
    pub status: ExperimentStatus,
    pub current_variant_index: Option<i32>,
    pub winner_variant_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_rotated_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub variants: Vec<Variant>,
}

impl Experiment {
    pub fn variant(&self, variant_id: Uuid) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }

    pub fn variant_at(&self, index: i32) -> Option<&Variant> {
        self.variants.iter().find(|v| v.index == index)
    }

    pub fn current_variant(&self) -> Option<&Variant> {
        self.current_variant_index.and_then(|index| self.variant_at(index))
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let started = self.started_at?;
        let hours = self.duration_days.checked_mul(24)?;
        started.checked_add_signed(chrono::Duration::try_hours(hours)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    pub id: Uuid,
    pub experiment_id: Uuid,
    pub index: i32,
    pub name: String,
    pub title: String,
    pub description: String,
    pub price_minor: i64,
    pub images: Vec<String>,
    pub views: i64,
    pub contacts: i64,
    pub favorites: i64,
    pub external_listing_id: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateExperimentInput {
    pub owner_id: String,
    pub project_id: Option<String>,
    pub name: String,
    pub category: String,
    pub base: ListingContent,
    pub duration_days: i64,
    pub rotation_interval_hours: i64,
    #[serde(default)]
    pub variants: Vec<CreateVariantInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateVariantInput {
    pub index: i32,
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub price_minor: Option<i64>,
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricsMode {
    Set,
    Increment,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateMetricsInput {
    pub mode: MetricsMode,
    pub views: Option<i64>,
    pub contacts: Option<i64>,
    pub favorites: Option<i64>,
}
