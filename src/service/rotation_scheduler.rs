use chrono::{DateTime, Utc};

use crate::domain::error::ExperimentError;
use crate::domain::experiment::{Experiment, ExperimentStatus};
use crate::selection::winner::SelectionThresholds;
use crate::service::experiment_service::ExperimentService;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub rotation_pass_secs: u64,
    pub expiry_pass_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            rotation_pass_secs: 3600,
            expiry_pass_secs: 21600,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub examined: usize,
    pub acted: usize,
    pub errors: usize,
}

#[derive(Clone)]
pub struct RotationScheduler {
    pub service: ExperimentService,
    pub config: SchedulerConfig,
}

impl RotationScheduler {
    pub async fn run(self) {
        let mut last_expiry: Option<DateTime<Utc>> = None;
        loop {
            let now = Utc::now();
            match self.rotation_pass(now).await {
                Ok(summary) => tracing::info!(
                    "rotation pass examined {}, rotated {}, {} errors",
                    summary.examined,
                    summary.acted,
                    summary.errors
                ),
                Err(err) => tracing::error!("rotation pass failed: {}", err),
            }

            let expiry_due = match last_expiry {
                Some(at) => (now - at).num_seconds() >= self.config.expiry_pass_secs as i64,
                None => true,
            };
            if expiry_due {
                match self.expiry_pass(now).await {
                    Ok(summary) => tracing::info!(
                        "expiry pass examined {}, completed {}, {} errors",
                        summary.examined,
                        summary.acted,
                        summary.errors
                    ),
                    Err(err) => tracing::error!("expiry pass failed: {}", err),
                }
                last_expiry = Some(now);
            }

            tokio::time::sleep(std::time::Duration::from_secs(self.config.rotation_pass_secs))
                .await;
        }
    }

    pub async fn rotation_pass(&self, now: DateTime<Utc>) -> Result<PassSummary, ExperimentError> {
        let mut summary = PassSummary::default();
        let testing = self
            .service
            .list_by_status(ExperimentStatus::Testing)
            .await?;

        for experiment in testing {
            summary.examined += 1;
            if !rotation_due(&experiment, now) {
                continue;
            }
            match self.service.rotate_next(experiment.id).await {
                Ok(_) => summary.acted += 1,
                Err(ExperimentError::InvalidState { .. }) => {}
                Err(err) => {
                    summary.errors += 1;
                    tracing::error!("rotation failed for experiment {}: {}", experiment.id, err);
                }
            }
        }
        Ok(summary)
    }

    pub async fn expiry_pass(&self, now: DateTime<Utc>) -> Result<PassSummary, ExperimentError> {
        let mut summary = PassSummary::default();
        let testing = self
            .service
            .list_by_status(ExperimentStatus::Testing)
            .await?;
        let stranded = self
            .service
            .list_by_status(ExperimentStatus::WinnerFound)
            .await?;

        for experiment in testing {
            summary.examined += 1;
            if !expired(&experiment, now) {
                continue;
            }
            match self.retire(&experiment).await {
                Ok(_) => summary.acted += 1,
                Err(err) => {
                    summary.errors += 1;
                    tracing::error!("failed to retire experiment {}: {}", experiment.id, err);
                }
            }
        }

        for experiment in stranded {
            summary.examined += 1;
            if !expired(&experiment, now) {
                continue;
            }
            match self.service.stop(experiment.id).await {
                Ok(_) => {
                    summary.acted += 1;
                    tracing::info!(
                        "experiment {} completed after an interrupted retirement",
                        experiment.id
                    );
                }
                Err(err) => {
                    summary.errors += 1;
                    tracing::error!(
                        "failed to complete experiment {}: {}",
                        experiment.id,
                        err
                    );
                }
            }
        }
        Ok(summary)
    }

    async fn retire(&self, experiment: &Experiment) -> Result<(), ExperimentError> {
        match self
            .service
            .declare_winner(experiment.id, &SelectionThresholds::forced())
            .await
        {
            Ok(report) => {
                tracing::info!(
                    "experiment {} expired, winner is variant {} with score {:.4}",
                    experiment.id,
                    report.variant_index,
                    report.score
                );
                if let Some(winner) = experiment.variant(report.variant_id) {
                    self.service.publish_variant(experiment, winner).await;
                }
            }
            Err(err) => {
                tracing::warn!(
                    "experiment {} expired without a winner: {}",
                    experiment.id,
                    err
                );
            }
        }

        self.service.stop(experiment.id).await?;
        Ok(())
    }
}

pub fn rotation_due(experiment: &Experiment, now: DateTime<Utc>) -> bool {
    let hours_since = match experiment.last_rotated_at {
        Some(last) => (now - last).num_hours(),
        None => experiment.rotation_interval_hours + 1,
    };
    hours_since >= experiment.rotation_interval_hours
}

pub fn expired(experiment: &Experiment, now: DateTime<Utc>) -> bool {
    if experiment.duration_days <= 0 {
        return false;
    }
    match experiment.expires_at() {
        Some(at) => at <= now,
        None => false,
    }
}
