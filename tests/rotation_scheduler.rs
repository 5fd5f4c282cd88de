use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use listing_experiments::domain::content::ListingContent;
use listing_experiments::domain::experiment::{
    CreateExperimentInput, CreateVariantInput, Experiment, ExperimentStatus, MetricsMode,
    UpdateMetricsInput, Variant,
};
use listing_experiments::publisher::mock::MockPublisher;
use listing_experiments::service::experiment_service::ExperimentService;
use listing_experiments::service::rotation_scheduler::{
    PassSummary, RotationScheduler, SchedulerConfig,
};
use listing_experiments::store::memory::MemoryExperimentStore;
use listing_experiments::store::{ExperimentStore, StoreError};
use uuid::Uuid;

#[derive(Clone)]
struct FlakyStore {
    inner: MemoryExperimentStore,
    poisoned: Arc<Mutex<Option<Uuid>>>,
}

impl FlakyStore {
    fn new() -> Self {
        FlakyStore {
            inner: MemoryExperimentStore::new(),
            poisoned: Arc::new(Mutex::new(None)),
        }
    }

    fn poison(&self, id: Uuid) {
        *self.poisoned.lock().unwrap() = Some(id);
    }

    fn heal(&self) {
        *self.poisoned.lock().unwrap() = None;
    }

    fn check(&self, id: Uuid) -> Result<(), StoreError> {
        if *self.poisoned.lock().unwrap() == Some(id) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ExperimentStore for FlakyStore {
    async fn insert(&self, experiment: &Experiment) -> Result<(), StoreError> {
        self.inner.insert(experiment).await
    }

    async fn insert_variant(&self, variant: &Variant) -> Result<(), StoreError> {
        self.inner.insert_variant(variant).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Experiment>, StoreError> {
        self.inner.get(id).await
    }

    async fn list(&self) -> Result<Vec<Experiment>, StoreError> {
        self.inner.list().await
    }

    async fn list_by_status(
        &self,
        status: ExperimentStatus,
    ) -> Result<Vec<Experiment>, StoreError> {
        self.inner.list_by_status(status).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        self.inner.delete(id).await
    }

    async fn mark_started(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        self.inner.mark_started(id, now).await
    }

    async fn mark_completed(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        self.check(id)?;
        self.inner.mark_completed(id, now).await
    }

    async fn advance_rotation(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<i32>, StoreError> {
        self.check(id)?;
        self.inner.advance_rotation(id, now).await
    }

    async fn set_winner(
        &self,
        id: Uuid,
        variant_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.inner.set_winner(id, variant_id, now).await
    }

    async fn update_variant_metrics(
        &self,
        experiment_id: Uuid,
        variant_id: Uuid,
        input: &UpdateMetricsInput,
    ) -> Result<bool, StoreError> {
        self.inner
            .update_variant_metrics(experiment_id, variant_id, input)
            .await
    }

    async fn replace_variant_images(
        &self,
        experiment_id: Uuid,
        variant_id: Uuid,
        images: &[String],
    ) -> Result<bool, StoreError> {
        self.inner
            .replace_variant_images(experiment_id, variant_id, images)
            .await
    }

    async fn record_publish_receipt(
        &self,
        experiment_id: Uuid,
        variant_id: Uuid,
        listing_ref: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.inner
            .record_publish_receipt(experiment_id, variant_id, listing_ref, now)
            .await
    }
}

#[tokio::test]
async fn first_pass_rotates_newly_started_experiments() {
    let (scheduler, service, _) = scheduler_with(MemoryExperimentStore::new(), "ALWAYS_SUCCESS");
    let created = service.create(experiment_input(3)).await.unwrap();
    service.start(created.id).await.unwrap();

    let summary = scheduler.rotation_pass(Utc::now()).await.unwrap();
    assert_eq!(
        summary,
        PassSummary {
            examined: 1,
            acted: 1,
            errors: 0
        }
    );

    let after = service.get(created.id).await.unwrap();
    assert_eq!(after.current_variant_index, Some(1));
    assert!(after.last_rotated_at.is_some());
}

#[tokio::test]
async fn rotation_respects_the_configured_interval() {
    let store = MemoryExperimentStore::new();
    let (scheduler, service, _) = scheduler_with(store.clone(), "ALWAYS_SUCCESS");
    let created = service.create(experiment_input(3)).await.unwrap();
    service.start(created.id).await.unwrap();

    let t0 = Utc::now();
    store.advance_rotation(created.id, t0).await.unwrap();

    let early = scheduler.rotation_pass(t0 + Duration::hours(3)).await.unwrap();
    assert_eq!(early.examined, 1);
    assert_eq!(early.acted, 0);

    let due = scheduler.rotation_pass(t0 + Duration::hours(4)).await.unwrap();
    assert_eq!(due.acted, 1);

    let after = service.get(created.id).await.unwrap();
    assert_eq!(after.current_variant_index, Some(2));
}

#[tokio::test]
async fn passes_only_consider_running_experiments() {
    let (scheduler, service, _) = scheduler_with(MemoryExperimentStore::new(), "ALWAYS_SUCCESS");
    service.create(experiment_input(2)).await.unwrap();

    let rotation = scheduler.rotation_pass(Utc::now()).await.unwrap();
    assert_eq!(rotation, PassSummary::default());

    let expiry = scheduler.expiry_pass(Utc::now()).await.unwrap();
    assert_eq!(expiry, PassSummary::default());
}

#[tokio::test]
async fn expiry_declares_a_winner_and_completes() {
    let (scheduler, service, _) = scheduler_with(MemoryExperimentStore::new(), "ALWAYS_SUCCESS");
    let created = service.create(experiment_input(2)).await.unwrap();
    service.start(created.id).await.unwrap();
    service
        .update_metrics(created.id, created.variants[1].id, set_metrics(30, 9, 2))
        .await
        .unwrap();

    let later = Utc::now() + Duration::days(8);
    let summary = scheduler.expiry_pass(later).await.unwrap();
    assert_eq!(
        summary,
        PassSummary {
            examined: 1,
            acted: 1,
            errors: 0
        }
    );

    let after = service.get(created.id).await.unwrap();
    assert_eq!(after.status, ExperimentStatus::Completed);
    assert_eq!(after.winner_variant_id, Some(created.variants[1].id));
    assert!(after.stopped_at.is_some());
}

#[tokio::test]
async fn expiry_leaves_running_experiments_alone() {
    let (scheduler, service, _) = scheduler_with(MemoryExperimentStore::new(), "ALWAYS_SUCCESS");
    let created = service.create(experiment_input(2)).await.unwrap();
    service.start(created.id).await.unwrap();

    let summary = scheduler.expiry_pass(Utc::now() + Duration::days(6)).await.unwrap();
    assert_eq!(summary.examined, 1);
    assert_eq!(summary.acted, 0);

    let after = service.get(created.id).await.unwrap();
    assert_eq!(after.status, ExperimentStatus::Testing);
}

#[tokio::test]
async fn expiry_sweep_is_idempotent() {
    let (scheduler, service, publisher) =
        scheduler_with(MemoryExperimentStore::new(), "ALWAYS_SUCCESS");
    let created = service.create(experiment_input(2)).await.unwrap();
    service.start(created.id).await.unwrap();
    service
        .update_metrics(created.id, created.variants[1].id, set_metrics(30, 9, 2))
        .await
        .unwrap();

    let later = Utc::now() + Duration::days(8);
    let first = scheduler.expiry_pass(later).await.unwrap();
    assert_eq!(first.acted, 1);
    let published = publisher.call_count();

    let second = scheduler.expiry_pass(later).await.unwrap();
    assert_eq!(second, PassSummary::default());
    assert_eq!(publisher.call_count(), published);

    let after = service.get(created.id).await.unwrap();
    assert_eq!(after.status, ExperimentStatus::Completed);
}

#[tokio::test]
async fn a_store_failure_on_one_experiment_does_not_stop_the_rotation_pass() {
    let store = FlakyStore::new();
    let (scheduler, service, _) = scheduler_with(store.clone(), "ALWAYS_SUCCESS");
    let healthy = service.create(experiment_input(2)).await.unwrap();
    let poisoned = service.create(experiment_input(2)).await.unwrap();
    service.start(healthy.id).await.unwrap();
    service.start(poisoned.id).await.unwrap();
    store.poison(poisoned.id);

    let summary = scheduler.rotation_pass(Utc::now()).await.unwrap();
    assert_eq!(
        summary,
        PassSummary {
            examined: 2,
            acted: 1,
            errors: 1
        }
    );

    let rotated = service.get(healthy.id).await.unwrap();
    assert_eq!(rotated.current_variant_index, Some(1));
    let stuck = service.get(poisoned.id).await.unwrap();
    assert_eq!(stuck.current_variant_index, Some(0));
}

#[tokio::test]
async fn a_store_failure_on_one_experiment_does_not_stop_the_expiry_pass() {
    let store = FlakyStore::new();
    let (scheduler, service, _) = scheduler_with(store.clone(), "ALWAYS_SUCCESS");
    let healthy = service.create(experiment_input(2)).await.unwrap();
    let poisoned = service.create(experiment_input(2)).await.unwrap();
    service.start(healthy.id).await.unwrap();
    service.start(poisoned.id).await.unwrap();
    store.poison(poisoned.id);

    let summary = scheduler
        .expiry_pass(Utc::now() + Duration::days(8))
        .await
        .unwrap();
    assert_eq!(
        summary,
        PassSummary {
            examined: 2,
            acted: 1,
            errors: 1
        }
    );

    let after = service.get(healthy.id).await.unwrap();
    assert_eq!(after.status, ExperimentStatus::Completed);
    let stuck = service.get(poisoned.id).await.unwrap();
    assert_eq!(stuck.status, ExperimentStatus::WinnerFound);
}

#[tokio::test]
async fn a_later_sweep_completes_experiments_stranded_in_winner_found() {
    let store = FlakyStore::new();
    let (scheduler, service, publisher) = scheduler_with(store.clone(), "ALWAYS_SUCCESS");
    let created = service.create(experiment_input(2)).await.unwrap();
    service.start(created.id).await.unwrap();
    store.poison(created.id);

    let later = Utc::now() + Duration::days(8);
    let first = scheduler.expiry_pass(later).await.unwrap();
    assert_eq!(
        first,
        PassSummary {
            examined: 1,
            acted: 0,
            errors: 1
        }
    );
    let stranded = service.get(created.id).await.unwrap();
    assert_eq!(stranded.status, ExperimentStatus::WinnerFound);

    store.heal();
    let published = publisher.call_count();
    let second = scheduler.expiry_pass(later).await.unwrap();
    assert_eq!(
        second,
        PassSummary {
            examined: 1,
            acted: 1,
            errors: 0
        }
    );

    let after = service.get(created.id).await.unwrap();
    assert_eq!(after.status, ExperimentStatus::Completed);
    assert_eq!(after.winner_variant_id, stranded.winner_variant_id);
    assert!(after.stopped_at.is_some());
    assert_eq!(publisher.call_count(), published);
}

#[tokio::test]
async fn oversized_durations_are_skipped_by_the_expiry_sweep() {
    let (scheduler, service, _) = scheduler_with(MemoryExperimentStore::new(), "ALWAYS_SUCCESS");
    let mut input = experiment_input(2);
    input.duration_days = 200_000_000_000;
    let oversized = service.create(input).await.unwrap();
    let healthy = service.create(experiment_input(2)).await.unwrap();
    service.start(oversized.id).await.unwrap();
    service.start(healthy.id).await.unwrap();

    let summary = scheduler
        .expiry_pass(Utc::now() + Duration::days(8))
        .await
        .unwrap();
    assert_eq!(
        summary,
        PassSummary {
            examined: 2,
            acted: 1,
            errors: 0
        }
    );

    assert_eq!(
        service.get(oversized.id).await.unwrap().status,
        ExperimentStatus::Testing
    );
    assert_eq!(
        service.get(healthy.id).await.unwrap().status,
        ExperimentStatus::Completed
    );
}

#[tokio::test]
async fn zero_variant_experiments_still_complete_on_expiry() {
    let store = MemoryExperimentStore::new();
    let (scheduler, service, publisher) = scheduler_with(store.clone(), "ALWAYS_SUCCESS");

    let stranded = stranded_experiment(Utc::now() - Duration::days(8));
    store.insert(&stranded).await.unwrap();

    let rotation = scheduler.rotation_pass(Utc::now()).await.unwrap();
    assert_eq!(
        rotation,
        PassSummary {
            examined: 1,
            acted: 0,
            errors: 0
        }
    );

    let expiry = scheduler.expiry_pass(Utc::now()).await.unwrap();
    assert_eq!(expiry.acted, 1);

    let after = service.get(stranded.id).await.unwrap();
    assert_eq!(after.status, ExperimentStatus::Completed);
    assert_eq!(after.winner_variant_id, None);
    assert_eq!(publisher.call_count(), 0);
}

fn scheduler_with<S>(
    store: S,
    behavior: &str,
) -> (RotationScheduler, ExperimentService, Arc<MockPublisher>)
where
    S: ExperimentStore + 'static,
{
    let publisher = Arc::new(MockPublisher::new(behavior));
    let service = ExperimentService {
        store: Arc::new(store),
        publisher: publisher.clone(),
    };
    let scheduler = RotationScheduler {
        service: service.clone(),
        config: SchedulerConfig::default(),
    };
    (scheduler, service, publisher)
}

fn experiment_input(variant_count: usize) -> CreateExperimentInput {
    CreateExperimentInput {
        owner_id: "seller-9".to_string(),
        project_id: Some("summer-clearout".to_string()),
        name: "price point test".to_string(),
        category: "bikes".to_string(),
        base: ListingContent {
            title: "Gravel bike 54cm".to_string(),
            description: "One season of use".to_string(),
            price_minor: 8_900_000,
            images: vec!["bike-front.jpg".to_string()],
        },
        duration_days: 7,
        rotation_interval_hours: 4,
        variants: (0..variant_count)
            .map(|i| CreateVariantInput {
                index: i as i32,
                name: format!("variant-{}", i),
                title: None,
                description: None,
                price_minor: Some(8_900_000 - 200_000 * i as i64),
                images: None,
            })
            .collect(),
    }
}

fn set_metrics(views: i64, contacts: i64, favorites: i64) -> UpdateMetricsInput {
    UpdateMetricsInput {
        mode: MetricsMode::Set,
        views: Some(views),
        contacts: Some(contacts),
        favorites: Some(favorites),
    }
}

fn stranded_experiment(started_at: chrono::DateTime<Utc>) -> Experiment {
    let now = Utc::now();
    Experiment {
        id: Uuid::new_v4(),
        owner_id: "seller-9".to_string(),
        project_id: None,
        name: "orphaned test".to_string(),
        category: "bikes".to_string(),
        base: ListingContent {
            title: "Gravel bike 54cm".to_string(),
            description: "One season of use".to_string(),
            price_minor: 8_900_000,
            images: vec![],
        },
        duration_days: 7,
        rotation_interval_hours: 4,
        status: ExperimentStatus::Testing,
        current_variant_index: Some(0),
        winner_variant_id: None,
        started_at: Some(started_at),
        last_rotated_at: None,
        stopped_at: None,
        created_at: started_at,
        updated_at: now,
        variants: vec![],
    }
}
