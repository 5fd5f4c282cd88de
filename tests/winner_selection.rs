use std::sync::Arc;

use listing_experiments::domain::content::ListingContent;
use listing_experiments::domain::error::ExperimentError;
use listing_experiments::domain::experiment::{
    CreateExperimentInput, CreateVariantInput, ExperimentStatus, MetricsMode, UpdateMetricsInput,
    Variant,
};
use listing_experiments::publisher::mock::MockPublisher;
use listing_experiments::selection::winner::{select_winner, SelectionThresholds};
use listing_experiments::service::experiment_service::ExperimentService;
use listing_experiments::store::memory::MemoryExperimentStore;
use uuid::Uuid;

#[test]
fn higher_contact_rate_wins_at_equal_views() {
    let variants = vec![measured(0, 100, 10, 0), measured(1, 100, 5, 0)];
    let report = select_winner(&variants, &SelectionThresholds::default()).unwrap();

    assert_eq!(report.variant_index, 0);
    assert_eq!(report.total_views, 200);
    assert_eq!(report.evaluated.len(), 2);
    assert!(report.ctr > 0.0);
}

#[test]
fn low_sample_variants_cannot_outrank_proven_ones() {
    let variants = vec![measured(0, 5, 5, 0), measured(1, 200, 40, 0)];
    let report = select_winner(&variants, &SelectionThresholds::default()).unwrap();

    assert_eq!(report.variant_index, 1);
    assert_eq!(report.evaluated.len(), 1);
}

#[test]
fn thin_experiments_need_explicit_low_sample_approval() {
    let variants = vec![measured(0, 6, 1, 0), measured(1, 4, 2, 1)];

    let err = select_winner(&variants, &SelectionThresholds::default()).unwrap_err();
    assert!(matches!(
        err,
        ExperimentError::InsufficientData {
            collected: 10,
            required: 50
        }
    ));

    let relaxed = SelectionThresholds {
        allow_low_sample: true,
        ..SelectionThresholds::default()
    };
    let report = select_winner(&variants, &relaxed).unwrap();
    assert_eq!(report.variant_index, 1);
}

#[test]
fn per_variant_floor_reports_the_best_collected_sample() {
    let variants = vec![measured(0, 19, 1, 0), measured(1, 19, 9, 3), measured(2, 19, 0, 0)];
    let err = select_winner(&variants, &SelectionThresholds::default()).unwrap_err();
    assert!(matches!(
        err,
        ExperimentError::InsufficientData {
            collected: 19,
            required: 20
        }
    ));
}

#[test]
fn forced_selection_handles_zero_views() {
    let variants = vec![measured(0, 0, 0, 0), measured(1, 0, 0, 0)];
    let report = select_winner(&variants, &SelectionThresholds::forced()).unwrap();

    assert_eq!(report.variant_index, 0);
    assert_eq!(report.score, 0.0);
}

#[test]
fn selection_needs_at_least_one_variant() {
    let err = select_winner(&[], &SelectionThresholds::forced()).unwrap_err();
    assert!(matches!(err, ExperimentError::Validation(_)));
}

#[tokio::test]
async fn declared_winner_is_persisted_on_the_experiment() {
    let service = service();
    let created = service.create(two_variant_input()).await.unwrap();
    service.start(created.id).await.unwrap();
    service
        .update_metrics(created.id, created.variants[0].id, set_metrics(120, 6, 2))
        .await
        .unwrap();
    service
        .update_metrics(created.id, created.variants[1].id, set_metrics(110, 22, 9))
        .await
        .unwrap();

    let report = service
        .declare_winner(created.id, &SelectionThresholds::default())
        .await
        .unwrap();
    assert_eq!(report.variant_index, 1);

    let after = service.get(created.id).await.unwrap();
    assert_eq!(after.status, ExperimentStatus::WinnerFound);
    assert_eq!(after.winner_variant_id, Some(report.variant_id));
}

#[tokio::test]
async fn winner_declaration_requires_a_running_experiment() {
    let service = service();
    let created = service.create(two_variant_input()).await.unwrap();

    let err = service
        .declare_winner(created.id, &SelectionThresholds::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ExperimentError::InvalidState { .. }));
}

#[tokio::test]
async fn preview_does_not_change_state() {
    let service = service();
    let created = service.create(two_variant_input()).await.unwrap();
    service.start(created.id).await.unwrap();
    service
        .update_metrics(created.id, created.variants[0].id, set_metrics(80, 8, 2))
        .await
        .unwrap();
    service
        .update_metrics(created.id, created.variants[1].id, set_metrics(90, 3, 1))
        .await
        .unwrap();

    let report = service
        .preview_winner(created.id, &SelectionThresholds::default())
        .await
        .unwrap();
    assert_eq!(report.variant_index, 0);

    let after = service.get(created.id).await.unwrap();
    assert_eq!(after.status, ExperimentStatus::Testing);
    assert_eq!(after.winner_variant_id, None);
}

fn service() -> ExperimentService {
    ExperimentService {
        store: Arc::new(MemoryExperimentStore::new()),
        publisher: Arc::new(MockPublisher::new("ALWAYS_SUCCESS")),
    }
}

fn two_variant_input() -> CreateExperimentInput {
    CreateExperimentInput {
        owner_id: "seller-7".to_string(),
        project_id: None,
        name: "photo order test".to_string(),
        category: "furniture".to_string(),
        base: ListingContent {
            title: "Oak dining table".to_string(),
            description: "Seats six".to_string(),
            price_minor: 1_200_000,
            images: vec![],
        },
        duration_days: 14,
        rotation_interval_hours: 6,
        variants: vec![
            CreateVariantInput {
                index: 0,
                name: "control".to_string(),
                title: None,
                description: None,
                price_minor: None,
                images: None,
            },
            CreateVariantInput {
                index: 1,
                name: "close-up first".to_string(),
                title: None,
                description: None,
                price_minor: None,
                images: None,
            },
        ],
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

fn measured(index: i32, views: i64, contacts: i64, favorites: i64) -> Variant {
    Variant {
        id: Uuid::new_v4(),
        experiment_id: Uuid::new_v4(),
        index,
        name: format!("variant-{}", index),
        title: "Oak dining table".to_string(),
        description: "Seats six".to_string(),
        price_minor: 1_200_000,
        images: vec![],
        views,
        contacts,
        favorites,
        external_listing_id: None,
        published_at: None,
    }
}
