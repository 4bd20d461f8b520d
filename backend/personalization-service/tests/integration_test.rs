use chrono::{Duration, TimeZone, Utc};
use personalization_service::backend::NoopBackend;
use personalization_service::jobs::{ManualClock, TaskKind};
use personalization_service::models::{
    BehaviorRecord, ModelTier, Product, PurchaseItem, ResourceSnapshot,
};
use personalization_service::services::model::descriptor;
use personalization_service::services::{FixedSampler, LabeledDataset};
use personalization_service::storage::MemoryLocalStore;
use personalization_service::{
    Config, ModelController, PersonalizationSession, RecommendationEngine,
};
use std::sync::Arc;

fn start_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
}

fn session(load: ResourceSnapshot, clock: Arc<ManualClock>) -> PersonalizationSession {
    PersonalizationSession::new(
        Config::default(),
        "integration-user",
        Arc::new(MemoryLocalStore::new()),
        Arc::new(NoopBackend),
        Arc::new(FixedSampler(load)),
        clock,
    )
    .with_controller(ModelController::with_seed(2024))
}

fn two_products() -> Vec<Product> {
    vec![
        Product::new("P1", "Brake pad", 100.0),
        Product::new("P2", "Air filter", 50.0),
    ]
}

#[tokio::test]
async fn test_uninitialized_model_ranks_by_heuristic() {
    let engine = RecommendationEngine::new(
        Arc::new(MemoryLocalStore::new()),
        Arc::new(ManualClock::new(start_time())),
    )
    .with_model(Arc::new(tokio::sync::Mutex::new(ModelController::with_seed(1))));

    let mut behavior = BehaviorRecord::new();
    behavior.product_views.insert("P1".to_string(), 3);

    let slate = engine.recompute(&two_products(), &behavior).await;

    assert_eq!(slate.product_ids(), vec!["P1", "P2"]);
    assert!((slate.items[0].score - 0.9).abs() < 1e-5);
    assert_eq!(slate.items[1].score, 0.0);
}

#[tokio::test]
async fn test_session_first_pass_is_heuristic_only() {
    let clock = Arc::new(ManualClock::new(start_time()));
    let session = session(ResourceSnapshot::new(20.0, 20.0, 20.0), clock);
    let mut rx = session.subscribe();

    for _ in 0..3 {
        session.behavior().record_view("P1").await.unwrap();
    }

    let slate = session.set_catalog(two_products()).await;

    assert_eq!(slate.product_ids(), vec!["P1", "P2"]);
    assert!((slate.items[0].score - 0.9).abs() < 1e-5);
    assert_eq!(slate.items[1].score, 0.0);
    assert_eq!(*rx.borrow_and_update(), slate);

    // The pass requested initialization for the next one
    assert!(session.model().lock().await.is_initialized());
}

#[tokio::test]
async fn test_resource_scenarios_pick_tiers() {
    let controller = ModelController::with_seed(1);
    assert_eq!(
        controller.evaluate(&ResourceSnapshot::new(20.0, 20.0, 20.0)),
        ModelTier::Minimal
    );
    assert_eq!(
        controller.evaluate(&ResourceSnapshot::new(90.0, 90.0, 90.0)),
        ModelTier::Advanced
    );

    let clock = Arc::new(ManualClock::new(start_time()));
    let busy = session(ResourceSnapshot::new(90.0, 90.0, 90.0), clock.clone());
    assert_eq!(busy.run_evolution().await.tier(), ModelTier::Advanced);

    let idle = session(ResourceSnapshot::new(20.0, 20.0, 20.0), clock);
    assert_eq!(idle.run_evolution().await.tier(), ModelTier::Minimal);
}

#[tokio::test]
async fn test_shrinking_evolution_preserves_overlapping_weights() {
    let mut controller = ModelController::with_seed(7);
    controller.maybe_evolve(
        &ResourceSnapshot::new(60.0, 60.0, 60.0),
        &LabeledDataset::new(),
        start_time(),
    );
    controller.initialize();
    assert_eq!(controller.tier(), ModelTier::Normal);
    let before = controller.snapshot().unwrap().to_tensors().unwrap();

    // Empty holdout scores 1.0 on both sides, so the downgrade commits
    let outcome = controller.maybe_evolve(
        &ResourceSnapshot::new(40.0, 40.0, 40.0),
        &LabeledDataset::new(),
        start_time(),
    );
    assert!(outcome.is_committed());
    assert_eq!(controller.tier(), ModelTier::Light);

    let after = controller.snapshot().unwrap().to_tensors().unwrap();

    // Second kernel: (16, 8) -> (8, 4); first 8 rows carried over exactly
    assert_eq!(before[2].shape(), &[16, 8]);
    assert_eq!(after[2].shape(), &[8, 4]);
    for row in 0..8 {
        for col in 0..4 {
            assert_eq!(after[2][[row, col]], before[2][[row, col]]);
        }
    }

    // First kernel: (5, 16) -> (5, 8)
    for row in 0..5 {
        for col in 0..8 {
            assert_eq!(after[0][[row, col]], before[0][[row, col]]);
        }
    }
}

#[tokio::test]
async fn test_prune_boundary_through_session() {
    let clock = Arc::new(ManualClock::new(start_time()));
    let session = session(ResourceSnapshot::new(20.0, 20.0, 20.0), clock.clone());

    session.track_search("brake").await;
    session
        .track_purchase(vec![PurchaseItem::new("P1", "Brake pad", 100.0, 1)])
        .await;

    clock.advance(Duration::days(30));
    let report = session.prune().await.unwrap();
    assert!(report.is_empty());

    clock.advance(Duration::seconds(1));
    let report = session.prune().await.unwrap();
    assert_eq!(report.searches_removed, 1);
    assert_eq!(report.purchases_removed, 1);

    let behavior = session.behavior().load().await;
    assert!(behavior.searches.is_empty());
    assert!(behavior.purchases.is_empty());
}

#[tokio::test]
async fn test_full_day_of_scheduled_work() {
    let clock = Arc::new(ManualClock::new(start_time()));
    let session = session(ResourceSnapshot::new(45.0, 45.0, 45.0), clock.clone());
    session.start().await;

    session
        .set_catalog(vec![
            Product::new("P1", "Brake pad", 450.0),
            Product::new("P2", "Engine oil 5W-30", 320.0),
            Product::new("P3", "Air filter", 180.0),
        ])
        .await;
    session.track_view("P2").await;
    session.track_search("engine oil").await;
    session
        .track_purchase(vec![PurchaseItem::new("P2", "Engine oil 5W-30", 320.0, 2)])
        .await;

    // First evolution tick moves to the light tier
    clock.advance(Duration::seconds(300));
    assert_eq!(session.run_due_tasks().await, vec![TaskKind::Evolution]);
    let tier = session.model().lock().await.tier();
    assert!(tier == ModelTier::Light || tier == ModelTier::Minimal);

    // Light retrains every 12 hours
    if tier == ModelTier::Light {
        clock.advance(Duration::seconds(descriptor(ModelTier::Light).training_interval_secs as i64));
        let ran = session.run_due_tasks().await;
        assert!(ran.contains(&TaskKind::Training));
    }

    let slate = session.recompute().await;
    assert_eq!(slate.items.len(), 3);
    assert_eq!(slate.items[0].product.id, "P2");
}
