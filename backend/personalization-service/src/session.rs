// ============================================
// Personalization Session
// ============================================
//
// Explicitly constructed context owning every component for one hosting
// session. Interactions flow mutate -> recompute -> sync, with mutate and
// recompute serialized so the published slate always ranks the latest
// record. The scheduler
// drives tier evolution and retraining. Both periodic tasks take the same
// classifier mutex, so they never overlap.
//
// Nothing here fails the caller: unavailable dependencies are logged and the
// session degrades (heuristic-only ranking, skipped sync).

use crate::backend::BackendDataService;
use crate::config::Config;
use crate::error::Result;
use crate::jobs::{Clock, Scheduler, TaskKind};
use crate::models::{Product, PurchaseItem, RecommendationSlate, SystemState};
use crate::services::behavior::{BehaviorEvent, BehaviorStore, BehaviorUpdate, PruneReport};
use crate::services::features::LabeledDataset;
use crate::services::model::{
    descriptor, ClassifierSnapshot, EvolutionOutcome, ModelController, TrainingReport,
};
use crate::services::recommendation::RecommendationEngine;
use crate::services::resource_monitor::ResourceSampler;
use crate::storage::{keys, load_json, load_versioned, save_json, LocalStore};
use chrono::Duration;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, MutexGuard, RwLock};
use tracing::{debug, error, info, warn};

pub struct PersonalizationSession {
    config: Config,
    user_id: String,
    store: Arc<dyn LocalStore>,
    backend: Arc<dyn BackendDataService>,
    sampler: Arc<dyn ResourceSampler>,
    clock: Arc<dyn Clock>,
    behavior: BehaviorStore,
    model: Arc<Mutex<ModelController>>,
    engine: RecommendationEngine,
    catalog: RwLock<Vec<Product>>,
    scheduler: Mutex<Scheduler>,
    // Held from behavior mutation through slate publication
    interactions: Mutex<()>,
}

impl PersonalizationSession {
    pub fn new(
        config: Config,
        user_id: impl Into<String>,
        store: Arc<dyn LocalStore>,
        backend: Arc<dyn BackendDataService>,
        sampler: Arc<dyn ResourceSampler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let model = Arc::new(Mutex::new(ModelController::new()));
        let engine = build_engine(&config, &store, &clock, &model);
        let behavior = BehaviorStore::new(store.clone(), clock.clone(), config.max_searches);
        let scheduler = Scheduler::from_secs(
            clock.now(),
            config.evolution_interval_secs,
            config.training_interval_secs,
        );

        Self {
            config,
            user_id: user_id.into(),
            store,
            backend,
            sampler,
            clock,
            behavior,
            model,
            engine,
            catalog: RwLock::new(Vec::new()),
            scheduler: Mutex::new(scheduler),
            interactions: Mutex::new(()),
        }
    }

    /// Replace the classifier, e.g. with a seeded one; call before `start`
    pub fn with_controller(mut self, controller: ModelController) -> Self {
        self.model = Arc::new(Mutex::new(controller));
        self.engine = build_engine(&self.config, &self.store, &self.clock, &self.model);
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn behavior(&self) -> &BehaviorStore {
        &self.behavior
    }

    /// Shared handle to the classifier
    pub fn model(&self) -> Arc<Mutex<ModelController>> {
        self.model.clone()
    }

    /// Restore persisted state and prune stale behavior
    pub async fn start(&self) {
        let restored = self.restore_classifier().await;

        if let Some(state) = load_versioned::<SystemState>(self.store.as_ref(), keys::SYSTEM_STATE).await {
            let mut model = self.model.lock().await;
            if !restored && model.adopt_tier(state.tier) {
                debug!(tier = %state.tier, "Adopted persisted tier");
            }
        }

        if let Some(products) = load_json::<Vec<Product>>(self.store.as_ref(), keys::PRODUCTS).await {
            *self.catalog.write().await = products;
        }

        if let Err(e) = self.prune().await {
            warn!(error = %e, "Failed to prune behavior history");
        }

        self.sync_training_cadence().await;

        let catalog = self.catalog().await;
        if !catalog.is_empty() {
            self.recompute().await;
        }

        let tier = self.model.lock().await.tier();
        info!(
            user_id = %self.user_id,
            tier = %tier,
            restored_classifier = restored,
            catalog_size = catalog.len(),
            "Personalization session started"
        );
    }

    async fn restore_classifier(&self) -> bool {
        let Some(snapshot) =
            load_versioned::<ClassifierSnapshot>(self.store.as_ref(), keys::CLASSIFIER_SNAPSHOT).await
        else {
            return false;
        };

        match self.model.lock().await.restore(&snapshot) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Persisted classifier does not match its tier, starting fresh");
                false
            }
        }
    }

    // ============================================
    // Catalog & recommendations
    // ============================================

    /// Replace the catalog, persist it and recompute the slate
    pub async fn set_catalog(&self, products: Vec<Product>) -> RecommendationSlate {
        if let Err(e) = save_json(self.store.as_ref(), keys::PRODUCTS, &products).await {
            warn!(error = %e, "Failed to persist catalog");
        }
        *self.catalog.write().await = products;

        self.recompute().await
    }

    pub async fn catalog(&self) -> Vec<Product> {
        self.catalog.read().await.clone()
    }

    pub async fn recompute(&self) -> RecommendationSlate {
        let _guard = self.interactions.lock().await;
        let catalog = self.catalog().await;
        let behavior = self.behavior.load().await;
        self.engine.recompute(&catalog, &behavior).await
    }

    pub fn recommendations(&self) -> RecommendationSlate {
        self.engine.latest()
    }

    /// Slates for the render layer
    pub fn subscribe(&self) -> watch::Receiver<RecommendationSlate> {
        self.engine.subscribe()
    }

    // ============================================
    // Interactions
    // ============================================

    pub async fn track_view(&self, product_id: &str) -> Option<RecommendationSlate> {
        let guard = self.interactions.lock().await;
        let update = self.behavior.record_view(product_id).await;
        self.after_mutation("view", update, guard).await
    }

    pub async fn track_search(&self, term: &str) -> Option<RecommendationSlate> {
        let guard = self.interactions.lock().await;
        let update = self.behavior.record_search(term).await;
        self.after_mutation("search", update, guard).await
    }

    pub async fn track_purchase(&self, items: Vec<PurchaseItem>) -> Option<RecommendationSlate> {
        let guard = self.interactions.lock().await;
        let update = self.behavior.record_purchase(items).await;
        self.after_mutation("purchase", update, guard).await
    }

    async fn after_mutation(
        &self,
        action: &str,
        update: Result<Option<BehaviorUpdate>>,
        guard: MutexGuard<'_, ()>,
    ) -> Option<RecommendationSlate> {
        let update = match update {
            Ok(Some(update)) => update,
            Ok(None) => return None,
            Err(e) if e.is_unavailable() => {
                warn!(action = action, error = %e, "Local store unavailable, interaction dropped");
                return None;
            }
            Err(e) => {
                error!(action = action, error = %e, "Failed to record interaction");
                return None;
            }
        };

        let catalog = self.catalog().await;
        let slate = self.engine.recompute(&catalog, &update.record).await;
        drop(guard);

        self.sync_event(&update.event).await;

        Some(slate)
    }

    /// Best-effort delta sync of one interaction
    async fn sync_event(&self, event: &BehaviorEvent) {
        let row = match event.to_row(&self.user_id) {
            Ok(row) => row,
            Err(e) => {
                warn!(error = %e, "Failed to encode behavior row");
                return;
            }
        };

        match self.backend.append_behavior_rows(std::slice::from_ref(&row)).await {
            Ok(()) => debug!(action = ?row.action_type, "Behavior synced"),
            Err(e) => warn!(
                action = ?row.action_type,
                error = %e,
                "Behavior sync failed, keeping local copy only"
            ),
        }
    }

    pub async fn prune(&self) -> Result<PruneReport> {
        self.behavior
            .prune(self.config.retention_days, self.config.max_searches)
            .await
    }

    // ============================================
    // Periodic tasks
    // ============================================

    /// Sample resources and move the classifier to the matching tier
    pub async fn run_evolution(&self) -> EvolutionOutcome {
        let resources = self.sampler.sample().await;
        let behavior = self.behavior.load().await;
        let catalog = self.catalog().await;
        let holdout = LabeledDataset::holdout_set(&behavior, &catalog);
        let now = self.clock.now();

        let (outcome, state, snapshot) = {
            let mut model = self.model.lock().await;
            let outcome = model.maybe_evolve(&resources, &holdout, now);
            let state = SystemState::new(model.tier(), now, model.evaluate_performance(&holdout));
            let snapshot = if outcome.is_committed() {
                model.snapshot()
            } else {
                None
            };
            (outcome, state, snapshot)
        };

        if let Err(e) = save_json(self.store.as_ref(), keys::SYSTEM_STATE, &state).await {
            warn!(error = %e, "Failed to persist system state");
        }

        if let Some(snapshot) = snapshot {
            self.save_snapshot(&snapshot).await;
        }

        if outcome.is_committed() {
            self.sync_training_cadence().await;
        }

        info!(
            cpu = resources.cpu,
            memory = resources.memory,
            storage = resources.storage,
            tier = %outcome.tier(),
            performance = state.performance_score,
            "Evolution check complete"
        );

        outcome
    }

    /// Retrain from behavior-derived examples, then persist and upload the weights
    pub async fn run_training(&self) -> Option<TrainingReport> {
        let behavior = self.behavior.load().await;
        let catalog = self.catalog().await;
        let dataset = LabeledDataset::training_set(&behavior, &catalog);

        let (report, snapshot) = {
            let mut model = self.model.lock().await;
            let report = match model.train_dataset(&dataset) {
                Ok(report) => report,
                Err(e) => {
                    error!(error = %e, "Training failed");
                    return None;
                }
            };
            (report, model.snapshot())
        };

        let report = report?;

        if let Some(snapshot) = snapshot {
            self.save_snapshot(&snapshot).await;
            self.upload_snapshot(&snapshot).await;
        }

        Some(report)
    }

    /// Run whatever the scheduler reports as due at the current time
    pub async fn run_due_tasks(&self) -> Vec<TaskKind> {
        let due = self.scheduler.lock().await.due(self.clock.now());

        for task in &due {
            match task {
                TaskKind::Evolution => {
                    self.run_evolution().await;
                }
                TaskKind::Training => {
                    self.run_training().await;
                }
            }
        }

        due
    }

    pub async fn next_deadline(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.scheduler.lock().await.next_deadline()
    }

    /// Persist the current weights on demand
    pub async fn persist_classifier(&self) -> Result<bool> {
        let snapshot = self.model.lock().await.snapshot();
        match snapshot {
            Some(snapshot) => {
                save_json(self.store.as_ref(), keys::CLASSIFIER_SNAPSHOT, &snapshot).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn save_snapshot(&self, snapshot: &ClassifierSnapshot) {
        if let Err(e) = save_json(self.store.as_ref(), keys::CLASSIFIER_SNAPSHOT, snapshot).await {
            warn!(error = %e, "Failed to persist classifier snapshot");
        }
    }

    async fn upload_snapshot(&self, snapshot: &ClassifierSnapshot) {
        let bytes = match serde_json::to_vec(snapshot) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Failed to encode model artifact");
                return;
            }
        };

        let folder = &self.config.model_folder;
        let file_name = &self.config.model_file_name;
        match self.backend.upload_artifact(folder, file_name, bytes).await {
            Ok(()) => info!(folder = %folder, file = %file_name, "Model artifact uploaded"),
            Err(e) => warn!(error = %e, "Model upload failed, keeping local snapshot only"),
        }
    }

    /// Retrain at the tier's cadence, never less often than configured
    async fn sync_training_cadence(&self) {
        let tier = self.model.lock().await.tier();
        let secs = descriptor(tier)
            .training_interval_secs
            .min(self.config.training_interval_secs);

        self.scheduler.lock().await.set_interval(
            TaskKind::Training,
            Duration::seconds(secs as i64),
            self.clock.now(),
        );
    }
}

fn build_engine(
    config: &Config,
    store: &Arc<dyn LocalStore>,
    clock: &Arc<dyn Clock>,
    model: &Arc<Mutex<ModelController>>,
) -> RecommendationEngine {
    RecommendationEngine::new(store.clone(), clock.clone())
        .with_model(model.clone())
        .with_limit(config.recommendation_limit)
        .with_weights(config.heuristic_weight, config.model_weight)
}
