// ============================================
// Recommendation Engine
// ============================================
//
// Blends heuristic relevance with the classifier's purchase propensity:
//   blended = heuristic_weight * heuristic + model_weight * model
// falling back to the pure heuristic when the classifier has no prediction.
// The top-N slate is persisted under `recommendations` and published on a
// watch channel for the render layer.

use super::features::product_features;
use super::heuristic::HeuristicScorer;
use super::model::ModelController;
use crate::jobs::Clock;
use crate::models::{BehaviorRecord, Product, RecommendationSlate, ScoredProduct};
use crate::storage::{keys, save_json, LocalStore};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

pub const DEFAULT_LIMIT: usize = 5;
pub const DEFAULT_HEURISTIC_WEIGHT: f32 = 0.7;
pub const DEFAULT_MODEL_WEIGHT: f32 = 0.3;

pub struct RecommendationEngine {
    scorer: HeuristicScorer,
    model: Option<Arc<Mutex<ModelController>>>,
    store: Arc<dyn LocalStore>,
    clock: Arc<dyn Clock>,
    limit: usize,
    heuristic_weight: f32,
    model_weight: f32,
    publisher: watch::Sender<RecommendationSlate>,
}

impl RecommendationEngine {
    pub fn new(store: Arc<dyn LocalStore>, clock: Arc<dyn Clock>) -> Self {
        let (publisher, _) = watch::channel(RecommendationSlate::new(clock.now(), Vec::new()));
        Self {
            scorer: HeuristicScorer::new(),
            model: None,
            store,
            clock,
            limit: DEFAULT_LIMIT,
            heuristic_weight: DEFAULT_HEURISTIC_WEIGHT,
            model_weight: DEFAULT_MODEL_WEIGHT,
            publisher,
        }
    }

    pub fn with_model(mut self, model: Arc<Mutex<ModelController>>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_weights(mut self, heuristic_weight: f32, model_weight: f32) -> Self {
        self.heuristic_weight = heuristic_weight;
        self.model_weight = model_weight;
        self
    }

    /// Receiver for every slate produced from now on
    pub fn subscribe(&self) -> watch::Receiver<RecommendationSlate> {
        self.publisher.subscribe()
    }

    /// Most recently published slate
    pub fn latest(&self) -> RecommendationSlate {
        self.publisher.borrow().clone()
    }

    /// Score the whole catalog and return it in descending order.
    ///
    /// Ties keep catalog order. With an uninitialized classifier the pass is
    /// heuristic-only and the classifier is initialized afterwards.
    pub async fn rank(&self, catalog: &[Product], behavior: &BehaviorRecord) -> Vec<ScoredProduct> {
        let mut model = match &self.model {
            Some(model) => Some(model.lock().await),
            None => None,
        };

        let mut scored: Vec<ScoredProduct> = catalog
            .iter()
            .map(|product| {
                let heuristic = self.scorer.score(product, behavior);
                let prediction = model
                    .as_deref()
                    .and_then(|m| m.predict(&product_features(product, behavior)))
                    .filter(|p| p.is_finite());

                let score = match prediction {
                    Some(p) => self.heuristic_weight * heuristic + self.model_weight * p,
                    None => heuristic,
                };

                ScoredProduct {
                    product: product.clone(),
                    score,
                }
            })
            .collect();

        // Stable: equal scores stay in catalog order
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));

        if let Some(controller) = model.as_deref_mut() {
            if !controller.is_initialized() {
                controller.initialize();
            }
        }

        scored
    }

    /// Rank, keep the top N, persist and publish
    pub async fn recompute(&self, catalog: &[Product], behavior: &BehaviorRecord) -> RecommendationSlate {
        let mut items = self.rank(catalog, behavior).await;
        items.truncate(self.limit);

        let slate = RecommendationSlate::new(self.clock.now(), items);

        if let Err(e) = save_json(self.store.as_ref(), keys::RECOMMENDATIONS, &slate).await {
            warn!(error = %e, "Failed to persist recommendations");
        }

        debug!(
            catalog_size = catalog.len(),
            recommended = slate.items.len(),
            "Recommendations recomputed"
        );

        self.publisher.send_replace(slate.clone());
        slate
    }
}
