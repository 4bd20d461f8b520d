pub mod behavior;
pub mod features;
pub mod heuristic;
pub mod model;
pub mod recommendation;
pub mod resource_monitor;

pub use behavior::{BehaviorEvent, BehaviorStore, BehaviorUpdate, PruneReport};
pub use features::{product_features, Category, FeatureVector, LabeledDataset};
pub use heuristic::HeuristicScorer;
pub use model::{ClassifierSnapshot, EvolutionOutcome, ModelController};
pub use recommendation::RecommendationEngine;
pub use resource_monitor::{FixedSampler, ResourceMonitor, ResourceSampler};
