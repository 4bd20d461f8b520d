use super::migration::migrate_tensors;
use super::network::{accuracy, Network, TrainingReport};
use super::tier::{self, descriptor};
use super::ClassifierSnapshot;
use crate::error::{PersonalizationError, Result};
use crate::models::{EvolutionRecord, ModelTier, ResourceSnapshot, SCHEMA_VERSION};
use crate::services::features::{FeatureVector, LabeledDataset, FEATURE_VECTOR_SIZE};
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

/// A candidate tier is rejected when it scores below this fraction of the current accuracy
pub const ROLLBACK_THRESHOLD: f32 = 0.9;

pub const TRAINING_EPOCHS: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum EvolutionOutcome {
    /// Load maps to the current tier
    Unchanged(ModelTier),
    Committed(EvolutionRecord),
    RolledBack {
        tier: ModelTier,
        attempted: ModelTier,
        previous_accuracy: f32,
        candidate_accuracy: f32,
    },
}

impl EvolutionOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, EvolutionOutcome::Committed(_))
    }

    /// Tier in effect after the decision
    pub fn tier(&self) -> ModelTier {
        match self {
            EvolutionOutcome::Unchanged(tier) => *tier,
            EvolutionOutcome::Committed(record) => record.to_tier,
            EvolutionOutcome::RolledBack { tier, .. } => *tier,
        }
    }
}

/// Owns the on-device classifier and moves it between capacity tiers.
///
/// The network is created lazily: until the first `initialize`, `train` or
/// `restore`, predictions are `None` and tier changes commit directly.
#[derive(Debug)]
pub struct ModelController {
    tier: ModelTier,
    network: Option<Network>,
    history: Vec<EvolutionRecord>,
    rng: StdRng,
}

impl Default for ModelController {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelController {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic initialization and shuffling
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            tier: ModelTier::Minimal,
            network: None,
            history: Vec::new(),
            rng,
        }
    }

    pub fn tier(&self) -> ModelTier {
        self.tier
    }

    pub fn is_initialized(&self) -> bool {
        self.network.is_some()
    }

    pub fn network(&self) -> Option<&Network> {
        self.network.as_ref()
    }

    pub fn evolution_history(&self) -> &[EvolutionRecord] {
        &self.history
    }

    /// Build a fresh network for the current tier if none exists yet
    pub fn initialize(&mut self) {
        if self.network.is_none() {
            let network = Network::random(self.tier, &mut self.rng);
            info!(
                tier = %self.tier,
                parameters = network.parameter_count(),
                "Initialized classifier"
            );
            self.network = Some(network);
        }
    }

    /// Adopt a persisted tier while no weights exist yet; returns whether it applied
    pub fn adopt_tier(&mut self, tier: ModelTier) -> bool {
        if self.network.is_some() {
            return false;
        }
        self.tier = tier;
        true
    }

    pub fn evaluate(&self, snapshot: &ResourceSnapshot) -> ModelTier {
        tier::evaluate(snapshot)
    }

    pub fn predict(&self, features: &FeatureVector) -> Option<f32> {
        self.network
            .as_ref()
            .map(|network| network.predict_one(features))
    }

    pub fn train(
        &mut self,
        examples: &[FeatureVector],
        labels: &[f32],
    ) -> Result<Option<TrainingReport>> {
        if examples.is_empty() {
            debug!("No training examples, skipping");
            return Ok(None);
        }
        if examples.len() != labels.len() {
            return Err(PersonalizationError::InvalidInput(format!(
                "{} examples with {} labels",
                examples.len(),
                labels.len()
            )));
        }

        self.initialize();

        let x = Array2::from_shape_fn((examples.len(), FEATURE_VECTOR_SIZE), |(i, j)| {
            examples[i][j]
        });
        let y = Array1::from(labels.to_vec());
        let batch_size = descriptor(self.tier).batch_size;

        let Some(network) = self.network.as_mut() else {
            return Ok(None);
        };
        let report = network.fit(&x, &y, TRAINING_EPOCHS, batch_size, &mut self.rng)?;

        if let Some(report) = &report {
            info!(
                tier = %self.tier,
                samples = report.samples,
                loss = report.final_loss,
                accuracy = report.final_accuracy,
                "Classifier trained"
            );
        }

        Ok(report)
    }

    pub fn train_dataset(&mut self, dataset: &LabeledDataset) -> Result<Option<TrainingReport>> {
        self.train(&dataset.features, &dataset.labels)
    }

    /// Held-out accuracy in `[0, 1]`; 1.0 when there is nothing to evaluate
    pub fn evaluate_performance(&self, holdout: &LabeledDataset) -> f32 {
        holdout_accuracy(self.network.as_ref(), holdout)
    }

    /// Move to the tier the current load calls for, keeping the old network
    /// when the migrated candidate regresses.
    pub fn maybe_evolve(
        &mut self,
        snapshot: &ResourceSnapshot,
        holdout: &LabeledDataset,
        now: DateTime<Utc>,
    ) -> EvolutionOutcome {
        let target = self.evaluate(snapshot);
        let from = self.tier;
        if target == from {
            debug!(tier = %from, load = snapshot.load_score(), "Tier unchanged");
            return EvolutionOutcome::Unchanged(from);
        }

        let Some(current) = self.network.as_ref() else {
            // Nothing trained yet; the network is built at the new tier on first use
            self.tier = target;
            let record = EvolutionRecord {
                timestamp: now,
                from_tier: from,
                to_tier: target,
                resources: *snapshot,
                resulting_accuracy: holdout_accuracy(None, holdout),
            };
            info!(from = %from, to = %target, "Tier changed before initialization");
            self.history.push(record.clone());
            return EvolutionOutcome::Committed(record);
        };

        let previous_accuracy = holdout_accuracy(Some(current), holdout);

        let fresh = Network::random(target, &mut self.rng);
        let (tensors, report) = migrate_tensors(&current.tensors(), fresh.tensors());
        let candidate = match Network::from_tensors(target, tensors) {
            Ok(network) => network,
            Err(e) => {
                warn!(error = %e, to = %target, "Migrated weights rejected, using fresh weights");
                fresh
            }
        };

        let candidate_accuracy = holdout_accuracy(Some(&candidate), holdout);

        if candidate_accuracy < ROLLBACK_THRESHOLD * previous_accuracy {
            warn!(
                from = %from,
                to = %target,
                previous_accuracy,
                candidate_accuracy,
                "Evolution regressed, rolling back"
            );
            return EvolutionOutcome::RolledBack {
                tier: from,
                attempted: target,
                previous_accuracy,
                candidate_accuracy,
            };
        }

        self.tier = target;
        self.network = Some(candidate);

        let record = EvolutionRecord {
            timestamp: now,
            from_tier: from,
            to_tier: target,
            resources: *snapshot,
            resulting_accuracy: candidate_accuracy,
        };
        info!(
            from = %from,
            to = %target,
            accuracy = candidate_accuracy,
            preserved_tensors = report.preserved,
            reinitialized_tensors = report.reinitialized,
            "Evolution committed"
        );
        self.history.push(record.clone());

        EvolutionOutcome::Committed(record)
    }

    /// Serializable copy of the current weights; `None` before initialization
    pub fn snapshot(&self) -> Option<ClassifierSnapshot> {
        self.network.as_ref().map(ClassifierSnapshot::from_network)
    }

    /// Replace tier and weights from a snapshot; on error nothing changes
    pub fn restore(&mut self, snapshot: &ClassifierSnapshot) -> Result<()> {
        if snapshot.version > SCHEMA_VERSION {
            return Err(PersonalizationError::Model(format!(
                "Unsupported classifier snapshot version {}",
                snapshot.version
            )));
        }

        let network = Network::from_tensors(snapshot.tier, snapshot.to_tensors()?)?;
        self.tier = snapshot.tier;
        self.network = Some(network);

        info!(tier = %self.tier, "Restored classifier from snapshot");
        Ok(())
    }

    /// JSON artifact of the current weights for upload
    pub fn export_artifact(&self) -> Result<Option<Vec<u8>>> {
        match self.snapshot() {
            Some(snapshot) => Ok(Some(serde_json::to_vec(&snapshot)?)),
            None => Ok(None),
        }
    }
}

fn holdout_accuracy(network: Option<&Network>, holdout: &LabeledDataset) -> f32 {
    if holdout.is_empty() {
        return 1.0;
    }
    match network {
        Some(network) => {
            let predictions = network.forward(&holdout.feature_matrix());
            accuracy(&predictions, &holdout.label_vector())
        }
        None => 0.0,
    }
}
