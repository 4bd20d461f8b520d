// ============================================
// Adaptive Classifier
// ============================================
//
// Resource-aware purchase-propensity classifier. The controller picks a
// capacity tier from device load, migrates weights between tiers and rolls
// back candidates that regress on held-out data.

pub mod controller;
pub mod migration;
pub mod network;
pub mod tier;

pub use controller::{EvolutionOutcome, ModelController, ROLLBACK_THRESHOLD, TRAINING_EPOCHS};
pub use migration::{migrate_tensors, MigrationReport};
pub use network::{Network, TrainingReport};
pub use tier::{descriptor, Activation, LayerSpec, TierDescriptor};

use crate::error::Result;
use crate::models::{ModelTier, SCHEMA_VERSION};
use crate::storage::Versioned;
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

fn snapshot_version() -> u32 {
    SCHEMA_VERSION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorSnapshot {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl TensorSnapshot {
    pub fn from_array(array: &ArrayD<f32>) -> Self {
        Self {
            shape: array.shape().to_vec(),
            data: array.iter().copied().collect(),
        }
    }

    pub fn to_array(&self) -> Result<ArrayD<f32>> {
        Ok(ArrayD::from_shape_vec(IxDyn(&self.shape), self.data.clone())?)
    }
}

/// Persisted classifier weights under `classifier-state-snapshot`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierSnapshot {
    #[serde(default = "snapshot_version")]
    pub version: u32,
    pub tier: ModelTier,
    pub tensors: Vec<TensorSnapshot>,
}

impl ClassifierSnapshot {
    pub fn from_network(network: &Network) -> Self {
        Self {
            version: SCHEMA_VERSION,
            tier: network.tier(),
            tensors: network
                .tensors()
                .iter()
                .map(TensorSnapshot::from_array)
                .collect(),
        }
    }

    pub fn to_tensors(&self) -> Result<Vec<ArrayD<f32>>> {
        self.tensors.iter().map(TensorSnapshot::to_array).collect()
    }
}

impl Versioned for ClassifierSnapshot {
    fn schema_version(&self) -> u32 {
        self.version
    }
}
