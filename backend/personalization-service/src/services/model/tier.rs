//! Capacity tier descriptors and the load → tier mapping.
use crate::models::{ModelTier, ResourceSnapshot};
use crate::services::features::FEATURE_VECTOR_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Relu,
    Sigmoid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerSpec {
    pub input_width: usize,
    pub units: usize,
    pub activation: Activation,
}

const fn dense(input_width: usize, units: usize, activation: Activation) -> LayerSpec {
    LayerSpec {
        input_width,
        units,
        activation,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierDescriptor {
    pub tier: ModelTier,
    pub layers: &'static [LayerSpec],
    pub batch_size: usize,
    pub training_interval_secs: u64,
}

const HOUR: u64 = 3600;
const INPUT: usize = FEATURE_VECTOR_SIZE;

const MINIMAL_LAYERS: [LayerSpec; 2] = [
    dense(INPUT, 4, Activation::Relu),
    dense(4, 1, Activation::Sigmoid),
];

const LIGHT_LAYERS: [LayerSpec; 3] = [
    dense(INPUT, 8, Activation::Relu),
    dense(8, 4, Activation::Relu),
    dense(4, 1, Activation::Sigmoid),
];

const NORMAL_LAYERS: [LayerSpec; 4] = [
    dense(INPUT, 16, Activation::Relu),
    dense(16, 8, Activation::Relu),
    dense(8, 4, Activation::Relu),
    dense(4, 1, Activation::Sigmoid),
];

const ADVANCED_LAYERS: [LayerSpec; 5] = [
    dense(INPUT, 32, Activation::Relu),
    dense(32, 16, Activation::Relu),
    dense(16, 8, Activation::Relu),
    dense(8, 4, Activation::Relu),
    dense(4, 1, Activation::Sigmoid),
];

static MINIMAL: TierDescriptor = TierDescriptor {
    tier: ModelTier::Minimal,
    layers: &MINIMAL_LAYERS,
    batch_size: 16,
    training_interval_secs: 24 * HOUR,
};

static LIGHT: TierDescriptor = TierDescriptor {
    tier: ModelTier::Light,
    layers: &LIGHT_LAYERS,
    batch_size: 32,
    training_interval_secs: 12 * HOUR,
};

static NORMAL: TierDescriptor = TierDescriptor {
    tier: ModelTier::Normal,
    layers: &NORMAL_LAYERS,
    batch_size: 64,
    training_interval_secs: 6 * HOUR,
};

static ADVANCED: TierDescriptor = TierDescriptor {
    tier: ModelTier::Advanced,
    layers: &ADVANCED_LAYERS,
    batch_size: 128,
    training_interval_secs: 3 * HOUR,
};

pub fn descriptor(tier: ModelTier) -> &'static TierDescriptor {
    match tier {
        ModelTier::Minimal => &MINIMAL,
        ModelTier::Light => &LIGHT,
        ModelTier::Normal => &NORMAL,
        ModelTier::Advanced => &ADVANCED,
    }
}

/// Tier for a weighted load score
pub fn tier_for_score(score: f32) -> ModelTier {
    if score < 30.0 {
        ModelTier::Minimal
    } else if score < 50.0 {
        ModelTier::Light
    } else if score < 80.0 {
        ModelTier::Normal
    } else {
        ModelTier::Advanced
    }
}

/// Total mapping from a resource snapshot to the tier it can sustain
pub fn evaluate(snapshot: &ResourceSnapshot) -> ModelTier {
    tier_for_score(snapshot.load_score())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate_extremes() {
        assert_eq!(evaluate(&ResourceSnapshot::new(0.0, 0.0, 0.0)), ModelTier::Minimal);
        assert_eq!(
            evaluate(&ResourceSnapshot::new(100.0, 100.0, 100.0)),
            ModelTier::Advanced
        );
    }

    #[test]
    fn test_evaluate_scenarios() {
        assert_eq!(evaluate(&ResourceSnapshot::new(20.0, 20.0, 20.0)), ModelTier::Minimal);
        assert_eq!(evaluate(&ResourceSnapshot::new(90.0, 90.0, 90.0)), ModelTier::Advanced);
    }

    #[test]
    fn test_threshold_boundaries() {
        assert_eq!(tier_for_score(29.99), ModelTier::Minimal);
        assert_eq!(tier_for_score(30.0), ModelTier::Light);
        assert_eq!(tier_for_score(49.99), ModelTier::Light);
        assert_eq!(tier_for_score(50.0), ModelTier::Normal);
        assert_eq!(tier_for_score(79.99), ModelTier::Normal);
        assert_eq!(tier_for_score(80.0), ModelTier::Advanced);
    }

    #[test]
    fn test_descriptors_are_well_formed() {
        for tier in ModelTier::ALL {
            let desc = descriptor(tier);
            assert_eq!(desc.tier, tier);
            assert_eq!(desc.layers[0].input_width, FEATURE_VECTOR_SIZE);

            // Each layer consumes the previous layer's output
            for pair in desc.layers.windows(2) {
                assert_eq!(pair[0].units, pair[1].input_width);
            }

            let last = desc.layers.last().unwrap();
            assert_eq!(last.units, 1);
            assert_eq!(last.activation, Activation::Sigmoid);
        }
    }

    #[test]
    fn test_capacity_grows_with_tier() {
        let widths: Vec<usize> = ModelTier::ALL
            .iter()
            .map(|t| descriptor(*t).layers[0].units)
            .collect();
        assert_eq!(widths, vec![4, 8, 16, 32]);
        assert!(descriptor(ModelTier::Advanced).batch_size > descriptor(ModelTier::Minimal).batch_size);
    }
}
