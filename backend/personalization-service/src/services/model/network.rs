/// Dense Feed-Forward Classifier
///
/// Small fully-connected network built from a tier descriptor, trained with
/// Adam on binary cross-entropy. Parameters are exposed as a flat list of
/// tensors in layer order: `[kernel_0, bias_0, kernel_1, bias_1, ...]`, where
/// a kernel has shape `(input_width, units)` and a bias `(units)`.
use super::tier::{descriptor, Activation, LayerSpec};
use crate::error::{PersonalizationError, Result};
use crate::models::ModelTier;
use crate::services::features::{FeatureVector, FEATURE_VECTOR_SIZE};
use ndarray::{Array1, Array2, ArrayD, Axis, Ix1, Ix2};
use rand::distributions::{Distribution, Uniform};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

const LEARNING_RATE: f32 = 0.01;
const BETA1: f32 = 0.9;
const BETA2: f32 = 0.999;
const ADAM_EPSILON: f32 = 1e-7;

/// Probabilities are clipped away from 0/1 before taking logs
const PROBABILITY_EPSILON: f32 = 1e-7;

#[derive(Debug, Clone)]
pub struct DenseLayer {
    pub kernel: Array2<f32>,
    pub bias: Array1<f32>,
    pub activation: Activation,
}

impl DenseLayer {
    fn glorot<R: Rng + ?Sized>(spec: &LayerSpec, rng: &mut R) -> Self {
        let limit = (6.0 / (spec.input_width + spec.units) as f32).sqrt();
        let uniform = Uniform::new(-limit, limit);
        Self {
            kernel: Array2::from_shape_fn((spec.input_width, spec.units), |_| uniform.sample(rng)),
            bias: Array1::zeros(spec.units),
            activation: spec.activation,
        }
    }

    fn forward(&self, input: &Array2<f32>) -> (Array2<f32>, Array2<f32>) {
        let z = input.dot(&self.kernel) + &self.bias;
        let a = match self.activation {
            Activation::Relu => z.mapv(|v| v.max(0.0)),
            Activation::Sigmoid => z.mapv(sigmoid),
        };
        (z, a)
    }
}

/// Adam moment estimates for one layer
#[derive(Debug, Clone)]
struct LayerMoments {
    m_kernel: Array2<f32>,
    v_kernel: Array2<f32>,
    m_bias: Array1<f32>,
    v_bias: Array1<f32>,
}

impl LayerMoments {
    fn zeros(layer: &DenseLayer) -> Self {
        Self {
            m_kernel: Array2::zeros(layer.kernel.raw_dim()),
            v_kernel: Array2::zeros(layer.kernel.raw_dim()),
            m_bias: Array1::zeros(layer.bias.raw_dim()),
            v_bias: Array1::zeros(layer.bias.raw_dim()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub epochs: usize,
    pub samples: usize,
    pub final_loss: f32,
    pub final_accuracy: f32,
}

#[derive(Debug, Clone)]
pub struct Network {
    tier: ModelTier,
    layers: Vec<DenseLayer>,
    moments: Vec<LayerMoments>,
    step: i32,
}

impl Network {
    /// Fresh network for a tier: Glorot-uniform kernels, zero biases
    pub fn random<R: Rng + ?Sized>(tier: ModelTier, rng: &mut R) -> Self {
        let layers: Vec<DenseLayer> = descriptor(tier)
            .layers
            .iter()
            .map(|spec| DenseLayer::glorot(spec, rng))
            .collect();
        Self::from_layers(tier, layers)
    }

    /// Rebuild a network from a flat tensor list; every shape must match the tier
    pub fn from_tensors(tier: ModelTier, tensors: Vec<ArrayD<f32>>) -> Result<Self> {
        let specs = descriptor(tier).layers;
        if tensors.len() != specs.len() * 2 {
            return Err(PersonalizationError::Model(format!(
                "Tier {} expects {} tensors, got {}",
                tier,
                specs.len() * 2,
                tensors.len()
            )));
        }

        let mut tensors = tensors.into_iter();
        let mut layers = Vec::with_capacity(specs.len());
        for spec in specs {
            let (Some(kernel), Some(bias)) = (tensors.next(), tensors.next()) else {
                break;
            };

            if kernel.shape() != [spec.input_width, spec.units].as_slice()
                || bias.shape() != [spec.units].as_slice()
            {
                return Err(PersonalizationError::Model(format!(
                    "Tier {} layer expects kernel {:?} and bias {:?}, got {:?} and {:?}",
                    tier,
                    [spec.input_width, spec.units],
                    [spec.units],
                    kernel.shape(),
                    bias.shape()
                )));
            }

            layers.push(DenseLayer {
                kernel: kernel.into_dimensionality::<Ix2>()?,
                bias: bias.into_dimensionality::<Ix1>()?,
                activation: spec.activation,
            });
        }

        Ok(Self::from_layers(tier, layers))
    }

    fn from_layers(tier: ModelTier, layers: Vec<DenseLayer>) -> Self {
        let moments = layers.iter().map(LayerMoments::zeros).collect();
        Self {
            tier,
            layers,
            moments,
            step: 0,
        }
    }

    pub fn tier(&self) -> ModelTier {
        self.tier
    }

    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    /// Flat parameter list `[kernel_0, bias_0, ...]`
    pub fn tensors(&self) -> Vec<ArrayD<f32>> {
        self.layers
            .iter()
            .flat_map(|layer| [layer.kernel.clone().into_dyn(), layer.bias.clone().into_dyn()])
            .collect()
    }

    pub fn parameter_count(&self) -> usize {
        self.layers
            .iter()
            .map(|l| l.kernel.len() + l.bias.len())
            .sum()
    }

    /// Batch inference, one probability per row
    pub fn forward(&self, input: &Array2<f32>) -> Array1<f32> {
        let mut activation = input.clone();
        for layer in &self.layers {
            activation = layer.forward(&activation).1;
        }
        activation.column(0).to_owned()
    }

    pub fn predict_one(&self, features: &FeatureVector) -> f32 {
        let input = Array2::from_shape_fn((1, FEATURE_VECTOR_SIZE), |(_, j)| features[j]);
        self.forward(&input)[0]
    }

    /// Mini-batch training; returns `None` for an empty dataset
    pub fn fit<R: Rng + ?Sized>(
        &mut self,
        x: &Array2<f32>,
        y: &Array1<f32>,
        epochs: usize,
        batch_size: usize,
        rng: &mut R,
    ) -> Result<Option<TrainingReport>> {
        let samples = x.nrows();
        if samples == 0 {
            return Ok(None);
        }
        if y.len() != samples || x.ncols() != FEATURE_VECTOR_SIZE {
            return Err(PersonalizationError::InvalidInput(format!(
                "Expected {} rows of {} features with matching labels, got {:?} and {} labels",
                samples,
                FEATURE_VECTOR_SIZE,
                x.shape(),
                y.len()
            )));
        }

        let batch_size = batch_size.max(1);
        let mut order: Vec<usize> = (0..samples).collect();
        let mut report = TrainingReport {
            epochs,
            samples,
            final_loss: 0.0,
            final_accuracy: 0.0,
        };

        for epoch in 0..epochs {
            order.shuffle(rng);
            let mut epoch_loss = 0.0;

            for chunk in order.chunks(batch_size) {
                let xb = x.select(Axis(0), chunk);
                let yb = y.select(Axis(0), chunk);
                epoch_loss += self.train_batch(&xb, &yb) * chunk.len() as f32;
            }

            let predictions = self.forward(x);
            report.final_loss = epoch_loss / samples as f32;
            report.final_accuracy = accuracy(&predictions, y);

            debug!(
                tier = %self.tier,
                epoch = epoch + 1,
                loss = report.final_loss,
                accuracy = report.final_accuracy,
                "Epoch complete"
            );
        }

        Ok(Some(report))
    }

    /// One Adam step on a batch; returns the batch's mean loss
    fn train_batch(&mut self, x: &Array2<f32>, y: &Array1<f32>) -> f32 {
        let batch = x.nrows() as f32;

        // Forward pass, keeping every layer's input and pre-activation
        let mut inputs = Vec::with_capacity(self.layers.len());
        let mut pre_activations = Vec::with_capacity(self.layers.len());
        let mut activation = x.clone();
        for layer in &self.layers {
            let (z, a) = layer.forward(&activation);
            inputs.push(activation);
            pre_activations.push(z);
            activation = a;
        }

        let predictions = activation.column(0).to_owned();
        let loss = binary_cross_entropy(&predictions, y);

        // Sigmoid + BCE gradient w.r.t. the output pre-activation
        let mut delta = (&predictions - y).insert_axis(Axis(1)) / batch;

        self.step += 1;
        for index in (0..self.layers.len()).rev() {
            let grad_kernel = inputs[index].t().dot(&delta);
            let grad_bias = delta.sum_axis(Axis(0));

            if index > 0 {
                let upstream = delta.dot(&self.layers[index].kernel.t());
                delta = match self.layers[index - 1].activation {
                    Activation::Relu => {
                        let mask = pre_activations[index - 1].mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
                        upstream * mask
                    }
                    Activation::Sigmoid => {
                        let s = pre_activations[index - 1].mapv(sigmoid);
                        upstream * &s * &s.mapv(|v| 1.0 - v)
                    }
                };
            }

            self.apply_adam(index, &grad_kernel, &grad_bias);
        }

        loss
    }

    fn apply_adam(&mut self, index: usize, grad_kernel: &Array2<f32>, grad_bias: &Array1<f32>) {
        let correction1 = 1.0 - BETA1.powi(self.step);
        let correction2 = 1.0 - BETA2.powi(self.step);
        let moments = &mut self.moments[index];
        let layer = &mut self.layers[index];

        moments.m_kernel = &moments.m_kernel * BETA1 + grad_kernel * (1.0 - BETA1);
        moments.v_kernel = &moments.v_kernel * BETA2 + &grad_kernel.mapv(|g| g * g) * (1.0 - BETA2);
        moments.m_bias = &moments.m_bias * BETA1 + grad_bias * (1.0 - BETA1);
        moments.v_bias = &moments.v_bias * BETA2 + &grad_bias.mapv(|g| g * g) * (1.0 - BETA2);

        ndarray::Zip::from(&mut layer.kernel)
            .and(&moments.m_kernel)
            .and(&moments.v_kernel)
            .for_each(|w, &m, &v| {
                *w -= LEARNING_RATE * (m / correction1) / ((v / correction2).sqrt() + ADAM_EPSILON);
            });
        ndarray::Zip::from(&mut layer.bias)
            .and(&moments.m_bias)
            .and(&moments.v_bias)
            .for_each(|b, &m, &v| {
                *b -= LEARNING_RATE * (m / correction1) / ((v / correction2).sqrt() + ADAM_EPSILON);
            });
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn binary_cross_entropy(predictions: &Array1<f32>, labels: &Array1<f32>) -> f32 {
    let n = predictions.len().max(1) as f32;
    predictions
        .iter()
        .zip(labels.iter())
        .map(|(&p, &y)| {
            let p = p.clamp(PROBABILITY_EPSILON, 1.0 - PROBABILITY_EPSILON);
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum::<f32>()
        / n
}

/// Fraction of predictions within 0.5 of their label
pub fn accuracy(predictions: &Array1<f32>, labels: &Array1<f32>) -> f32 {
    if labels.is_empty() {
        return 1.0;
    }
    let correct = predictions
        .iter()
        .zip(labels.iter())
        .filter(|(&p, &y)| (p - y).abs() < 0.5)
        .count();
    correct as f32 / labels.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_random_network_matches_descriptor() {
        for tier in ModelTier::ALL {
            let network = Network::random(tier, &mut rng());
            let desc = descriptor(tier);

            assert_eq!(network.layers().len(), desc.layers.len());
            for (layer, spec) in network.layers().iter().zip(desc.layers) {
                assert_eq!(layer.kernel.shape(), &[spec.input_width, spec.units]);
                assert!(layer.bias.iter().all(|&b| b == 0.0));
            }
        }
    }

    #[test]
    fn test_minimal_parameter_count() {
        // 5*4 + 4 + 4*1 + 1
        let network = Network::random(ModelTier::Minimal, &mut rng());
        assert_eq!(network.parameter_count(), 29);
    }

    #[test]
    fn test_tensor_roundtrip_preserves_predictions() {
        let network = Network::random(ModelTier::Normal, &mut rng());
        let rebuilt = Network::from_tensors(ModelTier::Normal, network.tensors()).unwrap();

        let features = [3.0, 1.0, 0.0, 120.0, 2.0];
        assert_eq!(network.predict_one(&features), rebuilt.predict_one(&features));
    }

    #[test]
    fn test_from_tensors_rejects_wrong_tier() {
        let light = Network::random(ModelTier::Light, &mut rng());
        let result = Network::from_tensors(ModelTier::Minimal, light.tensors());
        assert!(matches!(result, Err(PersonalizationError::Model(_))));

        // Same tensor count, wrong shapes
        let normal = Network::random(ModelTier::Normal, &mut rng());
        let mut tensors = normal.tensors();
        tensors.truncate(6);
        assert!(Network::from_tensors(ModelTier::Light, tensors).is_err());
    }

    #[test]
    fn test_predictions_are_probabilities() {
        let network = Network::random(ModelTier::Advanced, &mut rng());
        for features in [[0.0; 5], [100.0, 50.0, 10.0, 9999.0, 3.0]] {
            let p = network.predict_one(&features);
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn test_fit_learns_separable_data() {
        // Label is 1 exactly when the product was purchased (feature 2)
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..40 {
            let purchased = i % 2 == 0;
            rows.extend_from_slice(&[
                (i % 5) as f32,
                0.0,
                if purchased { 1.0 } else { 0.0 },
                1.0,
                0.0,
            ]);
            labels.push(if purchased { 1.0 } else { 0.0 });
        }
        let x = Array2::from_shape_vec((40, 5), rows).unwrap();
        let y = Array1::from(labels);

        let mut network = Network::random(ModelTier::Light, &mut rng());
        let mut first_loss = None;
        let mut report = None;
        for _ in 0..20 {
            let r = network.fit(&x, &y, 10, 8, &mut rng()).unwrap().unwrap();
            first_loss.get_or_insert(r.final_loss);
            report = Some(r);
        }

        let report = report.unwrap();
        assert!(report.final_loss < first_loss.unwrap());
        assert!(report.final_accuracy >= 0.9, "accuracy {}", report.final_accuracy);
    }

    #[test]
    fn test_fit_empty_is_noop() {
        let mut network = Network::random(ModelTier::Minimal, &mut rng());
        let before = network.tensors();

        let report = network
            .fit(&Array2::zeros((0, 5)), &Array1::zeros(0), 10, 16, &mut rng())
            .unwrap();

        assert!(report.is_none());
        assert_eq!(network.tensors(), before);
    }

    #[test]
    fn test_fit_rejects_mismatched_labels() {
        let mut network = Network::random(ModelTier::Minimal, &mut rng());
        let result = network.fit(&Array2::zeros((3, 5)), &Array1::zeros(2), 1, 16, &mut rng());
        assert!(matches!(result, Err(PersonalizationError::InvalidInput(_))));
    }

    #[test]
    fn test_accuracy() {
        let predictions = Array1::from(vec![0.9, 0.2, 0.6, 0.4]);
        let labels = Array1::from(vec![1.0, 0.0, 0.0, 1.0]);
        assert!((accuracy(&predictions, &labels) - 0.5).abs() < 1e-6);
        assert_eq!(accuracy(&Array1::zeros(0), &Array1::zeros(0)), 1.0);
    }
}
