// ============================================
// Feature Extraction
// ============================================
//
// Fixed 5-wide feature vector shared by training, evaluation and inference:
//   [view_count, related_search_count, purchase_count, price, category_index]

use super::heuristic::related_search_count;
use crate::models::{BehaviorRecord, Product, PurchaseItem};
use ndarray::{Array1, Array2};

pub const FEATURE_VECTOR_SIZE: usize = 5;

pub type FeatureVector = [f32; FEATURE_VECTOR_SIZE];

/// Category vocabulary with a catch-all bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Brakes,
    AirFilter,
    EngineOil,
    Other,
}

impl Category {
    const VOCABULARY: [(Category, &'static [&'static str]); 3] = [
        (Category::Brakes, &["เบรก", "brake"]),
        (Category::AirFilter, &["กรองอากาศ", "air filter"]),
        (Category::EngineOil, &["น้ำมันเครื่อง", "engine oil"]),
    ];

    pub fn index(&self) -> usize {
        match self {
            Category::Brakes => 0,
            Category::AirFilter => 1,
            Category::EngineOil => 2,
            Category::Other => 3,
        }
    }

    /// Match aliases against the explicit category first, then the name
    pub fn classify(category: Option<&str>, name: &str) -> Category {
        let lookup = |text: &str| {
            let text = text.to_lowercase();
            Self::VOCABULARY
                .iter()
                .find(|(_, aliases)| aliases.iter().any(|alias| text.contains(alias)))
                .map(|(category, _)| *category)
        };

        category
            .and_then(lookup)
            .or_else(|| lookup(name))
            .unwrap_or(Category::Other)
    }
}

pub fn product_features(product: &Product, behavior: &BehaviorRecord) -> FeatureVector {
    [
        behavior.view_count(&product.id) as f32,
        related_search_count(product, behavior) as f32,
        behavior.purchase_count(&product.id) as f32,
        product.price as f32,
        Category::classify(product.category.as_deref(), &product.name).index() as f32,
    ]
}

fn purchased_item_features(item: &PurchaseItem, behavior: &BehaviorRecord) -> FeatureVector {
    let as_product = Product::new(item.id.clone(), item.name.clone(), item.price);
    [
        behavior.view_count(&item.id) as f32,
        related_search_count(&as_product, behavior) as f32,
        1.0,
        item.price as f32,
        Category::classify(None, &item.name).index() as f32,
    ]
}

/// Feature rows with binary labels
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabeledDataset {
    pub features: Vec<FeatureVector>,
    pub labels: Vec<f32>,
}

impl LabeledDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, features: FeatureVector, label: f32) {
        self.features.push(features);
        self.labels.push(label);
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn feature_matrix(&self) -> Array2<f32> {
        Array2::from_shape_fn((self.len(), FEATURE_VECTOR_SIZE), |(i, j)| {
            self.features[i][j]
        })
    }

    pub fn label_vector(&self) -> Array1<f32> {
        Array1::from(self.labels.clone())
    }

    /// Training examples: every purchased item is a positive, every catalog
    /// product never purchased is a negative
    pub fn training_set(behavior: &BehaviorRecord, catalog: &[Product]) -> Self {
        let mut dataset = Self::new();

        for purchase in &behavior.purchases {
            for item in &purchase.items {
                dataset.push(purchased_item_features(item, behavior), 1.0);
            }
        }

        for product in catalog {
            if !behavior.has_purchased(&product.id) {
                dataset.push(product_features(product, behavior), 0.0);
            }
        }

        dataset
    }

    /// Held-out sample: each catalog product labelled by whether it was ever
    /// purchased. Empty until there is at least one purchase.
    pub fn holdout_set(behavior: &BehaviorRecord, catalog: &[Product]) -> Self {
        let mut dataset = Self::new();
        if behavior.purchases.is_empty() || catalog.is_empty() {
            return dataset;
        }

        for product in catalog {
            let mut features = product_features(product, behavior);
            // Search relevance and category are left neutral for evaluation
            features[1] = 0.0;
            features[4] = 0.0;
            let label = if behavior.has_purchased(&product.id) {
                1.0
            } else {
                0.0
            };
            dataset.push(features, label);
        }

        dataset
    }
}
