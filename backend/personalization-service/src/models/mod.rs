use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Schema version written into every persisted blob.
pub const SCHEMA_VERSION: u32 = 1;

fn schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Catalog ids arrive as strings or numbers depending on the backend table.
fn id_from_any<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

fn default_quantity() -> u32 {
    1
}

// ============================================
// Catalog
// ============================================

/// Catalog product, owned by the Backend Data Service (read-only here)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(deserialize_with = "id_from_any")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: f64,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl Product {
    pub fn new(id: impl Into<String>, name: impl Into<String>, price: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            price,
            image_url: None,
            category: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

// ============================================
// Behavior record
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseItem {
    #[serde(deserialize_with = "id_from_any")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

impl PurchaseItem {
    pub fn new(id: impl Into<String>, name: impl Into<String>, price: f64, quantity: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchEntry {
    pub term: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseEntry {
    pub items: Vec<PurchaseItem>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl PurchaseEntry {
    /// Whether this purchase contains the product with the given id
    pub fn contains_product(&self, product_id: &str) -> bool {
        self.items.iter().any(|item| item.id == product_id)
    }
}

/// Per-user interaction history, persisted under the `behavior` key.
///
/// Events are appended in arrival order; timestamps are not required to be
/// monotonic, so retention is decided per entry by age.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorRecord {
    #[serde(default = "schema_version")]
    pub version: u32,
    #[serde(default)]
    pub product_views: BTreeMap<String, u64>,
    #[serde(default)]
    pub searches: Vec<SearchEntry>,
    #[serde(default)]
    pub purchases: Vec<PurchaseEntry>,
}

impl BehaviorRecord {
    pub fn new() -> Self {
        Self {
            version: SCHEMA_VERSION,
            ..Default::default()
        }
    }

    pub fn view_count(&self, product_id: &str) -> u64 {
        self.product_views.get(product_id).copied().unwrap_or(0)
    }

    /// Number of purchases containing the product (matched by id)
    pub fn purchase_count(&self, product_id: &str) -> usize {
        self.purchases
            .iter()
            .filter(|p| p.contains_product(product_id))
            .count()
    }

    pub fn has_purchased(&self, product_id: &str) -> bool {
        self.purchases.iter().any(|p| p.contains_product(product_id))
    }

    pub fn is_empty(&self) -> bool {
        self.product_views.is_empty() && self.searches.is_empty() && self.purchases.is_empty()
    }
}

// ============================================
// Resources & tiers
// ============================================

/// Normalized device utilization, each field in 0..=100
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub cpu: f32,
    pub memory: f32,
    pub storage: f32,
}

impl ResourceSnapshot {
    pub fn new(cpu: f32, memory: f32, storage: f32) -> Self {
        Self {
            cpu,
            memory,
            storage,
        }
    }

    /// Weighted load score: memory and CPU dominate, storage counts half as much
    pub fn load_score(&self) -> f32 {
        self.memory * 0.4 + self.cpu * 0.4 + self.storage * 0.2
    }
}

/// Capacity tier of the on-device classifier, ordered by capacity
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    #[default]
    Minimal,
    Light,
    Normal,
    Advanced,
}

impl ModelTier {
    pub const ALL: [ModelTier; 4] = [
        ModelTier::Minimal,
        ModelTier::Light,
        ModelTier::Normal,
        ModelTier::Advanced,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Minimal => "minimal",
            ModelTier::Light => "light",
            ModelTier::Normal => "normal",
            ModelTier::Advanced => "advanced",
        }
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit entry for a committed tier transition (in memory only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionRecord {
    pub timestamp: DateTime<Utc>,
    pub from_tier: ModelTier,
    pub to_tier: ModelTier,
    pub resources: ResourceSnapshot,
    pub resulting_accuracy: f32,
}

/// Controller state persisted under `system-state`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemState {
    #[serde(default = "schema_version")]
    pub version: u32,
    pub tier: ModelTier,
    pub last_update: DateTime<Utc>,
    pub performance_score: f32,
}

impl SystemState {
    pub fn new(tier: ModelTier, last_update: DateTime<Utc>, performance_score: f32) -> Self {
        Self {
            version: SCHEMA_VERSION,
            tier,
            last_update,
            performance_score,
        }
    }
}

// ============================================
// Recommendations
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredProduct {
    pub product: Product,
    pub score: f32,
}

/// Ranked slate persisted under `recommendations` and published to the render layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSlate {
    #[serde(default = "schema_version")]
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    pub items: Vec<ScoredProduct>,
}

impl RecommendationSlate {
    pub fn new(generated_at: DateTime<Utc>, items: Vec<ScoredProduct>) -> Self {
        Self {
            version: SCHEMA_VERSION,
            generated_at,
            items,
        }
    }

    pub fn products(&self) -> Vec<Product> {
        self.items.iter().map(|i| i.product.clone()).collect()
    }

    pub fn product_ids(&self) -> Vec<&str> {
        self.items.iter().map(|i| i.product.id.as_str()).collect()
    }
}

// ============================================
// Backend rows
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    View,
    Search,
    Purchase,
}

/// Row appended to the backend `user_behavior` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorRow {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    pub action_type: ActionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_term: Option<String>,
    /// JSON-encoded purchased items
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchases: Option<String>,
    pub created_at: DateTime<Utc>,
}
