// ============================================
// Behavior Store
// ============================================
//
// Durable per-user interaction history (views, searches, purchases).
//
// Every mutation is a full read-modify-write of the `behavior` blob. The
// whole sequence runs under one async mutex, so two interleaved writers can
// never lose each other's update.

use crate::error::Result;
use crate::jobs::Clock;
use crate::models::{
    ActionType, BehaviorRecord, BehaviorRow, PurchaseEntry, PurchaseItem, SearchEntry,
};
use crate::storage::{keys, load_versioned, save_json, LocalStore};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Default retention for searches and purchases
pub const DEFAULT_MAX_AGE_DAYS: i64 = 30;

/// Default cap on remembered searches
pub const DEFAULT_MAX_SEARCHES: usize = 100;

/// The interaction appended by a mutation, used for delta sync
#[derive(Debug, Clone, PartialEq)]
pub enum BehaviorEvent {
    View {
        product_id: String,
        at: DateTime<Utc>,
    },
    Search {
        term: String,
        at: DateTime<Utc>,
    },
    Purchase {
        items: Vec<PurchaseItem>,
        at: DateTime<Utc>,
    },
}

impl BehaviorEvent {
    pub fn action_type(&self) -> ActionType {
        match self {
            BehaviorEvent::View { .. } => ActionType::View,
            BehaviorEvent::Search { .. } => ActionType::Search,
            BehaviorEvent::Purchase { .. } => ActionType::Purchase,
        }
    }

    /// Backend row for this event
    pub fn to_row(&self, user_id: &str) -> Result<BehaviorRow> {
        let mut row = BehaviorRow {
            user_id: user_id.to_string(),
            product_id: None,
            action_type: self.action_type(),
            search_term: None,
            purchases: None,
            created_at: Utc::now(),
        };

        match self {
            BehaviorEvent::View { product_id, at } => {
                row.product_id = Some(product_id.clone());
                row.created_at = *at;
            }
            BehaviorEvent::Search { term, at } => {
                row.search_term = Some(term.clone());
                row.created_at = *at;
            }
            BehaviorEvent::Purchase { items, at } => {
                row.purchases = Some(serde_json::to_string(items)?);
                row.created_at = *at;
            }
        }

        Ok(row)
    }
}

/// Result of a successful mutation
#[derive(Debug, Clone)]
pub struct BehaviorUpdate {
    pub record: BehaviorRecord,
    pub event: BehaviorEvent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub searches_removed: usize,
    pub purchases_removed: usize,
}

impl PruneReport {
    pub fn is_empty(&self) -> bool {
        self.searches_removed == 0 && self.purchases_removed == 0
    }
}

pub struct BehaviorStore {
    store: Arc<dyn LocalStore>,
    clock: Arc<dyn Clock>,
    max_searches: usize,
    write_lock: Mutex<()>,
}

impl BehaviorStore {
    pub fn new(store: Arc<dyn LocalStore>, clock: Arc<dyn Clock>, max_searches: usize) -> Self {
        Self {
            store,
            clock,
            max_searches,
            write_lock: Mutex::new(()),
        }
    }

    /// Current record; missing or malformed state yields an empty record
    pub async fn load(&self) -> BehaviorRecord {
        load_versioned(self.store.as_ref(), keys::BEHAVIOR)
            .await
            .unwrap_or_else(BehaviorRecord::new)
    }

    pub async fn record_view(&self, product_id: &str) -> Result<Option<BehaviorUpdate>> {
        let product_id = product_id.trim();
        if product_id.is_empty() {
            return Ok(None);
        }

        let at = self.clock.now();
        let record = self
            .mutate(|record| {
                *record
                    .product_views
                    .entry(product_id.to_string())
                    .or_insert(0) += 1;
            })
            .await?;

        debug!(product_id = product_id, views = record.view_count(product_id), "Recorded product view");
        Ok(Some(BehaviorUpdate {
            record,
            event: BehaviorEvent::View {
                product_id: product_id.to_string(),
                at,
            },
        }))
    }

    /// Record a search; the term is trimmed and lower-cased, blank input is ignored
    pub async fn record_search(&self, term: &str) -> Result<Option<BehaviorUpdate>> {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return Ok(None);
        }

        let at = self.clock.now();
        let max_searches = self.max_searches;
        let record = self
            .mutate(|record| {
                record.searches.push(SearchEntry {
                    term: term.clone(),
                    timestamp: at,
                });
                truncate_searches(record, max_searches);
            })
            .await?;

        debug!(term = %term, total = record.searches.len(), "Recorded search");
        Ok(Some(BehaviorUpdate {
            record,
            event: BehaviorEvent::Search { term, at },
        }))
    }

    /// Record a completed purchase; an empty cart is ignored
    pub async fn record_purchase(&self, items: Vec<PurchaseItem>) -> Result<Option<BehaviorUpdate>> {
        if items.is_empty() {
            return Ok(None);
        }

        let at = self.clock.now();
        let record = self
            .mutate(|record| {
                record.purchases.push(PurchaseEntry {
                    items: items.clone(),
                    timestamp: at,
                });
            })
            .await?;

        info!(items = items.len(), "Recorded purchase");
        Ok(Some(BehaviorUpdate {
            record,
            event: BehaviorEvent::Purchase { items, at },
        }))
    }

    /// Drop entries older than `max_age_days` and keep the newest `max_searches` searches
    pub async fn prune(&self, max_age_days: i64, max_searches: usize) -> Result<PruneReport> {
        let now = self.clock.now();
        let mut report = PruneReport::default();

        self.mutate(|record| {
            report = prune_record(record, now, Duration::days(max_age_days), max_searches);
        })
        .await?;

        if !report.is_empty() {
            info!(
                searches_removed = report.searches_removed,
                purchases_removed = report.purchases_removed,
                "Pruned behavior history"
            );
        }
        Ok(report)
    }

    async fn mutate<F>(&self, f: F) -> Result<BehaviorRecord>
    where
        F: FnOnce(&mut BehaviorRecord),
    {
        let _guard = self.write_lock.lock().await;

        let mut record = self.load().await;
        f(&mut record);
        save_json(self.store.as_ref(), keys::BEHAVIOR, &record).await?;

        Ok(record)
    }
}

/// Age and count based retention.
///
/// An entry exactly `max_age` old is kept; only strictly older entries go.
pub fn prune_record(
    record: &mut BehaviorRecord,
    now: DateTime<Utc>,
    max_age: Duration,
    max_searches: usize,
) -> PruneReport {
    let cutoff = now - max_age;
    let searches_before = record.searches.len();
    let purchases_before = record.purchases.len();

    record.searches.retain(|s| s.timestamp >= cutoff);
    record.purchases.retain(|p| p.timestamp >= cutoff);
    truncate_searches(record, max_searches);

    PruneReport {
        searches_removed: searches_before - record.searches.len(),
        purchases_removed: purchases_before - record.purchases.len(),
    }
}

/// Keep only the most recently appended `max` searches
fn truncate_searches(record: &mut BehaviorRecord, max: usize) {
    if record.searches.len() > max {
        let excess = record.searches.len() - max;
        record.searches.drain(..excess);
    }
}
