use crate::models::{BehaviorRecord, Product};
use crate::utils::contains_ignore_case;

/// Purchase intent > search intent > view intent
pub const VIEW_WEIGHT: f32 = 0.3;
pub const SEARCH_WEIGHT: f32 = 0.2;
pub const PURCHASE_WEIGHT: f32 = 0.5;

/// Heuristic relevance from weighted interaction counts.
///
/// Formula: `score = views * 0.3 + related_searches * 0.2 + related_purchases * 0.5`
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicScorer;

impl HeuristicScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, product: &Product, behavior: &BehaviorRecord) -> f32 {
        let views = behavior.view_count(&product.id) as f32;
        let searches = related_search_count(product, behavior) as f32;
        let purchases = related_purchase_count(product, behavior) as f32;

        views * VIEW_WEIGHT + searches * SEARCH_WEIGHT + purchases * PURCHASE_WEIGHT
    }
}

/// Searches whose (lower-cased) term occurs in the product name or description
pub fn related_search_count(product: &Product, behavior: &BehaviorRecord) -> usize {
    if behavior.searches.is_empty() {
        return 0;
    }

    let name = product.name.to_lowercase();
    let description = product.description.as_deref().map(str::to_lowercase);

    behavior
        .searches
        .iter()
        .filter(|search| {
            name.contains(&search.term)
                || description
                    .as_deref()
                    .is_some_and(|d| d.contains(&search.term))
        })
        .count()
}

/// Purchases containing an item whose name matches the product name in either direction
pub fn related_purchase_count(product: &Product, behavior: &BehaviorRecord) -> usize {
    if product.name.is_empty() {
        return 0;
    }

    behavior
        .purchases
        .iter()
        .filter(|purchase| {
            purchase.items.iter().any(|item| {
                !item.name.is_empty()
                    && (contains_ignore_case(&item.name, &product.name)
                        || contains_ignore_case(&product.name, &item.name))
            })
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PurchaseEntry, PurchaseItem, SearchEntry};
    use chrono::Utc;

    fn brake_pad() -> Product {
        Product::new("P1", "Brake Pad Front", 450.0).with_description("Ceramic pads for sedans")
    }

    fn search(term: &str) -> SearchEntry {
        SearchEntry {
            term: term.to_string(),
            timestamp: Utc::now(),
        }
    }

    fn purchase(name: &str) -> PurchaseEntry {
        PurchaseEntry {
            items: vec![PurchaseItem::new("X", name, 100.0, 1)],
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_empty_behavior_scores_zero() {
        let scorer = HeuristicScorer::new();
        assert_eq!(scorer.score(&brake_pad(), &BehaviorRecord::new()), 0.0);
    }

    #[test]
    fn test_view_weight() {
        let mut behavior = BehaviorRecord::new();
        behavior.product_views.insert("P1".to_string(), 3);

        let score = HeuristicScorer::new().score(&brake_pad(), &behavior);
        assert!((score - 0.9).abs() < 1e-5);
    }

    #[test]
    fn test_monotonic_in_views() {
        let scorer = HeuristicScorer::new();
        let mut behavior = BehaviorRecord::new();
        behavior.searches.push(search("brake"));

        let mut previous = scorer.score(&brake_pad(), &behavior);
        for views in 1..20 {
            behavior.product_views.insert("P1".to_string(), views);
            let score = scorer.score(&brake_pad(), &behavior);
            assert!(score >= previous);
            previous = score;
        }
    }

    #[test]
    fn test_search_matches_name_or_description() {
        let mut behavior = BehaviorRecord::new();
        behavior.searches.push(search("brake")); // name
        behavior.searches.push(search("ceramic")); // description
        behavior.searches.push(search("oil")); // neither

        assert_eq!(related_search_count(&brake_pad(), &behavior), 2);
        let score = HeuristicScorer::new().score(&brake_pad(), &behavior);
        assert!((score - 0.4).abs() < 1e-5);
    }

    #[test]
    fn test_purchase_matches_either_direction() {
        let mut behavior = BehaviorRecord::new();
        behavior.purchases.push(purchase("brake pad")); // item name inside product name
        behavior.purchases.push(purchase("Brake Pad Front Premium Kit")); // product name inside item
        behavior.purchases.push(purchase("Engine oil"));
        behavior.purchases.push(purchase("")); // empty names never match

        assert_eq!(related_purchase_count(&brake_pad(), &behavior), 2);
        let score = HeuristicScorer::new().score(&brake_pad(), &behavior);
        assert!((score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_purchase_counted_once_per_order() {
        let mut behavior = BehaviorRecord::new();
        behavior.purchases.push(PurchaseEntry {
            items: vec![
                PurchaseItem::new("A", "Brake pad", 1.0, 1),
                PurchaseItem::new("B", "brake pad", 1.0, 1),
            ],
            timestamp: Utc::now(),
        });

        assert_eq!(related_purchase_count(&brake_pad(), &behavior), 1);
    }
}
