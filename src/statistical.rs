// 📊 Statistical Classifier - TF-IDF centroids + cosine similarity
// Lightweight rebuild-on-demand model: one sparse centroid per category,
// built from a bounded snapshot of labeled transactions and cached with TTL

use crate::models::Transaction;
use crate::store::Store;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

// ============================================================================
// TOKENIZER
// ============================================================================

/// Lowercase word tokens of length > 1. Punctuation and digits-only noise
/// like card suffixes still tokenize (e.g. "4521"), which is fine: they
/// rarely repeat across a category and earn near-zero idf weight.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() > 1)
        .map(|token| token.to_string())
        .collect()
}

fn term_frequencies(text: &str) -> HashMap<String, f64> {
    let mut tf: HashMap<String, f64> = HashMap::new();
    for token in tokenize(text) {
        *tf.entry(token).or_insert(0.0) += 1.0;
    }
    tf
}

// ============================================================================
// CENTROID MODEL
// ============================================================================

/// Aggregated TF-IDF vector for one category.
#[derive(Debug, Clone)]
pub struct Centroid {
    pub category_id: String,
    pub weights: HashMap<String, f64>,
    pub norm: f64,
}

/// Per-category centroids built from a labeled-transaction snapshot.
#[derive(Debug, Clone, Default)]
pub struct CentroidModel {
    /// Sorted by category id so equal-score ties always resolve to the
    /// lowest id, independent of map iteration order
    centroids: Vec<Centroid>,
}

impl CentroidModel {
    /// Build centroids: tf accumulated per category over
    /// merchant + " " + description, idf(term) = ln(1 + N / df(term))
    /// where df counts categories containing the term and N is the number
    /// of categories with any data.
    pub fn build(transactions: &[Transaction]) -> Self {
        let mut tf_by_category: HashMap<String, HashMap<String, f64>> = HashMap::new();

        for tx in transactions {
            let Some(category_id) = &tx.category_id else {
                continue;
            };
            let text = format!("{} {}", tx.merchant, tx.description);
            let tf = tf_by_category.entry(category_id.clone()).or_default();
            for token in tokenize(&text) {
                *tf.entry(token).or_insert(0.0) += 1.0;
            }
        }

        let n = tf_by_category.len() as f64;
        let mut df: HashMap<&str, f64> = HashMap::new();
        for tf in tf_by_category.values() {
            for term in tf.keys() {
                *df.entry(term.as_str()).or_insert(0.0) += 1.0;
            }
        }
        let idf: HashMap<String, f64> = df
            .into_iter()
            .map(|(term, count)| (term.to_string(), (1.0 + n / count).ln()))
            .collect();

        let mut centroids: Vec<Centroid> = tf_by_category
            .into_iter()
            .map(|(category_id, tf)| {
                let weights: HashMap<String, f64> = tf
                    .into_iter()
                    .map(|(term, count)| {
                        let weight = count * idf.get(&term).copied().unwrap_or(0.0);
                        (term, weight)
                    })
                    .collect();
                let norm = l2_norm(weights.values().copied());
                Centroid {
                    category_id,
                    weights,
                    norm,
                }
            })
            .collect();
        centroids.sort_by(|a, b| a.category_id.cmp(&b.category_id));

        CentroidModel { centroids }
    }

    /// Best cosine match for the given text: (category_id, raw score).
    /// Strictly-greater comparison keeps the lowest category id on ties.
    pub fn best_match(&self, text: &str) -> Option<(String, f64)> {
        let query = term_frequencies(text);
        if query.is_empty() {
            return None;
        }
        let query_norm = l2_norm(query.values().copied());

        let mut best: Option<(&str, f64)> = None;
        for centroid in &self.centroids {
            // Dot product restricted to intersecting terms
            let dot: f64 = query
                .iter()
                .filter_map(|(term, tf)| centroid.weights.get(term).map(|w| tf * w))
                .sum();
            let score = dot / (query_norm * centroid.norm);

            if best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((&centroid.category_id, score));
            }
        }

        best.map(|(id, score)| (id.to_string(), score))
    }

    pub fn category_count(&self) -> usize {
        self.centroids.len()
    }
}

fn l2_norm(values: impl Iterator<Item = f64>) -> f64 {
    let norm = values.map(|v| v * v).sum::<f64>().sqrt();
    // Guard against division by zero for all-zero vectors
    if norm == 0.0 {
        1.0
    } else {
        norm
    }
}

// ============================================================================
// CLASSIFIER + TTL CACHE
// ============================================================================

struct CachedModel {
    built_at: DateTime<Utc>,
    model: Arc<CentroidModel>,
}

/// Statistical classifier with a TTL-cached centroid model.
///
/// The clock is passed in by the caller so expiry is testable without real
/// delays. The cache deliberately carries no rebuild mutex: two callers
/// racing past an expired timestamp both rebuild from (approximately) the
/// same snapshot and last-write-wins is an acceptable outcome.
pub struct StatisticalClassifier {
    /// Minimum cosine score to accept a suggestion (default: 0.35)
    pub acceptance_threshold: f64,

    /// Maximum labeled transactions fetched per rebuild (default: 10,000)
    pub snapshot_cap: usize,

    /// Cache lifetime (default: 5 minutes)
    pub ttl: Duration,

    cache: RwLock<Option<CachedModel>>,
}

impl StatisticalClassifier {
    pub fn new() -> Self {
        StatisticalClassifier {
            acceptance_threshold: 0.35,
            snapshot_cap: 10_000,
            ttl: Duration::minutes(5),
            cache: RwLock::new(None),
        }
    }

    /// Get the cached model, rebuilding it if older than the TTL.
    pub fn model(&self, store: &dyn Store, now: DateTime<Utc>) -> Result<Arc<CentroidModel>> {
        if let Some(cached) = self.cache.read().unwrap().as_ref() {
            if now - cached.built_at < self.ttl {
                return Ok(cached.model.clone());
            }
        }

        // Rebuild outside the lock; concurrent rebuilds are tolerated
        let snapshot = store.labeled_transactions(self.snapshot_cap)?;
        let model = Arc::new(CentroidModel::build(&snapshot));
        *self.cache.write().unwrap() = Some(CachedModel {
            built_at: now,
            model: model.clone(),
        });
        Ok(model)
    }

    /// Classify text against the cached centroids.
    ///
    /// Returns (category_id, confidence) with confidence clamped to [0, 1],
    /// or None for empty input or a best score below the threshold.
    pub fn classify(
        &self,
        store: &dyn Store,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<(String, f64)>> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        let model = self.model(store, now)?;
        let result = model
            .best_match(text)
            .map(|(category_id, score)| (category_id, score.clamp(0.0, 1.0)))
            .filter(|(_, confidence)| *confidence >= self.acceptance_threshold);
        Ok(result)
    }

    /// Drop the cached model so the next read rebuilds.
    pub fn invalidate(&self) {
        *self.cache.write().unwrap() = None;
    }
}

impl Default for StatisticalClassifier {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, CategorySource, CategoryType};
    use crate::store::MemoryStore;

    fn labeled(merchant: &str, description: &str, category_id: &str) -> Transaction {
        Transaction::new(merchant, description, -10.0)
            .with_category(category_id, CategorySource::User)
    }

    fn grocery_vs_transport_store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .insert_category(&Category {
                id: "cat-a-groceries".to_string(),
                name: "Groceries".to_string(),
                category_type: CategoryType::Expense,
            })
            .unwrap();
        store
            .insert_category(&Category {
                id: "cat-b-transport".to_string(),
                name: "Transportation".to_string(),
                category_type: CategoryType::Expense,
            })
            .unwrap();

        for _ in 0..4 {
            store
                .insert_transaction(&labeled("MIGROS MARKET", "grocery shopping", "cat-a-groceries"))
                .unwrap();
            store
                .insert_transaction(&labeled("UBER TRIP", "ride downtown", "cat-b-transport"))
                .unwrap();
        }
        store
    }

    #[test]
    fn test_tokenize_drops_single_chars_and_lowercases() {
        let tokens = tokenize("MIGROS-Market, 5 a TL");
        assert_eq!(tokens, vec!["migros", "market", "tl"]);
    }

    #[test]
    fn test_model_build_and_match() {
        let store = grocery_vs_transport_store();
        let snapshot = store.labeled_transactions(10_000).unwrap();
        let model = CentroidModel::build(&snapshot);

        assert_eq!(model.category_count(), 2);

        let (category, score) = model.best_match("migros grocery").unwrap();
        assert_eq!(category, "cat-a-groceries");
        assert!(score > 0.5);

        let (category, _) = model.best_match("uber ride").unwrap();
        assert_eq!(category, "cat-b-transport");
    }

    #[test]
    fn test_classify_confidence_bounds_and_threshold() {
        let store = grocery_vs_transport_store();
        let classifier = StatisticalClassifier::new();
        let now = Utc::now();

        let (_, confidence) = classifier
            .classify(&store, "migros market grocery", now)
            .unwrap()
            .unwrap();
        assert!((0.0..=1.0).contains(&confidence));
        assert!(confidence >= classifier.acceptance_threshold);

        // Vocabulary with no overlap scores 0, below any sane threshold
        let result = classifier
            .classify(&store, "zzqx unrelated noise", now)
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_classify_empty_input_short_circuits() {
        let store = grocery_vs_transport_store();
        let classifier = StatisticalClassifier::new();

        assert!(classifier.classify(&store, "", Utc::now()).unwrap().is_none());
        assert!(classifier.classify(&store, "   ", Utc::now()).unwrap().is_none());
    }

    #[test]
    fn test_cache_honors_ttl_with_injected_clock() {
        let store = grocery_vs_transport_store();
        let classifier = StatisticalClassifier::new();
        let t0 = Utc::now();

        let first = classifier.model(&store, t0).unwrap();
        assert_eq!(first.category_count(), 2);

        // New category appears after the model was cached
        store
            .insert_category(&Category {
                id: "cat-c-coffee".to_string(),
                name: "Café".to_string(),
                category_type: CategoryType::Expense,
            })
            .unwrap();
        for _ in 0..3 {
            store
                .insert_transaction(&labeled("STARBUCKS", "latte", "cat-c-coffee"))
                .unwrap();
        }

        // Within the TTL: still the stale 2-category model
        let within = classifier.model(&store, t0 + Duration::minutes(4)).unwrap();
        assert_eq!(within.category_count(), 2);

        // Past the TTL: lazily rebuilt with the new category
        let after = classifier.model(&store, t0 + Duration::minutes(6)).unwrap();
        assert_eq!(after.category_count(), 3);
    }

    #[test]
    fn test_invalidate_forces_rebuild() {
        let store = grocery_vs_transport_store();
        let classifier = StatisticalClassifier::new();
        let now = Utc::now();

        classifier.model(&store, now).unwrap();
        store
            .insert_category(&Category {
                id: "cat-c-coffee".to_string(),
                name: "Café".to_string(),
                category_type: CategoryType::Expense,
            })
            .unwrap();
        store
            .insert_transaction(&labeled("STARBUCKS", "latte", "cat-c-coffee"))
            .unwrap();

        classifier.invalidate();
        let model = classifier.model(&store, now).unwrap();
        assert_eq!(model.category_count(), 3);
    }

    #[test]
    fn test_equal_score_tie_breaks_to_lowest_category_id() {
        // Two categories with identical vocabulary produce identical scores
        let transactions = vec![
            labeled("ACME", "widgets", "cat-b"),
            labeled("ACME", "widgets", "cat-a"),
        ];
        let model = CentroidModel::build(&transactions);

        let (category, _) = model.best_match("acme widgets").unwrap();
        assert_eq!(category, "cat-a");
    }

    #[test]
    fn test_empty_snapshot_yields_no_match() {
        let model = CentroidModel::build(&[]);
        assert_eq!(model.category_count(), 0);
        assert!(model.best_match("anything").is_none());
    }
}
