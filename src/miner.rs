// ⛏️ Rule-Suggestion Miner - Offline discovery of candidate rules
// Analyzes historical merchant → category consistency; read-only. Turning a
// candidate into a real Rule is a separate explicit action.

use crate::models::RuleCandidate;
use crate::store::Store;
use anyhow::Result;
use std::collections::HashMap;

// ============================================================================
// RULE MINER
// ============================================================================

/// Batch job proposing literal merchant rules from consistent history.
///
/// Noisy, ambiguous merchants are filtered out: a candidate needs at least
/// `min_count` labeled transactions and a dominant-category share of at
/// least `min_share`.
pub struct RuleMiner {
    /// Minimum labeled transactions per merchant (default: 3)
    pub min_count: usize,

    /// Minimum dominant-category share (default: 0.7)
    pub min_share: f64,

    /// Recent-history window (default: 500)
    pub window: usize,

    /// Hard ceiling on the window (default: 2000)
    pub max_window: usize,
}

impl RuleMiner {
    pub fn new() -> Self {
        RuleMiner {
            min_count: 3,
            min_share: 0.7,
            window: 500,
            max_window: 2000,
        }
    }

    /// Mine candidates from the most recent expense transactions.
    ///
    /// Candidates covered by an existing literal rule for the same
    /// (merchant, category) pair are dropped. Output is sorted by share
    /// descending, then count descending.
    pub fn mine(&self, store: &dyn Store) -> Result<Vec<RuleCandidate>> {
        let window = self.window.min(self.max_window);
        let transactions = store.recent_expense_transactions(window)?;
        let rules = store.rules()?;

        // Existing literal rules, keyed the same way candidates are
        let covered: Vec<(String, String)> = rules
            .iter()
            .filter(|rule| !rule.is_regex)
            .map(|rule| (rule.pattern.trim().to_lowercase(), rule.category_id.clone()))
            .collect();

        // Group by normalized merchant, count per category
        let mut groups: HashMap<String, HashMap<String, usize>> = HashMap::new();
        for tx in &transactions {
            let merchant = tx.merchant.trim().to_lowercase();
            if merchant.is_empty() {
                continue;
            }
            let Some(category_id) = &tx.category_id else {
                continue;
            };
            *groups
                .entry(merchant)
                .or_default()
                .entry(category_id.clone())
                .or_insert(0) += 1;
        }

        let mut candidates = Vec::new();
        for (merchant, by_category) in groups {
            let total: usize = by_category.values().sum();
            if total < self.min_count {
                continue;
            }

            // Dominant category; equal counts resolve to the lowest id
            let (dominant_id, dominant_count) = by_category
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                .map(|(id, count)| (id.clone(), *count))
                .expect("group is non-empty");

            let share = dominant_count as f64 / total as f64;
            if share < self.min_share {
                continue;
            }

            if covered.contains(&(merchant.clone(), dominant_id.clone())) {
                continue;
            }

            candidates.push(RuleCandidate {
                merchant_pattern: merchant,
                suggested_category_id: dominant_id,
                share,
                count: dominant_count,
                total,
            });
        }

        candidates.sort_by(|a, b| {
            b.share
                .partial_cmp(&a.share)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.count.cmp(&a.count))
                .then_with(|| a.merchant_pattern.cmp(&b.merchant_pattern))
        });
        Ok(candidates)
    }
}

impl Default for RuleMiner {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
