// 🔤 Heuristic Fallback - Static keyword → category dictionary
// Classifier of last resort: fixed confidences, always terminates

use crate::models::Category;

// ============================================================================
// KEYWORD TABLE
// ============================================================================

/// One dictionary entry: any keyword hit maps to the named category at a
/// fixed confidence. Entries are ordered; the first hit wins.
pub struct HeuristicEntry {
    pub keywords: &'static [&'static str],
    pub category_name: &'static str,
    pub confidence: f64,
}

/// Built-in keyword table for common merchant vocabulary.
pub const DEFAULT_ENTRIES: &[HeuristicEntry] = &[
    HeuristicEntry {
        keywords: &["migros", "a101", "bim", "carrefour", "walmart", "grocery", "market"],
        category_name: "Market",
        confidence: 0.65,
    },
    HeuristicEntry {
        keywords: &["starbucks", "kahve", "coffee", "cafe", "café"],
        category_name: "Café",
        confidence: 0.60,
    },
    HeuristicEntry {
        keywords: &["mcdonald", "burger", "kfc", "restaurant", "restoran", "pizza"],
        category_name: "Restaurants",
        confidence: 0.60,
    },
    HeuristicEntry {
        keywords: &["uber", "lyft", "taxi", "taksi", "metro", "shell", "opet", "petrol"],
        category_name: "Transportation",
        confidence: 0.60,
    },
    HeuristicEntry {
        keywords: &["amazon", "trendyol", "hepsiburada", "ebay", "aliexpress"],
        category_name: "Online Shopping",
        confidence: 0.60,
    },
    HeuristicEntry {
        keywords: &["netflix", "spotify", "youtube", "disney", "hbo"],
        category_name: "Subscriptions",
        confidence: 0.60,
    },
    HeuristicEntry {
        keywords: &["eczane", "pharmacy", "hospital", "hastane", "clinic"],
        category_name: "Health",
        confidence: 0.60,
    },
];

// ============================================================================
// HEURISTIC CLASSIFIER
// ============================================================================

/// Keyword-dictionary classifier. Total: every call returns, possibly with
/// no suggestion. The winning entry's category name is resolved against the
/// live category list; an unresolved name yields no suggestion rather than
/// falling through to later entries.
pub struct HeuristicClassifier {
    entries: &'static [HeuristicEntry],
}

impl HeuristicClassifier {
    pub fn new() -> Self {
        HeuristicClassifier {
            entries: DEFAULT_ENTRIES,
        }
    }

    pub fn with_entries(entries: &'static [HeuristicEntry]) -> Self {
        HeuristicClassifier { entries }
    }

    /// Returns (category_id, category_name, confidence) for the first
    /// entry with a keyword contained in the text.
    pub fn classify(&self, text: &str, categories: &[Category]) -> Option<(String, String, f64)> {
        let haystack = text.to_lowercase();
        if haystack.trim().is_empty() {
            return None;
        }

        let entry = self.entries.iter().find(|entry| {
            entry.keywords.iter().any(|keyword| haystack.contains(keyword))
        })?;

        let lower_name = entry.category_name.to_lowercase();
        let category = categories
            .iter()
            .find(|category| category.name.to_lowercase() == lower_name)?;

        Some((category.id.clone(), category.name.clone(), entry.confidence))
    }
}

impl Default for HeuristicClassifier {
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
    use crate::models::CategoryType;

    fn categories() -> Vec<Category> {
        vec![
            Category {
                id: "cat-market".to_string(),
                name: "Market".to_string(),
                category_type: CategoryType::Expense,
            },
            Category {
                id: "cat-transport".to_string(),
                name: "Transportation".to_string(),
                category_type: CategoryType::Expense,
            },
        ]
    }

    #[test]
    fn test_keyword_hit_resolves_category() {
        let classifier = HeuristicClassifier::new();

        let (id, name, confidence) = classifier
            .classify("MIGROS SANAL MARKET", &categories())
            .unwrap();
        assert_eq!(id, "cat-market");
        assert_eq!(name, "Market");
        assert_eq!(confidence, 0.65);
    }

    #[test]
    fn test_case_insensitive_category_resolution() {
        let mut cats = categories();
        cats[0].name = "MARKET".to_string();

        let classifier = HeuristicClassifier::new();
        let (id, name, _) = classifier.classify("a101 kapida", &cats).unwrap();
        assert_eq!(id, "cat-market");
        assert_eq!(name, "MARKET");
    }

    #[test]
    fn test_unresolved_category_name_yields_none() {
        // "starbucks" hits the Café entry, but no Café category exists;
        // no fall-through to later entries
        let classifier = HeuristicClassifier::new();
        assert!(classifier.classify("STARBUCKS", &categories()).is_none());
    }

    #[test]
    fn test_first_entry_wins() {
        // "market" (entry 0) and "uber" (transport entry) both present
        let classifier = HeuristicClassifier::new();
        let (id, _, _) = classifier
            .classify("uber eats market delivery", &categories())
            .unwrap();
        assert_eq!(id, "cat-market");
    }

    #[test]
    fn test_no_keyword_no_suggestion() {
        let classifier = HeuristicClassifier::new();
        assert!(classifier.classify("UNKNOWN MERCHANT 123", &categories()).is_none());
        assert!(classifier.classify("", &categories()).is_none());
    }
}
