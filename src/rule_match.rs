// 🎯 Rule Matcher - Compile stored rules into an ordered matcher list
// Pure function of (rules, categories); first match in precedence order wins

use crate::models::{Category, Rule};
use regex::{Regex, RegexBuilder};
use std::collections::HashSet;

// ============================================================================
// COMPILED RULE
// ============================================================================

enum Matcher {
    /// Case-insensitive substring containment (pattern stored lowercased)
    Literal(String),

    /// Case-insensitive compiled regex
    Pattern(Regex),

    /// Empty pattern or a regex that failed to compile
    Never,
}

pub struct CompiledRule {
    pub rule_id: String,
    pub category_id: String,
    pub pattern: String,
    pub merchant_only: bool,
    matcher: Matcher,
}

impl CompiledRule {
    fn compile(rule: &Rule) -> Self {
        let pattern = rule.pattern.trim().to_string();

        let matcher = if pattern.is_empty() {
            Matcher::Never
        } else if rule.is_regex {
            // A pattern that fails to compile is permanently non-matching
            match RegexBuilder::new(&pattern).case_insensitive(true).build() {
                Ok(regex) => Matcher::Pattern(regex),
                Err(_) => Matcher::Never,
            }
        } else {
            Matcher::Literal(pattern.to_lowercase())
        };

        CompiledRule {
            rule_id: rule.id.clone(),
            category_id: rule.category_id.clone(),
            pattern,
            merchant_only: rule.merchant_only,
            matcher,
        }
    }

    fn matches(&self, haystack: &str) -> bool {
        match &self.matcher {
            Matcher::Literal(needle) => haystack.contains(needle.as_str()),
            Matcher::Pattern(regex) => regex.is_match(haystack),
            Matcher::Never => false,
        }
    }
}

// ============================================================================
// RULE MATCHER
// ============================================================================

/// Ordered list of compiled rules.
///
/// Precedence: priority ascending (smaller = higher), ties broken by longer
/// pattern first so the more specific rule wins. Rules whose category no
/// longer exists are dropped at compile time (degrade to "no match").
pub struct RuleMatcher {
    compiled: Vec<CompiledRule>,
}

impl RuleMatcher {
    pub fn compile(rules: &[Rule], categories: &[Category]) -> Self {
        let known: HashSet<&str> = categories.iter().map(|c| c.id.as_str()).collect();

        let mut ordered: Vec<&Rule> = rules
            .iter()
            .filter(|rule| known.contains(rule.category_id.as_str()))
            .collect();
        ordered.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| b.pattern.len().cmp(&a.pattern.len()))
        });

        RuleMatcher {
            compiled: ordered.into_iter().map(CompiledRule::compile).collect(),
        }
    }

    /// Return the first rule matching the transaction text, if any.
    /// O(number of rules), no side effects.
    pub fn match_text(&self, merchant: &str, description: &str) -> Option<&CompiledRule> {
        // Both haystacks lowercased once, shared across all rules
        let merchant_haystack = merchant.to_lowercase();
        let full_haystack = format!("{} {}", merchant, description).trim().to_lowercase();

        self.compiled.iter().find(|rule| {
            let haystack = if rule.merchant_only {
                merchant_haystack.as_str()
            } else {
                full_haystack.as_str()
            };
            rule.matches(haystack)
        })
    }

    pub fn rule_count(&self) -> usize {
        self.compiled.len()
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
                id: "cat-express".to_string(),
                name: "ExpressMarket".to_string(),
                category_type: CategoryType::Expense,
            },
        ]
    }

    #[test]
    fn test_literal_match_case_insensitive() {
        let rules = vec![Rule::literal("starbucks", "cat-market", 10)];
        let matcher = RuleMatcher::compile(&rules, &categories());

        let hit = matcher.match_text("STARBUCKS COFFEE #4521", "").unwrap();
        assert_eq!(hit.category_id, "cat-market");
        assert!(matcher.match_text("AMAZON", "").is_none());
    }

    #[test]
    fn test_regex_match_case_insensitive() {
        let rules = vec![Rule::regex(r"uber\s*(trip|eats)", "cat-market", 10)];
        let matcher = RuleMatcher::compile(&rules, &categories());

        assert!(matcher.match_text("UBER TRIP HELP.UBER.COM", "").is_some());
        assert!(matcher.match_text("uber eats", "").is_some());
        assert!(matcher.match_text("UBER ONE", "").is_none());
    }

    #[test]
    fn test_invalid_regex_never_matches() {
        let rules = vec![
            Rule::regex(r"[unclosed", "cat-market", 1),
            Rule::literal("migros", "cat-express", 10),
        ];
        let matcher = RuleMatcher::compile(&rules, &categories());

        // Broken regex is skipped silently, later rule still wins
        let hit = matcher.match_text("MIGROS", "").unwrap();
        assert_eq!(hit.category_id, "cat-express");
    }

    #[test]
    fn test_empty_pattern_never_matches() {
        let rules = vec![Rule::literal("", "cat-market", 1)];
        let matcher = RuleMatcher::compile(&rules, &categories());
        assert!(matcher.match_text("anything", "at all").is_none());
    }

    #[test]
    fn test_priority_order() {
        let rules = vec![
            Rule::literal("amazon", "cat-market", 100),
            Rule::literal("amazon", "cat-express", 1),
        ];
        let matcher = RuleMatcher::compile(&rules, &categories());

        // Smaller priority wins
        let hit = matcher.match_text("AMAZON.COM", "").unwrap();
        assert_eq!(hit.category_id, "cat-express");
    }

    #[test]
    fn test_equal_priority_longer_pattern_wins() {
        // Both rules at priority 10: the longer "a101 express" pattern
        // must beat the shorter "a101".
        let rules = vec![
            Rule::literal("a101", "cat-market", 10),
            Rule::literal("a101 express", "cat-express", 10),
        ];
        let matcher = RuleMatcher::compile(&rules, &categories());

        let hit = matcher.match_text("A101 EXPRESS MARKET", "").unwrap();
        assert_eq!(hit.category_id, "cat-express");
        assert_eq!(hit.pattern, "a101 express");

        // Plain A101 still falls to the shorter rule
        let hit = matcher.match_text("A101 MERKEZ", "").unwrap();
        assert_eq!(hit.category_id, "cat-market");
    }

    #[test]
    fn test_merchant_only_ignores_description() {
        let mut rule = Rule::literal("netflix", "cat-market", 10);
        rule.merchant_only = true;
        let matcher = RuleMatcher::compile(&[rule], &categories());

        assert!(matcher.match_text("NETFLIX.COM", "subscription").is_some());
        assert!(matcher.match_text("CARD PAYMENT", "netflix").is_none());
    }

    #[test]
    fn test_description_included_by_default() {
        let rules = vec![Rule::literal("netflix", "cat-market", 10)];
        let matcher = RuleMatcher::compile(&rules, &categories());
        assert!(matcher.match_text("CARD PAYMENT", "NETFLIX monthly").is_some());
    }

    #[test]
    fn test_dangling_category_degrades_to_no_match() {
        let rules = vec![Rule::literal("migros", "cat-deleted", 10)];
        let matcher = RuleMatcher::compile(&rules, &categories());

        assert_eq!(matcher.rule_count(), 0);
        assert!(matcher.match_text("MIGROS", "").is_none());
    }
}
