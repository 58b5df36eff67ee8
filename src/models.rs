// 🏷️ Core Data Model - Categories, Rules, Transactions, Suggestions
// Shared record types for the categorization engine and its persistence layer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// CATEGORY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategoryType {
    /// Money coming in
    Income,

    /// Money going out
    Expense,
}

impl CategoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryType::Income => "Income",
            CategoryType::Expense => "Expense",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Income" => Some(CategoryType::Income),
            "Expense" => Some(CategoryType::Expense),
            _ => None,
        }
    }
}

/// Spending/income category. Identity is the UUID; the name is a value and
/// may be renamed without breaking references from rules or transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub category_type: CategoryType,
}

impl Category {
    pub fn new(name: impl Into<String>, category_type: CategoryType) -> Self {
        Category {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            category_type,
        }
    }
}

/// Starter category set for fresh databases. Names line up with the
/// heuristic keyword table so the fallback stage resolves out of the box.
pub fn default_categories() -> Vec<Category> {
    let expense = [
        "Market",
        "Café",
        "Restaurants",
        "Transportation",
        "Online Shopping",
        "Subscriptions",
        "Health",
        "Rent",
        "Utilities",
    ];
    let income = ["Salary", "Other Income"];

    expense
        .iter()
        .map(|name| Category::new(*name, CategoryType::Expense))
        .chain(income.iter().map(|name| Category::new(*name, CategoryType::Income)))
        .collect()
}

// ============================================================================
// RULE
// ============================================================================

/// User-defined pattern → category mapping.
///
/// Smaller priority = higher precedence. A literal pattern matches by
/// case-insensitive substring containment; a regex pattern is compiled
/// case-insensitively. `merchant_only` restricts the haystack to the
/// merchant field instead of merchant + description.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: String,
    pub pattern: String,
    pub is_regex: bool,
    pub merchant_only: bool,
    pub priority: i64,
    pub category_id: String,
    pub created_at: DateTime<Utc>,
}

impl Rule {
    /// Create a literal (non-regex) rule matching merchant + description.
    pub fn literal(pattern: impl Into<String>, category_id: impl Into<String>, priority: i64) -> Self {
        Rule {
            id: uuid::Uuid::new_v4().to_string(),
            pattern: pattern.into(),
            is_regex: false,
            merchant_only: false,
            priority,
            category_id: category_id.into(),
            created_at: Utc::now(),
        }
    }

    /// Create a literal merchant-only rule (the shape produced by rule
    /// mining and the self-reinforcement loop).
    pub fn merchant_literal(
        pattern: impl Into<String>,
        category_id: impl Into<String>,
        priority: i64,
    ) -> Self {
        let mut rule = Rule::literal(pattern, category_id, priority);
        rule.merchant_only = true;
        rule
    }

    /// Create a regex rule matching merchant + description.
    pub fn regex(pattern: impl Into<String>, category_id: impl Into<String>, priority: i64) -> Self {
        let mut rule = Rule::literal(pattern, category_id, priority);
        rule.is_regex = true;
        rule
    }
}

// ============================================================================
// TRANSACTION
// ============================================================================

/// How a transaction's category assignment came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategorySource {
    /// Assigned manually by the user
    User,

    /// Assigned by a matching rule
    Rule,

    /// Assigned by the statistical/AI pipeline
    Ml,
}

impl CategorySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategorySource::User => "user",
            CategorySource::Rule => "rule",
            CategorySource::Ml => "ml",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(CategorySource::User),
            "rule" => Some(CategorySource::Rule),
            "ml" => Some(CategorySource::Ml),
            _ => None,
        }
    }
}

/// Transaction record, restricted to the fields the categorization core
/// reads and writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub merchant: String,
    pub description: String,
    pub amount: f64,
    pub category_id: Option<String>,
    pub category_source: Option<CategorySource>,
    pub suggested_category_id: Option<String>,
    pub suggested_confidence: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(merchant: impl Into<String>, description: impl Into<String>, amount: f64) -> Self {
        Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            merchant: merchant.into(),
            description: description.into(),
            amount,
            category_id: None,
            category_source: None,
            suggested_category_id: None,
            suggested_confidence: None,
            created_at: Utc::now(),
        }
    }

    /// Builder-style helper for seeding labeled history.
    pub fn with_category(mut self, category_id: impl Into<String>, source: CategorySource) -> Self {
        self.category_id = Some(category_id.into());
        self.category_source = Some(source);
        self
    }
}

// ============================================================================
// SUGGESTION
// ============================================================================

/// Which pipeline stage produced a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionSource {
    Rule,
    Ai,
    Heuristic,
}

impl SuggestionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionSource::Rule => "rule",
            SuggestionSource::Ai => "ai",
            SuggestionSource::Heuristic => "heuristic",
        }
    }
}

/// Ephemeral, request-scoped output of the classification pipeline.
/// Never persisted; `category_id` is None when a stage produced an
/// explicit "no match" result (e.g. rule-only misses).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    /// Stored transaction id this suggestion refers to, if any
    pub id: Option<String>,

    pub merchant: String,
    pub description: String,
    pub amount: f64,

    pub category_id: Option<String>,
    pub category_name: Option<String>,

    pub source: SuggestionSource,

    /// Heuristic trust score in [0, 1]
    pub confidence: f64,

    /// Human-readable explanation ("rule-match", "no-rule", ...)
    pub reason: String,

    /// Set when `source` is `Rule`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
}

// ============================================================================
// RULE CANDIDATE (mining output)
// ============================================================================

/// Candidate rule proposed by the offline miner. Becomes a real `Rule`
/// only through an explicit creation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCandidate {
    /// Normalized (trimmed, lowercased) merchant text
    pub merchant_pattern: String,

    /// Dominant category across the merchant's history
    pub suggested_category_id: String,

    /// dominant_count / total, in [0, 1]
    pub share: f64,

    /// Transactions labeled with the dominant category
    pub count: usize,

    /// All labeled transactions for this merchant in the window
    pub total: usize,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_creation() {
        let category = Category::new("Groceries", CategoryType::Expense);

        assert!(!category.id.is_empty());
        assert_eq!(category.name, "Groceries");
        assert_eq!(category.category_type, CategoryType::Expense);
    }

    #[test]
    fn test_category_type_round_trip() {
        assert_eq!(CategoryType::from_str("Income"), Some(CategoryType::Income));
        assert_eq!(CategoryType::from_str(CategoryType::Expense.as_str()), Some(CategoryType::Expense));
        assert_eq!(CategoryType::from_str("Transfer"), None);
    }

    #[test]
    fn test_rule_constructors() {
        let literal = Rule::literal("starbucks", "cat-1", 10);
        assert!(!literal.is_regex);
        assert!(!literal.merchant_only);
        assert_eq!(literal.priority, 10);

        let mined = Rule::merchant_literal("migros", "cat-2", 50);
        assert!(mined.merchant_only);
        assert!(!mined.is_regex);

        let re = Rule::regex(r"uber\s*(trip|eats)", "cat-3", 5);
        assert!(re.is_regex);
    }

    #[test]
    fn test_transaction_with_category() {
        let tx = Transaction::new("MIGROS", "card purchase", -42.50)
            .with_category("cat-1", CategorySource::User);

        assert_eq!(tx.category_id.as_deref(), Some("cat-1"));
        assert_eq!(tx.category_source, Some(CategorySource::User));
        assert!(tx.suggested_category_id.is_none());
    }

    #[test]
    fn test_suggestion_wire_field_names() {
        let suggestion = Suggestion {
            id: Some("tx-1".to_string()),
            merchant: "MIGROS".to_string(),
            description: "card purchase".to_string(),
            amount: -42.50,
            category_id: Some("cat-1".to_string()),
            category_name: Some("Groceries".to_string()),
            source: SuggestionSource::Rule,
            confidence: 0.95,
            reason: "rule-match".to_string(),
            rule_id: Some("rule-1".to_string()),
        };

        let json = serde_json::to_value(&suggestion).unwrap();
        assert_eq!(json["categoryId"], "cat-1");
        assert_eq!(json["categoryName"], "Groceries");
        assert_eq!(json["source"], "rule");
        assert_eq!(json["ruleId"], "rule-1");
    }
}
