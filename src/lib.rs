// Category Engine - Core Library
// Automatic transaction categorization: rule matching, TF-IDF statistical
// classification, heuristic keyword fallback, optional AI fallback, and the
// offline rule-suggestion miner. Exposed for the CLI, API server, and tests.

pub mod ai;
pub mod heuristic;
pub mod importer;
pub mod miner;
pub mod models;
pub mod pipeline;
pub mod rule_match;
pub mod statistical;
pub mod store;

// Re-export commonly used types
pub use ai::{AiClassifier, CompletionProvider};
pub use heuristic::{HeuristicClassifier, HeuristicEntry, DEFAULT_ENTRIES};
pub use importer::{import_csv, ImportReport};
pub use miner::RuleMiner;
pub use models::{
    default_categories, Category, CategorySource, CategoryType, Rule, RuleCandidate, Suggestion,
    SuggestionSource, Transaction,
};
pub use pipeline::{
    CategorizationEngine, CategorizeRequest, CategorizeResponse, CreatedRule, Strategy, Target,
};
pub use rule_match::{CompiledRule, RuleMatcher};
pub use statistical::{tokenize, Centroid, CentroidModel, StatisticalClassifier};
pub use store::{MemoryStore, SqliteStore, Store};

#[cfg(feature = "ai")]
pub use ai::OpenAiProvider;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
