// 🔀 Suggestion Pipeline - Multi-stage orchestration with first-success-wins
// Stage order per target: Rule → AI → Statistical → Heuristic, filtered by
// the requested strategy. Opt-in side effects: apply categories, save rules.

use crate::ai::AiClassifier;
use crate::heuristic::HeuristicClassifier;
use crate::models::{Category, CategorySource, Rule, Suggestion, SuggestionSource};
use crate::rule_match::RuleMatcher;
use crate::statistical::{CentroidModel, StatisticalClassifier};
use crate::store::Store;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

// ============================================================================
// REQUEST / RESPONSE CONTRACT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Strategy {
    /// Rules first, then AI/statistical, then heuristic (default)
    #[default]
    #[serde(rename = "rule-first")]
    RuleFirst,

    /// Rules only; misses yield an explicit null suggestion
    #[serde(rename = "rule-only")]
    RuleOnly,

    /// Skip the rule stage entirely
    #[serde(rename = "ai-only")]
    AiOnly,
}

impl std::str::FromStr for Strategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rule-first" => Ok(Strategy::RuleFirst),
            "rule-only" => Ok(Strategy::RuleOnly),
            "ai-only" => Ok(Strategy::AiOnly),
            other => anyhow::bail!("Unknown strategy: {}", other),
        }
    }
}

/// One classification target: either a stored transaction reference (`id`)
/// or an ad-hoc merchant/description payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub merchant: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
}

impl Target {
    pub fn stored(id: impl Into<String>) -> Self {
        Target {
            id: Some(id.into()),
            ..Target::default()
        }
    }

    pub fn ad_hoc(merchant: impl Into<String>, description: impl Into<String>) -> Self {
        Target {
            merchant: Some(merchant.into()),
            description: Some(description.into()),
            ..Target::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorizeRequest {
    #[serde(default)]
    pub targets: Vec<Target>,

    #[serde(default)]
    pub strategy: Strategy,

    /// Acceptance threshold for the apply phase, in [0, 1]
    #[serde(default)]
    pub threshold: Option<f64>,

    /// Write accepted suggestions back to their transactions
    #[serde(default)]
    pub apply: bool,

    /// Mine new literal rules from high-confidence suggestions
    #[serde(default)]
    pub save_rules: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedRule {
    pub id: String,
    pub pattern: String,
    pub category_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorizeResponse {
    pub threshold: f64,
    pub suggestions: Vec<Suggestion>,
    pub applied: usize,
    pub created_rules: Vec<CreatedRule>,
}

// ============================================================================
// CLASSIFICATION STAGES
// ============================================================================

/// Per-target input shared by every stage.
struct StageInput<'a> {
    merchant: &'a str,
    description: &'a str,
    /// merchant + " " + description, trimmed
    text: &'a str,
    categories: &'a [Category],
}

/// Outcome of a single stage for a single target.
struct StageHit {
    category_id: String,
    category_name: Option<String>,
    source: SuggestionSource,
    confidence: f64,
    reason: String,
    rule_id: Option<String>,
}

/// One pluggable pipeline stage. The orchestrator walks an ordered stage
/// list and the first `Some` wins; `None` is the ordinary no-match path.
trait ClassifyStage {
    fn classify(&self, input: &StageInput) -> Option<StageHit>;
}

fn category_name(categories: &[Category], id: &str) -> Option<String> {
    categories
        .iter()
        .find(|category| category.id == id)
        .map(|category| category.name.clone())
}

struct RuleStage<'a> {
    matcher: &'a RuleMatcher,
    base_confidence: f64,
    bonus_step: f64,
    bonus_cap: f64,
    ceiling: f64,
}

impl ClassifyStage for RuleStage<'_> {
    fn classify(&self, input: &StageInput) -> Option<StageHit> {
        let hit = self.matcher.match_text(input.merchant, input.description)?;

        // Longer matched pattern ⇒ more specific rule ⇒ higher confidence
        let bonus = (hit.pattern.len() as f64 * self.bonus_step).min(self.bonus_cap);
        let confidence = (self.base_confidence + bonus).min(self.ceiling);

        Some(StageHit {
            category_name: category_name(input.categories, &hit.category_id),
            category_id: hit.category_id.clone(),
            source: SuggestionSource::Rule,
            confidence,
            reason: format!("rule-match:{}", hit.pattern),
            rule_id: Some(hit.rule_id.clone()),
        })
    }
}

struct AiStage<'a> {
    classifier: &'a AiClassifier,
}

impl ClassifyStage for AiStage<'_> {
    fn classify(&self, input: &StageInput) -> Option<StageHit> {
        let (category_id, name, confidence) =
            self.classifier
                .classify(input.merchant, input.description, input.categories)?;
        Some(StageHit {
            category_id,
            category_name: Some(name),
            source: SuggestionSource::Ai,
            confidence,
            reason: "ai-match".to_string(),
            rule_id: None,
        })
    }
}

struct StatisticalStage {
    model: Arc<CentroidModel>,
    acceptance_threshold: f64,
}

impl ClassifyStage for StatisticalStage {
    fn classify(&self, input: &StageInput) -> Option<StageHit> {
        if input.text.trim().is_empty() {
            return None;
        }
        let (category_id, score) = self.model.best_match(input.text)?;
        let confidence = score.clamp(0.0, 1.0);
        if confidence < self.acceptance_threshold {
            return None;
        }
        Some(StageHit {
            category_name: category_name(input.categories, &category_id),
            category_id,
            // Statistical hits ride the "ai" suggestion source: both are
            // model-derived, as opposed to rule/heuristic table lookups
            source: SuggestionSource::Ai,
            confidence,
            reason: "tfidf-match".to_string(),
            rule_id: None,
        })
    }
}

struct HeuristicStage<'a> {
    classifier: &'a HeuristicClassifier,
}

impl ClassifyStage for HeuristicStage<'_> {
    fn classify(&self, input: &StageInput) -> Option<StageHit> {
        let (category_id, name, confidence) =
            self.classifier.classify(input.text, input.categories)?;
        Some(StageHit {
            category_id,
            category_name: Some(name),
            source: SuggestionSource::Heuristic,
            confidence,
            reason: "keyword-match".to_string(),
            rule_id: None,
        })
    }
}

// ============================================================================
// CATEGORIZATION ENGINE
// ============================================================================

/// Orchestrator for the whole suggestion pipeline.
///
/// All confidence constants are plain public fields so callers can tune
/// them; the defaults mirror long-standing product behavior.
pub struct CategorizationEngine {
    store: Arc<dyn Store>,

    pub statistical: StatisticalClassifier,
    pub heuristic: HeuristicClassifier,
    ai: Option<AiClassifier>,

    /// Apply threshold used when the request doesn't carry one (default: 0.35)
    pub default_threshold: f64,

    /// Maximum targets per batch (default: 100)
    pub batch_cap: usize,

    /// Rule-match confidence: base + min(cap, pattern_len × step), ceiling-capped
    pub rule_base_confidence: f64,
    pub rule_length_bonus_step: f64,
    pub rule_length_bonus_cap: f64,
    pub rule_confidence_ceiling: f64,

    /// Minimum confidence for the self-reinforcement loop (default: 0.7)
    pub mine_confidence_floor: f64,

    /// Priority assigned to mined rules (default: 50, i.e. low precedence)
    pub mined_rule_priority: i64,
}

impl CategorizationEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        CategorizationEngine {
            store,
            statistical: StatisticalClassifier::new(),
            heuristic: HeuristicClassifier::new(),
            ai: None,
            default_threshold: 0.35,
            batch_cap: 100,
            rule_base_confidence: 0.90,
            rule_length_bonus_step: 0.01,
            rule_length_bonus_cap: 0.09,
            rule_confidence_ceiling: 0.99,
            mine_confidence_floor: 0.7,
            mined_rule_priority: 50,
        }
    }

    /// Attach an AI fallback classifier.
    pub fn with_ai(mut self, ai: AiClassifier) -> Self {
        self.ai = Some(ai);
        self
    }

    /// Attach the AI stage when a credential is present in the environment.
    #[cfg(feature = "ai")]
    pub fn with_ai_from_env(mut self) -> Self {
        self.ai = AiClassifier::from_env();
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Run the pipeline for a batch of targets.
    ///
    /// Every target yields exactly one suggestion. Apply and rule-creation
    /// side effects are best-effort per target; one failure never blocks
    /// the rest of the batch. An empty target list is a no-op success.
    pub fn categorize(
        &self,
        request: &CategorizeRequest,
        now: DateTime<Utc>,
    ) -> Result<CategorizeResponse> {
        let threshold = request
            .threshold
            .unwrap_or(self.default_threshold)
            .clamp(0.0, 1.0);

        if request.targets.is_empty() {
            return Ok(CategorizeResponse {
                threshold,
                suggestions: Vec::new(),
                applied: 0,
                created_rules: Vec::new(),
            });
        }
        if request.targets.len() > self.batch_cap {
            anyhow::bail!(
                "Batch too large: {} targets (cap: {})",
                request.targets.len(),
                self.batch_cap
            );
        }

        let categories = self.store.categories()?;
        let rules = self.store.rules()?;
        let matcher = RuleMatcher::compile(&rules, &categories);

        let stages = self.build_stages(request.strategy, &matcher, now)?;

        let mut suggestions = Vec::with_capacity(request.targets.len());
        for target in &request.targets {
            suggestions.push(self.classify_target(target, &stages, &categories, request.strategy)?);
        }

        let applied = if request.apply {
            self.apply_suggestions(&suggestions, threshold)
        } else {
            0
        };

        let created_rules = if request.save_rules {
            self.save_rules(&suggestions, &rules, threshold)
        } else {
            Vec::new()
        };

        Ok(CategorizeResponse {
            threshold,
            suggestions,
            applied,
            created_rules,
        })
    }

    /// Assemble the ordered stage list for a strategy.
    fn build_stages<'a>(
        &'a self,
        strategy: Strategy,
        matcher: &'a RuleMatcher,
        now: DateTime<Utc>,
    ) -> Result<Vec<Box<dyn ClassifyStage + 'a>>> {
        let mut stages: Vec<Box<dyn ClassifyStage + 'a>> = Vec::new();

        if strategy != Strategy::AiOnly {
            stages.push(Box::new(RuleStage {
                matcher,
                base_confidence: self.rule_base_confidence,
                bonus_step: self.rule_length_bonus_step,
                bonus_cap: self.rule_length_bonus_cap,
                ceiling: self.rule_confidence_ceiling,
            }));
        }

        if strategy != Strategy::RuleOnly {
            if let Some(ai) = &self.ai {
                stages.push(Box::new(AiStage { classifier: ai }));
            }
            // Centroid model fetched once per batch through the TTL cache
            stages.push(Box::new(StatisticalStage {
                model: self.statistical.model(self.store.as_ref(), now)?,
                acceptance_threshold: self.statistical.acceptance_threshold,
            }));
            stages.push(Box::new(HeuristicStage {
                classifier: &self.heuristic,
            }));
        }

        Ok(stages)
    }

    fn classify_target(
        &self,
        target: &Target,
        stages: &[Box<dyn ClassifyStage + '_>],
        categories: &[Category],
        strategy: Strategy,
    ) -> Result<Suggestion> {
        // Stored reference wins over ad-hoc fields
        let (target_id, merchant, description, amount) = match &target.id {
            Some(id) => match self.store.transaction(id)? {
                Some(tx) => (Some(tx.id), tx.merchant, tx.description, tx.amount),
                None => {
                    // Unknown id: explicit null suggestion, batch continues
                    return Ok(null_suggestion(target, "missing-transaction"));
                }
            },
            None => (
                None,
                target.merchant.clone().unwrap_or_default(),
                target.description.clone().unwrap_or_default(),
                target.amount.unwrap_or(0.0),
            ),
        };

        let text = format!("{} {}", merchant, description).trim().to_string();
        let input = StageInput {
            merchant: &merchant,
            description: &description,
            text: &text,
            categories,
        };

        for stage in stages {
            if let Some(hit) = stage.classify(&input) {
                return Ok(Suggestion {
                    id: target_id,
                    merchant,
                    description,
                    amount,
                    category_id: Some(hit.category_id),
                    category_name: hit.category_name,
                    source: hit.source,
                    confidence: hit.confidence,
                    reason: hit.reason,
                    rule_id: hit.rule_id,
                });
            }
        }

        // No stage produced a result: still exactly one suggestion per target
        let (source, reason) = match strategy {
            Strategy::RuleOnly => (SuggestionSource::Rule, "no-rule"),
            _ => (SuggestionSource::Heuristic, "no-match"),
        };
        Ok(Suggestion {
            id: target_id,
            merchant,
            description,
            amount,
            category_id: None,
            category_name: None,
            source,
            confidence: 0.0,
            reason: reason.to_string(),
            rule_id: None,
        })
    }

    /// Apply phase: write accepted suggestions back to their transactions.
    /// Idempotent and independent per target.
    fn apply_suggestions(&self, suggestions: &[Suggestion], threshold: f64) -> usize {
        let mut applied = 0;
        for suggestion in suggestions {
            let (Some(transaction_id), Some(category_id)) =
                (&suggestion.id, &suggestion.category_id)
            else {
                continue;
            };
            if suggestion.confidence < threshold {
                continue;
            }

            let source = match suggestion.source {
                SuggestionSource::Rule => CategorySource::Rule,
                _ => CategorySource::Ml,
            };
            if self
                .store
                .assign_category(transaction_id, category_id, source, suggestion.confidence)
                .is_ok()
            {
                applied += 1;
            }
        }
        applied
    }

    /// Self-reinforcement loop: turn high-confidence suggestions with
    /// merchant text into literal merchant-only rules at low priority.
    fn save_rules(
        &self,
        suggestions: &[Suggestion],
        existing_rules: &[Rule],
        threshold: f64,
    ) -> Vec<CreatedRule> {
        let floor = threshold.max(self.mine_confidence_floor);

        let mut known: HashSet<(String, String)> = existing_rules
            .iter()
            .filter(|rule| !rule.is_regex)
            .map(|rule| (rule.pattern.trim().to_lowercase(), rule.category_id.clone()))
            .collect();

        let mut created = Vec::new();
        for suggestion in suggestions {
            let Some(category_id) = &suggestion.category_id else {
                continue;
            };
            let pattern = suggestion.merchant.trim().to_lowercase();
            if pattern.is_empty() || suggestion.confidence < floor {
                continue;
            }

            let key = (pattern.clone(), category_id.clone());
            if known.contains(&key) {
                continue;
            }

            let rule = Rule::merchant_literal(&pattern, category_id, self.mined_rule_priority);
            if self.store.insert_rule(&rule).is_ok() {
                known.insert(key);
                created.push(CreatedRule {
                    id: rule.id,
                    pattern: rule.pattern,
                    category_id: rule.category_id,
                });
            }
        }
        created
    }
}

fn null_suggestion(target: &Target, reason: &str) -> Suggestion {
    Suggestion {
        id: target.id.clone(),
        merchant: target.merchant.clone().unwrap_or_default(),
        description: target.description.clone().unwrap_or_default(),
        amount: target.amount.unwrap_or(0.0),
        category_id: None,
        category_name: None,
        source: SuggestionSource::Heuristic,
        confidence: 0.0,
        reason: reason.to_string(),
        rule_id: None,
    }
}

// ============================================================================
// TESTS
// ============================================================================
