// 🤖 AI Fallback Adapter - Optional text-completion classification
// Prompt-constrained to the enumerated category list; every provider
// failure degrades to "no suggestion", never to an error for the caller

use crate::models::Category;
use anyhow::Result;

// ============================================================================
// COMPLETION PROVIDER
// ============================================================================

/// Single-shot text-completion capability. The engine treats the provider
/// as unreliable: any `Err` is swallowed by the classifier.
pub trait CompletionProvider: Send + Sync {
    fn complete(&self, prompt: &str) -> Result<String>;
}

// ============================================================================
// OPENAI-COMPATIBLE PROVIDER (feature "ai")
// ============================================================================

/// Blocking client for any OpenAI-compatible chat completion endpoint.
///
/// Configuration via environment:
/// - `CATEGORY_AI_API_KEY`  (required; absence disables the AI stage)
/// - `CATEGORY_AI_BASE_URL` (default: https://api.openai.com/v1)
/// - `CATEGORY_AI_MODEL`    (default: gpt-4o-mini)
#[cfg(feature = "ai")]
pub struct OpenAiProvider {
    base_url: String,
    model: String,
    api_key: String,
    http: reqwest::blocking::Client,
}

#[cfg(feature = "ai")]
impl OpenAiProvider {
    pub const API_KEY_ENV: &'static str = "CATEGORY_AI_API_KEY";
    pub const BASE_URL_ENV: &'static str = "CATEGORY_AI_BASE_URL";
    pub const MODEL_ENV: &'static str = "CATEGORY_AI_MODEL";

    pub fn new(base_url: String, model: String, api_key: String) -> Self {
        OpenAiProvider {
            base_url,
            model,
            api_key,
            http: reqwest::blocking::Client::new(),
        }
    }

    /// Build from environment; None when no credential is configured.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var(Self::API_KEY_ENV).ok()?;
        if api_key.trim().is_empty() {
            return None;
        }
        let base_url = std::env::var(Self::BASE_URL_ENV)
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let model =
            std::env::var(Self::MODEL_ENV).unwrap_or_else(|_| "gpt-4o-mini".to_string());
        Some(OpenAiProvider::new(base_url, model, api_key))
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[cfg(feature = "ai")]
impl CompletionProvider for OpenAiProvider {
    fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": 0,
            "max_tokens": 20,
        });

        let response = self
            .http
            .post(self.completions_url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()?
            .error_for_status()?;

        let payload: serde_json::Value = response.json()?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();
        Ok(content)
    }
}

// ============================================================================
// AI CLASSIFIER
// ============================================================================

/// Classifier wrapping a completion provider. A successful match carries a
/// fixed configured confidence, not a computed probability.
pub struct AiClassifier {
    provider: Box<dyn CompletionProvider>,

    /// Confidence assigned to every successful AI match (default: 0.8)
    pub confidence: f64,
}

impl AiClassifier {
    pub fn new(provider: Box<dyn CompletionProvider>) -> Self {
        AiClassifier {
            provider,
            confidence: 0.8,
        }
    }

    /// Build from environment credentials; None disables the AI stage.
    #[cfg(feature = "ai")]
    pub fn from_env() -> Option<Self> {
        OpenAiProvider::from_env().map(|provider| AiClassifier::new(Box::new(provider)))
    }

    /// Ask the provider to pick one category name for the transaction.
    ///
    /// Returns (category_id, category_name, confidence). Provider errors,
    /// empty responses and unmapped free text all return None.
    pub fn classify(
        &self,
        merchant: &str,
        description: &str,
        categories: &[Category],
    ) -> Option<(String, String, f64)> {
        if categories.is_empty() {
            return None;
        }

        let names: Vec<&str> = categories.iter().map(|c| c.name.as_str()).collect();
        let prompt = format!(
            "Pick the spending category for this transaction.\n\
             Categories: {}\n\
             Merchant: {}\n\
             Description: {}\n\
             Return exactly one name from this list, nothing else.",
            names.join(", "),
            merchant,
            description,
        );

        let raw = self.provider.complete(&prompt).ok()?;
        let answer = raw.trim().trim_matches(|c| c == '"' || c == '\'' || c == '.');
        if answer.is_empty() {
            return None;
        }

        let lower = answer.to_lowercase();
        categories
            .iter()
            .find(|category| category.name.to_lowercase() == lower)
            .map(|category| (category.id.clone(), category.name.clone(), self.confidence))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CategoryType;

    struct FixedProvider(Result<&'static str, ()>);

    impl CompletionProvider for FixedProvider {
        fn complete(&self, _prompt: &str) -> Result<String> {
            match self.0 {
                Ok(reply) => Ok(reply.to_string()),
                Err(()) => anyhow::bail!("provider unavailable"),
            }
        }
    }

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
    fn test_successful_match_gets_fixed_confidence() {
        let classifier = AiClassifier::new(Box::new(FixedProvider(Ok("Market"))));

        let (id, name, confidence) = classifier
            .classify("MIGROS", "grocery run", &categories())
            .unwrap();
        assert_eq!(id, "cat-market");
        assert_eq!(name, "Market");
        assert_eq!(confidence, 0.8);
    }

    #[test]
    fn test_response_matched_case_insensitively_with_noise_stripped() {
        let classifier = AiClassifier::new(Box::new(FixedProvider(Ok("  \"transportation\". "))));

        let (id, _, _) = classifier.classify("UBER", "", &categories()).unwrap();
        assert_eq!(id, "cat-transport");
    }

    #[test]
    fn test_unmapped_response_degrades_to_none() {
        let classifier = AiClassifier::new(Box::new(FixedProvider(Ok(
            "I think this is probably a grocery store",
        ))));
        assert!(classifier.classify("MIGROS", "", &categories()).is_none());
    }

    #[test]
    fn test_empty_response_degrades_to_none() {
        let classifier = AiClassifier::new(Box::new(FixedProvider(Ok("   "))));
        assert!(classifier.classify("MIGROS", "", &categories()).is_none());
    }

    #[test]
    fn test_provider_error_degrades_to_none() {
        let classifier = AiClassifier::new(Box::new(FixedProvider(Err(()))));
        assert!(classifier.classify("MIGROS", "", &categories()).is_none());
    }

    #[test]
    fn test_empty_category_list_skips_provider() {
        let classifier = AiClassifier::new(Box::new(FixedProvider(Ok("Market"))));
        assert!(classifier.classify("MIGROS", "", &[]).is_none());
    }

    #[test]
    fn test_overridable_confidence() {
        let mut classifier = AiClassifier::new(Box::new(FixedProvider(Ok("Market"))));
        classifier.confidence = 0.5;

        let (_, _, confidence) = classifier.classify("MIGROS", "", &categories()).unwrap();
        assert_eq!(confidence, 0.5);
    }
}
