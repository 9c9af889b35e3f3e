//! Template suggestion
//!
//! Ranks templates for a usage context by three additive signals: keyword
//! hits against descriptive text and metadata (2.0 each), the requested
//! category appearing on the template's category path (1.0, gated on a
//! keyword hit when keywords were given), and a damped
//! usage bonus (0.25 * ln(1 + uses)). Recording usage is the only mutable
//! state and lives outside the registry snapshot.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;
use tracing::debug;

use crate::domain::Template;
use crate::store::Registry;

const KEYWORD_WEIGHT: f64 = 2.0;
const CATEGORY_WEIGHT: f64 = 1.0;
const USAGE_WEIGHT: f64 = 0.25;

/// What the caller is about to do, as ranking input
#[derive(Debug, Clone, Default)]
pub struct UsageContext {
    /// Free-text keywords matched against names, descriptions, and metadata
    pub keywords: Vec<String>,
    /// Category the work falls under; matches the whole ancestor path
    pub category: Option<String>,
}

impl UsageContext {
    /// Context from keywords alone
    pub fn keywords(words: &[&str]) -> Self {
        Self {
            keywords: words.iter().map(|s| s.to_string()).collect(),
            category: None,
        }
    }

    /// Restrict to a category
    pub fn in_category(mut self, category_id: impl Into<String>) -> Self {
        self.category = Some(category_id.into());
        self
    }
}

/// One ranked candidate
#[derive(Debug, Clone)]
pub struct Suggestion {
    pub template_id: String,
    pub score: f64,
    /// Human-readable reasons the candidate scored
    pub reasons: Vec<String>,
}

/// Ranks templates and tracks usage counts
#[derive(Debug, Default)]
pub struct SuggestionEngine {
    usage: RwLock<HashMap<String, u64>>,
}

impl SuggestionEngine {
    /// Engine with no recorded usage
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a template was filled
    pub fn record_usage(&self, template_id: &str) {
        let mut usage = self.usage.write().unwrap_or_else(|p| p.into_inner());
        *usage.entry(template_id.to_string()).or_insert(0) += 1;
    }

    /// Recorded fill count for a template
    pub fn usage_count(&self, template_id: &str) -> u64 {
        let usage = self.usage.read().unwrap_or_else(|p| p.into_inner());
        usage.get(template_id).copied().unwrap_or(0)
    }

    /// Rank every template in the registry against a context
    ///
    /// Zero-scoring templates are dropped. Ties break on id so the order is
    /// stable across calls.
    pub fn suggest(&self, registry: &Registry, context: &UsageContext, limit: usize) -> Vec<Suggestion> {
        let mut suggestions: Vec<Suggestion> = registry
            .list()
            .into_iter()
            .filter_map(|template| self.score(registry, template, context))
            .collect();

        suggestions.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.template_id.cmp(&b.template_id))
        });
        suggestions.truncate(limit);
        debug!(candidates = suggestions.len(), "ranked suggestions");
        suggestions
    }

    fn score(&self, registry: &Registry, template: &Template, context: &UsageContext) -> Option<Suggestion> {
        let mut score = 0.0;
        let mut reasons = Vec::new();

        let haystack = searchable_text(template);
        for keyword in &context.keywords {
            let needle = keyword.to_lowercase();
            if !needle.is_empty() && haystack.contains(&needle) {
                score += KEYWORD_WEIGHT;
                reasons.push(format!("matches keyword '{}'", keyword));
            }
        }

        // The category bonus refines keyword results; it only stands on
        // its own when the context carries no keywords at all
        if let Some(wanted) = &context.category {
            if let Some(assigned) = &template.category {
                if registry.category_path(assigned).iter().any(|c| c == wanted)
                    && (score > 0.0 || context.keywords.is_empty())
                {
                    score += CATEGORY_WEIGHT;
                    reasons.push(format!("in category '{}'", wanted));
                }
            }
        }

        if score > 0.0 {
            let uses = self.usage_count(&template.id);
            if uses > 0 {
                score += USAGE_WEIGHT * (uses as f64).ln_1p();
                reasons.push(format!("used {} times", uses));
            }
            Some(Suggestion {
                template_id: template.id.clone(),
                score,
                reasons,
            })
        } else {
            None
        }
    }
}

/// Lowercased name, description, and metadata text for keyword matching
fn searchable_text(template: &Template) -> String {
    let mut text = String::new();
    text.push_str(&template.name);
    text.push(' ');
    text.push_str(&template.description);
    for value in template.metadata.values() {
        push_value_text(value, &mut text);
    }
    text.to_lowercase()
}

fn push_value_text(value: &Value, text: &mut String) {
    match value {
        Value::String(s) => {
            text.push(' ');
            text.push_str(s);
        }
        Value::Array(items) => {
            for item in items {
                push_value_text(item, text);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                text.push(' ');
                text.push_str(key);
                push_value_text(item, text);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Category, Template};
    use crate::store::TemplateStore;

    fn medical_store() -> TemplateStore {
        let store = TemplateStore::new();
        store.add_category(Category::new("cardio", "Cardiology")).unwrap();
        store
            .add_category(Category::child_of("hypertension", "Hypertension", "cardio"))
            .unwrap();
        store
            .insert(
                Template::new("bp_explain", "Blood Pressure Explanation", "explain blood pressure")
                    .with_category("hypertension")
                    .with_metadata("domain", "medical")
                    .with_metadata("usage", "patient education"),
            )
            .unwrap();
        store
            .insert(
                Template::new("tax_form", "Tax Form Helper", "fill a tax form")
                    .with_metadata("domain", "finance"),
            )
            .unwrap();
        store
    }

    #[test]
    fn test_keyword_match_in_metadata() {
        let store = medical_store();
        let engine = SuggestionEngine::new();
        let snapshot = store.snapshot();

        let results = engine.suggest(&snapshot, &UsageContext::keywords(&["medical"]), 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].template_id, "bp_explain");
        assert_eq!(results[0].score, 2.0);
    }

    #[test]
    fn test_keyword_match_is_case_insensitive() {
        let store = medical_store();
        let engine = SuggestionEngine::new();
        let results = engine.suggest(&store.snapshot(), &UsageContext::keywords(&["BLOOD"]), 10);
        assert_eq!(results[0].template_id, "bp_explain");
    }

    #[test]
    fn test_category_path_bonus() {
        let store = medical_store();
        let engine = SuggestionEngine::new();

        // bp_explain sits in hypertension, whose path includes cardio
        let context = UsageContext::keywords(&["pressure"]).in_category("cardio");
        let results = engine.suggest(&store.snapshot(), &context, 10);
        assert_eq!(results[0].template_id, "bp_explain");
        assert_eq!(results[0].score, 3.0);
    }

    #[test]
    fn test_category_alone_does_not_surface_unrelated() {
        let store = medical_store();
        let engine = SuggestionEngine::new();

        let context = UsageContext::keywords(&["finance"]).in_category("cardio");
        let results = engine.suggest(&store.snapshot(), &context, 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].template_id, "tax_form");
    }

    #[test]
    fn test_category_only_context_lists_subtree() {
        let store = medical_store();
        let engine = SuggestionEngine::new();

        // No keywords: category membership is the whole signal
        let context = UsageContext::default().in_category("cardio");
        let results = engine.suggest(&store.snapshot(), &context, 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].template_id, "bp_explain");
        assert_eq!(results[0].score, 1.0);
    }

    #[test]
    fn test_usage_breaks_keyword_tie() {
        let store = TemplateStore::new();
        store
            .insert(Template::new("a", "Shared term", "x").with_metadata("domain", "shared"))
            .unwrap();
        store
            .insert(Template::new("b", "Shared term", "x").with_metadata("domain", "shared"))
            .unwrap();

        let engine = SuggestionEngine::new();
        engine.record_usage("b");
        engine.record_usage("b");

        let results = engine.suggest(&store.snapshot(), &UsageContext::keywords(&["shared"]), 10);
        assert_eq!(results[0].template_id, "b");
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn test_tie_breaks_on_id() {
        let store = TemplateStore::new();
        store.insert(Template::new("zeta", "Same", "x").with_metadata("k", "match")).unwrap();
        store.insert(Template::new("alpha", "Same", "x").with_metadata("k", "match")).unwrap();

        let engine = SuggestionEngine::new();
        let results = engine.suggest(&store.snapshot(), &UsageContext::keywords(&["match"]), 10);
        assert_eq!(results[0].template_id, "alpha");
        assert_eq!(results[1].template_id, "zeta");
    }

    #[test]
    fn test_limit_truncates() {
        let store = medical_store();
        let engine = SuggestionEngine::new();
        let context = UsageContext::keywords(&["blood", "tax"]);
        let results = engine.suggest(&store.snapshot(), &context, 1);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_no_match_is_empty() {
        let store = medical_store();
        let engine = SuggestionEngine::new();
        let results = engine.suggest(&store.snapshot(), &UsageContext::keywords(&["astronomy"]), 10);
        assert!(results.is_empty());
    }

    #[test]
    fn test_record_usage_counts() {
        let engine = SuggestionEngine::new();
        assert_eq!(engine.usage_count("t"), 0);
        engine.record_usage("t");
        engine.record_usage("t");
        assert_eq!(engine.usage_count("t"), 2);
    }
}
