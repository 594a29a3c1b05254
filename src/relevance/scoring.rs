use super::CategorizedRelations;
use crate::config::PruningConfig;
use crate::query::Intent;
use crate::vocabulary::Vocabulary;

const EXPLICIT_WEIGHT: u32 = 10;
const FACTOR_WEIGHT: u32 = 5;
const CONTEXT_WEIGHT: u32 = 3;
const IMPORTANT_BONUS: u32 = 2;

/// Keyword tiers for deterministic scoring. Each tier holds distinct,
/// non-empty keywords.
#[derive(Debug, Clone, Default)]
pub struct ScoringTiers {
    pub explicit: Vec<String>,
    pub factors: Vec<String>,
    pub context: Vec<String>,
}

impl ScoringTiers {
    pub fn from_intent(intent: &Intent, vocabulary: &Vocabulary) -> Self {
        let context = intent
            .user_groups
            .iter()
            .chain(&intent.implicit_needs)
            .chain(&intent.usage_scenarios);

        Self {
            explicit: distinct(&intent.explicit_needs),
            factors: distinct(&vocabulary.purchase_factors),
            context: distinct(context),
        }
    }
}

fn distinct<'a>(words: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for word in words {
        if !word.is_empty() && !out.contains(word) {
            out.push(word.clone());
        }
    }
    out
}

/// Relevance score of `item` filed under `category`.
///
/// A keyword counts once per tier when it is a substring of the item or of
/// the category name.
pub fn score_item(tiers: &ScoringTiers, vocabulary: &Vocabulary, category: &str, item: &str) -> u32 {
    let hits = |keywords: &[String]| {
        keywords
            .iter()
            .filter(|k| item.contains(k.as_str()) || category.contains(k.as_str()))
            .count() as u32
    };

    let mut score = hits(&tiers.explicit) * EXPLICIT_WEIGHT
        + hits(&tiers.factors) * FACTOR_WEIGHT
        + hits(&tiers.context) * CONTEXT_WEIGHT;
    if vocabulary.is_important(category) {
        score += IMPORTANT_BONUS;
    }
    score
}

fn category_cap(category: &str, intent: &Intent, vocabulary: &Vocabulary, limits: &PruningConfig) -> usize {
    if vocabulary.is_important(category) {
        limits.important_cap
    } else if intent
        .user_groups
        .iter()
        .any(|g| g == category || vocabulary.canonical_group(g) == category)
    {
        limits.user_group_cap
    } else {
        limits.default_cap
    }
}

/// Deterministic keyword-scored pruning.
///
/// Zero-score items are dropped, the rest are ranked by score with ties kept
/// in aggregation order and cut to the category cap. A category with any
/// scoring item keeps at least `min(retention_floor, original len)` of them.
/// An important category where nothing scored keeps its first
/// `important_fallback` items.
pub fn score_prune(
    categorized: &CategorizedRelations,
    intent: &Intent,
    vocabulary: &Vocabulary,
    limits: &PruningConfig,
) -> CategorizedRelations {
    let tiers = ScoringTiers::from_intent(intent, vocabulary);
    let mut pruned = CategorizedRelations::new();

    for (category, items) in categorized.iter() {
        let mut scored: Vec<(&String, u32)> = items
            .iter()
            .map(|item| (item, score_item(&tiers, vocabulary, category, item)))
            .filter(|(_, score)| *score > 0)
            .collect();

        if scored.is_empty() {
            if vocabulary.is_important(category) {
                let kept = items.iter().take(limits.important_fallback).cloned().collect();
                pruned.insert(category, kept);
            }
            continue;
        }

        // sort_by is stable: equal scores keep aggregation order
        scored.sort_by(|a, b| b.1.cmp(&a.1));

        let cap = category_cap(category, intent, vocabulary, limits);
        let floor = limits.retention_floor.min(items.len());
        let keep = floor.max(scored.len().min(cap));
        let kept = scored.into_iter().take(keep).map(|(item, _)| item.clone()).collect();
        pruned.insert(category, kept);
    }

    pruned
}
