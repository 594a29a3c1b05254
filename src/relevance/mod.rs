//! Category aggregation and relevance pruning.

mod pruner;
mod scoring;

pub use pruner::{PruneSource, Pruned, RelevancePruner};
pub use scoring::{score_item, ScoringTiers, score_prune};

use std::collections::HashMap;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::graph::GraphRelation;

/// Ordered mapping from a category (relation source name) to its items
/// (relation target names).
///
/// Categories keep first-insertion order and items keep insertion order.
/// Items are not de-duplicated: repeats mark items reached several ways.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategorizedRelations {
    entries: Vec<(String, Vec<String>)>,
    index: HashMap<String, usize>,
}

impl CategorizedRelations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one item under `category`, creating the category if needed.
    pub fn push(&mut self, category: &str, item: &str) {
        let slot = self.slot(category);
        self.entries[slot].1.push(item.to_string());
    }

    /// Set the items of `category`, keeping its position if it exists.
    pub fn insert(&mut self, category: &str, items: Vec<String>) {
        let slot = self.slot(category);
        self.entries[slot].1 = items;
    }

    fn slot(&mut self, category: &str) -> usize {
        if let Some(&i) = self.index.get(category) {
            return i;
        }
        self.entries.push((category.to_string(), Vec::new()));
        let i = self.entries.len() - 1;
        self.index.insert(category.to_string(), i);
        i
    }

    pub fn get(&self, category: &str) -> Option<&[String]> {
        self.index.get(category).map(|&i| self.entries[i].1.as_slice())
    }

    pub fn contains(&self, category: &str) -> bool {
        self.index.contains_key(category)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(c, items)| (c.as_str(), items.as_slice()))
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(c, _)| c.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn item_count(&self) -> usize {
        self.entries.iter().map(|(_, items)| items.len()).sum()
    }

    /// Copy with every category cut to its first `n` items.
    pub fn truncated(&self, n: usize) -> Self {
        self.iter()
            .map(|(c, items)| (c.to_string(), items.iter().take(n).cloned().collect()))
            .collect()
    }

    /// True when every item under every category also appears under the
    /// same category in `original`.
    pub fn is_subset_of(&self, original: &CategorizedRelations) -> bool {
        self.iter().all(|(category, items)| match original.get(category) {
            Some(source) => items.iter().all(|item| source.contains(item)),
            None => items.is_empty(),
        })
    }
}

impl FromIterator<(String, Vec<String>)> for CategorizedRelations {
    fn from_iter<I: IntoIterator<Item = (String, Vec<String>)>>(iter: I) -> Self {
        let mut out = CategorizedRelations::new();
        for (category, items) in iter {
            out.insert(&category, items);
        }
        out
    }
}

impl Serialize for CategorizedRelations {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (category, items) in &self.entries {
            map.serialize_entry(category, items)?;
        }
        map.end()
    }
}

/// Group relations by source name, first-seen order, duplicates kept.
pub fn organize(relations: &[GraphRelation]) -> CategorizedRelations {
    let mut organized = CategorizedRelations::new();
    for relation in relations {
        organized.push(&relation.source, &relation.target);
    }
    organized
}
