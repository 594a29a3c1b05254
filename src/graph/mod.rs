//! Decision-factor graph: node/relation types, store reads, bounded
//! multi-hop traversal and the four-strategy retriever.

mod retriever;
mod store;
mod traversal;

pub use retriever::{run_strategies, GraphRetriever};
pub use store::{Edge, GraphStore};
pub use traversal::{traversal_limits, bounded_traversal, Hop};

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::{Map, Value};

/// Store-assigned node identifier.
pub type NodeId = i64;

/// Property bag attached to nodes and relations.
pub type Properties = Map<String, Value>;

/// A node as read during one retrieval pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub name: String,
    pub labels: Vec<String>,
    pub properties: Properties,
}

/// A relation between two display names (source --relation_type--> target).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphRelation {
    pub source: String,
    pub target: String,
    /// Display label, e.g. `涉及` or `需要(2度)` for traversal results.
    pub relation_type: String,
    pub properties: Properties,
    /// Path length for relations produced by multi-hop traversal.
    pub degree: Option<usize>,
    /// Endpoint ids resolved through the retrieval's name index.
    pub source_id: Option<NodeId>,
    pub target_id: Option<NodeId>,
}

impl GraphRelation {
    pub fn new(source: &str, target: &str, relation_type: impl Into<String>) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            relation_type: relation_type.into(),
            properties: Properties::new(),
            degree: None,
            source_id: None,
            target_id: None,
        }
    }
}

/// Seeding strategy that produced part of a retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StrategyKind {
    DecisionCore,
    CategoryAnchor,
    UserGroup,
    ExplicitNeed,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StrategyKind::DecisionCore => "decision-core",
            StrategyKind::CategoryAnchor => "category-anchor",
            StrategyKind::UserGroup => "user-group",
            StrategyKind::ExplicitNeed => "explicit-need",
        };
        f.write_str(name)
    }
}

/// What one strategy run (or one seed of it) contributed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyOutcome {
    pub kind: StrategyKind,
    pub seed: Option<String>,
    pub relations: usize,
    pub error: Option<String>,
}

impl StrategyOutcome {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Nodes and relations produced by one strategy before merging.
#[derive(Debug, Default)]
pub struct Partial {
    pub nodes: Vec<GraphNode>,
    pub relations: Vec<GraphRelation>,
}

/// Union of all strategy results for one query.
///
/// Nodes are keyed by id (a later write replaces an earlier one); the name
/// index keeps the first node seen under each name.
#[derive(Debug, Default)]
pub struct Retrieval {
    nodes: HashMap<NodeId, GraphNode>,
    order: Vec<NodeId>,
    name_index: HashMap<String, NodeId>,
    relations: Vec<GraphRelation>,
    outcomes: Vec<StrategyOutcome>,
}

impl Retrieval {
    pub fn insert_node(&mut self, node: GraphNode) {
        self.name_index.entry(node.name.clone()).or_insert(node.id);
        if self.nodes.insert(node.id, node.clone()).is_none() {
            self.order.push(node.id);
        }
    }

    /// Merge a strategy result, recording success or failure.
    pub fn absorb(
        &mut self,
        kind: StrategyKind,
        seed: Option<&str>,
        result: crate::Result<Partial>,
    ) {
        match result {
            Ok(partial) => {
                let count = partial.relations.len();
                for node in partial.nodes {
                    self.insert_node(node);
                }
                self.relations.extend(partial.relations);
                log::debug!("{} strategy ({:?}): {} relations", kind, seed, count);
                self.outcomes.push(StrategyOutcome {
                    kind,
                    seed: seed.map(str::to_string),
                    relations: count,
                    error: None,
                });
            }
            Err(e) => {
                log::warn!("{} strategy ({:?}) failed, continuing: {}", kind, seed, e);
                self.outcomes.push(StrategyOutcome {
                    kind,
                    seed: seed.map(str::to_string),
                    relations: 0,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    /// Fill relation endpoint ids from the name index.
    pub fn resolve_endpoints(&mut self) {
        for relation in &mut self.relations {
            relation.source_id = self.name_index.get(&relation.source).copied();
            relation.target_id = self.name_index.get(&relation.target).copied();
        }
    }

    /// Nodes in first-insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.order.iter().filter_map(move |id| self.nodes.get(id))
    }

    /// Retrieved nodes per label. A node with several labels counts once
    /// under each of them.
    pub fn label_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for label in self.nodes().flat_map(|n| n.labels.iter()) {
            *counts.entry(label.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn relations(&self) -> &[GraphRelation] {
        &self.relations
    }

    pub fn outcomes(&self) -> &[StrategyOutcome] {
        &self.outcomes
    }

    pub fn failed_strategies(&self) -> impl Iterator<Item = &StrategyOutcome> {
        self.outcomes.iter().filter(|o| o.failed())
    }
}
