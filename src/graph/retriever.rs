//! Four-strategy retrieval of the query-relevant subgraph.

use std::sync::Arc;

use rusqlite::Connection;

use super::store::GraphStore;
use super::traversal::bounded_traversal;
use super::{GraphRelation, Partial, Retrieval, StrategyKind};
use crate::db::Db;
use crate::error::Result;
use crate::query::Intent;
use crate::vocabulary::Vocabulary;

const ANCHOR_ROW_LIMIT: usize = 50;
const NEED_SEED_LIMIT: usize = 5;

/// Decision-core row cap for a configured degree.
fn decision_core_limit(max_degree: usize) -> usize {
    if max_degree <= 2 {
        30
    } else {
        50
    }
}

pub struct GraphRetriever {
    db: Db,
    vocabulary: Arc<Vocabulary>,
    max_degree: usize,
}

impl GraphRetriever {
    pub fn new(db: Db, vocabulary: Arc<Vocabulary>, max_degree: usize) -> Self {
        Self {
            db,
            vocabulary,
            max_degree: max_degree.max(1),
        }
    }

    pub fn max_degree(&self) -> usize {
        self.max_degree
    }

    /// Retrieve with the degree fixed at construction.
    pub async fn retrieve(&self, intent: &Intent) -> Result<Retrieval> {
        self.retrieve_with_degree(intent, self.max_degree).await
    }

    /// Run all strategies over one connection.
    ///
    /// Fails only when the store cannot be opened; individual strategy
    /// failures are recorded in the returned `Retrieval`.
    pub async fn retrieve_with_degree(&self, intent: &Intent, max_degree: usize) -> Result<Retrieval> {
        let vocabulary = Arc::clone(&self.vocabulary);
        let intent = intent.clone();
        let retrieval = self
            .db
            .with_connection(move |conn| Ok(run_strategies(conn, &vocabulary, &intent, max_degree)))
            .await?;

        log::info!(
            "Graph retrieval: {} nodes, {} relations, {} failed strategy runs",
            retrieval.node_count(),
            retrieval.relations().len(),
            retrieval.failed_strategies().count()
        );
        Ok(retrieval)
    }
}

/// Run the four strategies in order against one connection.
pub fn run_strategies(
    conn: &Connection,
    vocabulary: &Vocabulary,
    intent: &Intent,
    max_degree: usize,
) -> Retrieval {
    let store = GraphStore::new(conn);
    let mut retrieval = Retrieval::default();

    retrieval.absorb(
        StrategyKind::DecisionCore,
        None,
        decision_core(&store, vocabulary, max_degree),
    );

    if !intent.product_category.trim().is_empty() {
        retrieval.absorb(
            StrategyKind::CategoryAnchor,
            Some(&intent.product_category),
            category_anchor(&store, vocabulary, &intent.product_category),
        );
    }

    for group in &intent.user_groups {
        let node_name = vocabulary.canonical_group(group);
        retrieval.absorb(
            StrategyKind::UserGroup,
            Some(node_name),
            traversal(&store, vocabulary, node_name, max_degree),
        );
    }

    for need in &intent.explicit_needs {
        match store.factor_names_containing(need, NEED_SEED_LIMIT) {
            Ok(names) => {
                for name in names {
                    retrieval.absorb(
                        StrategyKind::ExplicitNeed,
                        Some(&name),
                        traversal(&store, vocabulary, &name, max_degree),
                    );
                }
            }
            Err(e) => retrieval.absorb(StrategyKind::ExplicitNeed, Some(need), Err(e)),
        }
    }

    retrieval.resolve_endpoints();
    retrieval
}

/// Stages and factors under the configured product's decision root. The
/// root does not depend on the category the query mentioned.
fn decision_core(store: &GraphStore<'_>, vocabulary: &Vocabulary, max_degree: usize) -> Result<Partial> {
    let category = vocabulary.product_category.as_str();
    let root_name = vocabulary.decision_root_name(category);
    let rows = store.decision_paths(&root_name, decision_core_limit(max_degree))?;

    let mut partial = Partial::default();
    for (root, stage, factor) in rows {
        partial.relations.push(GraphRelation::new(
            category,
            &stage.name,
            vocabulary.stage_relation_label.clone(),
        ));
        partial.relations.push(GraphRelation::new(
            &stage.name,
            &factor.name,
            vocabulary.factor_relation_label.clone(),
        ));
        partial.nodes.extend([root, stage, factor]);
    }
    Ok(partial)
}

fn category_anchor(store: &GraphStore<'_>, vocabulary: &Vocabulary, token: &str) -> Result<Partial> {
    let rows = store.anchor_rows(token, &vocabulary.anchor_factors, ANCHOR_ROW_LIMIT)?;

    let mut partial = Partial::default();
    for (factor, edge) in rows {
        if let Some(edge) = edge {
            let related = store.node(edge.other(factor.id))?;
            let mut relation = GraphRelation::new(
                &factor.name,
                &related.name,
                vocabulary.relation_label(&edge.relation_type),
            );
            relation.properties = edge.properties;
            partial.nodes.push(related);
            partial.relations.push(relation);
        }
        partial.nodes.push(factor);
    }
    Ok(partial)
}

fn traversal(
    store: &GraphStore<'_>,
    vocabulary: &Vocabulary,
    seed: &str,
    max_degree: usize,
) -> Result<Partial> {
    let hops = bounded_traversal(store, seed, max_degree)?;

    let mut partial = Partial::default();
    for hop in hops {
        let label = vocabulary.relation_label(&hop.edge.relation_type);
        let mut relation = GraphRelation::new(
            &hop.center.name,
            &hop.neighbor.name,
            format!("{}({}度)", label, hop.degree),
        );
        relation.properties = hop.edge.properties;
        relation.degree = Some(hop.degree);
        partial.nodes.push(hop.center);
        partial.nodes.push(hop.neighbor);
        partial.relations.push(relation);
    }
    Ok(partial)
}
