//! End-to-end query answering: interpret, retrieve, aggregate, prune, compose.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::config::Config;
use crate::db::Db;
use crate::error::{Result, ShopgraphError};
use crate::graph::{GraphRetriever, StrategyOutcome};
use crate::llm::{CompletionClient, CompletionSettings, OpenAiChatClient};
use crate::query::{Intent, QueryInterpreter};
use crate::relevance::{organize, PruneSource, RelevancePruner};
use crate::report::ReportComposer;

/// Report plus what happened along the way.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub intent: Intent,
    pub node_count: usize,
    /// Retrieved nodes per graph label.
    pub nodes_by_label: BTreeMap<String, usize>,
    pub relation_count: usize,
    pub category_count: usize,
    pub pruned_category_count: usize,
    pub pruned_item_count: usize,
    pub model_pruned: bool,
    pub failed_strategies: Vec<StrategyOutcome>,
    pub report: String,
}

pub struct Pipeline {
    interpreter: QueryInterpreter,
    retriever: GraphRetriever,
    pruner: RelevancePruner,
    composer: ReportComposer,
}

impl Pipeline {
    /// Build a pipeline from configuration.
    ///
    /// The completion client is created only when the API key variable is
    /// set; without it both model-assisted stages use their fallbacks.
    pub async fn new(config: &Config) -> Result<Self> {
        let client: Option<Arc<dyn CompletionClient>> = match config.llm_api_key() {
            Some(key) => {
                let client = OpenAiChatClient::from_config(&config.llm, key)?;
                Some(Arc::new(client) as Arc<dyn CompletionClient>)
            }
            None => {
                log::warn!(
                    "{} is not set; query parsing and pruning use keyword fallbacks",
                    config.llm.api_key_env
                );
                None
            }
        };
        Self::with_client(config, client).await
    }

    /// Build a pipeline around an explicit completion client.
    ///
    /// Fails when the store is unreachable or lacks the graph tables.
    pub async fn with_client(config: &Config, client: Option<Arc<dyn CompletionClient>>) -> Result<Self> {
        let db = Db::new(config.db_path());
        db.verify_graph_schema().await?;
        log::info!("Graph store ready at {}", db.path().display());

        if let Some(client) = &client {
            log::info!("Using completion model {}", client.model_name());
        }

        let vocabulary = Arc::new(config.vocabulary.clone());
        let interpreter = QueryInterpreter::new(
            client.clone(),
            Arc::clone(&vocabulary),
            CompletionSettings::for_parsing(&config.llm),
        )?;
        let retriever = GraphRetriever::new(db, Arc::clone(&vocabulary), config.shopgraph.max_degree);
        let pruner = RelevancePruner::new(
            client,
            Arc::clone(&vocabulary),
            config.pruning.clone(),
            CompletionSettings::for_pruning(&config.llm),
        );
        let composer = ReportComposer::new(vocabulary);

        Ok(Self {
            interpreter,
            retriever,
            pruner,
            composer,
        })
    }

    pub fn max_degree(&self) -> usize {
        self.retriever.max_degree()
    }

    /// Answer `query` at the configured degree.
    pub async fn answer(&self, query: &str) -> Result<PipelineOutput> {
        self.answer_with_degree(query, self.retriever.max_degree()).await
    }

    /// Answer `query`, traversing up to `max_degree` hops.
    ///
    /// Model failures and failing retrieval strategies degrade the result
    /// instead of failing it. A blank query or a store that cannot be opened
    /// is an error.
    pub async fn answer_with_degree(&self, query: &str, max_degree: usize) -> Result<PipelineOutput> {
        if query.trim().is_empty() {
            return Err(ShopgraphError::InvalidInput("Query must not be empty".to_string()));
        }
        let start = std::time::Instant::now();
        log::info!("Answering query: {}", query);

        let intent = self.interpreter.interpret(query).await;

        let retrieval = self.retriever.retrieve_with_degree(&intent, max_degree.max(1)).await?;
        for outcome in retrieval.failed_strategies() {
            log::error!(
                "Strategy {} failed (seed: {}): {}",
                outcome.kind,
                outcome.seed.as_deref().unwrap_or("-"),
                outcome.error.as_deref().unwrap_or("unknown error")
            );
        }

        let categorized = organize(retrieval.relations());
        log::info!(
            "Aggregated {} relations into {} categories",
            retrieval.relations().len(),
            categorized.len()
        );

        let pruned = self.pruner.prune(query, &categorized, &intent).await;
        let report = self.composer.compose(query, &pruned.relations, &intent)?;

        log::info!(
            "Report ready in {:?}: {} categories, {} items",
            start.elapsed(),
            pruned.relations.len(),
            pruned.relations.item_count()
        );

        Ok(PipelineOutput {
            node_count: retrieval.node_count(),
            nodes_by_label: retrieval.label_counts(),
            relation_count: retrieval.relations().len(),
            category_count: categorized.len(),
            pruned_category_count: pruned.relations.len(),
            pruned_item_count: pruned.relations.item_count(),
            model_pruned: pruned.source == PruneSource::Model,
            failed_strategies: retrieval.failed_strategies().cloned().collect(),
            intent,
            report,
        })
    }
}
