pub mod config;
pub mod error;
pub mod db;
pub mod vocabulary;
pub mod llm;
pub mod query;
pub mod graph;
pub mod relevance;
pub mod report;
pub mod pipeline;

pub use config::Config;
pub use error::{ShopgraphError, Result};
pub use pipeline::{Pipeline, PipelineOutput};
pub use query::Intent;
pub use relevance::CategorizedRelations;
