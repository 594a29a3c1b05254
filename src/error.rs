use thiserror::Error;

/// Main error type for Shopgraph
#[derive(Error, Debug)]
pub enum ShopgraphError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Completion endpoint errors (network, timeout, non-success status)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Model reply could not be decoded into the expected shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// JSON rendering errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Graph store errors outside of SQLite itself (bad rows, missing schema)
    #[error("Graph error: {0}")]
    Graph(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenient Result type using ShopgraphError
pub type Result<T> = std::result::Result<T, ShopgraphError>;
