use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shopgraph::db::{migrate, Db};
use shopgraph::{Config, Pipeline};
use std::path::Path;

#[derive(Parser, Debug)]
#[command(name = "shopgraph")]
#[command(version, about = "Purchase-decision graph retrieval and tiered reports")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer a purchase query and print the report
    Ask {
        /// Natural-language purchase query
        query: String,

        /// Traversal depth (overrides shopgraph.max_degree)
        #[arg(short, long)]
        degree: Option<usize>,

        /// Print run statistics to stderr after the report
        #[arg(short, long)]
        stats: bool,
    },
    /// Apply SQL migrations to the graph store
    Migrate,
    /// Check store connectivity and graph schema
    Verify,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load before the logger so log_level from config.toml can act as default
    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", config.shopgraph.log_level.as_str())
    ).init();

    log::info!("Starting shopgraph v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Database path: {}", config.db_path().display());

    match cli.command.unwrap_or(Command::Verify) {
        Command::Ask { query, degree, stats } => run_query(&config, &query, degree, stats).await?,
        Command::Migrate => run_migrations(&config).await?,
        Command::Verify => run_schema_verification(&config).await?,
    }

    Ok(())
}

async fn run_query(config: &Config, query: &str, degree: Option<usize>, stats: bool) -> Result<()> {
    let pipeline = Pipeline::new(config)
        .await
        .context("Graph store is not usable")?;
    let degree = degree.unwrap_or_else(|| pipeline.max_degree());
    let output = pipeline.answer_with_degree(query, degree).await?;

    println!("{}", output.report);

    if stats {
        eprintln!("\n📈 Run statistics");
        eprintln!("   Degree: {}", degree);
        eprintln!("   Nodes: {}", output.node_count);
        for (label, count) in &output.nodes_by_label {
            eprintln!("     {}: {}", label, count);
        }
        eprintln!("   Relations: {}", output.relation_count);
        eprintln!("   Categories: {} → {} after pruning", output.category_count, output.pruned_category_count);
        eprintln!("   Items kept: {}", output.pruned_item_count);
        eprintln!("   Pruning: {}", if output.model_pruned { "model" } else { "scored fallback" });
        for outcome in &output.failed_strategies {
            eprintln!(
                "   ⚠ {} failed ({}): {}",
                outcome.kind,
                outcome.seed.as_deref().unwrap_or("-"),
                outcome.error.as_deref().unwrap_or("")
            );
        }
    }

    Ok(())
}

async fn run_migrations(config: &Config) -> Result<()> {
    let db = Db::new(config.db_path());
    let migrations_dir = Path::new("migrations");
    let applied = db.with_connection(|conn| {
        migrate::run_migrations(conn, migrations_dir)
    }).await?;

    log::info!("Graph store initialized ({} new migrations)", applied);
    Ok(())
}

async fn run_schema_verification(config: &Config) -> Result<()> {
    let db = Db::new(config.db_path());
    db.verify_graph_schema().await?;

    let (applied, pending) = db.with_connection(|conn| {
        let applied = migrate::get_applied_migrations(conn)?;
        let pending = migrate::pending_migrations(conn, Path::new("migrations"))?;
        Ok((applied, pending))
    }).await?;
    log::info!("✓ {} migrations applied", applied.len());
    for name in &pending {
        log::warn!("Migration {} is not applied; run `shopgraph migrate`", name);
    }

    let (nodes, relations) = db.with_connection(|conn| {
        let nodes: i64 = conn.query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?;
        let relations: i64 = conn.query_row("SELECT COUNT(*) FROM relations", [], |row| row.get(0))?;
        Ok((nodes, relations))
    }).await?;

    if nodes == 0 {
        log::warn!("Graph store is empty; load the decision graph before querying");
    }
    log::info!("✓ Graph store verification complete: {} nodes, {} relations", nodes, relations);
    Ok(())
}
