use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use codemem_core::{log_path, EmbeddingProviderKind, IndexError, IndexerConfig};
use codemem_index::{ClearMode, GraphView, IndexOptions, Indexer};
use codemem_parser::ParserRegistry;
use codemem_vector::{
    CostLedger, EmbeddingCoordinator, EmbeddingProvider, OpenAiConfig, OpenAiProvider,
    PointFilter, QdrantIndex, VectorIndex, VoyageConfig, VoyageProvider,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "codemem")]
#[command(about = "Incremental semantic indexing of source repositories", long_about = None)]
#[command(version)]
struct Cli {
    /// Verbose (debug-level) output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the indexing pipeline over a project
    Index {
        /// Project root directory
        #[arg(short, long)]
        project: PathBuf,

        /// Target collection name
        #[arg(short, long)]
        collection: String,

        /// Erase auto-generated points first, keep manual records
        #[arg(long, conflicts_with = "clear_all")]
        clear: bool,

        /// Erase every point, manual records included
        #[arg(long)]
        clear_all: bool,

        /// Reindex files even when unchanged
        #[arg(long)]
        force: bool,

        /// Additional include globs (repeatable)
        #[arg(long)]
        include: Vec<String>,

        /// Additional exclude globs (repeatable)
        #[arg(long)]
        exclude: Vec<String>,
    },

    /// Semantic search over an indexed collection
    Search {
        #[arg(short, long)]
        project: PathBuf,

        #[arg(short, long)]
        collection: String,

        /// Query text
        #[arg(short, long)]
        query: String,

        /// Restrict results by point kind
        #[arg(long, value_enum, default_value = "chunk")]
        r#type: SearchType,

        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SearchType {
    Entity,
    Relation,
    Chunk,
}

fn init_logging(verbose: bool, project: &PathBuf, collection: &str) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let log_file = log_path(project, collection);
    let guard = match log_file.parent().map(std::fs::create_dir_all) {
        Some(Ok(())) => {
            let appender = tracing_appender::rolling::never(
                log_file.parent().unwrap(),
                log_file.file_name().unwrap(),
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    };
    guard
}

fn build_provider(config: &IndexerConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let api_key = config.require_embedding_key()?.to_string();
    let provider: Arc<dyn EmbeddingProvider> = match config.embedding_provider {
        EmbeddingProviderKind::OpenAi => Arc::new(OpenAiProvider::new(OpenAiConfig::new(
            api_key,
            config.embedding_model.clone(),
        ))?),
        EmbeddingProviderKind::Voyage => Arc::new(VoyageProvider::new(VoyageConfig::new(
            api_key,
            config.embedding_model.clone(),
        ))?),
    };
    Ok(provider)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            // Anything that escapes the pipeline is fatal: bad config, or
            // the store/provider being globally unreachable.
            error!("fatal: {:#}", e);
            eprintln!("error: {:#}", e);
            2
        }
    };
    std::process::exit(code);
}

async fn dispatch(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Index {
            project,
            collection,
            clear,
            clear_all,
            force,
            include,
            exclude,
        } => {
            let _guard = init_logging(cli.verbose, &project, &collection);
            let mut config = IndexerConfig::from_env()?
                .with_project_overrides(&project)
                .context("loading project config")?;
            config.include_patterns.extend(include);
            config.exclude_patterns.extend(exclude);

            let provider = build_provider(&config)?;
            let provider_kind = config.embedding_provider;
            let coordinator = Arc::new(EmbeddingCoordinator::new(
                provider,
                provider_kind,
                Arc::new(CostLedger::new()),
            ));
            let store: Arc<dyn VectorIndex> = Arc::new(QdrantIndex::connect(
                &config.vector_store_url,
                config.vector_store_api_key.as_deref(),
            )?);
            let registry = Arc::new(ParserRegistry::with_default_parsers(
                config.streaming_threshold,
            ));

            let indexer = Indexer::new(config, project, registry, coordinator, store);
            let mut options = IndexOptions::new(collection);
            options.force = force;
            options.clear = if clear_all {
                ClearMode::All
            } else if clear {
                ClearMode::PreserveManual
            } else {
                ClearMode::None
            };

            let report = indexer.run(&options).await?;
            for line in report.summary_lines() {
                println!("{}", line);
            }
            Ok(report.exit_code())
        }

        Commands::Search {
            project,
            collection,
            query,
            r#type,
            limit,
        } => {
            let _guard = init_logging(cli.verbose, &project, &collection);
            let config = IndexerConfig::from_env()?
                .with_project_overrides(&project)
                .context("loading project config")?;

            let provider = build_provider(&config)?;
            let vector = provider
                .embed(&[query.clone()])
                .await
                .map_err(|e| IndexError::Embedding {
                    chunk_id: "query".to_string(),
                    detail: e.message,
                })?
                .vectors
                .remove(0);

            let store: Arc<dyn VectorIndex> = Arc::new(QdrantIndex::connect(
                &config.vector_store_url,
                config.vector_store_api_key.as_deref(),
            )?);

            let filter = match r#type {
                SearchType::Entity => PointFilter::chunks()
                    .with_chunk_type("metadata")
                    .automatic_only(),
                SearchType::Chunk => PointFilter::chunks(),
                SearchType::Relation => PointFilter::relations(),
            };
            let hits = store.search(&collection, vector, &filter, limit).await?;

            if hits.is_empty() {
                println!("no results");
                return Ok(0);
            }
            let view = GraphView::new(Arc::clone(&store), collection.clone());
            for hit in hits {
                match hit.payload {
                    codemem_vector::PointPayload::Chunk(chunk) => {
                        println!(
                            "{:.3}  [{}] {} ({}:{}-{})",
                            hit.score,
                            chunk.chunk_type,
                            chunk.entity_name,
                            chunk.file_path.as_deref().unwrap_or("manual"),
                            chunk.line_start,
                            chunk.line_end
                        );
                        if chunk.has_implementation == Some(true) {
                            // Progressive disclosure: point at the deep fetch
                            // instead of inlining the body.
                            let graph = view.entity_graph(&chunk.entity_name, 1).await?;
                            println!(
                                "        implementation available; {} related entities",
                                graph.neighbors.len()
                            );
                        }
                    }
                    codemem_vector::PointPayload::Relation(relation) => {
                        println!(
                            "{:.3}  {} -{}-> {} ({})",
                            hit.score,
                            relation.from_entity,
                            relation.relation_type,
                            relation.to_entity,
                            relation.file_path
                        );
                    }
                }
            }
            Ok(0)
        }
    }
}
