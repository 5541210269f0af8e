use ragfuse::cli::{Cli, Commands, ConfigAction};
use ragfuse::config::Config;
use ragfuse::error::{RagfuseError, Result};
use ragfuse::index::{
    EmbeddingProvider, FastEmbedProvider, KeywordIndex, VectorIndex,
};
use ragfuse::retrieval::{
    Document, HybridPipeline, KeywordRetriever, QueryRewriter, RerankClient, VectorRetriever,
};
use ragfuse::security::{InjectionHeuristics, InputGuard};
use std::sync::Arc;
use tokio::sync::RwLock;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Search {
            query,
            corpus,
            limit,
            json,
        } => {
            cmd_search(cli.config, &query, &corpus, limit, json).await?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "ragfuse=debug" } else { "ragfuse=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(false).init();
}

async fn cmd_search(
    config_path: Option<std::path::PathBuf>,
    query: &str,
    corpus: &std::path::Path,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(limit) = limit {
        config.hybrid.top_k = limit;
    }

    // Screening runs in front of the pipeline, never inside it.
    let guard = InjectionHeuristics::new(&config.security)?;
    let effective_query = if config.security.enabled {
        let verdict = guard.inspect(query);
        if verdict.malicious {
            tracing::warn!(
                risk_score = verdict.risk_score,
                reason = %verdict.reason,
                "query rejected by input guard"
            );
            println!("Query rejected: {}", verdict.reason);
            return Ok(());
        }
        guard.sanitize(query)
    } else {
        query.to_string()
    };

    let documents = load_corpus(corpus)?;
    tracing::info!(documents = documents.len(), corpus = %corpus.display(), "corpus loaded");

    let provider: Arc<dyn EmbeddingProvider> =
        Arc::new(FastEmbedProvider::new(&config.embedding.model).map_err(|e| {
            RagfuseError::Embedding(e.to_string())
        })?);

    let mut keyword_index = KeywordIndex::new().map_err(|e| RagfuseError::Index(e.to_string()))?;
    let mut vector_index = VectorIndex::new(
        config.index.vector_dim,
        config.index.hnsw_ef_construction,
        config.index.hnsw_m,
    );

    for document in &documents {
        keyword_index
            .insert(document)
            .map_err(|e| RagfuseError::Index(e.to_string()))?;
        let embedding = provider
            .embed(&document.text)
            .map_err(|e| RagfuseError::Embedding(e.to_string()))?;
        vector_index
            .insert(document.clone(), &embedding)
            .map_err(|e| RagfuseError::Index(e.to_string()))?;
    }
    keyword_index
        .commit()
        .map_err(|e| RagfuseError::Index(e.to_string()))?;

    let keyword_index = Arc::new(RwLock::new(keyword_index));
    let vector_index = Arc::new(RwLock::new(vector_index));

    let pipeline = HybridPipeline::new(
        QueryRewriter::new(&config.query_rewrite, None)?,
        Arc::new(KeywordRetriever::new(keyword_index, config.keyword.top_n)),
        Arc::new(VectorRetriever::new(
            provider,
            vector_index,
            config.vector.top_k,
            config.vector.similarity_threshold,
            config.vector.hnsw_ef_search,
        )),
        RerankClient::new(&config.rerank),
        &config,
    );

    let results = pipeline.run(&effective_query).await;
    print_results(&results, json)?;
    Ok(())
}

fn print_results(results: &[Document], json: bool) -> Result<()> {
    if json {
        let rendered = serde_json::to_string_pretty(results).map_err(|e| RagfuseError::Json {
            source: e,
            context: "Failed to serialize results".to_string(),
        })?;
        println!("{rendered}");
        return Ok(());
    }

    if results.is_empty() {
        println!("No supporting documents found.");
        return Ok(());
    }

    for (rank, document) in results.iter().enumerate() {
        let id = document.id.as_deref().unwrap_or("-");
        println!("{}. [{}] {}", rank + 1, id, document.text);
    }
    Ok(())
}

/// Load a JSONL corpus: one document object per line, blank lines
/// skipped.
fn load_corpus(path: &std::path::Path) -> Result<Vec<Document>> {
    let content = std::fs::read_to_string(path).map_err(|e| RagfuseError::Io {
        source: e,
        context: format!("Failed to read corpus: {:?}", path),
    })?;

    let mut documents = Vec::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let document: Document = serde_json::from_str(line).map_err(|e| RagfuseError::Json {
            source: e,
            context: format!("Invalid document on line {}", number + 1),
        })?;
        documents.push(document);
    }
    Ok(documents)
}

fn cmd_config(config_path: Option<std::path::PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let rendered = toml::to_string_pretty(&config)?;
            println!("{rendered}");
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            Config::load(&path)?;
            println!("✓ Configuration is valid");
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| RagfuseError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<std::path::PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'ragfuse config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        return Ok(config);
    }

    Config::load(&path)
}
