use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use contract_rag_core::config::{
    DEFAULT_EMBEDDING_DEPLOYMENT, DEFAULT_INDEX_NAME, DEFAULT_MIN_SCORE, DEFAULT_OPENAI_API_VERSION,
    DEFAULT_TOP,
};
use contract_rag_core::{
    contract_index_schema, read_text_pages, AzureOpenAiEmbeddings, AzureOpenAiSettings,
    AzureSearchSettings, AzureSearchStore, ChunkingConfig, ChunkingStrategy, DocumentIndexer,
    EmbeddingProvider, EmbeddingService, HashingEmbeddings, InMemoryIndex, SearchIndexBackend,
    SearchIndexManager, SearchMode, SearchQuery, SearchResponse, SearchService, TextChunker,
    DEFAULT_BATCH_SIZE, DEFAULT_EMBEDDING_DIMENSIONS,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "contract-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Azure AI Search service URL
    #[arg(long, env = "AZURE_SEARCH_ENDPOINT")]
    search_endpoint: Option<String>,

    /// Azure AI Search admin key
    #[arg(long, env = "AZURE_SEARCH_API_KEY", hide_env_values = true)]
    search_api_key: Option<String>,

    /// Index holding the contract chunks
    #[arg(long, env = "AZURE_SEARCH_INDEX_NAME", default_value = DEFAULT_INDEX_NAME)]
    index_name: String,

    /// Azure OpenAI resource URL
    #[arg(long, env = "AZURE_OPENAI_ENDPOINT")]
    openai_endpoint: Option<String>,

    /// Azure OpenAI key
    #[arg(long, env = "AZURE_OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    #[arg(long, env = "AZURE_OPENAI_API_VERSION", default_value = DEFAULT_OPENAI_API_VERSION)]
    openai_api_version: String,

    /// Embedding model deployment name
    #[arg(long, env = "AZURE_OPENAI_EMBEDDING_DEPLOYMENT", default_value = DEFAULT_EMBEDDING_DEPLOYMENT)]
    embedding_deployment: String,

    #[arg(long, env = "EMBEDDING_DIMENSIONS", default_value_t = DEFAULT_EMBEDDING_DIMENSIONS)]
    embedding_dimensions: usize,

    /// Use hashing embeddings and a local JSON index at this path instead of Azure.
    #[arg(long)]
    local_store: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Create the index, or update its schema in place.
    CreateIndex,
    /// Print the index name and field count.
    IndexStats,
    /// Drop the index and every chunk in it.
    DeleteIndex {
        /// Confirm the deletion.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    /// Chunk a page-text file (pages separated by form feeds) and index it.
    Ingest {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        client_id: String,
        /// Defaults to a fresh UUID.
        #[arg(long)]
        document_id: Option<String>,
        /// Defaults to the file name.
        #[arg(long)]
        document_name: Option<String>,
        #[arg(long, default_value_t = ChunkingStrategy::Hybrid)]
        strategy: ChunkingStrategy,
        #[arg(long, default_value = "1000")]
        chunk_size: usize,
        #[arg(long, default_value = "200")]
        chunk_overlap: usize,
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },
    /// Search one tenant's chunks.
    Search {
        #[arg(long)]
        query: String,
        #[arg(long)]
        client_id: String,
        #[arg(long, default_value_t = SearchMode::Hybrid)]
        mode: SearchMode,
        #[arg(long, default_value_t = DEFAULT_TOP)]
        top: usize,
        #[arg(long, default_value_t = DEFAULT_MIN_SCORE)]
        min_score: f64,
        #[arg(long)]
        document_id: Option<String>,
        #[arg(long)]
        section_type: Option<String>,
        /// Print the whole response as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Find chunks similar to an indexed chunk.
    Similar {
        #[arg(long)]
        chunk_id: String,
        #[arg(long)]
        client_id: String,
        #[arg(long, default_value = "5")]
        top: usize,
        #[arg(long, default_value_t = false)]
        exclude_same_document: bool,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Remove every chunk of a document.
    DeleteDocument {
        #[arg(long)]
        document_id: String,
        #[arg(long)]
        client_id: String,
    },
    /// Count the indexed chunks of a document.
    Count {
        #[arg(long)]
        document_id: String,
        #[arg(long)]
        client_id: String,
    },
}

impl Command {
    fn mutates_index(&self) -> bool {
        matches!(
            self,
            Self::CreateIndex | Self::DeleteIndex { .. } | Self::Ingest { .. } | Self::DeleteDocument { .. }
        )
    }
}

struct Services {
    embeddings: Arc<EmbeddingService>,
    backend: Arc<dyn SearchIndexBackend>,
    local: Option<(Arc<InMemoryIndex>, PathBuf)>,
}

impl Services {
    async fn connect(cli: &Cli) -> anyhow::Result<Self> {
        if let Some(path) = &cli.local_store {
            let index = Arc::new(InMemoryIndex::load(cli.index_name.as_str(), path).await?);
            let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbeddings::new(cli.embedding_dimensions));
            info!(path = %path.display(), "using local store");
            return Ok(Self {
                embeddings: Arc::new(EmbeddingService::new(provider, "hashing", cli.embedding_dimensions)),
                backend: index.clone(),
                local: Some((index, path.clone())),
            });
        }

        let (Some(search_endpoint), Some(search_api_key)) = (&cli.search_endpoint, &cli.search_api_key) else {
            bail!("AZURE_SEARCH_ENDPOINT and AZURE_SEARCH_API_KEY are required unless --local-store is set");
        };
        let (Some(openai_endpoint), Some(openai_api_key)) = (&cli.openai_endpoint, &cli.openai_api_key) else {
            bail!("AZURE_OPENAI_ENDPOINT and AZURE_OPENAI_API_KEY are required unless --local-store is set");
        };

        let search_settings =
            AzureSearchSettings::new(search_endpoint, search_api_key).with_index_name(&cli.index_name);
        let mut openai_settings = AzureOpenAiSettings::new(openai_endpoint, openai_api_key);
        openai_settings.api_version = cli.openai_api_version.clone();
        openai_settings.embedding_deployment = cli.embedding_deployment.clone();
        openai_settings.dimensions = cli.embedding_dimensions;

        let provider: Arc<dyn EmbeddingProvider> = Arc::new(
            AzureOpenAiEmbeddings::new(&openai_settings).context("invalid AZURE_OPENAI_ENDPOINT")?,
        );
        let backend = AzureSearchStore::new(&search_settings).context("invalid AZURE_SEARCH_ENDPOINT")?;

        Ok(Self {
            embeddings: Arc::new(EmbeddingService::new(
                provider,
                openai_settings.embedding_deployment.clone(),
                openai_settings.dimensions,
            )),
            backend: Arc::new(backend),
            local: None,
        })
    }

    fn manager(&self, cli: &Cli) -> SearchIndexManager {
        SearchIndexManager::new(
            self.backend.clone(),
            contract_index_schema(cli.index_name.as_str(), cli.embedding_dimensions),
        )
    }

    fn indexer(&self) -> DocumentIndexer {
        DocumentIndexer::new(self.embeddings.clone(), self.backend.clone())
    }

    fn search(&self) -> SearchService {
        SearchService::new(self.embeddings.clone(), self.backend.clone())
    }

    async fn persist(&self) -> anyhow::Result<()> {
        if let Some((index, path)) = &self.local {
            index
                .save(path)
                .await
                .with_context(|| format!("failed to save local store {}", path.display()))?;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let services = Services::connect(&cli).await?;

    info!(
        version = app_version,
        index_name = %cli.index_name,
        started_at = %Utc::now().to_rfc3339(),
        "contract-rag boot"
    );

    run(&cli, &services).await?;

    if cli.command.mutates_index() {
        services.persist().await?;
    }
    Ok(())
}

async fn run(cli: &Cli, services: &Services) -> anyhow::Result<()> {
    match &cli.command {
        Command::CreateIndex => {
            let schema = services.manager(cli).create_or_update().await?;
            println!("index {} ready with {} fields", schema.name, schema.fields.len());
        }
        Command::IndexStats => {
            let stats = services.manager(cli).stats().await?;
            println!("index={} fields={}", stats.name, stats.field_count);
        }
        Command::DeleteIndex { yes } => {
            if !yes {
                bail!("refusing to delete index {} without --yes", cli.index_name);
            }
            services.manager(cli).delete().await?;
            println!("index {} deleted", cli.index_name);
        }
        Command::Ingest {
            file,
            client_id,
            document_id,
            document_name,
            strategy,
            chunk_size,
            chunk_overlap,
            batch_size,
        } => {
            let manager = services.manager(cli);
            if !manager.exists().await? {
                manager.create_or_update().await?;
            }

            let pages = read_text_pages(file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let chunker = TextChunker::new(ChunkingConfig {
                strategy: *strategy,
                chunk_size: *chunk_size,
                chunk_overlap: *chunk_overlap,
                ..ChunkingConfig::default()
            })?;

            let document_id = document_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
            let document_name = document_name.clone().unwrap_or_else(|| {
                file.file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_else(|| document_id.clone())
            });

            let chunks: Vec<_> = chunker
                .chunk_pages(&pages, &document_id, client_id)?
                .into_iter()
                .map(|chunk| chunk.with_document_name(document_name.as_str()))
                .collect();

            let indexer = services.indexer().with_batch_size(*batch_size);
            let (report, replaced) = indexer
                .replace_document_chunks(&document_id, client_id, &chunks)
                .await?;
            for failure in &report.errors {
                warn!(record_id = %failure.record_id, error = %failure.error_message, "chunk not indexed");
            }
            println!(
                "document_id={} pages={} chunks={} indexed={} failed={} replaced={}",
                document_id,
                pages.len(),
                chunks.len(),
                report.indexed_count,
                report.failed_count,
                replaced.deleted_count
            );
        }
        Command::Search {
            query,
            client_id,
            mode,
            top,
            min_score,
            document_id,
            section_type,
            json,
        } => {
            let mut search_query = SearchQuery::new(query.as_str(), client_id.as_str())
                .with_mode(*mode)
                .with_top(*top)
                .with_min_score(*min_score);
            if let Some(document_id) = document_id {
                search_query = search_query.with_document(document_id.as_str());
            }
            if let Some(section_type) = section_type {
                search_query = search_query.with_section_type(section_type.as_str());
            }

            let response = services.search().search(&search_query).await?;
            print_response(&response, *json)?;
        }
        Command::Similar {
            chunk_id,
            client_id,
            top,
            exclude_same_document,
            json,
        } => {
            let response = services
                .search()
                .find_similar(chunk_id, client_id, *top, *exclude_same_document)
                .await?;
            print_response(&response, *json)?;
        }
        Command::DeleteDocument {
            document_id,
            client_id,
        } => {
            let report = services.indexer().delete_document_chunks(document_id, client_id).await?;
            println!("document_id={document_id} deleted={}", report.deleted_count);
        }
        Command::Count {
            document_id,
            client_id,
        } => {
            let count = services.indexer().count_document_chunks(document_id, client_id).await?;
            println!("document_id={document_id} chunks={count}");
        }
    }

    Ok(())
}

fn print_response(response: &SearchResponse, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
        return Ok(());
    }

    println!(
        "query: {} mode={} results={} time_ms={:.1}",
        response.query(),
        response.mode(),
        response.total_count(),
        response.search_time_ms()
    );
    for result in response.results() {
        println!(
            "[{}] score={:.4} rerank={:.4} chunk={} document_id={} page={}",
            result.chunk_index,
            result.score,
            result.reranker_score.unwrap_or(result.score),
            result.id,
            result.document_id,
            result
                .page_number
                .or(result.page_start)
                .map(|page| page.to_string())
                .unwrap_or_else(|| "-".to_string())
        );
        if let Some(title) = &result.section_title {
            println!("  section={title}");
        }
        println!("  {}", result.content);
    }
    Ok(())
}
