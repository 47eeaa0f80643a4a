use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use medrag_core::config::{ProviderKind, StoreBackend, resolve_config_path};
use medrag_core::{Config, RagService};
use medrag_gateway::GatewayServer;
use medrag_llm::any::AnyProvider;
#[cfg(feature = "mock")]
use medrag_llm::mock::MockProvider;
use medrag_llm::openai::OpenAiProvider;
use medrag_memory::document::{MetadataFilter, NewDocument, TextLoader};
use medrag_memory::{
    Caller, CallerRole, InMemoryVectorStore, PgVectorStore, RolePolicy, VectorStore,
};
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(
    name = "medrag",
    version,
    about = "Ask questions over access-controlled healthcare documents"
)]
struct Cli {
    /// Config file (defaults to $MEDRAG_CONFIG, then config/default.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve,
    /// Chunk, embed and store a text or markdown file
    Ingest {
        file: PathBuf,
        /// Document title, defaults to the file name
        #[arg(long)]
        title: Option<String>,
        #[arg(long = "type", default_value = "general")]
        document_type: String,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        sensitive: bool,
        #[arg(long)]
        patient_id: Option<i64>,
        #[command(flatten)]
        caller: CallerArgs,
    },
    /// Rank document chunks against a query
    Search {
        query: String,
        #[arg(long)]
        limit: Option<usize>,
        /// Restrict to these document types (repeatable)
        #[arg(long = "type")]
        document_types: Vec<String>,
        #[arg(long)]
        filter_department: Option<String>,
        #[command(flatten)]
        caller: CallerArgs,
    },
    /// Answer a question from the documents the caller can read
    Ask {
        question: String,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        patient_id: Option<i64>,
        #[command(flatten)]
        caller: CallerArgs,
    },
}

#[derive(Args, Debug, Clone)]
struct CallerArgs {
    #[arg(long, env = "MEDRAG_USER_ID", default_value_t = 1)]
    user_id: i64,
    /// doctor, nurse or admin; anything else is treated as staff
    #[arg(long, env = "MEDRAG_USER_ROLE", default_value = "admin")]
    role: String,
    /// Caller's own department (not the document's)
    #[arg(id = "user_department", long = "user-department", env = "MEDRAG_USER_DEPARTMENT")]
    department: Option<String>,
}

impl CallerArgs {
    fn caller(&self) -> Caller {
        Caller::new(
            self.user_id,
            CallerRole::parse(&self.role),
            self.department.as_deref(),
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_subscriber();

    let config_path = resolve_config_path(cli.config.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    config.validate()?;

    let provider = Arc::new(create_provider(&config)?);
    let store = create_store(&config).await?;
    let service = Arc::new(RagService::from_config(
        &config,
        provider,
        store,
        Arc::new(RolePolicy),
    )?);

    match cli.command {
        Command::Serve => serve(&config, service).await,
        Command::Ingest {
            file,
            title,
            document_type,
            department,
            sensitive,
            patient_id,
            caller,
        } => {
            let loaded = TextLoader::default()
                .load(&file)
                .await
                .map_err(medrag_core::RagError::from)?;
            let document = NewDocument {
                title: title.unwrap_or_else(|| default_title(&file)),
                content: loaded.content,
                document_type,
                department,
                is_sensitive: sensitive,
                patient_id,
            };
            let report = service.ingest(&caller.caller(), document).await?;
            println!(
                "ingested {} as document {} ({} chunks)",
                loaded.source, report.document_id, report.chunk_count
            );
            Ok(())
        }
        Command::Search {
            query,
            limit,
            document_types,
            filter_department,
            caller,
        } => {
            let filter = MetadataFilter {
                department: filter_department,
                document_types,
                patient_id: None,
            };
            let results = service
                .search(&caller.caller(), &query, filter, limit)
                .await?;
            if results.is_empty() {
                println!("no matching documents");
            }
            for (rank, result) in results.iter().enumerate() {
                println!(
                    "{}. [{:.3}] {} (document {}, chunk {})\n   {}",
                    rank + 1,
                    result.similarity,
                    result.document_title,
                    result.document_id,
                    result.chunk_index,
                    excerpt(&result.chunk_excerpt, 200)
                );
            }
            Ok(())
        }
        Command::Ask {
            question,
            limit,
            patient_id,
            caller,
        } => {
            let filter = MetadataFilter {
                patient_id,
                ..MetadataFilter::default()
            };
            let answer = service
                .ask(&caller.caller(), &question, filter, limit)
                .await?;
            println!("{}", answer.response);
            if !answer.sources.is_empty() {
                println!("\nSources:");
                for source in &answer.sources {
                    println!(
                        "- {} (document {}, chunk {}, similarity {:.3})",
                        source.document_title,
                        source.document_id,
                        source.chunk_index,
                        source.similarity
                    );
                }
            }
            Ok(())
        }
    }
}

async fn serve(config: &Config, service: Arc<RagService<AnyProvider>>) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e:#}");
            return;
        }
        tracing::info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    GatewayServer::new(
        &config.gateway.bind,
        config.gateway.port,
        service,
        shutdown_rx,
    )
    .with_auth(config.gateway.auth_token.clone())
    .with_rate_limit(config.gateway.rate_limit)
    .with_max_body_size(config.gateway.max_body_size)
    .serve()
    .await?;
    Ok(())
}

fn create_provider(config: &Config) -> anyhow::Result<AnyProvider> {
    match config.llm.provider {
        ProviderKind::OpenAi => {
            let api_key = config.secrets.openai_api_key.as_ref().context(
                "OPENAI_API_KEY or MEDRAG_OPENAI_API_KEY is required for the openai provider",
            )?;
            let provider = OpenAiProvider::new(
                api_key.expose().to_owned(),
                config.llm.base_url.clone(),
                config.llm.completion_model.clone(),
                config.llm.embedding_model.clone(),
                config.llm.max_completion_tokens,
            )
            .with_temperature(config.llm.temperature)
            .with_retry_policy(config.llm.retry.policy());
            tracing::info!(
                model = provider.model(),
                embedding_model = provider.embedding_model(),
                "using openai provider"
            );
            Ok(AnyProvider::OpenAi(provider))
        }
        #[cfg(feature = "mock")]
        ProviderKind::Mock => {
            tracing::warn!("using mock provider, answers are canned");
            Ok(AnyProvider::Mock(
                MockProvider::default().with_dimensions(config.llm.embedding_dimensions),
            ))
        }
        #[allow(unreachable_patterns)]
        other => bail!(
            "LLM provider {} not available (feature not enabled)",
            other.as_str()
        ),
    }
}

async fn create_store(config: &Config) -> anyhow::Result<Arc<dyn VectorStore>> {
    let dimensions = config.llm.embedding_dimensions;
    match config.store.backend {
        StoreBackend::Postgres => {
            let store = PgVectorStore::connect(
                &config.store.database_url,
                config.store.max_connections,
                dimensions,
            )
            .await
            .context("failed to connect to the PostgreSQL vector store")?;
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store, documents are lost on exit");
            Ok(Arc::new(InMemoryVectorStore::new(dimensions)))
        }
    }
}

fn default_title(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map_or_else(|| "untitled".to_owned(), str::to_owned)
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let line = text.replace('\n', " ");
    if line.chars().count() <= max_chars {
        return line;
    }
    let mut out: String = line.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // stdout carries command output
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
