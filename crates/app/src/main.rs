mod server;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use hmo_rag_core::{
    build_index_from_dir, form_template, load_prompt_or, validate, AzureOpenAiClient,
    AzureOpenAiConfig, CharacterNgramEmbedder, ChatCompleter, Embedder, FieldExtractor,
    DocumentIntelligenceClient, DocumentIntelligenceConfig, ExtractionReport, FilePromptLoader,
    IndexHandle, IndexOptions, IndexStore, JsonFileStore, DEFAULT_QA_PROMPT, QA_PROMPT_FILE,
};
use server::AppState;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "hmo-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Azure OpenAI resource endpoint
    #[arg(long, global = true, env = "AZURE_OPENAI_ENDPOINT")]
    azure_endpoint: Option<String>,

    /// Azure OpenAI API key
    #[arg(long, global = true, env = "AZURE_OPENAI_KEY", hide_env_values = true)]
    azure_key: Option<String>,

    #[arg(
        long,
        global = true,
        env = "AZURE_OPENAI_API_VERSION",
        default_value = "2024-06-01"
    )]
    azure_api_version: String,

    #[arg(
        long,
        global = true,
        env = "AZURE_OPENAI_CHAT_DEPLOYMENT",
        default_value = "gpt-4o-mini"
    )]
    chat_deployment: String,

    #[arg(
        long,
        global = true,
        env = "AZURE_OPENAI_EMBEDDINGS_DEPLOYMENT",
        default_value = "text-embedding-3-large"
    )]
    embeddings_deployment: String,

    /// Azure Document Intelligence endpoint used by `extract` (falls back to AZURE_ENDPOINT)
    #[arg(long, global = true, env = "AZURE_DOCUMENTINTELLIGENCE_ENDPOINT")]
    document_intelligence_endpoint: Option<String>,

    /// Falls back to AZURE_KEY
    #[arg(
        long,
        global = true,
        env = "AZURE_DOCUMENTINTELLIGENCE_KEY",
        hide_env_values = true
    )]
    document_intelligence_key: Option<String>,

    /// Folder of HTML knowledge-base documents
    #[arg(long, global = true, env = "DATA_DIR", default_value = "phase2_data")]
    data_dir: PathBuf,

    /// Persisted index file
    #[arg(long, global = true, env = "INDEX_PATH", default_value = "index/phase2_index.json")]
    index_path: String,

    #[arg(long, global = true, env = "PROMPTS_DIR", default_value = "prompts")]
    prompts_dir: PathBuf,

    #[arg(long, global = true, env = "REQUEST_TIMEOUT_SECS", default_value = "60")]
    request_timeout_secs: u64,

    /// Use the local character n-gram embedder instead of Azure OpenAI.
    #[arg(long, global = true, default_value_t = false)]
    offline: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Normalize, chunk and embed the data folder, then persist the index.
    BuildIndex {
        #[arg(long, default_value = "1100")]
        chunk_max_chars: usize,
        #[arg(long, default_value = "200")]
        chunk_overlap_chars: usize,
        #[arg(long, default_value = "256")]
        embed_batch_size: usize,
    },
    /// Rank indexed snippets against a query.
    Search {
        #[arg(long)]
        query: String,
        #[arg(long, default_value = "5")]
        top_k: usize,
    },
    /// Validate an extracted form JSON file against the form template.
    Validate {
        #[arg(long)]
        file: PathBuf,
    },
    /// OCR a form, extract its fields with the chat model and validate them.
    Extract {
        #[arg(long)]
        file: PathBuf,
        /// Only print the first OCR characters.
        #[arg(long, default_value_t = false)]
        preview: bool,
    },
    /// Serve health, search, qa and validate over HTTP.
    Serve {
        #[arg(long, env = "PORT", default_value = "8000")]
        port: u16,
    },
}

impl Cli {
    fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn azure_client(&self) -> anyhow::Result<Option<Arc<AzureOpenAiClient>>> {
        let (Some(endpoint), Some(key)) = (&self.azure_endpoint, &self.azure_key) else {
            return Ok(None);
        };

        let mut config = AzureOpenAiConfig::new(endpoint, key);
        config.api_version = self.azure_api_version.clone();
        config.chat_deployment = self.chat_deployment.clone();
        config.embeddings_deployment = self.embeddings_deployment.clone();
        config.timeout = self.timeout();
        Ok(Some(Arc::new(AzureOpenAiClient::new(config)?)))
    }

    fn embedder(
        &self,
        azure: Option<&Arc<AzureOpenAiClient>>,
    ) -> anyhow::Result<Arc<dyn Embedder>> {
        if self.offline {
            return Ok(Arc::new(CharacterNgramEmbedder::default()));
        }
        match azure {
            Some(client) => Ok(Arc::clone(client) as Arc<dyn Embedder>),
            None => bail!(
                "AZURE_OPENAI_ENDPOINT and AZURE_OPENAI_KEY are required (or pass --offline)"
            ),
        }
    }

    fn ocr_engine(&self) -> anyhow::Result<DocumentIntelligenceClient> {
        let endpoint = self
            .document_intelligence_endpoint
            .clone()
            .or_else(|| std::env::var("AZURE_ENDPOINT").ok())
            .context("AZURE_DOCUMENTINTELLIGENCE_ENDPOINT is required for extraction")?;
        let key = self
            .document_intelligence_key
            .clone()
            .or_else(|| std::env::var("AZURE_KEY").ok())
            .context("AZURE_DOCUMENTINTELLIGENCE_KEY is required for extraction")?;

        let mut config = DocumentIntelligenceConfig::new(endpoint, key);
        config.timeout = self.timeout();
        Ok(DocumentIntelligenceClient::new(config)?)
    }
}

fn ensure_valid(report: &ExtractionReport, file: &Path) -> anyhow::Result<()> {
    if !report.is_valid() {
        bail!(
            "fields extracted from {} are not valid ({} issue(s))",
            file.display(),
            report.issues.len()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        offline = cli.offline,
        "hmo-rag boot"
    );

    let azure = cli.azure_client()?;
    let store = JsonFileStore::new();

    match &cli.command {
        Command::BuildIndex {
            chunk_max_chars,
            chunk_overlap_chars,
            embed_batch_size,
        } => {
            let embedder = cli.embedder(azure.as_ref())?;
            let options = IndexOptions {
                chunk_max_chars: *chunk_max_chars,
                chunk_overlap_chars: *chunk_overlap_chars,
                embed_batch_size: *embed_batch_size,
            };
            let index = build_index_from_dir(&cli.data_dir, embedder.as_ref(), &options).await?;
            store.save(&cli.index_path, &index).await?;

            println!(
                "{} chunks from {} written to {} at {}",
                index.len(),
                cli.data_dir.display(),
                cli.index_path,
                Utc::now().to_rfc3339()
            );
        }
        Command::Search { query, top_k } => {
            let embedder = cli.embedder(azure.as_ref())?;
            let index = store
                .load(&cli.index_path)
                .await
                .with_context(|| format!("unable to load index {}", cli.index_path))?;
            let hits = index.search(embedder.as_ref(), query, *top_k).await?;

            println!("query: {query}");
            for (rank, hit) in hits.iter().enumerate() {
                println!(
                    "[{}] score={:.4} source={} chunk={}",
                    rank + 1,
                    hit.score,
                    hit.source,
                    hit.chunk_id
                );
                println!("{}", hit.text);
            }
        }
        Command::Validate { file } => {
            let raw = std::fs::read_to_string(file)
                .with_context(|| format!("unable to read {}", file.display()))?;
            let payload: serde_json::Value = serde_json::from_str(&raw)?;
            let issues = validate(&payload, &form_template());

            if issues.is_empty() {
                println!("valid");
            } else {
                for issue in &issues {
                    println!("- {issue}");
                }
                bail!("{} validation issue(s) in {}", issues.len(), file.display());
            }
        }
        Command::Extract { file, preview } => {
            let completer: Arc<dyn ChatCompleter> = match &azure {
                Some(client) => Arc::clone(client) as Arc<dyn ChatCompleter>,
                None => {
                    bail!("AZURE_OPENAI_ENDPOINT and AZURE_OPENAI_KEY are required for extraction")
                }
            };
            let ocr = cli.ocr_engine()?;
            let prompts = FilePromptLoader::new(&cli.prompts_dir);
            let extractor = FieldExtractor::new(&ocr, completer.as_ref(), &prompts);

            let bytes = tokio::fs::read(file)
                .await
                .with_context(|| format!("unable to read {}", file.display()))?;
            let file_name = file
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default();

            if *preview {
                println!("{}", extractor.preview(&bytes, &file_name).await?);
            } else {
                let report = extractor.run(&bytes, &file_name).await?;
                if report.payload.is_none() {
                    warn!(file = %file.display(), "model output could not be parsed");
                }
                println!("{}", serde_json::to_string_pretty(&report)?);
                ensure_valid(&report, file)?;
            }
        }
        Command::Serve { port } => {
            let embedder = cli.embedder(azure.as_ref())?;
            let index = IndexHandle::empty();
            if let Err(error) = index.reload_from(&store, &cli.index_path).await {
                warn!(
                    path = %cli.index_path,
                    %error,
                    "index unavailable, serving in degraded mode"
                );
            }

            let prompts = FilePromptLoader::new(&cli.prompts_dir);
            let qa_prompt = load_prompt_or(&prompts, QA_PROMPT_FILE, DEFAULT_QA_PROMPT);
            let completer = azure
                .as_ref()
                .map(|client| Arc::clone(client) as Arc<dyn ChatCompleter>);

            let state = AppState {
                index: Arc::new(index),
                embedder,
                completer,
                qa_prompt: Arc::from(qa_prompt),
            };
            server::serve(state, *port).await?;
        }
    }

    Ok(())
}
