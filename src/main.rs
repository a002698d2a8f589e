//! timerag CLI application
//!
//! Command-line interface for the timerag library.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use timerag::api::INSUFFICIENT_INFORMATION;
use timerag::ml::embedder_from_config;
use timerag::utils::{format_file_size, parse_time, preview, unix_now};
use timerag::{
    Answer, Config, ContextPromptBuilder, Embedder, OpenAiChat, QueryContent, RagError, RagPipeline,
    RagQuery, Record, Retriever, TimeFilter, VectorStore, create_index_params, create_schema,
    extract_structured,
};

#[derive(Parser)]
#[command(name = "timerag")]
#[command(about = "Time-filtered semantic retrieval and retrieval-augmented answers")]
#[command(version)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the configured collection
    Create,

    /// Embed and insert documents from a JSON file
    Ingest {
        /// JSON array of {"id", "text", "ingest_time"?} objects
        input: PathBuf,
    },

    /// Search the collection
    Search {
        /// Search query
        query: String,

        /// Number of results to return
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Earliest ingestion time (unix seconds, RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,

        /// Latest ingestion time
        #[arg(long)]
        end: Option<String>,
    },

    /// Answer a question from the collection
    Ask {
        /// Question
        question: String,

        /// Number of documents to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Earliest ingestion time
        #[arg(long)]
        start: Option<String>,

        /// Latest ingestion time
        #[arg(long)]
        end: Option<String>,

        /// Parse the answer as JSON and pretty-print it
        #[arg(long)]
        structured: bool,
    },

    /// Show collections and store statistics
    Info,
}

#[derive(Deserialize)]
struct IngestItem {
    id: String,
    text: String,
    ingest_time: Option<i64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Create => create_command(&config)?,
        Commands::Ingest { input } => ingest_command(&config, input).await?,
        Commands::Search {
            query,
            top_k,
            start,
            end,
        } => {
            let filter = time_filter(start, end)?;
            search_command(&config, &query, top_k, filter).await?;
        }
        Commands::Ask {
            question,
            top_k,
            start,
            end,
            structured,
        } => {
            let filter = time_filter(start, end)?;
            ask_command(&config, question, top_k, filter, structured).await?;
        }
        Commands::Info => info_command(&config)?,
    }

    Ok(())
}

fn time_filter(start: Option<String>, end: Option<String>) -> anyhow::Result<TimeFilter> {
    Ok(TimeFilter {
        start: start.as_deref().map(parse_time).transpose()?,
        end: end.as_deref().map(parse_time).transpose()?,
    })
}

fn open_store(config: &Config) -> anyhow::Result<Arc<VectorStore>> {
    let store = VectorStore::open(&config.store.path)
        .with_context(|| format!("opening store {}", config.store.path))?;
    Ok(Arc::new(store))
}

fn create_command(config: &Config) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let schema = create_schema(
        &config.store.description,
        config.embedding.dimension,
        config.store.max_text_len,
    )?;
    let index_config = create_index_params(&schema, config.search.index)?;
    store.create_collection(&config.store.collection, schema, index_config)?;

    println!(
        "✅ Collection '{}' ready (dim {})",
        config.store.collection, config.embedding.dimension
    );
    Ok(())
}

async fn ingest_command(config: &Config, input: PathBuf) -> anyhow::Result<()> {
    let data = std::fs::read_to_string(&input)
        .with_context(|| format!("reading {}", input.display()))?;
    let items: Vec<IngestItem> = serde_json::from_str(&data)
        .with_context(|| format!("parsing {}", input.display()))?;

    let store = open_store(config)?;
    let embedder = embedder_from_config(&config.embedding, &config.llm)?;

    println!("📄 Embedding {} documents...", items.len());
    let now = unix_now();
    let mut records = Vec::with_capacity(items.len());
    for item in items {
        let vector = embedder.embed(&item.text).await?;
        records.push(Record::new(
            item.id,
            item.text,
            item.ingest_time.unwrap_or(now),
            vector,
        ));
    }

    let count = store.insert(&config.store.collection, records)?;
    println!("✅ Inserted {} records into '{}'", count, config.store.collection);
    Ok(())
}

async fn search_command(
    config: &Config,
    query: &str,
    top_k: Option<usize>,
    filter: TimeFilter,
) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let embedder = embedder_from_config(&config.embedding, &config.llm)?;
    let retriever = Retriever::new(store, embedder, &config.store.collection)?;

    let top_k = top_k.unwrap_or(config.search.num_results);
    let start_time = std::time::Instant::now();
    let results = retriever
        .search(QueryContent::Text(query), top_k, &filter)
        .await?;
    let elapsed = start_time.elapsed();

    println!(
        "🔍 Found {} results in {:.3}s:\n",
        results.len(),
        elapsed.as_secs_f64()
    );
    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{}] [Score: {:.3}] {}",
            i + 1,
            result.id,
            result.score,
            preview(&result.text, 100)
        );
    }
    Ok(())
}

async fn ask_command(
    config: &Config,
    question: String,
    top_k: Option<usize>,
    filter: TimeFilter,
    structured: bool,
) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let embedder = embedder_from_config(&config.embedding, &config.llm)?;
    let retriever = Retriever::new(store, embedder, &config.store.collection)?;
    let rag = RagPipeline::new(
        Arc::new(retriever),
        Arc::new(ContextPromptBuilder::default()),
        Arc::new(OpenAiChat::new(&config.llm)),
    );

    let query = RagQuery::new(question)
        .with_num_results(top_k.unwrap_or(config.search.num_results))
        .with_time_filter(filter);

    let answer = match rag.answer_or_decline(&query).await? {
        Answer::Answered(text) => text,
        Answer::InsufficientInformation => {
            println!("{}", INSUFFICIENT_INFORMATION);
            return Ok(());
        }
    };

    if structured {
        match extract_structured(&answer) {
            Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            Err(RagError::MalformedOutput { reason, raw }) => {
                eprintln!("❌ Model output is not valid JSON: {}", reason);
                println!("{}", raw);
            }
            Err(e) => return Err(e.into()),
        }
    } else {
        println!("{}", answer);
    }
    Ok(())
}

fn info_command(config: &Config) -> anyhow::Result<()> {
    let store = open_store(config)?;

    println!("📊 Store: {}", config.store.path);
    println!(
        "   Size: {}",
        format_file_size(store.file_size()? as u64)
    );

    let names = store.list_collections();
    if names.is_empty() {
        println!("   No collections");
    }
    for name in names {
        let info = store.collection_info(&name)?;
        println!(
            "   {}: {} records, dim {}, max text {} chars",
            info.name, info.record_count, info.schema.dim, info.schema.max_text_len
        );
    }
    Ok(())
}
