use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, Level};

use genai_stack::external::{EmbeddingEngine, LLMEngine, QdrantVectorDB};
use genai_stack::normalize::NormalizedDocument;
use genai_stack::{ChatHistory, Config, QueryDispatcher, SearchMethod, StackModel, VectorSearch};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Override the configured search method
    #[arg(short = 'm', long)]
    method: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Retrieve documents for a query and print them as JSON
    Search { query: String },
    /// Answer a question with the configured model
    Ask {
        question: String,
        /// Answer through the conversational retrieval chain
        #[arg(long)]
        chat: bool,
        /// Answer from the model alone, without retrieval
        #[arg(long, conflicts_with = "chat")]
        no_retriever: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    let config = Config::from_env()?;

    let level = Level::from_str(&config.log_level).unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    let method = match &args.method {
        Some(raw) => SearchMethod::from_str(raw)?,
        None => config.vector_db.search_method,
    };

    let embedder = Arc::new(EmbeddingEngine::new(config.embedding.clone())?);
    let store: Arc<dyn VectorSearch> =
        Arc::new(QdrantVectorDB::new(config.vector_db.clone(), embedder)?);
    let dispatcher = QueryDispatcher::new(store, method, config.vector_db.search_options.clone())
        .with_policy(config.backend.clone());

    match args.command {
        Command::Search { query } => {
            let documents = dispatcher.search(&query).await?;
            info!(count = documents.len(), %method, "search complete");
            let documents: Vec<NormalizedDocument> = documents.iter().map(Into::into).collect();
            println!("{}", serde_json::to_string_pretty(&documents)?);
        }
        Command::Ask {
            question,
            chat,
            no_retriever,
        } => {
            let llm = Arc::new(LLMEngine::new(config.llm.clone())?);
            let chat = chat || (config.llm.chat && !no_retriever);
            let mut model = StackModel::new(llm).with_chat(chat);
            if !no_retriever {
                model = model.with_retriever(dispatcher);
            }

            let mut history = ChatHistory::new();
            println!("{}", model.predict(question, &mut history).await?);
        }
    }

    Ok(())
}
