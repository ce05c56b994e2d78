//! Manual smoke-test binary: wires a concrete HTTP Model Client provider and
//! SQLite Store together and drives ingest -> query from the command line.
//! Not a served API; carries no routing, auth, or request-validation logic.
//!
//! Usage:
//!   rag-demo ingest <path-to-pdf> [--title TITLE]
//!   rag-demo ask "<question>"
//!   rag-demo stats
//!   rag-demo reprocess-all

use onboarding_rag::config::RagConfig;
use onboarding_rag::model_client::{HttpModelProvider, ModelClient};
use onboarding_rag::store::SqliteStore;
use onboarding_rag::{Answerer, Ingestor, Retriever, StatsReporter};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        print_usage();
        std::process::exit(1);
    };

    let config = RagConfig::load(Some("onboarding_rag.toml"))?;
    let store = Arc::new(SqliteStore::connect(&config.store).await?);
    let provider = Arc::new(HttpModelProvider::new(
        config.model_client.provider_url.clone(),
        config.model_client.api_key.clone(),
        config.model_client.text_model.clone(),
        config.model_client.embedding_model.clone(),
        Duration::from_millis(config.model_client.request_timeout_ms),
    )?);
    let model_client = Arc::new(ModelClient::spawn(provider, config.model_client.clone()));

    match command.as_str() {
        "ingest" => {
            let Some(path) = args.get(1) else {
                eprintln!("usage: rag-demo ingest <path-to-pdf> [--title TITLE]");
                std::process::exit(1);
            };
            let title = parse_flag(&args, "--title");

            let ingestor = Ingestor::new(
                store.clone(),
                model_client.clone(),
                config.chunker.clone(),
                config.embedder.clone(),
            );
            let bytes = tokio::fs::read(path).await?;
            let summary = ingestor
                .process_document(&bytes, title.as_deref(), None, Some(path))
                .await?;
            info!(document_id = %summary.document_id, chunks = summary.chunk_count, "ingested document");
            println!(
                "ingested \"{}\": {} chunks, {} embedded",
                summary.title, summary.chunk_count, summary.embedded_chunk_count
            );
            if summary.embedding_partial {
                println!("warning: some chunks failed to embed; rerun reprocess-all to retry");
            }
        }
        "ask" => {
            let Some(question) = args.get(1) else {
                eprintln!("usage: rag-demo ask \"<question>\"");
                std::process::exit(1);
            };

            let retriever = Retriever::new(store.clone(), model_client.clone(), config.retriever.clone());
            let answerer = Answerer::new(retriever, model_client.clone(), config.answerer.clone());

            match answerer.answer(question, None).await {
                Ok(answer) => {
                    println!("{}\n", answer.answer);
                    println!(
                        "confidence: {:.2} ({} source(s), {:.2}s)",
                        answer.confidence,
                        answer.sources.len(),
                        answer.response_time_seconds
                    );
                    for source in &answer.sources {
                        println!(
                            "  - {} (section {}, relevance {:.2}): {}",
                            source.document_title,
                            source.chunk_index + 1,
                            source.relevance_score,
                            source.excerpt()
                        );
                    }
                }
                Err(e) => {
                    error!(error = %e, "failed to answer question");
                    std::process::exit(1);
                }
            }
        }
        "stats" => {
            let stats = StatsReporter::new(store.clone()).compute().await?;
            println!("documents:            {}", stats.total_documents);
            println!("chunks:               {}", stats.total_chunks);
            println!("words:                {}", stats.total_words);
            println!("documents embedded:   {}", stats.documents_with_embeddings);
            println!("avg chunks/document:  {:.2}", stats.avg_chunks_per_document);
            println!("ready:                {}", stats.is_ready);
            println!("document types:");
            for (document_type, count) in &stats.document_type_distribution {
                println!("  - {document_type}: {count}");
            }
        }
        "reprocess-all" => {
            let ingestor = Ingestor::new(
                store.clone(),
                model_client.clone(),
                config.chunker.clone(),
                config.embedder.clone(),
            );
            let report = ingestor.reprocess_all_documents().await?;
            println!("reprocessed {} document(s)", report.processed);
            for (document_id, message) in &report.errors {
                println!("  error on {document_id}: {message}");
            }
        }
        other => {
            eprintln!("unknown command: {other}");
            print_usage();
            std::process::exit(1);
        }
    }

    Ok(())
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn print_usage() {
    eprintln!("usage:");
    eprintln!("  rag-demo ingest <path-to-pdf> [--title TITLE]");
    eprintln!("  rag-demo ask \"<question>\"");
    eprintln!("  rag-demo stats");
    eprintln!("  rag-demo reprocess-all");
}
