use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

use rag_indexer::database::QdrantConfig;
use rag_indexer::gemini::{GeminiClient, GeminiConfig};
use rag_indexer::ingest::{IngestConfig, IngestService};
use rag_indexer::rag::RagGateway;
use rag_indexer::server::{self, AppState};

/// Document indexing and query service that batches updates into a Qdrant-backed RAG index
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Address to bind the HTTP server to
    #[arg(long, env = "RAG_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, env = "RAG_PORT", default_value_t = 26808)]
    port: u16,

    /// API key required on index, delete, query and stats requests
    #[arg(long, env = "RAG_AUTH_KEY")]
    auth_key: Option<String>,

    /// Seconds between checks of the pending queue
    #[arg(long, default_value_t = 1)]
    tick_interval_secs: u64,

    /// Seconds without new documents before the queue is flushed
    #[arg(long, default_value_t = 5)]
    inactivity_secs: u64,

    /// Qdrant collection holding the indexed chunks
    #[arg(long, env = "RAG_COLLECTION", default_value = "rag_documents")]
    collection: String,

    /// Dimension of the embedding vectors
    #[arg(long, default_value_t = 768)]
    embedding_dim: u64,

    /// Leave pending documents unflushed on shutdown
    #[arg(long)]
    no_flush_on_shutdown: bool,
}

#[actix_web::main]
async fn main() -> Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    // Load configuration from environment
    let qdrant_config = QdrantConfig::from_env().context("Missing QDRANT_URL")?;
    let gemini_config = GeminiConfig::from_env().context("Missing GEMINI_API_KEY")?;

    let gateway = RagGateway::new(
        qdrant_config,
        &args.collection,
        args.embedding_dim,
        GeminiClient::new(gemini_config),
    );

    let ingest_config = IngestConfig {
        tick_interval: Duration::from_secs(args.tick_interval_secs.max(1)),
        inactivity_threshold: Duration::from_secs(args.inactivity_secs),
        flush_on_shutdown: !args.no_flush_on_shutdown,
    };
    let service = Arc::new(IngestService::new(Arc::new(gateway), ingest_config));
    service
        .start()
        .await
        .context("Failed to start ingest service")?;

    if args.auth_key.is_some() {
        info!("API auth key is set");
    } else {
        warn!("API auth key is NOT set. The API is open.");
    }

    let state = web::Data::new(AppState {
        service: service.clone(),
        auth_key: args.auth_key,
    });

    let listen_addr = format!("{}:{}", args.host, args.port);
    info!("Starting server on {}", listen_addr);

    let server_result = match HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(server::configure)
    })
    .bind(&listen_addr)
    {
        Ok(server) => server.run().await.context("HTTP server failed"),
        Err(e) => Err(e).with_context(|| format!("Failed to bind {}", listen_addr)),
    };

    info!("Application shutdown...");
    service
        .stop()
        .await
        .context("Failed to stop ingest service")?;

    server_result
}
