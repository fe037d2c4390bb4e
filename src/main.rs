use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use policychat::chat::ChatService;
use policychat::index::VectorIndex;
use policychat::openai::OpenAiClient;
use policychat::retrieval::Retriever;
use policychat::{run_server, AppConfig};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    dotenv::dotenv().ok();

    let config = AppConfig::from_env()?;

    let index = VectorIndex::load(&config.index_dir, &config.models.embedding_model)
        .context("failed to load the vector index; run the `ingest` binary first")?;
    tracing::info!(
        "loaded {} chunks from {} (embedding model {})",
        index.len(),
        config.index_dir.display(),
        index.manifest().embedding_model
    );

    let client = OpenAiClient::new(config.api_base_url.clone(), config.api_key.clone());
    let retriever = Retriever::new(
        client.clone(),
        Arc::new(index),
        config.models.chat_model.clone(),
        config.models.embedding_model.clone(),
        config.retrieve_top_k,
        config.source_label.clone(),
    );
    let chat = ChatService::new(
        client,
        retriever,
        config.models.chat_model.clone(),
        config.source_label.clone(),
        config.stage_timeout(),
    );

    run_server(config, chat).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
