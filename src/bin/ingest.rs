use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use policychat::config::AppConfig;
use policychat::ingest::Ingestor;
use policychat::openai::OpenAiClient;

#[derive(Parser, Debug)]
#[command(name = "ingest")]
#[command(about = "Ingest the HR policy PDF into a local vector index")]
struct Cli {
    /// Path to the source PDF
    #[arg(long)]
    pdf: PathBuf,

    /// Override the configured chunk size in characters
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Override the configured chunk overlap in characters
    #[arg(long)]
    chunk_overlap: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = AppConfig::from_env()?;
    if let Some(size) = cli.chunk_size {
        config.chunks.chunk_size = size;
    }
    if let Some(overlap) = cli.chunk_overlap {
        config.chunks.chunk_overlap = overlap;
    }
    config.validate()?;

    let client = OpenAiClient::new(config.api_base_url.clone(), config.api_key.clone());
    let ingestor = Ingestor::new(config, client);

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    bar.set_message("embedding chunks");

    let report = ingestor
        .ingest(&cli.pdf, |done, total| {
            if bar.length().unwrap_or(0) != total as u64 {
                bar.set_length(total as u64);
            }
            bar.set_position(done as u64);
        })
        .await?;
    bar.finish_and_clear();

    println!(
        "Ingestion complete. Pages: {}. Chunks: {}. Index saved to: {}",
        report.page_count,
        report.chunk_count,
        report.index_dir.display()
    );

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
