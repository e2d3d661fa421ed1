use anyhow::{Context, Result};
use clap::Parser;
use feedpipe::{Aggregator, Config, ContentExtractor, ExtractedItem, JinaExtractor, SourceFetcher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Get the default config file path (~/.config/feedpipe/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("feedpipe")
        .join("config.toml"))
}

#[derive(Parser, Debug)]
#[command(name = "feedpipe", about = "Aggregate RSS/Atom feeds with optional full-text extraction")]
struct Args {
    /// Config file (defaults to ~/.config/feedpipe/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the snapshot as JSON instead of a listing
    #[arg(long)]
    json: bool,

    /// Enable full-text extraction regardless of the config file
    #[arg(long)]
    extract: bool,
}

fn build_extractor(config: &Config, client: &reqwest::Client) -> Result<Arc<dyn ContentExtractor>> {
    // Env var takes precedence over config file
    let api_key = std::env::var("JINA_API_KEY")
        .ok()
        .or_else(|| config.extraction.jina_api_key.clone());

    let mut extractor = JinaExtractor::new(client.clone()).with_api_key(api_key);
    if let Some(base) = &config.extraction.jina_base_url {
        extractor = extractor
            .with_base_url(base)
            .context("Invalid extraction base URL")?;
    }
    Ok(Arc::new(extractor))
}

fn print_items(mut items: Vec<ExtractedItem>, json: bool) -> Result<()> {
    // Newest first; undated entries last
    items.sort_by(|a, b| b.item.published.cmp(&a.item.published));

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&items).context("Failed to serialize items")?
        );
        return Ok(());
    }

    for entry in &items {
        let date = entry
            .item
            .published
            .map(|p| p.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "----------------".to_string());
        let marker = if entry.content_extracted { "+" } else { " " };
        println!(
            "{} {} [{}] {}  {}",
            date, marker, entry.item.source, entry.item.title, entry.item.link
        );
    }
    println!("{} items", items.len());
    Ok(())
}

async fn run_once(aggregator: &Aggregator, cancel: &CancellationToken, json: bool) -> Result<()> {
    if let Err(e) = aggregator.fetch_all(cancel).await {
        tracing::warn!(error = %e, "Aggregation finished with errors");
        if let Some(report) = aggregator.last_report() {
            for failure in &report.failures {
                eprintln!("{} ({}): {}", failure.name, failure.url, failure.error);
            }
        }
    }
    print_items(aggregator.items(), json)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    if args.extract {
        config.extraction.enabled = true;
    }

    if config.sources.is_empty() {
        eprintln!("Warning: no [[sources]] configured in {}", config_path.display());
    }

    let client = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;
    let extractor = if config.extraction.enabled {
        Some(build_extractor(&config, &client)?)
    } else {
        None
    };
    let refresh = Duration::from_secs(config.refresh_interval_minutes.saturating_mul(60));
    let fetcher = SourceFetcher::new(client, config.fetch_timeout());
    let aggregator = Aggregator::new(Arc::new(config), fetcher, extractor);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, cancelling");
            on_signal.cancel();
        }
    });

    if refresh.is_zero() {
        return run_once(&aggregator, &cancel, args.json).await;
    }

    let mut ticker = tokio::time::interval(refresh);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => run_once(&aggregator, &cancel, args.json).await?,
        }
    }

    Ok(())
}
