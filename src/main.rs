use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::Result;
use futures_util::future::join_all;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use pixcache::application::ImageLoader;
use pixcache::domain::entities::Scheme;
use pixcache::infrastructure::{AppConfig, CliArgs, ConfigStorage, build_configuration};

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = config.effective_log_path() {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry().with(filter).init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let storage = ConfigStorage::new()?;
    let mut config = storage.load_config(args.config.as_deref())?;
    config.merge_with_args(args);
    Ok(config)
}

/// Bare local paths become `file://` URIs.
fn normalize_uri(uri: &str) -> String {
    if Scheme::of(uri) == Scheme::Unknown && Path::new(uri).exists() {
        match std::fs::canonicalize(uri) {
            Ok(path) => Scheme::File.wrap_path(&path),
            Err(_) => uri.to_string(),
        }
    } else {
        uri.to_string()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();

    let args = CliArgs::parse();
    let config = load_config(&args)?;
    init_logging(&config)?;

    info!(version = pixcache::VERSION, "Starting {}", pixcache::NAME);

    let loader = Arc::new(ImageLoader::new());
    loader.init(build_configuration(&config)?)?;
    loader.deny_network_downloads(config.network.deny_network)?;
    loader.handle_slow_network(config.network.slow_network)?;

    if args.clear_memory {
        loader.clear_memory_cache()?;
    }
    if args.clear_disk {
        loader.clear_disk_cache().await?;
        info!("Disk cache cleared");
    }

    let size = args.size;
    let requests = args.uris.iter().map(|uri| {
        let loader = Arc::clone(&loader);
        let uri = normalize_uri(uri);
        async move {
            let result = loader.load(&uri, size, None).await;
            (uri, result)
        }
    });

    let mut failures = 0usize;
    for (uri, result) in join_all(requests).await {
        match result {
            Ok(Some(loaded)) => println!("{uri} -> {} ({})", loaded.size(), loaded.source),
            Ok(None) => println!("{uri} -> empty"),
            Err(e) => {
                failures += 1;
                warn!(uri = %uri, error = %e, "Load failed");
                println!("{uri} -> {e}");
            }
        }
    }

    loader.destroy().await;

    if failures > 0 {
        color_eyre::eyre::bail!("{failures} of {} images failed to load", args.uris.len());
    }
    Ok(())
}
