use super::app_config::LogLevel;
use crate::domain::entities::ImageSize;
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(
    name = "pixcache",
    version,
    about = "Loads images through a memory and disk cache",
    long_about = None
)]
pub struct CliArgs {
    /// Image URIs or local paths to load.
    #[arg(value_name = "URI", required = true)]
    pub uris: Vec<String>,

    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Decode size as WIDTHxHEIGHT.
    #[arg(short, long, value_name = "WxH")]
    pub size: Option<ImageSize>,

    /// Disk cache directory.
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Concurrent loads per pool.
    #[arg(long)]
    pub threads: Option<usize>,

    /// Only load images that are already cached.
    #[arg(long)]
    pub deny_network: bool,

    /// Buffer whole downloads before decoding.
    #[arg(long)]
    pub slow_network: bool,

    /// Clear the memory cache before loading.
    #[arg(long)]
    pub clear_memory: bool,

    /// Clear the disk cache before loading.
    #[arg(long)]
    pub clear_disk: bool,
}
