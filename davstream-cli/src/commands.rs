//! CLI command implementations

use std::path::PathBuf;

use clap::Subcommand;
use davstream_core::{CacheStore, DavstreamConfig, EncoderAvailability, Result};
use tracing::info;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the media server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
        /// Base URL of the WebDAV collection
        #[arg(long)]
        webdav_url: Option<String>,
        /// Directory for transformed renditions
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
    /// Check whether the video encoder can be started
    ProbeEncoder {
        /// Encoder binary, defaults to the configured one
        path: Option<PathBuf>,
    },
    /// Remove expired and over-budget cache entries once
    PruneCache {
        /// Cache directory, defaults to the configured one
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub async fn handle_command(command: Commands) -> Result<()> {
    let mut config = DavstreamConfig::from_env();

    match command {
        Commands::Serve {
            host,
            port,
            webdav_url,
            cache_dir,
        } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(url) = webdav_url {
                config.remote.base_url = url;
            }
            if let Some(dir) = cache_dir {
                config.cache.root = dir;
            }
            serve(config).await
        }
        Commands::ProbeEncoder { path } => {
            let binary = path.unwrap_or(config.transform.encoder_path);
            probe_encoder(binary).await
        }
        Commands::PruneCache { cache_dir } => {
            if let Some(dir) = cache_dir {
                config.cache.root = dir;
            }
            prune_cache(config).await
        }
    }
}

/// Start the HTTP server
///
/// # Errors
/// - `DavstreamError::Remote` - WebDAV client could not be configured
/// - `DavstreamError::Io` - Failed to bind to the address
pub async fn serve(config: DavstreamConfig) -> Result<()> {
    info!(
        host = %config.server.host,
        port = config.server.port,
        "Starting davstream"
    );
    davstream_web::run_server(config).await
}

/// Report encoder availability
///
/// # Errors
/// - `DavstreamError::Configuration` - The encoder cannot be started
pub async fn probe_encoder(binary: PathBuf) -> Result<()> {
    match EncoderAvailability::probe(&binary).await {
        EncoderAvailability::Available { binary, version } => {
            println!("Encoder available: {}", binary.display());
            println!("  {version}");
            Ok(())
        }
        EncoderAvailability::Unavailable { reason } => {
            Err(davstream_core::DavstreamError::Configuration {
                reason: format!("encoder {} unavailable: {reason}", binary.display()),
            })
        }
    }
}

/// Run one cache prune pass and print what it removed
///
/// # Errors
/// - `DavstreamError::Cache` - The cache directory could not be read
pub async fn prune_cache(config: DavstreamConfig) -> Result<()> {
    let cache = CacheStore::open(config.cache).await?;
    let report = cache.prune().await?;

    println!("Cache pruned: {}", cache.root().display());
    println!("  Expired entries:   {}", report.expired);
    println!("  Evicted entries:   {}", report.evicted);
    println!("  Stale temp files:  {}", report.stale_temp);
    println!("  Freed:             {} bytes", report.freed_bytes);
    println!("  Remaining:         {} bytes", report.remaining_bytes);
    Ok(())
}
