use anyhow::{Context, Result};
use clap::Parser;
use fanitude_server::background_jobs::jobs::CacheSweepJob;
use fanitude_server::background_jobs::{spawn_jobs, BackgroundJob};
use fanitude_server::cache::ArtistCache;
use fanitude_server::config::{AppConfig, CliConfig, FileConfig};
use fanitude_server::spotify::SpotifyClient;
use fanitude_server::store::SqliteFanStore;
use fanitude_server::sync::SyncService;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite fanitude database file.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// Path to an optional TOML config file; its values override CLI args.
    #[clap(long, value_parser = parse_path)]
    pub config_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config_file {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let config = AppConfig::resolve(
        &CliConfig {
            db_path: cli_args.db_path,
            port: cli_args.port,
        },
        file_config,
    )?;

    info!("Opening fanitude database at {:?}...", config.db_path);
    let store = Arc::new(SqliteFanStore::new(&config.db_path)?);

    let cache = Arc::new(ArtistCache::new(
        Duration::from_secs(config.cache.ttl_secs),
        Duration::from_secs(config.cache.dead_after_secs),
    ));

    let spotify = Arc::new(SpotifyClient::new(&config.spotify)?);

    let sync = SyncService::new(
        cache.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        spotify,
        Duration::from_secs(config.sync.deadline_secs),
    );

    let cancellation_token = CancellationToken::new();

    let sweep_job: Arc<dyn BackgroundJob> = Arc::new(CacheSweepJob::new(
        cache.clone(),
        Duration::from_secs(config.cache.sweep_interval_secs),
    ));
    let job_handles = spawn_jobs(vec![sweep_job], cancellation_token.clone());

    {
        let cancellation_token = cancellation_token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
                cancellation_token.cancel();
            }
        });
    }

    info!("Ready to serve at port {}!", config.port);
    fanitude_server::run_server(sync, config.port, cancellation_token).await?;

    for handle in job_handles {
        let _ = handle.await;
    }
    info!("Bye!");
    Ok(())
}
