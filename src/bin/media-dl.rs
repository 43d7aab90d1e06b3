//! media-dl server: REST API in front of the download queue.
//!
//! Configuration is read from the JSON file named by `MEDIA_DL_CONFIG` (if
//! set), then `MEDIA_DL_*` environment overrides are applied. Log verbosity
//! follows `RUST_LOG` (default `info`).

use std::path::PathBuf;

use media_dl::{Config, MediaDownloader, run_with_shutdown};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const ENV_CONFIG_PATH: &str = "MEDIA_DL_CONFIG";

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();
}

fn load_config() -> media_dl::Result<Config> {
    let mut config = match std::env::var_os(ENV_CONFIG_PATH) {
        Some(path) => {
            let path = PathBuf::from(path);
            tracing::info!(path = %path.display(), "Loading configuration file");
            Config::from_json_file(&path)?
        }
        None => Config::default(),
    };
    config.apply_env_overrides()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config = load_config()?;
    tokio::fs::create_dir_all(config.library_dir()).await?;

    let downloader = MediaDownloader::new(config)?;
    let api = downloader.spawn_api_server();

    tokio::select! {
        result = api => {
            // The server only returns on bind or serve failure
            match result {
                Ok(Err(e)) => tracing::error!(error = %e, "API server failed"),
                Err(e) => tracing::error!(error = %e, "API server task aborted"),
                Ok(Ok(())) => {}
            }
            downloader.shutdown().await?;
        }
        result = run_with_shutdown(downloader.clone()) => result?,
    }

    Ok(())
}
