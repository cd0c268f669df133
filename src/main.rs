//! media-dl server binary
//!
//! Environment:
//! - `MEDIA_DL_CONFIG` - path to a JSON config file (defaults apply when unset)
//! - `MEDIA_DL_BIND` - overrides `server.api.bind_address`
//! - `RUST_LOG` - log filter (default `media_dl=info,tower_http=info`)

use media_dl::{Config, MediaDownloader, run_with_shutdown};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "media_dl=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config()?;
    tracing::info!(
        bind_address = %config.server.api.bind_address,
        output_dir = %config.output_dir().display(),
        max_concurrent_jobs = config.jobs.max_concurrent_jobs,
        "Configuration loaded"
    );

    let downloader = Arc::new(MediaDownloader::new(config).await?);
    let _maintenance = downloader.spawn_maintenance();
    let server = downloader.spawn_api_server();

    tokio::select! {
        result = run_with_shutdown((*downloader).clone()) => result?,
        joined = server => {
            // The server only returns on error; still stop running jobs.
            downloader.shutdown().await?;
            joined??;
        }
    }

    Ok(())
}

fn load_config() -> media_dl::Result<Config> {
    let mut config = match std::env::var_os("MEDIA_DL_CONFIG") {
        Some(path) => Config::from_file(&PathBuf::from(path))?,
        None => Config::default(),
    };

    if let Ok(bind) = std::env::var("MEDIA_DL_BIND") {
        config.server.api.bind_address = bind.parse().map_err(|e| media_dl::Error::Config {
            message: format!("invalid MEDIA_DL_BIND '{bind}': {e}"),
            key: Some("bind_address".into()),
        })?;
    }

    Ok(config)
}
