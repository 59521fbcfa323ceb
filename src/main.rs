use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tubefeed::common::logger;
use tubefeed::configs::Config;
use tubefeed::download::{DownloadManager, QualityCache, YtDlp};
use tubefeed::server::AppState;
use tubefeed::sources::YouTubeSource;
use tubefeed::storage::MemoryStorage;
use tubefeed::transport;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load();
    logger::init(&config);

    let youtube = YouTubeSource::new(config.youtube.clone())?;
    let cache = QualityCache::new(&config.downloads.cache_dir)?;
    let ytdlp = Arc::new(YtDlp::new(
        config.downloads.ytdlp_path.clone(),
        config.downloads.cookies_path.clone().map(PathBuf::from),
    ));
    let downloads = Arc::new(DownloadManager::new(
        ytdlp.clone(),
        cache,
        Duration::from_millis(config.downloads.progress_throttle_ms),
    ));

    let state = Arc::new(AppState {
        youtube,
        storage: Arc::new(MemoryStorage::new()),
        downloads,
        ytdlp,
        config: config.clone(),
    });

    let app = transport::http_server::router(state)
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let address: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", address);

    let listener = tokio::net::TcpListener::bind(address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
