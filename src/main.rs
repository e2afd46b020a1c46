use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::HeaderValue;
use clap::Parser;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reelshare::cache::VideoIndex;
use reelshare::config::Config;
use reelshare::mount::{MountStrategy, RootResolver, SystemRunner};
use reelshare::providers::{MetadataProvider, OmdbProvider};
use reelshare::routes;
use reelshare::scanner::VideoScanner;
use reelshare::state::AppState;

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "reelshare")]
#[command(about = "Media indexing and range-streaming server for local or SMB-mounted libraries")]
struct Cli {
    /// Server port (overrides config)
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::from_env()?;
    if let Some(port) = cli.port {
        config.server_port = port;
    }
    if let Some(host) = cli.host {
        config.server_host = host;
    }
    let config = Arc::new(config);

    let provider: Option<Arc<dyn MetadataProvider>> = match &config.omdb_api_key {
        Some(api_key) => {
            let provider = match &config.omdb_api_url {
                Some(base_url) => OmdbProvider::with_base_url(api_key.clone(), base_url.clone()),
                None => OmdbProvider::new(api_key.clone()),
            };
            info!(provider = provider.name(), "metadata enrichment enabled");
            Some(Arc::new(provider))
        }
        None => {
            info!("no metadata API key configured, serving unenriched records");
            None
        }
    };

    let strategy = MountStrategy::detect();
    info!(?strategy, "detected platform mount strategy");

    let resolver = Arc::new(RootResolver::new(
        config.smb_share_url.clone(),
        config.mount_point.clone(),
        config.media_dir.clone(),
        config.smb_credentials.clone(),
        strategy,
        Arc::new(SystemRunner),
    ));
    let root = resolver.resolve().await;
    info!(root = %root.display(), "effective media root established");

    let scanner = VideoScanner::new(provider, config.scan_concurrency, config.metadata_timeout);
    let index = Arc::new(VideoIndex::new(
        scanner,
        resolver.effective_root(),
        config.cache_ttl,
    ));

    let state = AppState {
        config: Arc::clone(&config),
        index,
        root: resolver.effective_root(),
        resolver,
    };

    let cors = if config.cors_allowed_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any).allow_methods(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_allowed_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
    };

    let app = routes::create_api_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port)
        .parse()
        .context("invalid listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
