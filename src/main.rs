use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::anyhow;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use http::{HeaderValue, Method, header};
use tokio::net::TcpListener;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use waav_media_bridge::{ServerConfig, routes, state::AppState};

const RATE_LIMIT_DISABLED_AT: u32 = 100_000;

/// How long in-flight calls get to finish after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// WaaV Media Bridge - telephony media streams bridged to the OpenAI Realtime API
#[derive(Parser, Debug)]
#[command(name = "waav-media-bridge")]
#[command(version, about, long_about = None)]
struct Cli {
    /// YAML configuration file; environment variables are used when omitted
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env must be loaded before RUST_LOG and the config are read
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tungstenite=warn,hyper=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Needed by both the TLS listener and the wss:// realtime client
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();
    let config = match cli.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            ServerConfig::from_file(&path).map_err(|e| anyhow!(e.to_string()))?
        }
        None => ServerConfig::from_env().map_err(|e| anyhow!(e.to_string()))?,
    };

    if config.openai_api_key.is_none() {
        warn!("OPENAI_API_KEY is not set; every call will fail to connect");
    }

    let socket_addr: SocketAddr = config
        .address()
        .parse()
        .map_err(|e| anyhow!("Invalid server address '{}': {}", config.address(), e))?;
    info!(
        model = %config.realtime_model,
        audio_format = config.audio_format.map(|f| f.as_str()).unwrap_or("default"),
        max_concurrent_calls = ?config.max_concurrent_calls,
        greeting = config.greeting_enabled,
        "Starting media bridge on {socket_addr}"
    );

    let tls = config.tls.clone();
    let app = with_transport_layers(routes::create_app(AppState::new(config.clone())), &config)?;

    match tls {
        Some(tls) => {
            let rustls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
                .await
                .map_err(|e| {
                    anyhow!(
                        "Failed to load TLS certificates from {} and {}: {}",
                        tls.cert_path.display(),
                        tls.key_path.display(),
                        e
                    )
                })?;

            let handle = axum_server::Handle::new();
            let shutdown = handle.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                shutdown.graceful_shutdown(Some(SHUTDOWN_GRACE));
            });

            info!("Listening on https://{socket_addr} (media stream at wss://{socket_addr}/media-stream)");
            axum_server::bind_rustls(socket_addr, rustls_config)
                .handle(handle)
                .serve(app.into_make_service_with_connect_info::<SocketAddr>())
                .await
                .map_err(|e| anyhow!("TLS server error: {}", e))?;
        }
        None => {
            info!("Listening on http://{socket_addr} (media stream at ws://{socket_addr}/media-stream)");
            let listener = TcpListener::bind(&socket_addr).await?;
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        }
    }

    info!("Media bridge stopped");
    Ok(())
}

/// CORS, per-IP rate limiting and security headers around the app routes.
fn with_transport_layers(app: Router, config: &ServerConfig) -> anyhow::Result<Router> {
    let security_headers = tower::ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ));

    // Disabled entirely at very high rates, for load tests
    let rps = config.rate_limit_requests_per_second;
    let governor_layer = if rps < RATE_LIMIT_DISABLED_AT {
        let governor_config = GovernorConfigBuilder::default()
            .per_second(rps as u64)
            .burst_size(config.rate_limit_burst_size)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow!("Failed to build rate limiter config"))?;
        Some(GovernorLayer::new(governor_config))
    } else {
        info!("Rate limiting disabled (rate >= {RATE_LIMIT_DISABLED_AT}/s)");
        None
    };

    Ok(app
        .layer(cors_layer(config.cors_allowed_origins.as_deref()))
        .layer(tower::util::option_layer(governor_layer))
        .layer(security_headers))
}

/// Only the health check is fetched from browsers; the media stream is
/// server-to-server.
fn cors_layer(origins: Option<&str>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);
    match origins {
        Some("*") => base.allow_origin(Any),
        Some(list) => {
            let origins: Vec<HeaderValue> = list
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            base.allow_origin(origins).allow_credentials(true)
        }
        // Same-origin only
        None => base,
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining calls");
}
