use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use tandem_api::auth::AppStateInner;
use tandem_api::push::PushNotifier;
use tandem_api::sweep::run_sweep_loop;
use tandem_realtime::RealtimeConfig;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tandem_server=debug,tandem_api=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret = std::env::var("TANDEM_JWT_SECRET").unwrap_or_default();
    if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
        eprintln!("FATAL: TANDEM_JWT_SECRET is unset or still a placeholder.");
        eprintln!("       It must match the secret your auth service signs tokens with.");
        std::process::exit(1);
    }

    let db_path: PathBuf = std::env::var("TANDEM_DB_PATH")
        .unwrap_or_else(|_| "tandem.db".into())
        .into();
    let host = std::env::var("TANDEM_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("TANDEM_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let sweep_secs: u64 = std::env::var("TANDEM_SWEEP_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(30);
    let push = match std::env::var("TANDEM_PUSH_WEBHOOK_URL") {
        Ok(url) if !url.trim().is_empty() => {
            info!("Push delivery via {}", url);
            Some(PushNotifier::new(url))
        }
        _ => {
            warn!("TANDEM_PUSH_WEBHOOK_URL not set, push notifications disabled");
            None
        }
    };
    let realtime = RealtimeConfig::from_env();

    let db = tandem_db::Database::open(&db_path)?;
    let state = AppStateInner::new(db, jwt_secret, push);

    tokio::spawn(run_sweep_loop(
        state.clone(),
        realtime.typing_ttl,
        realtime.ring_timeout,
        Duration::from_secs(sweep_secs),
    ));

    let app = tandem_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Tandem server listening on {}", addr);
    info!(
        "Typing TTL {:?}, ring timeout {:?}, sweep every {}s",
        realtime.typing_ttl, realtime.ring_timeout, sweep_secs
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
