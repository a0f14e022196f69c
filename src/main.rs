use std::{sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::HeaderValue;
use tokio::{net::TcpListener, signal};
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::{info, warn};

use storefront_api::{
    app_router,
    config::{init_tracing, load_config},
    db, events, openapi,
    sessions::{InMemorySessionStore, SessionLayer},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;
    init_tracing(config.log_level(), config.log_json);
    info!(
        environment = %config.environment,
        "Starting storefront API v{}",
        env!("CARGO_PKG_VERSION")
    );

    let pool = db::establish_connection_from_app_config(&config)
        .await
        .context("failed to connect to database")?;
    if config.auto_migrate {
        db::run_migrations(&pool)
            .await
            .context("failed to run migrations")?;
    }
    let pool = Arc::new(pool);

    let (event_sender, event_receiver) = events::channel(config.event_channel_capacity);
    tokio::spawn(events::process_events(event_receiver));

    let session_ttl = Duration::from_secs(config.session_ttl_secs);
    let sessions = Arc::new(SessionLayer {
        store: Arc::new(InMemorySessionStore::new(session_ttl)),
        cookie_name: config.session_cookie_name.clone(),
        ttl: session_ttl,
    });

    let cors = build_cors(&config);
    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState::new(pool, config, event_sender, sessions));

    let app = app_router(state)
        .merge(openapi::swagger_ui())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(cors);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

fn build_cors(config: &storefront_api::config::AppConfig) -> CorsLayer {
    match config.cors_allowed_origins.as_deref() {
        Some(origins) if !origins.trim().is_empty() => {
            let parsed: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|o| {
                    let o = o.trim();
                    HeaderValue::from_str(o)
                        .map_err(|_| warn!(origin = o, "skipping unparseable CORS origin"))
                        .ok()
                })
                .collect();
            CorsLayer::new()
                .allow_origin(tower_http::cors::AllowOrigin::list(parsed))
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any)
        }
        _ if config.is_development() => CorsLayer::permissive(),
        _ => CorsLayer::new(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
