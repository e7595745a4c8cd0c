use std::future::IntoFuture;
use std::sync::Arc;

use chrono::TimeDelta;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use fleetbook::api::{self, AppState};
use fleetbook::auth::TokenKeys;
use fleetbook::config::{Config, StoreKind};
use fleetbook::engine::Engine;
use fleetbook::limits::SHUTDOWN_DRAIN;
use fleetbook::store::{MemoryStore, PgStore, Store};

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(fmt::layer())
        .init();

    fleetbook::observability::init(config.metrics_port)?;

    let store: Arc<dyn Store> = match config.store {
        StoreKind::Memory => {
            tracing::warn!("using the in-memory store; data is lost on exit");
            Arc::new(MemoryStore::new())
        }
        StoreKind::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .connect_with(config.database.connect_options())
                .await?;
            let pg = PgStore::new(pool);
            pg.migrate().await?;
            info!("connected to postgres {}:{}/{}", config.database.host, config.database.port, config.database.name);
            Arc::new(pg)
        }
    };

    let engine = Arc::new(Engine::new(store));
    if let Some(seed) = &config.admin {
        let admin = engine.ensure_admin(&seed.name, &seed.email, &seed.password).await?;
        info!("admin account ready: {}", admin.id);
    }

    let reaper = tokio::spawn(fleetbook::reaper::run_reaper(engine.clone()));

    let tokens = Arc::new(TokenKeys::new(
        config.jwt_secret.as_bytes(),
        TimeDelta::hours(config.jwt_expiration_hours),
    ));
    let app = api::router(AppState::new(engine, tokens));

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("fleetbook listening on {addr}");
    info!("  env: {:?}", config.env);
    info!("  store: {:?}", config.store);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            info!("shutdown signal received, draining requests");
        })
        .into_future();
    tokio::pin!(server);

    // Once the signal fires, in-flight requests get SHUTDOWN_DRAIN to finish.
    tokio::select! {
        result = &mut server => result?,
        _ = async {
            shutdown_signal().await;
            tokio::time::sleep(SHUTDOWN_DRAIN).await;
        } => {
            tracing::warn!("drain timeout, dropping remaining connections");
        }
    }

    reaper.abort();
    info!("fleetbook stopped");
    Ok(())
}
