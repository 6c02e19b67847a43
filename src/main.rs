//! matchday-back binary entrypoint wiring the interaction webhook, the outbox SSE stream,
//! and the event store.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use matchday_back::{
    config::AppConfig,
    dao::event_store::MemoryEventStore,
    routes,
    services::{payment::HttpPaymentGateway, session_sweeper, sse_events},
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let payments =
        HttpPaymentGateway::from_env(config.payment()).context("building payment client")?;
    let app_state = AppState::new(config, Arc::new(payments));

    install_event_store(&app_state).await;
    tokio::spawn(session_sweeper::run(app_state.clone()));
    tokio::spawn(watch_degraded(app_state.clone()));

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// MongoDB when `MONGO_URI` is set, the in-memory store otherwise.
async fn install_event_store(state: &SharedState) {
    #[cfg(feature = "mongo-store")]
    {
        if env::var_os("MONGO_URI").is_some() {
            use matchday_back::dao::{
                event_store::{
                    EventStore,
                    mongodb::{MongoConfig, MongoEventStore},
                },
                storage::StorageError,
            };
            use matchday_back::services::storage_supervisor;

            info!("MONGO_URI set; supervising MongoDB event store");
            let settings = state.config().store().clone();
            tokio::spawn(storage_supervisor::run(state.clone(), move || {
                let settings = settings.clone();
                async move {
                    let config = MongoConfig::from_env(&settings).await?;
                    let store = MongoEventStore::connect(config).await?;
                    Ok::<Arc<dyn EventStore>, StorageError>(Arc::new(store))
                }
            }));
            return;
        }
    }

    warn!("no persistent store configured; events are kept in memory");
    state
        .set_event_store(Arc::new(MemoryEventStore::new()))
        .await;
}

/// Forward degraded mode changes to outbox subscribers.
async fn watch_degraded(state: SharedState) {
    let mut watcher = state.degraded_watcher();
    while watcher.changed().await.is_ok() {
        let degraded = *watcher.borrow_and_update();
        sse_events::broadcast_system_status(&state, degraded);
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
