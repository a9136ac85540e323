//! Artifex gateway server entry point.

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use artifex_core::clock::SystemClock;
use artifex_core::repository::EventRepository;
use artifex_event_store::{EventStore, InMemoryEventRepository, PgEventRepository};
use artifex_generation::application::{CommandBus, QueryBus};
use artifex_generation::notifier::{EventNotifier, EventSink};
use artifex_generation::projections::ProjectionStore;

use artifex_gateway::auth::DevTokenAuth;
use artifex_gateway::config::{EventStoreBackend, GatewayConfig};
use artifex_gateway::registry::ConnectionRegistry;
use artifex_gateway::routes;
use artifex_gateway::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Artifex gateway");

    let config = GatewayConfig::from_env()?;

    // Select the event repository backend.
    let repository: Arc<dyn EventRepository> = match config.backend {
        EventStoreBackend::Memory => {
            tracing::info!("using in-memory event store");
            Arc::new(InMemoryEventRepository::new())
        }
        EventStoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or("DATABASE_URL must be set when EVENT_STORE=postgres")?;
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await?;
            let repository = PgEventRepository::new(pool);
            repository.ensure_schema().await?;
            tracing::info!("using postgres event store");
            Arc::new(repository)
        }
    };

    // Wire store, read side, and buses.
    let store = Arc::new(EventStore::new(repository));
    let projections = Arc::new(ProjectionStore::new(config.workers_available));
    let registry = Arc::new(ConnectionRegistry::new());
    let notifier = Arc::new(EventNotifier::new(Arc::clone(&projections)));
    notifier.add_sink(Arc::clone(&registry) as Arc<dyn EventSink>);
    notifier.attach(&store);

    let command_bus = Arc::new(CommandBus::new(Arc::clone(&store), Arc::new(SystemClock)));
    let query_bus = Arc::new(QueryBus::new(
        Arc::clone(&projections),
        store,
        config.enable_event_history,
    ));

    let app_state = AppState::new(
        command_bus,
        query_bus,
        projections,
        registry,
        Arc::new(DevTokenAuth),
    );

    // Build router.
    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    let app = Router::new()
        .merge(routes::health::router())
        .merge(routes::ws::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server.
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| format!("invalid HOST:PORT combination: {e}"))?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
