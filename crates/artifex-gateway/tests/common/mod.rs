//! Shared test helpers for gateway integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use artifex_event_store::{EventStore, InMemoryEventRepository};
use artifex_generation::application::{CommandBus, QueryBus};
use artifex_generation::notifier::{EventNotifier, EventSink};
use artifex_generation::projections::ProjectionStore;
use artifex_test_support::FixedClock;

use artifex_gateway::auth::DevTokenAuth;
use artifex_gateway::registry::ConnectionRegistry;
use artifex_gateway::routes;
use artifex_gateway::state::AppState;

/// Build the full app over an in-memory event store and a fixed clock.
/// Uses the same route structure as `main.rs`.
pub fn build_test_app() -> (Router, AppState) {
    let store = Arc::new(EventStore::new(Arc::new(InMemoryEventRepository::new())));
    let projections = Arc::new(ProjectionStore::new(1));
    let registry = Arc::new(ConnectionRegistry::new());
    let notifier = Arc::new(EventNotifier::new(Arc::clone(&projections)));
    notifier.add_sink(Arc::clone(&registry) as Arc<dyn EventSink>);
    notifier.attach(&store);

    let clock = Arc::new(FixedClock(
        chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2026, 1, 15, 10, 0, 0).unwrap(),
    ));
    let state = AppState::new(
        Arc::new(CommandBus::new(Arc::clone(&store), clock)),
        Arc::new(QueryBus::new(Arc::clone(&projections), store, false)),
        projections,
        registry,
        Arc::new(DevTokenAuth),
    );

    let router = Router::new()
        .merge(routes::health::router())
        .merge(routes::ws::router())
        .with_state(state.clone());
    (router, state)
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}
