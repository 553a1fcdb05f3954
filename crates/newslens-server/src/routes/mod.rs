mod agents;
mod analyze;
mod health;

use agents::agents_router;
use analyze::analyze_router;
use axum::Router;
use health::health_router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .nest("/health", health_router())
        .nest("/api", analyze_router().merge(agents_router()))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
