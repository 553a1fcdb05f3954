use axum::{Json, Router, extract::State, routing::get};
use newslens_core::AgentSpec;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
struct AgentsResponse {
    agents: Vec<AgentSpec>,
}

pub fn agents_router() -> Router<AppState> {
    Router::new().route("/agents", get(list_agents))
}

async fn list_agents(State(state): State<AppState>) -> Json<AgentsResponse> {
    let agents = state
        .run_service()
        .orchestrator()
        .registry()
        .specs()
        .iter()
        .map(|spec| spec.as_ref().clone())
        .collect();
    Json(AgentsResponse { agents })
}
