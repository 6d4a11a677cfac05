use crate::errors::ApiError;
use crate::openapi::AGENTS_TAG;
use crate::state::AppState;
use crate::store::{epoch_to_rfc3339, Agent, Developer};
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RegisterAgentRequest {
    /// Display name shown on consent screens
    name: String,
    #[serde(default)]
    description: Option<String>,
    /// Scopes the agent intends to request
    #[serde(default)]
    scopes: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AgentResponse {
    id: String,
    did: String,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    scopes: Vec<String>,
    status: String,
    created_at: String,
}

impl From<Agent> for AgentResponse {
    fn from(agent: Agent) -> Self {
        Self {
            id: agent.id,
            did: agent.did,
            name: agent.name,
            description: agent.description,
            scopes: agent.scopes,
            status: agent.status,
            created_at: epoch_to_rfc3339(agent.created_at),
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/agents",
    tag = AGENTS_TAG,
    request_body = RegisterAgentRequest,
    responses(
        (status = 201, description = "Agent registered", body = AgentResponse),
        (status = 400, description = "Missing name"),
    )
)]
async fn register_agent(
    State(state): State<AppState>,
    Extension(developer): Extension<Developer>,
    Json(body): Json<RegisterAgentRequest>,
) -> Result<Response, ApiError> {
    if body.name.is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }

    let agent = state.store.create_agent(
        &developer.id,
        &body.name,
        body.description.as_deref(),
        &body.scopes,
    )?;

    Ok((StatusCode::CREATED, Json(AgentResponse::from(agent))).into_response())
}

#[utoipa::path(
    get,
    path = "/v1/agents",
    tag = AGENTS_TAG,
    responses(
        (status = 200, description = "Agents owned by the caller"),
    )
)]
async fn list_agents(
    State(state): State<AppState>,
    Extension(developer): Extension<Developer>,
) -> Result<Response, ApiError> {
    let agents: Vec<AgentResponse> = state
        .store
        .list_agents(&developer.id)?
        .into_iter()
        .map(AgentResponse::from)
        .collect();
    Ok(Json(serde_json::json!({ "agents": agents })).into_response())
}

#[utoipa::path(
    get,
    path = "/v1/agents/{id}",
    tag = AGENTS_TAG,
    params(("id" = String, Path, description = "Agent id")),
    responses(
        (status = 200, description = "Agent", body = AgentResponse),
        (status = 404, description = "Agent not found"),
    )
)]
async fn get_agent(
    State(state): State<AppState>,
    Extension(developer): Extension<Developer>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let agent = state
        .store
        .agent_by_id(&developer.id, &id)?
        .ok_or_else(|| ApiError::not_found("Agent not found"))?;
    Ok(Json(AgentResponse::from(agent)).into_response())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/agents", post(register_agent).get(list_agents))
        .route("/v1/agents/{id}", get(get_agent))
}
