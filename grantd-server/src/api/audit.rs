use crate::errors::ApiError;
use crate::openapi::AUDIT_TAG;
use crate::state::AppState;
use crate::store::{AuditEntry, AuditFilter, Developer, NewAuditEntry};
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AppendEntryRequest {
    agent_id: String,
    agent_did: String,
    grant_id: String,
    principal_id: String,
    action: String,
    /// success | failure | blocked (defaults to success)
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AuditListQuery {
    #[serde(default)]
    agent_id: Option<String>,
    #[serde(default)]
    grant_id: Option<String>,
    #[serde(default)]
    principal_id: Option<String>,
    #[serde(default)]
    action: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AuditEntryResponse {
    id: String,
    agent_id: String,
    agent_did: String,
    grant_id: String,
    principal_id: String,
    developer_id: String,
    action: String,
    status: String,
    metadata: serde_json::Value,
    hash: String,
    prev_hash: Option<String>,
    timestamp: String,
}

impl From<AuditEntry> for AuditEntryResponse {
    fn from(entry: AuditEntry) -> Self {
        Self {
            id: entry.id,
            agent_id: entry.agent_id,
            agent_did: entry.agent_did,
            grant_id: entry.grant_id,
            principal_id: entry.principal_id,
            developer_id: entry.developer_id,
            action: entry.action,
            status: entry.status,
            metadata: entry.metadata,
            hash: entry.hash,
            prev_hash: entry.prev_hash,
            timestamp: entry.timestamp,
        }
    }
}

const VALID_STATUSES: [&str; 3] = ["success", "failure", "blocked"];

/// Append an entry to the developer's tamper-evident chain. Entries are
/// immutable once written; there is no update or delete surface.
#[utoipa::path(
    post,
    path = "/v1/audit/log",
    tag = AUDIT_TAG,
    request_body = AppendEntryRequest,
    responses(
        (status = 201, description = "Entry appended", body = AuditEntryResponse),
        (status = 400, description = "Missing required fields"),
    )
)]
async fn append_entry(
    State(state): State<AppState>,
    Extension(developer): Extension<Developer>,
    Json(body): Json<AppendEntryRequest>,
) -> Result<Response, ApiError> {
    if body.agent_id.is_empty()
        || body.agent_did.is_empty()
        || body.grant_id.is_empty()
        || body.principal_id.is_empty()
        || body.action.is_empty()
    {
        return Err(ApiError::bad_request(
            "agentId, agentDid, grantId, principalId, and action are required",
        ));
    }

    let status = body.status.unwrap_or_else(|| "success".to_string());
    if !VALID_STATUSES.contains(&status.as_str()) {
        return Err(ApiError::bad_request(
            "status must be success, failure, or blocked",
        ));
    }

    let entry = state.store.append_audit_entry(NewAuditEntry {
        agent_id: body.agent_id,
        agent_did: body.agent_did,
        grant_id: body.grant_id,
        principal_id: body.principal_id,
        developer_id: developer.id,
        action: body.action,
        status,
        metadata: body.metadata.unwrap_or_else(|| json!({})),
    })?;

    Ok((
        StatusCode::CREATED,
        Json(AuditEntryResponse::from(entry)),
    )
        .into_response())
}

#[utoipa::path(
    get,
    path = "/v1/audit",
    tag = AUDIT_TAG,
    params(AuditListQuery),
    responses(
        (status = 200, description = "Entries in chain order"),
    )
)]
async fn list_entries(
    State(state): State<AppState>,
    Extension(developer): Extension<Developer>,
    Query(query): Query<AuditListQuery>,
) -> Result<Response, ApiError> {
    let filter = AuditFilter {
        agent_id: query.agent_id,
        grant_id: query.grant_id,
        principal_id: query.principal_id,
        action: query.action,
    };
    let entries: Vec<AuditEntryResponse> = state
        .store
        .list_audit_entries(&developer.id, &filter)?
        .into_iter()
        .map(AuditEntryResponse::from)
        .collect();
    Ok(Json(json!({ "entries": entries })).into_response())
}

#[utoipa::path(
    get,
    path = "/v1/audit/{id}",
    tag = AUDIT_TAG,
    params(("id" = String, Path, description = "Audit entry id")),
    responses(
        (status = 200, description = "Audit entry", body = AuditEntryResponse),
        (status = 404, description = "Entry not found"),
    )
)]
async fn get_entry(
    State(state): State<AppState>,
    Extension(developer): Extension<Developer>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let entry = state
        .store
        .audit_entry_by_id(&developer.id, &id)?
        .ok_or_else(|| ApiError::not_found("Audit entry not found"))?;
    Ok(Json(AuditEntryResponse::from(entry)).into_response())
}

pub fn router() -> Router<AppState> {
    // Only POST (append) and GET are routed; PUT/DELETE on an entry answer
    // 405, which is the append-only contract.
    Router::new()
        .route("/v1/audit/log", post(append_entry))
        .route("/v1/audit", get(list_entries))
        .route("/v1/audit/{id}", get(get_entry))
}
