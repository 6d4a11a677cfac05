use crate::errors::ApiError;
use crate::openapi::GRANTS_TAG;
use crate::revocation;
use crate::state::AppState;
use crate::store::{epoch_to_rfc3339, Developer, Grant, GrantFilter};
use crate::verify::{self, Verification};
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

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GrantListQuery {
    #[serde(default)]
    agent_id: Option<String>,
    #[serde(default)]
    principal_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GrantResponse {
    grant_id: String,
    agent_id: String,
    principal_id: String,
    developer_id: String,
    scopes: Vec<String>,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_grant_id: Option<String>,
    delegation_depth: i64,
    issued_at: String,
    expires_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    revoked_at: Option<String>,
}

impl From<Grant> for GrantResponse {
    fn from(grant: Grant) -> Self {
        Self {
            grant_id: grant.id,
            agent_id: grant.agent_id,
            principal_id: grant.principal_id,
            developer_id: grant.developer_id,
            scopes: grant.scopes,
            status: grant.status,
            parent_grant_id: grant.parent_grant_id,
            delegation_depth: grant.delegation_depth,
            issued_at: epoch_to_rfc3339(grant.issued_at),
            expires_at: epoch_to_rfc3339(grant.expires_at),
            revoked_at: grant.revoked_at.map(epoch_to_rfc3339),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub(crate) struct VerifyRequest {
    token: String,
}

#[utoipa::path(
    get,
    path = "/v1/grants",
    tag = GRANTS_TAG,
    params(GrantListQuery),
    responses(
        (status = 200, description = "Grants matching the filters"),
    )
)]
async fn list_grants(
    State(state): State<AppState>,
    Extension(developer): Extension<Developer>,
    Query(query): Query<GrantListQuery>,
) -> Result<Response, ApiError> {
    let filter = GrantFilter {
        agent_id: query.agent_id,
        principal_id: query.principal_id,
        status: query.status,
    };
    let grants: Vec<GrantResponse> = state
        .store
        .list_grants(&developer.id, &filter)?
        .into_iter()
        .map(GrantResponse::from)
        .collect();
    Ok(Json(json!({ "grants": grants })).into_response())
}

#[utoipa::path(
    get,
    path = "/v1/grants/{id}",
    tag = GRANTS_TAG,
    params(("id" = String, Path, description = "Grant id")),
    responses(
        (status = 200, description = "Grant", body = GrantResponse),
        (status = 404, description = "Grant not found"),
    )
)]
async fn get_grant(
    State(state): State<AppState>,
    Extension(developer): Extension<Developer>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let grant = state
        .store
        .grant_by_id(&developer.id, &id)?
        .ok_or_else(|| ApiError::not_found("Grant not found"))?;
    Ok(Json(GrantResponse::from(grant)).into_response())
}

/// Revoke a grant and cascade through every active descendant.
#[utoipa::path(
    delete,
    path = "/v1/grants/{id}",
    tag = GRANTS_TAG,
    params(("id" = String, Path, description = "Grant id")),
    responses(
        (status = 204, description = "Grant and descendants revoked"),
        (status = 404, description = "Grant not found or already revoked"),
    )
)]
async fn revoke_grant(
    State(state): State<AppState>,
    Extension(developer): Extension<Developer>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    match revocation::revoke_grant_cascade(&state, &developer.id, &id).await? {
        Some(_) => Ok(StatusCode::NO_CONTENT.into_response()),
        None => Err(ApiError::not_found("Grant not found or already revoked")),
    }
}

/// Verify a grant token: signature, then revocation cache, then the
/// authoritative store.
#[utoipa::path(
    post,
    path = "/v1/grants/verify",
    tag = GRANTS_TAG,
    request_body = VerifyRequest,
    responses(
        (status = 200, description = "Verification verdict"),
        (status = 400, description = "Missing or malformed token"),
    )
)]
async fn verify_grant(
    State(state): State<AppState>,
    Extension(developer): Extension<Developer>,
    Json(body): Json<VerifyRequest>,
) -> Result<Response, ApiError> {
    if body.token.is_empty() {
        return Err(ApiError::bad_request("token is required"));
    }

    let verdict = verify::verify_grant_token(&state, &developer.id, &body.token).await?;
    let response = match verdict {
        Verification::Active(claims) => json!({
            "valid": true,
            "delegationDepth": claims.delegation_depth(),
            "claims": *claims,
        }),
        Verification::Inactive(reason) => json!({
            "valid": false,
            "reason": reason.to_string(),
        }),
    };
    Ok(Json(response).into_response())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/grants", get(list_grants))
        .route("/v1/grants/verify", post(verify_grant))
        .route("/v1/grants/{id}", get(get_grant).delete(revoke_grant))
}

#[cfg(test)]
mod tests {
    use crate::test_utils::TestFixture;
    use http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn grant_lifecycle_read_and_filter() {
        let fixture = TestFixture::new().await;
        let grant = fixture.root_grant_token("user_1", &["read"]).await;

        let fetched = fixture.get(&format!("/v1/grants/{}", grant.grant_id)).await;
        fetched.assert_status(StatusCode::OK);
        assert_eq!(fetched.json["status"], "active");
        assert_eq!(fetched.json["delegationDepth"], 0);

        let listed = fixture.get("/v1/grants?principalId=user_1").await;
        assert_eq!(listed.json["grants"].as_array().unwrap().len(), 1);

        let empty = fixture.get("/v1/grants?principalId=user_other").await;
        assert!(empty.json["grants"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn revoke_returns_204_then_404() {
        let fixture = TestFixture::new().await;
        let grant = fixture.root_grant_token("user_1", &["read"]).await;

        let revoked = fixture.delete(&format!("/v1/grants/{}", grant.grant_id)).await;
        revoked.assert_status(StatusCode::NO_CONTENT);

        let again = fixture.delete(&format!("/v1/grants/{}", grant.grant_id)).await;
        again.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn verify_active_then_revoked() {
        let fixture = TestFixture::new().await;
        let grant = fixture.root_grant_token("user_1", &["read"]).await;

        let active = fixture
            .post("/v1/grants/verify", &json!({ "token": grant.access_token }))
            .await;
        active.assert_status(StatusCode::OK);
        assert_eq!(active.json["valid"], true);
        assert_eq!(active.json["claims"]["sub"], "user_1");

        fixture.delete(&format!("/v1/grants/{}", grant.grant_id)).await;

        let revoked = fixture
            .post("/v1/grants/verify", &json!({ "token": grant.access_token }))
            .await;
        revoked.assert_status(StatusCode::OK);
        assert_eq!(revoked.json["valid"], false);
        assert_eq!(revoked.json["reason"], "revoked");
    }

    #[tokio::test]
    async fn verify_revoked_via_store_only_fallback() {
        let fixture = TestFixture::new_without_cache().await;
        let grant = fixture.root_grant_token("user_1", &["read"]).await;
        fixture.delete(&format!("/v1/grants/{}", grant.grant_id)).await;

        // The null cache never hits, so this verdict comes from the store.
        let revoked = fixture
            .post("/v1/grants/verify", &json!({ "token": grant.access_token }))
            .await;
        assert_eq!(revoked.json["valid"], false);
        assert_eq!(revoked.json["reason"], "revoked");
    }

    #[tokio::test]
    async fn verify_garbage_token_is_400() {
        let fixture = TestFixture::new().await;
        let response = fixture
            .post("/v1/grants/verify", &json!({ "token": "garbage" }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json["code"], "TOKEN_INVALID");
    }
}
