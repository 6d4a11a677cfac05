use crate::api::parse_expires_in;
use crate::errors::ApiError;
use crate::ids;
use crate::openapi::AUTHORIZATION_TAG;
use crate::state::AppState;
use crate::store::{epoch_to_rfc3339, now_epoch, Developer, NewAuthRequest};
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::post,
    Extension, Json, Router,
};
use grantd_policy::{Effect, RequestContext};
use http::StatusCode;
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

const DEFAULT_EXPIRES_IN: &str = "24h";

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AuthorizeRequest {
    agent_id: String,
    principal_id: String,
    scopes: Vec<String>,
    #[serde(default)]
    redirect_uri: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    expires_in: Option<String>,
    #[serde(default)]
    audience: Option<String>,
    #[serde(default)]
    code_challenge: Option<String>,
    #[serde(default)]
    code_challenge_method: Option<String>,
}

/// Start the consent flow for an agent/principal/scope triple.
///
/// The policy engine runs first: a matching deny fails the call, a matching
/// allow skips human consent and issues a code immediately, and no match
/// falls through to a pending request plus consent URL.
#[utoipa::path(
    post,
    path = "/v1/authorize",
    tag = AUTHORIZATION_TAG,
    request_body = AuthorizeRequest,
    responses(
        (status = 201, description = "Authorization request created"),
        (status = 400, description = "Invalid request payload"),
        (status = 403, description = "Denied by policy"),
        (status = 404, description = "Agent not found"),
    )
)]
async fn authorize_handler(
    State(state): State<AppState>,
    Extension(developer): Extension<Developer>,
    Json(body): Json<AuthorizeRequest>,
) -> Result<Response, ApiError> {
    if body.agent_id.is_empty() || body.principal_id.is_empty() || body.scopes.is_empty() {
        return Err(ApiError::bad_request(
            "agentId, principalId, and scopes are required",
        ));
    }

    // PKCE is S256-only.
    if let Some(method) = body.code_challenge_method.as_deref() {
        if method != "S256" {
            return Err(ApiError::bad_request(format!(
                "Unsupported codeChallengeMethod: {method} (only S256 is supported)"
            )));
        }
    }

    state
        .store
        .active_agent(&developer.id, &body.agent_id)?
        .ok_or_else(|| ApiError::not_found("Agent not found"))?;

    let rules: Vec<grantd_policy::Policy> = state
        .store
        .list_policies(&developer.id)?
        .iter()
        .map(|record| record.to_rule())
        .collect();
    let effect = grantd_policy::evaluate(
        &rules,
        &RequestContext {
            agent_id: &body.agent_id,
            principal_id: &body.principal_id,
            scopes: &body.scopes,
            now_hhmm: None,
        },
    );

    if effect == Some(Effect::Deny) {
        return Err(ApiError::policy_denied("Authorization denied by policy"));
    }

    let expires_in = body.expires_in.as_deref().unwrap_or(DEFAULT_EXPIRES_IN);
    let expires_secs = parse_expires_in(expires_in)
        .ok_or_else(|| ApiError::bad_request(format!("Invalid expiresIn format: {expires_in}")))?;
    let expires_at = now_epoch() + expires_secs;

    let auto_approve = effect == Some(Effect::Allow);
    let code = auto_approve.then(ids::new_code);

    let request = state.store.create_auth_request(NewAuthRequest {
        agent_id: &body.agent_id,
        principal_id: &body.principal_id,
        developer_id: &developer.id,
        scopes: &body.scopes,
        redirect_uri: body.redirect_uri.as_deref(),
        state: body.state.as_deref(),
        code_challenge: body.code_challenge.as_deref(),
        audience: body.audience.as_deref(),
        expires_in,
        expires_at,
        status: if auto_approve { "approved" } else { "pending" },
        code: code.as_deref(),
    })?;

    let consent_url = format!("{}/consent?req={}", state.config.issuer, request.id);
    let mut response = json!({
        "authRequestId": request.id,
        "consentUrl": consent_url,
        "expiresAt": epoch_to_rfc3339(expires_at),
    });
    if auto_approve {
        response["policyEnforced"] = json!(true);
        response["effect"] = json!("allow");
        response["code"] = json!(code);
    }

    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// Developer-side approval, used by trusted backends and tests; the
/// principal-facing flow lives under `/v1/consent`.
#[utoipa::path(
    post,
    path = "/v1/authorize/{id}/approve",
    tag = AUTHORIZATION_TAG,
    params(("id" = String, Path, description = "Authorization request id")),
    responses(
        (status = 200, description = "Request approved, code issued"),
        (status = 404, description = "Request not found or already processed"),
    )
)]
async fn approve_handler(
    State(state): State<AppState>,
    Extension(developer): Extension<Developer>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let code = ids::new_code();
    let issued = state
        .store
        .approve_auth_request(&developer.id, &id, &code)?
        .ok_or_else(|| ApiError::not_found("Auth request not found or already processed"))?;

    Ok(Json(json!({
        "requestId": id,
        "status": "approved",
        "code": issued,
    }))
    .into_response())
}

#[utoipa::path(
    post,
    path = "/v1/authorize/{id}/deny",
    tag = AUTHORIZATION_TAG,
    params(("id" = String, Path, description = "Authorization request id")),
    responses(
        (status = 200, description = "Request denied"),
        (status = 404, description = "Request not found or already processed"),
    )
)]
async fn deny_handler(
    State(state): State<AppState>,
    Extension(developer): Extension<Developer>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    if !state.store.deny_auth_request(&developer.id, &id)? {
        return Err(ApiError::not_found(
            "Auth request not found or already processed",
        ));
    }
    Ok(Json(json!({ "requestId": id, "status": "denied" })).into_response())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/authorize", post(authorize_handler))
        .route("/v1/authorize/{id}/approve", post(approve_handler))
        .route("/v1/authorize/{id}/deny", post(deny_handler))
}

#[cfg(test)]
mod tests {
    use crate::test_utils::TestFixture;
    use http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn pending_request_returns_consent_url() {
        let fixture = TestFixture::new().await;
        let response = fixture
            .post(
                "/v1/authorize",
                &json!({
                    "agentId": fixture.agent.id,
                    "principalId": "user_1",
                    "scopes": ["read"]
                }),
            )
            .await;
        response.assert_status(StatusCode::CREATED);
        assert!(response.json["consentUrl"]
            .as_str()
            .unwrap()
            .contains("/consent?req=areq_"));
        assert!(response.json.get("code").is_none());
    }

    #[tokio::test]
    async fn missing_fields_are_rejected() {
        let fixture = TestFixture::new().await;
        let response = fixture
            .post(
                "/v1/authorize",
                &json!({
                    "agentId": fixture.agent.id,
                    "principalId": "user_1",
                    "scopes": []
                }),
            )
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_agent_is_404() {
        let fixture = TestFixture::new().await;
        let response = fixture
            .post(
                "/v1/authorize",
                &json!({
                    "agentId": "ag_missing",
                    "principalId": "user_1",
                    "scopes": ["read"]
                }),
            )
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(response.json["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn plain_pkce_method_is_rejected() {
        let fixture = TestFixture::new().await;
        let response = fixture
            .post(
                "/v1/authorize",
                &json!({
                    "agentId": fixture.agent.id,
                    "principalId": "user_1",
                    "scopes": ["read"],
                    "codeChallenge": "abc",
                    "codeChallengeMethod": "plain"
                }),
            )
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn deny_policy_blocks_authorization() {
        let fixture = TestFixture::new().await;
        fixture.create_policy("deny", 10, None).await;

        let response = fixture
            .post(
                "/v1/authorize",
                &json!({
                    "agentId": fixture.agent.id,
                    "principalId": "user_1",
                    "scopes": ["read"]
                }),
            )
            .await;
        response.assert_status(StatusCode::FORBIDDEN);
        assert_eq!(response.json["code"], "POLICY_DENIED");
    }

    #[tokio::test]
    async fn allow_policy_skips_consent() {
        let fixture = TestFixture::new().await;
        fixture.create_policy("allow", 10, None).await;

        let response = fixture
            .post(
                "/v1/authorize",
                &json!({
                    "agentId": fixture.agent.id,
                    "principalId": "user_1",
                    "scopes": ["read"]
                }),
            )
            .await;
        response.assert_status(StatusCode::CREATED);
        assert_eq!(response.json["policyEnforced"], true);
        assert!(response.json["code"].is_string());
    }

    #[tokio::test]
    async fn higher_priority_deny_beats_allow() {
        let fixture = TestFixture::new().await;
        fixture.create_policy("deny", 10, None).await;
        fixture.create_policy("allow", 5, None).await;

        let response = fixture
            .post(
                "/v1/authorize",
                &json!({
                    "agentId": fixture.agent.id,
                    "principalId": "user_1",
                    "scopes": ["read"]
                }),
            )
            .await;
        response.assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn approve_then_deny_is_not_found() {
        let fixture = TestFixture::new().await;
        let request_id = fixture.authorize_pending("user_1", &["read"]).await;

        let approved = fixture
            .post(
                &format!("/v1/authorize/{request_id}/approve"),
                &json!({}),
            )
            .await;
        approved.assert_status(StatusCode::OK);
        assert!(approved.json["code"].is_string());

        let denied = fixture
            .post(&format!("/v1/authorize/{request_id}/deny"), &json!({}))
            .await;
        denied.assert_status(StatusCode::NOT_FOUND);
    }
}
