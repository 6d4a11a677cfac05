//! Principal-facing consent endpoints. These are public: the principal
//! holding the consent URL is not an API-key caller.

use crate::errors::ApiError;
use crate::ids;
use crate::openapi::AUTHORIZATION_TAG;
use crate::state::AppState;
use crate::store::{epoch_to_rfc3339, now_epoch};
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

#[utoipa::path(
    get,
    path = "/v1/consent/{id}",
    tag = AUTHORIZATION_TAG,
    params(("id" = String, Path, description = "Authorization request id")),
    responses(
        (status = 200, description = "Request details for the consent screen"),
        (status = 404, description = "Request not found"),
        (status = 410, description = "Request expired or already processed"),
    )
)]
async fn consent_details(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let (request, agent) = state
        .store
        .auth_request_with_agent(&id)?
        .ok_or_else(|| ApiError::not_found("Auth request not found"))?;

    if request.status != "pending" || request.expires_at <= now_epoch() {
        return Err(ApiError::gone("Auth request expired or already processed"));
    }

    Ok(Json(json!({
        "id": request.id,
        "agentName": agent.name,
        "agentDid": agent.did,
        "agentDescription": agent.description,
        "scopes": request.scopes,
        "expiresAt": epoch_to_rfc3339(request.expires_at),
        "status": request.status,
    }))
    .into_response())
}

#[utoipa::path(
    post,
    path = "/v1/consent/{id}/approve",
    tag = AUTHORIZATION_TAG,
    params(("id" = String, Path, description = "Authorization request id")),
    responses(
        (status = 200, description = "Approved; authorization code issued"),
        (status = 410, description = "Request expired or already processed"),
    )
)]
async fn consent_approve(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let code = ids::new_code();
    let request = state
        .store
        .consent_approve(&id, &code)?
        .ok_or_else(|| ApiError::gone("Auth request expired or already processed"))?;

    let mut response = json!({ "code": code });
    if let Some(redirect_uri) = request.redirect_uri {
        response["redirectUri"] = json!(redirect_uri);
    }
    if let Some(state_param) = request.state {
        response["state"] = json!(state_param);
    }
    Ok(Json(response).into_response())
}

#[utoipa::path(
    post,
    path = "/v1/consent/{id}/deny",
    tag = AUTHORIZATION_TAG,
    params(("id" = String, Path, description = "Authorization request id")),
    responses(
        (status = 200, description = "Denied"),
        (status = 404, description = "Request not found or already processed"),
    )
)]
async fn consent_deny(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let request = state
        .store
        .consent_deny(&id)?
        .ok_or_else(|| ApiError::not_found("Auth request not found or already processed"))?;

    let mut response = json!({});
    if let Some(redirect_uri) = request.redirect_uri {
        response["redirectUri"] = json!(redirect_uri);
    }
    if let Some(state_param) = request.state {
        response["state"] = json!(state_param);
    }
    Ok(Json(response).into_response())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/consent/{id}", get(consent_details))
        .route("/v1/consent/{id}/approve", post(consent_approve))
        .route("/v1/consent/{id}/deny", post(consent_deny))
}

#[cfg(test)]
mod tests {
    use crate::test_utils::TestFixture;
    use http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn consent_flow_approves_without_auth() {
        let fixture = TestFixture::new().await;
        let request_id = fixture.authorize_pending("user_1", &["read"]).await;

        let details = fixture
            .get_public(&format!("/v1/consent/{request_id}"))
            .await;
        details.assert_status(StatusCode::OK);
        assert_eq!(details.json["agentDid"], fixture.agent.did);
        assert_eq!(details.json["scopes"], json!(["read"]));

        let approved = fixture
            .post_public(&format!("/v1/consent/{request_id}/approve"), &json!({}))
            .await;
        approved.assert_status(StatusCode::OK);
        assert!(approved.json["code"].is_string());

        // The request is settled: the consent page reports 410 now.
        let details = fixture
            .get_public(&format!("/v1/consent/{request_id}"))
            .await;
        details.assert_status(StatusCode::GONE);

        // And a second approval loses the conditional update.
        let again = fixture
            .post_public(&format!("/v1/consent/{request_id}/approve"), &json!({}))
            .await;
        again.assert_status(StatusCode::GONE);
    }

    #[tokio::test]
    async fn deny_settles_and_unknown_is_404() {
        let fixture = TestFixture::new().await;
        let request_id = fixture.authorize_pending("user_1", &["read"]).await;

        let denied = fixture
            .post_public(&format!("/v1/consent/{request_id}/deny"), &json!({}))
            .await;
        denied.assert_status(StatusCode::OK);

        let again = fixture
            .post_public(&format!("/v1/consent/{request_id}/deny"), &json!({}))
            .await;
        again.assert_status(StatusCode::NOT_FOUND);

        let missing = fixture.get_public("/v1/consent/areq_missing").await;
        missing.assert_status(StatusCode::NOT_FOUND);
    }
}
