use crate::api::parse_expires_in;
use crate::errors::ApiError;
use crate::ids;
use crate::keys::GrantClaims;
use crate::openapi::TOKENS_TAG;
use crate::state::AppState;
use crate::store::{epoch_to_rfc3339, now_epoch, Developer};
use crate::webhooks::{self, EVENT_TOKEN_ISSUED};
use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::post,
    Extension, Json, Router,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use http::StatusCode;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

const REFRESH_TTL_SECS: i64 = 30 * 86400;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExchangeRequest {
    code: String,
    agent_id: String,
    #[serde(default)]
    code_verifier: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshRequest {
    refresh_token: String,
    agent_id: String,
}

/// PKCE S256: base64url(SHA-256(verifier)), compared against the stored
/// challenge.
fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Exchange an approved authorization code for a root grant plus tokens.
#[utoipa::path(
    post,
    path = "/v1/token",
    tag = TOKENS_TAG,
    request_body = ExchangeRequest,
    responses(
        (status = 201, description = "Grant created, tokens issued"),
        (status = 400, description = "Invalid code, request state, or PKCE verifier"),
    )
)]
async fn exchange_handler(
    State(state): State<AppState>,
    Extension(developer): Extension<Developer>,
    Json(body): Json<ExchangeRequest>,
) -> Result<Response, ApiError> {
    if body.code.is_empty() || body.agent_id.is_empty() {
        return Err(ApiError::bad_request("code and agentId are required"));
    }

    let (request, agent_did) = state
        .store
        .auth_request_by_code(&developer.id, &body.agent_id, &body.code)?
        .ok_or_else(|| ApiError::invalid_grant("Invalid code"))?;

    if request.status != "approved" {
        return Err(ApiError::invalid_grant("Authorization request not approved"));
    }
    if request.expires_at <= now_epoch() {
        return Err(ApiError::invalid_grant("Authorization request expired"));
    }

    if let Some(challenge) = &request.code_challenge {
        let Some(verifier) = body.code_verifier.as_deref() else {
            return Err(ApiError::invalid_grant("codeVerifier is required"));
        };
        if pkce_challenge(verifier) != *challenge {
            return Err(ApiError::invalid_grant(
                "codeVerifier does not match codeChallenge",
            ));
        }
    }

    // Consume exactly once before any issuance; the loser of a racing
    // exchange fails here instead of double-issuing.
    if !state.store.consume_auth_request(&request.id)? {
        return Err(ApiError::invalid_grant("Authorization code already used"));
    }

    let expires_secs = parse_expires_in(&request.expires_in).unwrap_or(86400);
    let now = now_epoch();
    let expires_at = now + expires_secs;

    let grant = state.store.create_grant(
        &developer.id,
        &request.agent_id,
        &request.principal_id,
        &request.scopes,
        expires_at,
        None,
    )?;

    let jti = ids::new_token_id();
    state
        .store
        .create_grant_token(&jti, &grant.id, now, expires_at)?;

    let refresh_id = ids::new_refresh_token_id();
    state
        .store
        .create_refresh_token(&refresh_id, &grant.id, now + REFRESH_TTL_SECS)?;

    let claims = GrantClaims {
        iss: state.keys.issuer().to_string(),
        sub: request.principal_id.clone(),
        agt: agent_did,
        dev: developer.id.clone(),
        scp: request.scopes.clone(),
        jti,
        grnt: Some(grant.id.clone()),
        aud: request.audience.clone(),
        iat: now,
        exp: expires_at,
        delegation: None,
    };
    let access_token = state.keys.sign(&claims)?;

    webhooks::emit_event(
        &state,
        &developer.id,
        EVENT_TOKEN_ISSUED,
        json!({
            "grantId": grant.id,
            "agentId": request.agent_id,
            "principalId": request.principal_id,
            "scopes": request.scopes,
        }),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "accessToken": access_token,
            "tokenType": "Bearer",
            "expiresIn": expires_secs,
            "refreshToken": refresh_id,
            "grantId": grant.id,
        })),
    )
        .into_response())
}

/// Rotate a refresh token into a fresh grant token for the same grant.
#[utoipa::path(
    post,
    path = "/v1/token/refresh",
    tag = TOKENS_TAG,
    request_body = RefreshRequest,
    responses(
        (status = 201, description = "New grant token issued"),
        (status = 400, description = "Unknown, used or expired refresh token"),
    )
)]
async fn refresh_handler(
    State(state): State<AppState>,
    Extension(developer): Extension<Developer>,
    Json(body): Json<RefreshRequest>,
) -> Result<Response, ApiError> {
    if body.refresh_token.is_empty() || body.agent_id.is_empty() {
        return Err(ApiError::bad_request("refreshToken and agentId are required"));
    }

    let context = state
        .store
        .refresh_context(&developer.id, &body.refresh_token)?
        .ok_or_else(|| ApiError::invalid_grant("Invalid refresh token"))?;

    if context.is_used {
        return Err(ApiError::invalid_grant("Refresh token already used"));
    }
    let now = now_epoch();
    if context.refresh_expires_at <= now {
        return Err(ApiError::invalid_grant("Refresh token expired"));
    }
    if context.grant_status != "active" || context.grant_expires_at <= now {
        return Err(ApiError::invalid_grant("Grant has been revoked"));
    }
    if context.agent_id != body.agent_id {
        return Err(ApiError::invalid_grant("Agent mismatch"));
    }

    // Rotation: the old token is spent exactly once even under races.
    if !state.store.mark_refresh_used(&context.refresh_id)? {
        return Err(ApiError::invalid_grant("Refresh token already used"));
    }

    let expires_at = context.grant_expires_at;
    let jti = ids::new_token_id();
    state
        .store
        .create_grant_token(&jti, &context.grant_id, now, expires_at)?;

    let refresh_id = ids::new_refresh_token_id();
    state
        .store
        .create_refresh_token(&refresh_id, &context.grant_id, now + REFRESH_TTL_SECS)?;

    let claims = GrantClaims {
        iss: state.keys.issuer().to_string(),
        sub: context.principal_id.clone(),
        agt: context.agent_did.clone(),
        dev: developer.id.clone(),
        scp: context.scopes.clone(),
        jti,
        grnt: Some(context.grant_id.clone()),
        aud: None,
        iat: now,
        exp: expires_at,
        delegation: None,
    };
    let grant_token = state.keys.sign(&claims)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "grantToken": grant_token,
            "expiresAt": epoch_to_rfc3339(expires_at),
            "scopes": context.scopes,
            "refreshToken": refresh_id,
            "grantId": context.grant_id,
        })),
    )
        .into_response())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/token", post(exchange_handler))
        .route("/v1/token/refresh", post(refresh_handler))
}
