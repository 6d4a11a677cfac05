use crate::api::parse_expires_in;
use crate::errors::ApiError;
use crate::ids;
use crate::keys::{DelegationClaims, GrantClaims};
use crate::openapi::GRANTS_TAG;
use crate::state::AppState;
use crate::store::{epoch_to_rfc3339, now_epoch, Developer};
use crate::verify::{self, InactiveReason, Verification};
use crate::webhooks::{self, EVENT_GRANT_CREATED};
use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::post,
    Extension, Json, Router,
};
use grantd_policy::scope;
use http::StatusCode;
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

const DEFAULT_EXPIRES_IN: &str = "1h";

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DelegateRequest {
    parent_grant_token: String,
    sub_agent_id: String,
    scopes: Vec<String>,
    #[serde(default)]
    expires_in: Option<String>,
}

/// Delegate a subset of a parent grant to a sub-agent.
///
/// The revocation check runs before scope validation so a revoked parent
/// can never delegate, whatever it asks for.
#[utoipa::path(
    post,
    path = "/v1/grants/delegate",
    tag = GRANTS_TAG,
    request_body = DelegateRequest,
    responses(
        (status = 201, description = "Child grant created, token issued"),
        (status = 400, description = "Invalid/revoked parent token or scope violation"),
        (status = 404, description = "Sub-agent not found"),
    )
)]
async fn delegate_handler(
    State(state): State<AppState>,
    Extension(developer): Extension<Developer>,
    Json(body): Json<DelegateRequest>,
) -> Result<Response, ApiError> {
    if body.parent_grant_token.is_empty() || body.sub_agent_id.is_empty() || body.scopes.is_empty()
    {
        return Err(ApiError::bad_request(
            "parentGrantToken, subAgentId, and scopes are required",
        ));
    }

    // Signature first, then revocation state; both precede scope checks.
    let parent =
        match verify::verify_grant_token(&state, &developer.id, &body.parent_grant_token).await? {
            Verification::Active(claims) => *claims,
            Verification::Inactive(InactiveReason::Revoked) => {
                return Err(ApiError::grant_revoked("Parent grant has been revoked"));
            }
            Verification::Inactive(InactiveReason::Expired) => {
                return Err(ApiError::token_invalid("Parent grant token expired"));
            }
            Verification::Inactive(InactiveReason::NotFound) => {
                return Err(ApiError::token_invalid("Unknown parent grant token"));
            }
        };

    let delegation_depth = parent.delegation_depth() + 1;
    if delegation_depth > state.config.max_delegation_depth {
        return Err(ApiError::bad_request(format!(
            "Delegation depth limit exceeded (max {})",
            state.config.max_delegation_depth
        )));
    }

    if let Err(exceeded) = scope::contains_all(&parent.scp, &body.scopes) {
        return Err(ApiError::scope_exceeded(format!(
            "Requested scopes exceed parent grant scopes: {}",
            exceeded.join(", ")
        )));
    }

    let sub_agent = state
        .store
        .active_agent(&developer.id, &body.sub_agent_id)?
        .ok_or_else(|| ApiError::not_found("Sub-agent not found"))?;

    let expires_in = body.expires_in.as_deref().unwrap_or(DEFAULT_EXPIRES_IN);
    let expires_secs = parse_expires_in(expires_in)
        .ok_or_else(|| ApiError::bad_request(format!("Invalid expiresIn format: {expires_in}")))?;
    let now = now_epoch();
    // A child can never outlive its parent token.
    let expires_at = (now + expires_secs).min(parent.exp);

    let parent_grant_id = parent.grant_id().to_string();
    let grant = state.store.create_grant(
        &developer.id,
        &sub_agent.id,
        &parent.sub,
        &body.scopes,
        expires_at,
        Some((&parent_grant_id, delegation_depth)),
    )?;

    let jti = ids::new_token_id();
    state
        .store
        .create_grant_token(&jti, &grant.id, now, expires_at)?;

    // Delegated grants mint no refresh token.
    let claims = GrantClaims {
        iss: state.keys.issuer().to_string(),
        sub: parent.sub.clone(),
        agt: sub_agent.did.clone(),
        dev: developer.id.clone(),
        scp: body.scopes.clone(),
        jti,
        grnt: Some(grant.id.clone()),
        aud: None,
        iat: now,
        exp: expires_at,
        delegation: Some(DelegationClaims {
            parent_agt: Some(parent.agt.clone()),
            parent_grnt: parent_grant_id,
            delegation_depth,
        }),
    };
    let grant_token = state.keys.sign(&claims)?;

    webhooks::emit_event(
        &state,
        &developer.id,
        EVENT_GRANT_CREATED,
        json!({
            "grantId": grant.id,
            "parentGrantId": grant.parent_grant_id,
            "agentId": sub_agent.id,
            "principalId": parent.sub,
            "scopes": body.scopes,
            "delegationDepth": delegation_depth,
        }),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "grantToken": grant_token,
            "expiresAt": epoch_to_rfc3339(expires_at),
            "scopes": body.scopes,
            "grantId": grant.id,
            "delegationDepth": delegation_depth,
        })),
    )
        .into_response())
}

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/grants/delegate", post(delegate_handler))
}
