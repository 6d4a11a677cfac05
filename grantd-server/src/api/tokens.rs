use crate::errors::ApiError;
use crate::openapi::TOKENS_TAG;
use crate::revocation;
use crate::state::AppState;
use crate::store::Developer;
use crate::verify::{self, Verification};
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{delete, post},
    Extension, Json, Router,
};
use http::StatusCode;
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub(crate) struct IntrospectRequest {
    token: String,
}

/// RFC 7662-style introspection: inactive tokens yield `{"active": false}`
/// with no further detail, whatever the cause.
#[utoipa::path(
    post,
    path = "/v1/tokens/introspect",
    tag = TOKENS_TAG,
    request_body = IntrospectRequest,
    responses(
        (status = 200, description = "Introspection result"),
        (status = 400, description = "Missing token"),
    )
)]
async fn introspect_handler(
    State(state): State<AppState>,
    Extension(developer): Extension<Developer>,
    Json(body): Json<IntrospectRequest>,
) -> Result<Response, ApiError> {
    if body.token.is_empty() {
        return Err(ApiError::bad_request("token is required"));
    }

    let inactive = Json(json!({ "active": false }));
    let verdict = match verify::verify_grant_token(&state, &developer.id, &body.token).await {
        Ok(verdict) => verdict,
        // Introspection never leaks why a token failed.
        Err(_) => return Ok(inactive.into_response()),
    };

    let claims = match verdict {
        Verification::Active(claims) => claims,
        Verification::Inactive(_) => return Ok(inactive.into_response()),
    };

    let mut response = json!({
        "active": true,
        "iss": claims.iss,
        "sub": claims.sub,
        "agt": claims.agt,
        "dev": claims.dev,
        "scp": claims.scp,
        "jti": claims.jti,
        "iat": claims.iat,
        "exp": claims.exp,
    });
    if let Some(grnt) = &claims.grnt {
        response["grnt"] = json!(grnt);
    }
    if let Some(delegation) = &claims.delegation {
        response["parentGrnt"] = json!(delegation.parent_grnt);
        response["delegationDepth"] = json!(delegation.delegation_depth);
    }
    Ok(Json(response).into_response())
}

/// Revoke one token. The owning grant and any delegated grants are
/// untouched; this is the narrow sibling of grant revocation.
#[utoipa::path(
    delete,
    path = "/v1/tokens/{jti}",
    tag = TOKENS_TAG,
    params(("jti" = String, Path, description = "Token id")),
    responses(
        (status = 204, description = "Token revoked"),
        (status = 404, description = "Token not found or already revoked"),
    )
)]
async fn revoke_token_handler(
    State(state): State<AppState>,
    Extension(developer): Extension<Developer>,
    Path(jti): Path<String>,
) -> Result<Response, ApiError> {
    if revocation::revoke_token(&state, &developer.id, &jti).await? {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Err(ApiError::not_found("Token not found or already revoked"))
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/tokens/introspect", post(introspect_handler))
        .route("/v1/tokens/{jti}", delete(revoke_token_handler))
}
