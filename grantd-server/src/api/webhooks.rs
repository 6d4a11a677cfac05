use crate::errors::ApiError;
use crate::openapi::WEBHOOKS_TAG;
use crate::state::AppState;
use crate::store::{epoch_to_rfc3339, Developer};
use crate::webhooks::VALID_EVENTS;
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::post,
    Extension, Json, Router,
};
use http::StatusCode;
use rand::RngCore;
use serde::Deserialize;
use serde_json::json;
use url::Url;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub(crate) struct CreateWebhookRequest {
    url: String,
    events: Vec<String>,
}

fn new_webhook_secret() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Register an endpoint. The signing secret is returned exactly once, at
/// creation.
#[utoipa::path(
    post,
    path = "/v1/webhooks",
    tag = WEBHOOKS_TAG,
    request_body = CreateWebhookRequest,
    responses(
        (status = 201, description = "Webhook registered"),
        (status = 400, description = "Missing url or invalid event types"),
    )
)]
async fn create_webhook(
    State(state): State<AppState>,
    Extension(developer): Extension<Developer>,
    Json(body): Json<CreateWebhookRequest>,
) -> Result<Response, ApiError> {
    if body.url.is_empty() || body.events.is_empty() {
        return Err(ApiError::bad_request("url and events are required"));
    }
    if Url::parse(&body.url).is_err() {
        return Err(ApiError::bad_request("url must be a valid absolute URL"));
    }

    let invalid: Vec<&str> = body
        .events
        .iter()
        .map(String::as_str)
        .filter(|event| !VALID_EVENTS.contains(event))
        .collect();
    if !invalid.is_empty() {
        return Err(ApiError::bad_request(format!(
            "Invalid event types: {}. Valid: {}",
            invalid.join(", "),
            VALID_EVENTS.join(", ")
        )));
    }

    let secret = new_webhook_secret();
    let webhook = state
        .store
        .create_webhook(&developer.id, &body.url, &secret, &body.events)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": webhook.id,
            "url": webhook.url,
            "events": webhook.events,
            "secret": webhook.secret,
            "createdAt": epoch_to_rfc3339(webhook.created_at),
        })),
    )
        .into_response())
}

#[utoipa::path(
    get,
    path = "/v1/webhooks",
    tag = WEBHOOKS_TAG,
    responses(
        (status = 200, description = "Registered webhooks, without secrets"),
    )
)]
async fn list_webhooks(
    State(state): State<AppState>,
    Extension(developer): Extension<Developer>,
) -> Result<Response, ApiError> {
    let webhooks: Vec<serde_json::Value> = state
        .store
        .list_webhooks(&developer.id)?
        .into_iter()
        .map(|webhook| {
            json!({
                "id": webhook.id,
                "url": webhook.url,
                "events": webhook.events,
                "createdAt": epoch_to_rfc3339(webhook.created_at),
            })
        })
        .collect();
    Ok(Json(json!({ "webhooks": webhooks })).into_response())
}

#[utoipa::path(
    delete,
    path = "/v1/webhooks/{id}",
    tag = WEBHOOKS_TAG,
    params(("id" = String, Path, description = "Webhook id")),
    responses(
        (status = 204, description = "Webhook deleted"),
        (status = 404, description = "Webhook not found"),
    )
)]
async fn delete_webhook(
    State(state): State<AppState>,
    Extension(developer): Extension<Developer>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    if state.store.delete_webhook(&developer.id, &id)? {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Err(ApiError::not_found("Webhook not found"))
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/webhooks", post(create_webhook).get(list_webhooks))
        .route(
            "/v1/webhooks/{id}",
            axum::routing::delete(delete_webhook),
        )
}
