use crate::errors::ApiError;
use crate::openapi::POLICIES_TAG;
use crate::state::AppState;
use crate::store::{epoch_to_rfc3339, Developer, NewPolicy, PolicyRecord};
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use grantd_policy::Effect;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreatePolicyRequest {
    #[serde(default)]
    name: Option<String>,
    /// "allow" or "deny"
    effect: String,
    #[serde(default)]
    priority: i64,
    #[serde(default)]
    agent_id: Option<String>,
    #[serde(default)]
    principal_id: Option<String>,
    #[serde(default)]
    scopes: Option<Vec<String>>,
    #[serde(default)]
    time_of_day_start: Option<String>,
    #[serde(default)]
    time_of_day_end: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PolicyResponse {
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[schema(value_type = String)]
    effect: Effect,
    priority: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    principal_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scopes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_of_day_start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_of_day_end: Option<String>,
    created_at: String,
}

impl From<PolicyRecord> for PolicyResponse {
    fn from(record: PolicyRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            effect: record.effect,
            priority: record.priority,
            agent_id: record.agent_id,
            principal_id: record.principal_id,
            scopes: record.scopes,
            time_of_day_start: record.time_of_day_start,
            time_of_day_end: record.time_of_day_end,
            created_at: epoch_to_rfc3339(record.created_at),
        }
    }
}

fn valid_hhmm(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() != 5 || bytes[2] != b':' {
        return false;
    }
    let (Some(hh), Some(mm)) = (value.get(..2), value.get(3..)) else {
        return false;
    };
    let (Ok(hours), Ok(minutes)) = (hh.parse::<u8>(), mm.parse::<u8>()) else {
        return false;
    };
    hours < 24 && minutes < 60
}

#[utoipa::path(
    post,
    path = "/v1/policies",
    tag = POLICIES_TAG,
    request_body = CreatePolicyRequest,
    responses(
        (status = 201, description = "Policy created", body = PolicyResponse),
        (status = 400, description = "Invalid effect or time window"),
    )
)]
async fn create_policy(
    State(state): State<AppState>,
    Extension(developer): Extension<Developer>,
    Json(body): Json<CreatePolicyRequest>,
) -> Result<Response, ApiError> {
    let effect: Effect = body
        .effect
        .parse()
        .map_err(|_| ApiError::bad_request("effect must be \"allow\" or \"deny\""))?;

    match (&body.time_of_day_start, &body.time_of_day_end) {
        (None, None) => {}
        (Some(start), Some(end)) => {
            if !valid_hhmm(start) || !valid_hhmm(end) {
                return Err(ApiError::bad_request(
                    "timeOfDayStart and timeOfDayEnd must be HH:MM",
                ));
            }
        }
        _ => {
            return Err(ApiError::bad_request(
                "timeOfDayStart and timeOfDayEnd must be provided together",
            ));
        }
    }

    let record = state.store.create_policy(
        &developer.id,
        NewPolicy {
            name: body.name.as_deref(),
            effect,
            priority: body.priority,
            agent_id: body.agent_id.as_deref(),
            principal_id: body.principal_id.as_deref(),
            scopes: body.scopes.as_deref(),
            time_of_day_start: body.time_of_day_start.as_deref(),
            time_of_day_end: body.time_of_day_end.as_deref(),
        },
    )?;

    Ok((StatusCode::CREATED, Json(PolicyResponse::from(record))).into_response())
}

#[utoipa::path(
    get,
    path = "/v1/policies",
    tag = POLICIES_TAG,
    responses(
        (status = 200, description = "Policies in evaluation order"),
    )
)]
async fn list_policies(
    State(state): State<AppState>,
    Extension(developer): Extension<Developer>,
) -> Result<Response, ApiError> {
    let policies: Vec<PolicyResponse> = state
        .store
        .list_policies(&developer.id)?
        .into_iter()
        .map(PolicyResponse::from)
        .collect();
    Ok(Json(json!({ "policies": policies })).into_response())
}

#[utoipa::path(
    get,
    path = "/v1/policies/{id}",
    tag = POLICIES_TAG,
    params(("id" = String, Path, description = "Policy id")),
    responses(
        (status = 200, description = "Policy", body = PolicyResponse),
        (status = 404, description = "Policy not found"),
    )
)]
async fn get_policy(
    State(state): State<AppState>,
    Extension(developer): Extension<Developer>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let record = state
        .store
        .policy_by_id(&developer.id, &id)?
        .ok_or_else(|| ApiError::not_found("Policy not found"))?;
    Ok(Json(PolicyResponse::from(record)).into_response())
}

#[utoipa::path(
    delete,
    path = "/v1/policies/{id}",
    tag = POLICIES_TAG,
    params(("id" = String, Path, description = "Policy id")),
    responses(
        (status = 204, description = "Policy deleted"),
        (status = 404, description = "Policy not found"),
    )
)]
async fn delete_policy(
    State(state): State<AppState>,
    Extension(developer): Extension<Developer>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    if state.store.delete_policy(&developer.id, &id)? {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Err(ApiError::not_found("Policy not found"))
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/policies", post(create_policy).get(list_policies))
        .route("/v1/policies/{id}", get(get_policy).delete(delete_policy))
}

#[cfg(test)]
mod tests {
    use crate::test_utils::TestFixture;
    use http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn create_list_delete_round_trip() {
        let fixture = TestFixture::new().await;

        let created = fixture
            .post(
                "/v1/policies",
                &json!({
                    "name": "after-hours deny",
                    "effect": "deny",
                    "priority": 100,
                    "timeOfDayStart": "22:00",
                    "timeOfDayEnd": "06:00"
                }),
            )
            .await;
        created.assert_status(StatusCode::CREATED);
        let id = created.json["id"].as_str().unwrap().to_string();

        let listed = fixture.get("/v1/policies").await;
        assert_eq!(listed.json["policies"].as_array().unwrap().len(), 1);

        let fetched = fixture.get(&format!("/v1/policies/{id}")).await;
        fetched.assert_status(StatusCode::OK);
        assert_eq!(fetched.json["effect"], "deny");

        let deleted = fixture.delete(&format!("/v1/policies/{id}")).await;
        deleted.assert_status(StatusCode::NO_CONTENT);

        let missing = fixture.delete(&format!("/v1/policies/{id}")).await;
        missing.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_effect_is_rejected() {
        let fixture = TestFixture::new().await;
        let response = fixture
            .post("/v1/policies", &json!({ "effect": "block" }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn half_open_time_window_is_rejected() {
        let fixture = TestFixture::new().await;
        let response = fixture
            .post(
                "/v1/policies",
                &json!({ "effect": "deny", "timeOfDayStart": "22:00" }),
            )
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);

        let bad_format = fixture
            .post(
                "/v1/policies",
                &json!({
                    "effect": "deny",
                    "timeOfDayStart": "22:00",
                    "timeOfDayEnd": "25:99"
                }),
            )
            .await;
        bad_format.assert_status(StatusCode::BAD_REQUEST);
    }
}
