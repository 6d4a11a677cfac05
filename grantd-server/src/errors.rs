use crate::cache::CacheError;
use crate::keys::KeyError;
use crate::store::StoreError;
use axum::response::IntoResponse;
use axum::Json;
use http::StatusCode;
use serde_json::json;

/// API-level error with a stable machine-readable code.
///
/// The `code` travels in the response body so SDK clients can branch on it
/// without parsing the human-readable detail.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub detail: String,
    pub code: &'static str,
    pub status_code: StatusCode,
}

impl ApiError {
    /// Create a new ApiError with a detail message, code and status code
    pub fn new<S: ToString>(detail: S, code: &'static str, status_code: StatusCode) -> Self {
        Self {
            detail: detail.to_string(),
            code,
            status_code,
        }
    }

    /// Create new Internal Server Error (500) with a detail message
    pub fn internal<S: ToString>(detail: S) -> Self {
        Self::new(detail, "INTERNAL_ERROR", StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Create new Bad Request Error (400) with a detail message
    pub fn bad_request<S: ToString>(detail: S) -> Self {
        Self::new(detail, "BAD_REQUEST", StatusCode::BAD_REQUEST)
    }

    /// Create new Not Found Error (404) with a detail message
    pub fn not_found<S: ToString>(detail: S) -> Self {
        Self::new(detail, "NOT_FOUND", StatusCode::NOT_FOUND)
    }

    /// Create new Gone Error (410) with a detail message
    pub fn gone<S: ToString>(detail: S) -> Self {
        Self::new(detail, "GONE", StatusCode::GONE)
    }

    /// Create new Conflict Error (409) with a detail message
    #[allow(dead_code)]
    pub fn conflict<S: ToString>(detail: S) -> Self {
        Self::new(detail, "CONFLICT", StatusCode::CONFLICT)
    }

    /// Authorization denied by a matching deny policy (403)
    pub fn policy_denied<S: ToString>(detail: S) -> Self {
        Self::new(detail, "POLICY_DENIED", StatusCode::FORBIDDEN)
    }

    /// Code exchange failures: unknown/expired/consumed codes, PKCE mismatch (400)
    pub fn invalid_grant<S: ToString>(detail: S) -> Self {
        Self::new(detail, "INVALID_GRANT", StatusCode::BAD_REQUEST)
    }

    /// Signature or structural token failures (400)
    pub fn token_invalid<S: ToString>(detail: S) -> Self {
        Self::new(detail, "TOKEN_INVALID", StatusCode::BAD_REQUEST)
    }

    /// A revoked parent grant was presented for delegation (400)
    pub fn grant_revoked<S: ToString>(detail: S) -> Self {
        Self::new(detail, "GRANT_REVOKED", StatusCode::BAD_REQUEST)
    }

    /// Delegation requested scopes outside the parent grant (400)
    pub fn scope_exceeded<S: ToString>(detail: S) -> Self {
        Self::new(detail, "SCOPE_EXCEEDED", StatusCode::BAD_REQUEST)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status_code = self.status_code;
        let body = json!({
            "detail": self.detail,
            "code": self.code,
        });
        (status_code, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        log::error!("Store error: {err}");
        ApiError::internal("An unexpected error occurred")
    }
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        log::error!("Cache error: {err}");
        ApiError::internal("An unexpected error occurred")
    }
}

impl From<KeyError> for ApiError {
    fn from(err: KeyError) -> Self {
        log::error!("Key manager error: {err}");
        ApiError::internal("An unexpected error occurred")
    }
}
