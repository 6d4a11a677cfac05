use crate::errors::ApiError;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http::StatusCode;
use log::warn;

/// Resolve the calling developer from `Authorization: Bearer <api-key>` and
/// stash it in request extensions for the handlers.
pub(super) async fn authentication_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let auth_header = match request.headers().get(http::header::AUTHORIZATION) {
        Some(header) => header,
        None => {
            warn!("Missing Authorization header");
            return ApiError::new(
                "Missing Authorization header",
                "UNAUTHORIZED",
                StatusCode::UNAUTHORIZED,
            )
            .into_response();
        }
    };

    let api_key = match auth_header.to_str() {
        Ok(header_str) if header_str.to_lowercase().starts_with("bearer ") => {
            header_str[7..].to_string()
        }
        Ok(_) => {
            warn!("Invalid Authorization header format, missing 'Bearer ' prefix");
            return forbidden();
        }
        Err(e) => {
            warn!("Failed to parse Authorization header to string: {}", e);
            return forbidden();
        }
    };

    let developer = match state.store.developer_by_api_key(&api_key) {
        Ok(Some(developer)) => developer,
        Ok(None) => {
            warn!("Authentication failed: unknown API key");
            return forbidden();
        }
        Err(err) => {
            log::error!("Developer lookup failed: {err}");
            return ApiError::internal("An unexpected error occurred").into_response();
        }
    };

    request.extensions_mut().insert(developer);
    next.run(request).await
}

fn forbidden() -> Response {
    ApiError::new(
        "You are not authorized to access this resource, please check your API key.",
        "FORBIDDEN",
        StatusCode::FORBIDDEN,
    )
    .into_response()
}

#[cfg(test)]
mod tests {
    use crate::test_utils::TestFixture;
    use axum::body::Body;
    use http::{Method, Request, StatusCode};

    #[tokio::test]
    async fn valid_api_key_passes() {
        let fixture = TestFixture::new().await;
        let response = fixture.get("/v1/agents").await;
        response.assert_status(StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_header_is_unauthorized() {
        let fixture = TestFixture::new().await;
        let request = Request::builder()
            .method(Method::GET)
            .uri("/v1/agents")
            .body(Body::empty())
            .unwrap();
        let response = fixture.send(request).await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn non_bearer_header_is_forbidden() {
        let fixture = TestFixture::new().await;
        let request = Request::builder()
            .method(Method::GET)
            .uri("/v1/agents")
            .header("Authorization", "test_api_key")
            .body(Body::empty())
            .unwrap();
        let response = fixture.send(request).await;
        response.assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn unknown_api_key_is_forbidden() {
        let fixture = TestFixture::new().await;
        let request = Request::builder()
            .method(Method::GET)
            .uri("/v1/agents")
            .header("Authorization", "Bearer wrong_api_key")
            .body(Body::empty())
            .unwrap();
        let response = fixture.send(request).await;
        response.assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn public_routes_skip_authentication() {
        let fixture = TestFixture::new().await;
        let request = Request::builder()
            .method(Method::GET)
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = fixture.send(request).await;
        response.assert_status(StatusCode::OK);
    }
}
