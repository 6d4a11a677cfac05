use crate::keys::Jwks;
use crate::openapi::KEYS_TAG;
use crate::state::AppState;
use axum::{extract::State, routing::get, Json, Router};

/// Public signing keys for offline token verification.
#[utoipa::path(
    get,
    path = "/.well-known/jwks.json",
    tag = KEYS_TAG,
    responses(
        (status = 200, description = "Public key set", body = Jwks)
    )
)]
async fn jwks_handler(State(state): State<AppState>) -> Json<Jwks> {
    Json(state.keys.public_jwks())
}

pub fn router() -> Router<AppState> {
    Router::new().route("/.well-known/jwks.json", get(jwks_handler))
}

#[cfg(test)]
mod tests {
    use crate::test_utils::TestFixture;
    use http::StatusCode;

    #[tokio::test]
    async fn jwks_is_public_and_contains_one_rsa_key() {
        let fixture = TestFixture::new().await;
        let response = fixture.get_public("/.well-known/jwks.json").await;
        response.assert_status(StatusCode::OK);

        let keys = response.json["keys"].as_array().unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0]["kty"], "RSA");
        assert_eq!(keys[0]["alg"], "RS256");
        assert_eq!(keys[0]["use"], "sig");
        assert!(keys[0].get("d").is_none(), "private exponent must never leak");
    }
}
