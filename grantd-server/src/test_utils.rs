//! Shared test fixture: a fully wired app over an in-memory store, a
//! seeded developer + agent, and request helpers.

use crate::cache::create_cache;
use crate::config::{CacheStore, GrantdConfig};
use crate::create_app;
use crate::keys::{GrantClaims, KeyManager};
use crate::state::AppState;
use crate::store::{now_epoch, Agent, Developer, Store};
use axum::body::Body;
use axum::Router;
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use log::LevelFilter;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};
use tower::ServiceExt;

pub const TEST_API_KEY: &str = "test_api_key";

/// 2048-bit keygen is the slow part of fixture setup; every test shares
/// one generated pair.
fn test_keys() -> Arc<KeyManager> {
    static KEYS: OnceLock<Arc<KeyManager>> = OnceLock::new();
    KEYS.get_or_init(|| {
        let config = crate::config::KeysConfig {
            rsa_private_key_pem: String::new(),
            auto_generate: true,
        };
        Arc::new(KeyManager::from_config(&config, "https://grantd.test").expect("test key pair"))
    })
    .clone()
}

/// A root grant as issued by the exchange endpoint.
pub struct RootGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub grant_id: String,
}

pub struct TestFixture {
    pub app: Router,
    pub state: AppState,
    pub developer: Developer,
    pub agent: Agent,
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::new_with(|_| {}).await
    }

    /// Fixture with the null cache, for store-only fallback tests.
    pub async fn new_without_cache() -> Self {
        Self::new_with(|config| {
            config.cache.store = CacheStore::None;
        })
        .await
    }

    pub async fn new_with(mutate: impl FnOnce(&mut GrantdConfig)) -> Self {
        let _ = env_logger::builder()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .try_init();

        let mut config = GrantdConfig {
            api_key: TEST_API_KEY.to_string(),
            issuer: "https://grantd.test".to_string(),
            ..GrantdConfig::default()
        };
        config.cache.store = CacheStore::InMemory;
        mutate(&mut config);

        let store = Store::memory().expect("in-memory store");
        let developer = store
            .seed_developer(TEST_API_KEY, Some("test developer"))
            .expect("seed developer");
        let agent = store
            .create_agent(
                &developer.id,
                "assistant",
                Some("test assistant"),
                &["read".to_string(), "write".to_string()],
            )
            .expect("seed agent");

        let cache = create_cache(&config).await.expect("test cache");
        let state = AppState {
            webhook_client: Arc::new(AppState::create_webhook_client(
                config.webhooks.delivery_timeout_secs,
            )),
            config: Arc::new(config),
            store,
            cache: Arc::new(cache),
            keys: test_keys(),
        };
        let app = create_app(state.clone()).await;

        Self {
            app,
            state,
            developer,
            agent,
        }
    }

    /// Request with the fixture developer's API key.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<&Value>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("Authorization", format!("Bearer {TEST_API_KEY}"))
            .header("Content-Type", "application/json");
        if body.is_none() {
            builder = builder.header("Content-Length", "0");
        }
        let body = match body {
            Some(value) => Body::from(serde_json::to_vec(value).expect("serialize body")),
            None => Body::empty(),
        };
        let request = builder.body(body).expect("Failed to build request");
        self.send(request).await
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post<T: Serialize>(&self, uri: &str, body: &T) -> TestResponse {
        let value = serde_json::to_value(body).expect("serialize body");
        self.request(Method::POST, uri, Some(&value)).await
    }

    pub async fn delete(&self, uri: &str) -> TestResponse {
        self.request(Method::DELETE, uri, None).await
    }

    /// Unauthenticated GET, for the public surface.
    pub async fn get_public(&self, uri: &str) -> TestResponse {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .expect("Failed to build request");
        self.send(request).await
    }

    /// Unauthenticated POST, for the public surface.
    pub async fn post_public<T: Serialize>(&self, uri: &str, body: &T) -> TestResponse {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_vec(body).expect("serialize body")))
            .expect("Failed to build request");
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        let json = if !body.is_empty() {
            serde_json::from_slice(&body).unwrap_or_else(|_| serde_json::json!({}))
        } else {
            serde_json::json!({})
        };

        TestResponse { status, json }
    }

    /// Register an additional agent and return its id.
    pub async fn register_agent(&self, name: &str) -> String {
        let response = self
            .post("/v1/agents", &json!({ "name": name, "scopes": ["read"] }))
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json["id"].as_str().expect("agent id").to_string()
    }

    /// Create a policy with the given effect and priority.
    pub async fn create_policy(&self, effect: &str, priority: i64, scopes: Option<Vec<String>>) {
        let mut body = json!({ "effect": effect, "priority": priority });
        if let Some(scopes) = scopes {
            body["scopes"] = json!(scopes);
        }
        let response = self.post("/v1/policies", &body).await;
        response.assert_status(StatusCode::CREATED);
    }

    /// Authorize and leave the request pending; returns the request id.
    pub async fn authorize_pending(&self, principal_id: &str, scopes: &[&str]) -> String {
        let response = self
            .post(
                "/v1/authorize",
                &json!({
                    "agentId": self.agent.id,
                    "principalId": principal_id,
                    "scopes": scopes,
                }),
            )
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json["authRequestId"]
            .as_str()
            .expect("request id")
            .to_string()
    }

    /// Authorize then approve; returns the authorization code.
    pub async fn approved_code(&self, principal_id: &str, scopes: &[&str]) -> String {
        let request_id = self.authorize_pending(principal_id, scopes).await;
        let response = self
            .post(&format!("/v1/authorize/{request_id}/approve"), &json!({}))
            .await;
        response.assert_status(StatusCode::OK);
        response.json["code"].as_str().expect("code").to_string()
    }

    /// Authorize with a PKCE challenge then approve; returns the code.
    pub async fn approved_code_with_challenge(
        &self,
        principal_id: &str,
        scopes: &[&str],
        code_challenge: &str,
    ) -> String {
        let response = self
            .post(
                "/v1/authorize",
                &json!({
                    "agentId": self.agent.id,
                    "principalId": principal_id,
                    "scopes": scopes,
                    "codeChallenge": code_challenge,
                    "codeChallengeMethod": "S256",
                }),
            )
            .await;
        response.assert_status(StatusCode::CREATED);
        let request_id = response.json["authRequestId"].as_str().unwrap();

        let approved = self
            .post(&format!("/v1/authorize/{request_id}/approve"), &json!({}))
            .await;
        approved.assert_status(StatusCode::OK);
        approved.json["code"].as_str().expect("code").to_string()
    }

    /// Full authorize → approve → exchange flow; returns the issued root
    /// grant.
    pub async fn root_grant_token(&self, principal_id: &str, scopes: &[&str]) -> RootGrant {
        let code = self.approved_code(principal_id, scopes).await;
        let response = self
            .post(
                "/v1/token",
                &json!({ "code": code, "agentId": self.agent.id }),
            )
            .await;
        response.assert_status(StatusCode::CREATED);
        RootGrant {
            access_token: response.json["accessToken"]
                .as_str()
                .expect("access token")
                .to_string(),
            refresh_token: response.json["refreshToken"]
                .as_str()
                .expect("refresh token")
                .to_string(),
            grant_id: response.json["grantId"]
                .as_str()
                .expect("grant id")
                .to_string(),
        }
    }

    /// Decode claims from a token signed with the fixture key.
    pub fn decode_claims(&self, token: &str) -> GrantClaims {
        self.state
            .keys
            .decode_unverified(token)
            .expect("decode claims")
    }

    /// Sign a token that has no backing store rows.
    pub fn mint_unstored_token(&self, jti: &str, grant_id: &str) -> String {
        let claims = GrantClaims {
            iss: self.state.keys.issuer().to_string(),
            sub: "user_ghost".to_string(),
            agt: self.agent.did.clone(),
            dev: self.developer.id.clone(),
            scp: vec!["read".to_string()],
            jti: jti.to_string(),
            grnt: Some(grant_id.to_string()),
            aud: None,
            iat: now_epoch(),
            exp: now_epoch() + 3600,
            delegation: None,
        };
        self.state.keys.sign(&claims).expect("sign test token")
    }
}

/// Response from a test request with convenient access to status and JSON
/// body.
pub struct TestResponse {
    pub status: StatusCode,
    pub json: Value,
}

impl TestResponse {
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {} but got {} with body: {}",
            expected,
            self.status,
            serde_json::to_string_pretty(&self.json).unwrap_or_default()
        );
        self
    }
}
