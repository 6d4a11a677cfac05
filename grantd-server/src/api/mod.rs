mod agents;
mod audit;
mod authn_middleware;
mod authorize;
mod consent;
mod delegate;
mod grants;
mod health;
mod jwks;
mod policies;
mod token;
mod tokens;
mod webhooks;

use crate::api::authn_middleware::authentication_middleware;
use crate::state::AppState;
use axum::{middleware, Router};

/// Combines all API routes into a single router
pub(super) fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(jwks::router())
        .merge(consent::router())
        .merge(protected_routes(state))
}

/// Creates a router for protected routes that require API key authentication
fn protected_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(agents::router())
        .merge(authorize::router())
        .merge(token::router())
        .merge(delegate::router())
        .merge(grants::router())
        .merge(tokens::router())
        .merge(policies::router())
        .merge(audit::router())
        .merge(webhooks::router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            authentication_middleware,
        ))
}

/// Parse a `<N><unit>` lifetime like `30s`, `15m`, `24h` or `7d` into
/// seconds.
pub(crate) fn parse_expires_in(expires_in: &str) -> Option<i64> {
    let unit = expires_in.chars().last()?;
    let amount: i64 = expires_in.get(..expires_in.len() - 1)?.parse().ok()?;
    if amount <= 0 {
        return None;
    }
    match unit {
        's' => Some(amount),
        'm' => Some(amount * 60),
        'h' => Some(amount * 3600),
        'd' => Some(amount * 86400),
        _ => None,
    }
}
