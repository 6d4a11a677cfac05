//! Two-layer grant token verification.
//!
//! Layer 1 is cryptographic: signature and algorithm, with expiry deferred
//! so it can be reported as a distinct reason. Layer 2 is authorization
//! state: the revocation cache, then the authoritative store. Layer 2 is
//! mandatory even though the signed token encodes expiry, because
//! revocation happens out-of-band and is never reflected in the token.

use crate::cache::{revoked_grant_key, revoked_token_key, CacheBackend};
use crate::errors::ApiError;
use crate::state::AppState;
use crate::store::now_epoch;
use crate::keys::GrantClaims;
use log::warn;
use std::fmt;

/// Why a structurally valid token is not active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InactiveReason {
    Revoked,
    Expired,
    NotFound,
}

impl fmt::Display for InactiveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InactiveReason::Revoked => write!(f, "revoked"),
            InactiveReason::Expired => write!(f, "expired"),
            InactiveReason::NotFound => write!(f, "not_found"),
        }
    }
}

#[derive(Debug)]
pub enum Verification {
    Active(Box<GrantClaims>),
    Inactive(InactiveReason),
}

/// Seconds until `expires_at`, clamped to the 1-second cache minimum.
pub fn remaining_ttl(expires_at: i64) -> u64 {
    (expires_at - now_epoch()).max(1) as u64
}

/// Verify a grant token for a developer. Signature failures are errors
/// (the caller never learns state about tokens it cannot present);
/// everything else is an active/inactive verdict with a reason.
pub async fn verify_grant_token(
    state: &AppState,
    developer_id: &str,
    token: &str,
) -> Result<Verification, ApiError> {
    let claims = state
        .keys
        .verify_ignoring_expiry(token)
        .map_err(|_| ApiError::token_invalid("Invalid token"))?;

    let grant_id = claims.grant_id().to_string();

    // Revocation cache first: cheap, and a hit is conclusive.
    if cache_hit(state, &revoked_token_key(&claims.jti)).await
        || cache_hit(state, &revoked_grant_key(&grant_id)).await
    {
        return Ok(Verification::Inactive(InactiveReason::Revoked));
    }

    // Authoritative store. A cache miss means nothing; the store decides.
    let Some(token_state) = state.store.token_state(developer_id, &claims.jti)? else {
        return Ok(Verification::Inactive(InactiveReason::NotFound));
    };

    if token_state.is_revoked {
        // Re-prime the cache so the next verifier short-circuits.
        cache_write_back(
            state,
            &revoked_token_key(&claims.jti),
            token_state.token_expires_at,
        )
        .await;
        return Ok(Verification::Inactive(InactiveReason::Revoked));
    }

    if token_state.grant_status == "revoked" {
        cache_write_back(
            state,
            &revoked_grant_key(&token_state.grant_id),
            token_state.grant_expires_at,
        )
        .await;
        return Ok(Verification::Inactive(InactiveReason::Revoked));
    }

    let now = now_epoch();
    if token_state.grant_status == "expired"
        || claims.exp <= now
        || token_state.token_expires_at <= now
        || token_state.grant_expires_at <= now
    {
        return Ok(Verification::Inactive(InactiveReason::Expired));
    }

    if token_state.grant_status != "active" {
        return Ok(Verification::Inactive(InactiveReason::Revoked));
    }

    Ok(Verification::Active(Box::new(claims)))
}

async fn cache_hit(state: &AppState, key: &str) -> bool {
    match state.cache.get(key).await {
        Ok(value) => value.is_some(),
        Err(err) => {
            // The cache is an optimization; fall through to the store.
            warn!("Revocation cache read failed for {key}: {err}");
            false
        }
    }
}

async fn cache_write_back(state: &AppState, key: &str, expires_at: i64) {
    if let Err(err) = state
        .cache
        .set(key, "1", remaining_ttl(expires_at))
        .await
    {
        warn!("Revocation cache write-back failed for {key}: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestFixture;

    #[tokio::test]
    async fn garbage_token_is_a_token_error() {
        let fixture = TestFixture::new().await;
        let result =
            verify_grant_token(&fixture.state, &fixture.developer.id, "not-a-jwt").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unknown_token_reports_not_found() {
        let fixture = TestFixture::new().await;
        // Signed by our key but never stored.
        let token = fixture.mint_unstored_token("tok_ghost", "grnt_ghost");
        let verdict = verify_grant_token(&fixture.state, &fixture.developer.id, &token)
            .await
            .unwrap();
        assert!(matches!(
            verdict,
            Verification::Inactive(InactiveReason::NotFound)
        ));
    }

    #[test]
    fn reasons_render_as_wire_strings() {
        assert_eq!(InactiveReason::Revoked.to_string(), "revoked");
        assert_eq!(InactiveReason::Expired.to_string(), "expired");
        assert_eq!(InactiveReason::NotFound.to_string(), "not_found");
    }

    #[test]
    fn ttl_clamps_to_one_second() {
        assert_eq!(remaining_ttl(0), 1);
        assert!(remaining_ttl(now_epoch() + 100) >= 99);
    }
}
