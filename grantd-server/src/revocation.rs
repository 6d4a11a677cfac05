//! Grant revocation with cascade, and token-level revocation.
//!
//! The conditional store update is the linearization point. Cache writes
//! and webhook emission come after it and are best-effort: a lost cache
//! entry only costs verifiers a store round-trip, and the cascade always
//! completes against the store even when every cache write fails.

use crate::cache::{revoked_grant_key, revoked_token_key, CacheBackend};
use crate::errors::ApiError;
use crate::state::AppState;
use crate::verify::remaining_ttl;
use crate::webhooks::{self, EVENT_GRANT_REVOKED};
use log::warn;
use serde_json::json;

/// What a successful cascade touched.
#[derive(Debug)]
pub struct RevocationOutcome {
    pub grant_id: String,
    pub descendants_revoked: usize,
}

/// Revoke a grant and all its currently-active descendants.
///
/// `None` means the grant was missing, foreign, or already settled;
/// reported as not-found so a second revoke is a harmless no-op.
pub async fn revoke_grant_cascade(
    state: &AppState,
    developer_id: &str,
    grant_id: &str,
) -> Result<Option<RevocationOutcome>, ApiError> {
    let Some(root) = state.store.revoke_grant(developer_id, grant_id)? else {
        return Ok(None);
    };

    mark_revoked(state, &revoked_grant_key(&root.id), root.expires_at).await;

    let descendants = state.store.revoke_active_descendants(&root.id)?;
    for descendant in &descendants {
        mark_revoked(
            state,
            &revoked_grant_key(&descendant.id),
            descendant.expires_at,
        )
        .await;
    }

    webhooks::emit_event(
        state,
        developer_id,
        EVENT_GRANT_REVOKED,
        json!({
            "grantId": root.id,
            "cascade": !descendants.is_empty(),
        }),
    )
    .await;

    Ok(Some(RevocationOutcome {
        grant_id: root.id,
        descendants_revoked: descendants.len(),
    }))
}

/// Revoke a single token without touching its grant or any descendants.
pub async fn revoke_token(
    state: &AppState,
    developer_id: &str,
    jti: &str,
) -> Result<bool, ApiError> {
    let Some(expires_at) = state.store.revoke_token(developer_id, jti)? else {
        return Ok(false);
    };
    mark_revoked(state, &revoked_token_key(jti), expires_at).await;
    Ok(true)
}

async fn mark_revoked(state: &AppState, key: &str, expires_at: i64) {
    if let Err(err) = state.cache.set(key, "1", remaining_ttl(expires_at)).await {
        warn!("Revocation cache write failed for {key}: {err}");
    }
}
