use super::{scopes_from_json, Store, StoreError};
use rusqlite::{params, OptionalExtension};

/// Authorization-state view of a token, joined with its owning grant.
#[derive(Debug, Clone)]
pub struct TokenState {
    pub jti: String,
    pub grant_id: String,
    pub is_revoked: bool,
    pub token_expires_at: i64,
    pub grant_status: String,
    pub grant_expires_at: i64,
}

/// Everything a refresh rotation needs, joined across refresh token, grant
/// and agent.
#[derive(Debug, Clone)]
pub struct RefreshTokenContext {
    pub refresh_id: String,
    pub grant_id: String,
    pub is_used: bool,
    pub refresh_expires_at: i64,
    pub agent_id: String,
    pub agent_did: String,
    pub principal_id: String,
    pub scopes: Vec<String>,
    pub grant_status: String,
    pub grant_expires_at: i64,
}

impl Store {
    pub fn create_grant_token(
        &self,
        jti: &str,
        grant_id: &str,
        issued_at: i64,
        expires_at: i64,
    ) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO grant_tokens (jti, grant_id, is_revoked, issued_at, expires_at)
             VALUES (?1, ?2, 0, ?3, ?4)",
            params![jti, grant_id, issued_at, expires_at],
        )?;
        Ok(())
    }

    /// Authorization-state lookup for verification, scoped to the
    /// developer so foreign tokens read as not found.
    pub fn token_state(
        &self,
        developer_id: &str,
        jti: &str,
    ) -> Result<Option<TokenState>, StoreError> {
        let state = self
            .conn()
            .query_row(
                "SELECT gt.jti, gt.grant_id, gt.is_revoked, gt.expires_at,
                        g.status, g.expires_at
                 FROM grant_tokens gt
                 JOIN grants g ON g.id = gt.grant_id
                 WHERE gt.jti = ?1 AND g.developer_id = ?2",
                params![jti, developer_id],
                |row| {
                    Ok(TokenState {
                        jti: row.get(0)?,
                        grant_id: row.get(1)?,
                        is_revoked: row.get::<_, i64>(2)? != 0,
                        token_expires_at: row.get(3)?,
                        grant_status: row.get(4)?,
                        grant_expires_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(state)
    }

    /// Token-level revocation: one token, no cascade, no grant mutation.
    /// Returns the token's expiry for the cache TTL; `None` keeps the
    /// operation idempotent.
    pub fn revoke_token(
        &self,
        developer_id: &str,
        jti: &str,
    ) -> Result<Option<i64>, StoreError> {
        let expires_at = self
            .conn()
            .query_row(
                "UPDATE grant_tokens SET is_revoked = 1
                 WHERE jti = ?1 AND is_revoked = 0
                   AND grant_id IN (SELECT id FROM grants WHERE developer_id = ?2)
                 RETURNING expires_at",
                params![jti, developer_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(expires_at)
    }

    pub fn create_refresh_token(
        &self,
        id: &str,
        grant_id: &str,
        expires_at: i64,
    ) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO refresh_tokens (id, grant_id, is_used, expires_at)
             VALUES (?1, ?2, 0, ?3)",
            params![id, grant_id, expires_at],
        )?;
        Ok(())
    }

    pub fn refresh_context(
        &self,
        developer_id: &str,
        refresh_id: &str,
    ) -> Result<Option<RefreshTokenContext>, StoreError> {
        let context = self
            .conn()
            .query_row(
                "SELECT rt.id, rt.grant_id, rt.is_used, rt.expires_at,
                        g.agent_id, a.did, g.principal_id, g.scopes, g.status, g.expires_at
                 FROM refresh_tokens rt
                 JOIN grants g ON g.id = rt.grant_id
                 JOIN agents a ON a.id = g.agent_id
                 WHERE rt.id = ?1 AND g.developer_id = ?2",
                params![refresh_id, developer_id],
                |row| {
                    Ok(RefreshTokenContext {
                        refresh_id: row.get(0)?,
                        grant_id: row.get(1)?,
                        is_used: row.get::<_, i64>(2)? != 0,
                        refresh_expires_at: row.get(3)?,
                        agent_id: row.get(4)?,
                        agent_did: row.get(5)?,
                        principal_id: row.get(6)?,
                        scopes: scopes_from_json(&row.get::<_, String>(7)?),
                        grant_status: row.get(8)?,
                        grant_expires_at: row.get(9)?,
                    })
                },
            )
            .optional()?;
        Ok(context)
    }

    /// Single-use marker for refresh rotation.
    pub fn mark_refresh_used(&self, refresh_id: &str) -> Result<bool, StoreError> {
        let changed = self.conn().execute(
            "UPDATE refresh_tokens SET is_used = 1 WHERE id = ?1 AND is_used = 0",
            [refresh_id],
        )?;
        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::seeded_store;
    use super::super::now_epoch;

    #[test]
    fn token_state_reflects_grant_status() {
        let (store, developer, agent) = seeded_store();
        let grant = store
            .create_grant(
                &developer.id,
                &agent.id,
                "user_1",
                &["read".to_string()],
                now_epoch() + 3600,
                None,
            )
            .unwrap();
        store
            .create_grant_token("tok_1", &grant.id, now_epoch(), now_epoch() + 3600)
            .unwrap();

        let state = store.token_state(&developer.id, "tok_1").unwrap().unwrap();
        assert!(!state.is_revoked);
        assert_eq!(state.grant_status, "active");

        store.revoke_grant(&developer.id, &grant.id).unwrap();
        let state = store.token_state(&developer.id, "tok_1").unwrap().unwrap();
        assert_eq!(state.grant_status, "revoked");
    }

    #[test]
    fn token_revocation_is_idempotent_and_scoped() {
        let (store, developer, agent) = seeded_store();
        let grant = store
            .create_grant(
                &developer.id,
                &agent.id,
                "user_1",
                &["read".to_string()],
                now_epoch() + 3600,
                None,
            )
            .unwrap();
        store
            .create_grant_token("tok_1", &grant.id, now_epoch(), now_epoch() + 3600)
            .unwrap();

        let other = store.seed_developer("other_key", None).unwrap();
        assert!(store.revoke_token(&other.id, "tok_1").unwrap().is_none());

        assert!(store.revoke_token(&developer.id, "tok_1").unwrap().is_some());
        assert!(store.revoke_token(&developer.id, "tok_1").unwrap().is_none());

        // The owning grant is untouched.
        let stored = store.grant_by_id(&developer.id, &grant.id).unwrap().unwrap();
        assert_eq!(stored.status, "active");
    }

    #[test]
    fn refresh_rotation_is_single_use() {
        let (store, developer, agent) = seeded_store();
        let grant = store
            .create_grant(
                &developer.id,
                &agent.id,
                "user_1",
                &["read".to_string()],
                now_epoch() + 3600,
                None,
            )
            .unwrap();
        store
            .create_refresh_token("ref_1", &grant.id, now_epoch() + 86400)
            .unwrap();

        let context = store
            .refresh_context(&developer.id, "ref_1")
            .unwrap()
            .unwrap();
        assert!(!context.is_used);
        assert_eq!(context.agent_did, agent.did);
        assert_eq!(context.scopes, vec!["read"]);

        assert!(store.mark_refresh_used("ref_1").unwrap());
        assert!(!store.mark_refresh_used("ref_1").unwrap());
    }
}
