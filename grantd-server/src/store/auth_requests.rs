use super::{now_epoch, scopes_from_json, scopes_to_json, Store, StoreError};
use crate::ids;
use rusqlite::{params, OptionalExtension, Row};

/// A pending consent decision: `pending → approved|denied → consumed`.
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub id: String,
    pub agent_id: String,
    pub principal_id: String,
    pub developer_id: String,
    pub scopes: Vec<String>,
    pub redirect_uri: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub audience: Option<String>,
    pub expires_in: String,
    pub status: String,
    pub code: Option<String>,
    pub created_at: i64,
    pub expires_at: i64,
}

fn request_from_row(row: &Row<'_>) -> rusqlite::Result<AuthRequest> {
    Ok(AuthRequest {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        principal_id: row.get(2)?,
        developer_id: row.get(3)?,
        scopes: scopes_from_json(&row.get::<_, String>(4)?),
        redirect_uri: row.get(5)?,
        state: row.get(6)?,
        code_challenge: row.get(7)?,
        audience: row.get(8)?,
        expires_in: row.get(9)?,
        status: row.get(10)?,
        code: row.get(11)?,
        created_at: row.get(12)?,
        expires_at: row.get(13)?,
    })
}

const REQUEST_COLUMNS: &str = "id, agent_id, principal_id, developer_id, scopes, redirect_uri, \
     state, code_challenge, audience, expires_in, status, code, created_at, expires_at";

/// Parameters for creating an authorization request.
pub struct NewAuthRequest<'a> {
    pub agent_id: &'a str,
    pub principal_id: &'a str,
    pub developer_id: &'a str,
    pub scopes: &'a [String],
    pub redirect_uri: Option<&'a str>,
    pub state: Option<&'a str>,
    pub code_challenge: Option<&'a str>,
    pub audience: Option<&'a str>,
    pub expires_in: &'a str,
    pub expires_at: i64,
    /// `approved` with a code for policy auto-approval, `pending` otherwise.
    pub status: &'a str,
    pub code: Option<&'a str>,
}

impl Store {
    pub fn create_auth_request(&self, new: NewAuthRequest<'_>) -> Result<AuthRequest, StoreError> {
        let id = ids::new_auth_request_id();
        let created_at = now_epoch();
        self.conn().execute(
            "INSERT INTO auth_requests
                 (id, agent_id, principal_id, developer_id, scopes, redirect_uri, state,
                  code_challenge, audience, expires_in, status, code, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                id,
                new.agent_id,
                new.principal_id,
                new.developer_id,
                scopes_to_json(new.scopes)?,
                new.redirect_uri,
                new.state,
                new.code_challenge,
                new.audience,
                new.expires_in,
                new.status,
                new.code,
                created_at,
                new.expires_at,
            ],
        )?;
        Ok(AuthRequest {
            id,
            agent_id: new.agent_id.to_string(),
            principal_id: new.principal_id.to_string(),
            developer_id: new.developer_id.to_string(),
            scopes: new.scopes.to_vec(),
            redirect_uri: new.redirect_uri.map(str::to_string),
            state: new.state.map(str::to_string),
            code_challenge: new.code_challenge.map(str::to_string),
            audience: new.audience.map(str::to_string),
            expires_in: new.expires_in.to_string(),
            status: new.status.to_string(),
            code: new.code.map(str::to_string),
            created_at,
            expires_at: new.expires_at,
        })
    }

    /// Consent view of a request: the request plus the displayable agent
    /// identity. Not developer-scoped, since the consent page is public.
    pub fn auth_request_with_agent(
        &self,
        id: &str,
    ) -> Result<Option<(AuthRequest, super::Agent)>, StoreError> {
        let request = self
            .conn()
            .query_row(
                &format!("SELECT {REQUEST_COLUMNS} FROM auth_requests WHERE id = ?1"),
                [id],
                request_from_row,
            )
            .optional()?;
        let Some(request) = request else {
            return Ok(None);
        };
        let agent = self
            .agent_by_id(&request.developer_id, &request.agent_id)?
            .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        Ok(Some((request, agent)))
    }

    /// Developer-side approval: `pending` and unexpired, or no-op.
    pub fn approve_auth_request(
        &self,
        developer_id: &str,
        id: &str,
        code: &str,
    ) -> Result<Option<String>, StoreError> {
        let approved = self
            .conn()
            .query_row(
                "UPDATE auth_requests SET status = 'approved', code = ?3
                 WHERE id = ?1 AND developer_id = ?2 AND status = 'pending' AND expires_at > ?4
                 RETURNING code",
                params![id, developer_id, code, now_epoch()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(approved)
    }

    /// Developer-side denial: `pending`, or no-op.
    pub fn deny_auth_request(&self, developer_id: &str, id: &str) -> Result<bool, StoreError> {
        let changed = self.conn().execute(
            "UPDATE auth_requests SET status = 'denied'
             WHERE id = ?1 AND developer_id = ?2 AND status = 'pending'",
            params![id, developer_id],
        )?;
        Ok(changed > 0)
    }

    /// Principal-side approval from the consent page.
    pub fn consent_approve(
        &self,
        id: &str,
        code: &str,
    ) -> Result<Option<AuthRequest>, StoreError> {
        let request = self
            .conn()
            .query_row(
                &format!(
                    "UPDATE auth_requests SET status = 'approved', code = ?2
                     WHERE id = ?1 AND status = 'pending' AND expires_at > ?3
                     RETURNING {REQUEST_COLUMNS}"
                ),
                params![id, code, now_epoch()],
                request_from_row,
            )
            .optional()?;
        Ok(request)
    }

    /// Principal-side denial from the consent page.
    pub fn consent_deny(&self, id: &str) -> Result<Option<AuthRequest>, StoreError> {
        let request = self
            .conn()
            .query_row(
                &format!(
                    "UPDATE auth_requests SET status = 'denied'
                     WHERE id = ?1 AND status = 'pending'
                     RETURNING {REQUEST_COLUMNS}"
                ),
                params![id],
                request_from_row,
            )
            .optional()?;
        Ok(request)
    }

    /// Look up a request for code exchange, along with the agent's DID for
    /// the token claims.
    pub fn auth_request_by_code(
        &self,
        developer_id: &str,
        agent_id: &str,
        code: &str,
    ) -> Result<Option<(AuthRequest, String)>, StoreError> {
        let found = self
            .conn()
            .query_row(
                "SELECT ar.id, ar.agent_id, ar.principal_id, ar.developer_id, ar.scopes,
                        ar.redirect_uri, ar.state, ar.code_challenge, ar.audience, ar.expires_in,
                        ar.status, ar.code, ar.created_at, ar.expires_at, a.did
                 FROM auth_requests ar
                 JOIN agents a ON a.id = ar.agent_id
                 WHERE ar.code = ?1 AND ar.agent_id = ?2 AND ar.developer_id = ?3",
                params![code, agent_id, developer_id],
                |row| Ok((request_from_row(row)?, row.get::<_, String>(14)?)),
            )
            .optional()?;
        Ok(found)
    }

    /// Consume an approved request exactly once. The conditional update is
    /// the linearization point for the whole exchange.
    pub fn consume_auth_request(&self, id: &str) -> Result<bool, StoreError> {
        let changed = self.conn().execute(
            "UPDATE auth_requests SET status = 'consumed'
             WHERE id = ?1 AND status = 'approved'",
            [id],
        )?;
        Ok(changed > 0)
    }
}
