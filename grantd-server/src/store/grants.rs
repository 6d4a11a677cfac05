use super::{now_epoch, scopes_from_json, scopes_to_json, Store, StoreError};
use crate::ids;
use rusqlite::{params, OptionalExtension, Row};

/// The durable authorization record. Mutated only by revocation; scope
/// edits do not exist.
#[derive(Debug, Clone)]
pub struct Grant {
    pub id: String,
    pub agent_id: String,
    pub principal_id: String,
    pub developer_id: String,
    pub scopes: Vec<String>,
    pub status: String,
    pub parent_grant_id: Option<String>,
    pub delegation_depth: i64,
    pub issued_at: i64,
    pub expires_at: i64,
    pub revoked_at: Option<i64>,
}

/// A grant the revocation pass just transitioned, with what the cache entry
/// needs.
#[derive(Debug, Clone)]
pub struct RevokedGrant {
    pub id: String,
    pub expires_at: i64,
}

/// Optional filters for grant listings.
#[derive(Debug, Default)]
pub struct GrantFilter {
    pub agent_id: Option<String>,
    pub principal_id: Option<String>,
    pub status: Option<String>,
}

fn grant_from_row(row: &Row<'_>) -> rusqlite::Result<Grant> {
    Ok(Grant {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        principal_id: row.get(2)?,
        developer_id: row.get(3)?,
        scopes: scopes_from_json(&row.get::<_, String>(4)?),
        status: row.get(5)?,
        parent_grant_id: row.get(6)?,
        delegation_depth: row.get(7)?,
        issued_at: row.get(8)?,
        expires_at: row.get(9)?,
        revoked_at: row.get(10)?,
    })
}

const GRANT_COLUMNS: &str = "id, agent_id, principal_id, developer_id, scopes, status, \
     parent_grant_id, delegation_depth, issued_at, expires_at, revoked_at";

impl Store {
    /// Create a grant. `parent` carries the parent grant id and the child's
    /// delegation depth; root grants pass `None` and get depth 0.
    pub fn create_grant(
        &self,
        developer_id: &str,
        agent_id: &str,
        principal_id: &str,
        scopes: &[String],
        expires_at: i64,
        parent: Option<(&str, i64)>,
    ) -> Result<Grant, StoreError> {
        let id = ids::new_grant_id();
        let issued_at = now_epoch();
        let (parent_grant_id, delegation_depth) = match parent {
            Some((parent_id, depth)) => (Some(parent_id), depth),
            None => (None, 0),
        };
        self.conn().execute(
            "INSERT INTO grants
                 (id, agent_id, principal_id, developer_id, scopes, status,
                  parent_grant_id, delegation_depth, issued_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'active', ?6, ?7, ?8, ?9)",
            params![
                id,
                agent_id,
                principal_id,
                developer_id,
                scopes_to_json(scopes)?,
                parent_grant_id,
                delegation_depth,
                issued_at,
                expires_at,
            ],
        )?;
        Ok(Grant {
            id,
            agent_id: agent_id.to_string(),
            principal_id: principal_id.to_string(),
            developer_id: developer_id.to_string(),
            scopes: scopes.to_vec(),
            status: "active".to_string(),
            parent_grant_id: parent_grant_id.map(str::to_string),
            delegation_depth,
            issued_at,
            expires_at,
            revoked_at: None,
        })
    }

    pub fn grant_by_id(
        &self,
        developer_id: &str,
        grant_id: &str,
    ) -> Result<Option<Grant>, StoreError> {
        let grant = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {GRANT_COLUMNS} FROM grants
                     WHERE id = ?1 AND developer_id = ?2"
                ),
                params![grant_id, developer_id],
                grant_from_row,
            )
            .optional()?;
        Ok(grant)
    }

    pub fn list_grants(
        &self,
        developer_id: &str,
        filter: &GrantFilter,
    ) -> Result<Vec<Grant>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {GRANT_COLUMNS} FROM grants
             WHERE developer_id = ?1
               AND (?2 IS NULL OR agent_id = ?2)
               AND (?3 IS NULL OR principal_id = ?3)
               AND (?4 IS NULL OR status = ?4)
             ORDER BY issued_at DESC, id DESC"
        ))?;
        let grants = stmt
            .query_map(
                params![
                    developer_id,
                    filter.agent_id,
                    filter.principal_id,
                    filter.status
                ],
                grant_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(grants)
    }

    /// Conditionally transition one grant from `active` to `revoked`.
    ///
    /// `None` means the grant is missing, foreign, or already settled;
    /// callers report "not found" either way, keeping revocation idempotent.
    pub fn revoke_grant(
        &self,
        developer_id: &str,
        grant_id: &str,
    ) -> Result<Option<RevokedGrant>, StoreError> {
        let revoked = self
            .conn()
            .query_row(
                "UPDATE grants SET status = 'revoked', revoked_at = ?3
                 WHERE id = ?1 AND developer_id = ?2 AND status = 'active'
                 RETURNING id, expires_at",
                params![grant_id, developer_id, now_epoch()],
                |row| {
                    Ok(RevokedGrant {
                        id: row.get(0)?,
                        expires_at: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(revoked)
    }

    /// Revoke every currently-active descendant of a grant in one
    /// set-oriented statement, returning the affected rows for cache
    /// propagation.
    pub fn revoke_active_descendants(
        &self,
        grant_id: &str,
    ) -> Result<Vec<RevokedGrant>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "WITH RECURSIVE descendants(id) AS (
                 SELECT id FROM grants WHERE parent_grant_id = ?1 AND status = 'active'
                 UNION ALL
                 SELECT g.id FROM grants g
                 JOIN descendants d ON g.parent_grant_id = d.id
                 WHERE g.status = 'active'
             )
             UPDATE grants SET status = 'revoked', revoked_at = ?2
             WHERE id IN (SELECT id FROM descendants)
             RETURNING id, expires_at",
        )?;
        let revoked = stmt
            .query_map(params![grant_id, now_epoch()], |row| {
                Ok(RevokedGrant {
                    id: row.get(0)?,
                    expires_at: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(revoked)
    }
}
