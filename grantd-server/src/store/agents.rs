use super::{now_epoch, scopes_from_json, scopes_to_json, Store, StoreError};
use crate::ids;
use rusqlite::{params, OptionalExtension, Row};

/// A registered AI actor. Identity (`did`) is minted at registration and
/// never changes.
#[derive(Debug, Clone)]
pub struct Agent {
    pub id: String,
    pub did: String,
    pub developer_id: String,
    pub name: String,
    pub description: Option<String>,
    pub scopes: Vec<String>,
    pub status: String,
    pub created_at: i64,
}

fn agent_from_row(row: &Row<'_>) -> rusqlite::Result<Agent> {
    Ok(Agent {
        id: row.get(0)?,
        did: row.get(1)?,
        developer_id: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        scopes: scopes_from_json(&row.get::<_, String>(5)?),
        status: row.get(6)?,
        created_at: row.get(7)?,
    })
}

const AGENT_COLUMNS: &str =
    "id, did, developer_id, name, description, scopes, status, created_at";

impl Store {
    pub fn create_agent(
        &self,
        developer_id: &str,
        name: &str,
        description: Option<&str>,
        scopes: &[String],
    ) -> Result<Agent, StoreError> {
        let id = ids::new_agent_id();
        let did = format!("did:grantd:{id}");
        let created_at = now_epoch();
        self.conn().execute(
            "INSERT INTO agents (id, did, developer_id, name, description, scopes, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'active', ?7)",
            params![
                id,
                did,
                developer_id,
                name,
                description,
                scopes_to_json(scopes)?,
                created_at
            ],
        )?;
        Ok(Agent {
            id,
            did,
            developer_id: developer_id.to_string(),
            name: name.to_string(),
            description: description.map(str::to_string),
            scopes: scopes.to_vec(),
            status: "active".to_string(),
            created_at,
        })
    }

    /// Resolve an active agent owned by the developer.
    pub fn active_agent(
        &self,
        developer_id: &str,
        agent_id: &str,
    ) -> Result<Option<Agent>, StoreError> {
        let agent = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {AGENT_COLUMNS} FROM agents
                     WHERE id = ?1 AND developer_id = ?2 AND status = 'active'"
                ),
                params![agent_id, developer_id],
                agent_from_row,
            )
            .optional()?;
        Ok(agent)
    }

    pub fn agent_by_id(
        &self,
        developer_id: &str,
        agent_id: &str,
    ) -> Result<Option<Agent>, StoreError> {
        let agent = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {AGENT_COLUMNS} FROM agents
                     WHERE id = ?1 AND developer_id = ?2"
                ),
                params![agent_id, developer_id],
                agent_from_row,
            )
            .optional()?;
        Ok(agent)
    }

    pub fn list_agents(&self, developer_id: &str) -> Result<Vec<Agent>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {AGENT_COLUMNS} FROM agents
             WHERE developer_id = ?1 ORDER BY created_at DESC, id DESC"
        ))?;
        let agents = stmt
            .query_map([developer_id], agent_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(agents)
    }
}
